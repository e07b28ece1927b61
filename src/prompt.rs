//! Hand-off between connection handlers and the code driving a server.
//!
//! Every server owns one [`Prompt`]. A connection handler that has parsed a
//! request suspends on the prompt: it publishes an [`Exchange`] (the request,
//! its body and a single-use [`UnitHandle`]) and then waits on a oneshot
//! channel until the handle is resumed with a response.
//!
//! Exchanges are queued in the order handlers reach the suspension point. The
//! prompt id stamped into each handle lets a server recognise handles that
//! were produced by a different server.

use crate::error::{Error, Result};

use bytes::Bytes;
use futures::channel::{mpsc, oneshot};
use http::{Request, Response};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PROMPT: AtomicU64 = AtomicU64::new(1);

type Reply = (Response<()>, Bytes);

/// Suspension marker shared by a server and its connection handlers.
#[derive(Clone)]
pub(crate) struct Prompt {
    id: u64,
    sender: mpsc::UnboundedSender<Exchange>,
}

impl Prompt {
    /// Creates a prompt and the receiving end its server reads from.
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Exchange>) {
        let (sender, receiver) = mpsc::unbounded();
        let id = NEXT_PROMPT.fetch_add(1, Ordering::Relaxed);

        (Self { id, sender }, receiver)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Publishes `request` and waits until its handle is resumed.
    ///
    /// # Errors
    /// [`Error::Closed`] if the server stopped listening for exchanges or
    /// dropped the handle without answering.
    pub(crate) async fn suspend(&self, request: Request<()>, body: Bytes) -> Result<Reply> {
        let (reply, answer) = oneshot::channel();
        let handle = UnitHandle {
            prompt: self.id,
            reply,
        };

        self.sender
            .unbounded_send(Exchange {
                handle,
                request,
                body,
            })
            .map_err(|_| Error::Closed)?;

        answer.await.map_err(|_| Error::Closed)
    }
}

/// Single-use token for one suspended connection handler.
///
/// Passing it to [`Server::write`](crate::Server::write) consumes it, so a
/// handler can never be resumed twice. Dropping it unanswered makes the
/// handler close its connection.
pub struct UnitHandle {
    prompt: u64,
    reply: oneshot::Sender<Reply>,
}

impl UnitHandle {
    pub(crate) fn prompt(&self) -> u64 {
        self.prompt
    }

    /// Whether the handler behind this handle is still waiting.
    pub fn is_waiting(&self) -> bool {
        !self.reply.is_canceled()
    }

    pub(crate) fn resume(self, response: Response<()>, body: Bytes) -> Result<()> {
        self.reply
            .send((response, body))
            .map_err(|_| Error::HandleAbandoned)
    }
}

impl fmt::Debug for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitHandle")
            .field("prompt", &self.prompt)
            .field("waiting", &self.is_waiting())
            .finish()
    }
}

/// A request surfaced by [`Server::read`](crate::Server::read).
#[derive(Debug)]
pub struct Exchange {
    /// Token to pass back to [`Server::write`](crate::Server::write) with the
    /// response.
    pub handle: UnitHandle,
    /// Parsed request head. Method, target, version and headers are as sent.
    pub request: Request<()>,
    /// Request body with transfer framing removed; empty when the request
    /// declared none.
    pub body: Bytes,
}

impl Exchange {
    /// Splits the exchange into its parts.
    ///
    /// # Returns
    /// `(handle, request, body)`, in the order the handler surfaced them.
    pub fn into_parts(self) -> (UnitHandle, Request<()>, Bytes) {
        (self.handle, self.request, self.body)
    }
}
