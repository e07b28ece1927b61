//! The transport a web front-end drives: open, read, write, close.
//!
//! A [`Server`] owns a [`Runtime`] and the receiving end of its prompt. Opening
//! it binds the listening socket and spawns the accept loop; nothing else runs
//! until the caller drives the runtime through [`Server::read`],
//! [`Server::try_read`] or [`Server::write`].
//!
//! # Hand-off
//!
//! ```text
//! accept loop ──spawn──▶ connection handler ──Exchange──▶ Server::read
//!                                ▲                              │
//!                                └──(response, body)── Server::write
//! ```
//!
//! Each handler has at most one exchange in flight. Exchanges from different
//! connections arrive in the order their handlers finished parsing.

use crate::builder::ServerBuilder;
use crate::connection;
use crate::error::{Error, Result};
use crate::net::tcp_listener::TcpListener;
use crate::prompt::{Exchange, Prompt, UnitHandle};
use crate::runtime::{self, Runtime};
use crate::task::JoinHandle;

use bytes::Bytes;
use futures::channel::mpsc;
use futures::future::{Either, FutureExt, select};
use futures::StreamExt;
use http::Response;
use std::io;
use std::net::SocketAddr;
use tracing::{debug, error, trace, warn};

/// A listening HTTP/1.x transport.
pub struct Server {
    runtime: Runtime,
    // Keeps the exchange channel open for as long as the server exists.
    prompt: Prompt,
    exchanges: mpsc::UnboundedReceiver<Exchange>,
    accept_loop: Option<JoinHandle<io::Error>>,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the listening socket and starts accepting connections.
    ///
    /// # Errors
    /// Fails if the address cannot be resolved or the socket cannot be bound,
    /// configured or listened on.
    pub fn open(mut options: ServerBuilder) -> Result<Self> {
        let runtime = Runtime::new()?;
        let listener = options.bind(runtime.reactor())?;
        let local_addr = listener.local_addr()?;
        let (prompt, exchanges) = Prompt::new();

        debug!(%local_addr, prompt = prompt.id(), "server listening");

        let accept_loop = runtime.spawn(accept_loop(
            listener,
            prompt.clone(),
            options.send_buffer(),
            options.read_buffer(),
        ));

        Ok(Self {
            runtime,
            prompt,
            exchanges,
            accept_loop: Some(accept_loop),
            local_addr,
        })
    }

    /// Drives the server until a connection handler hands off a request.
    ///
    /// # Returns
    /// The next [`Exchange`]: a request, its body and the handle to answer it
    /// with.
    ///
    /// # Errors
    /// [`Error::AcceptLoop`] once, when the accept loop dies; every later call
    /// fails with [`Error::AcceptLoopStopped`]. [`Error::Io`] if the poller
    /// fails. Exchanges already handed off are still returned before the
    /// accept loop's death is reported.
    pub fn read(&mut self) -> Result<Exchange> {
        let accept_loop = self.accept_loop.as_mut().ok_or(Error::AcceptLoopStopped)?;

        let next = self
            .runtime
            .run_until(select(self.exchanges.next(), accept_loop))?
            .map(|either| match either {
                Either::Left((exchange, _)) => Ok(exchange),
                Either::Right((error, _)) => Err(error),
            });

        match next {
            Some(Ok(Some(exchange))) => Ok(exchange),
            Some(Err(error)) => Err(self.accept_loop_died(error)),
            // The server holds a sender, so the channel never ends. A runtime
            // with nothing left to run has no accept loop either.
            Some(Ok(None)) | None => {
                self.accept_loop = None;
                Err(Error::AcceptLoopStopped)
            }
        }
    }

    /// Runs whatever is ready without waiting for I/O and returns a request if
    /// one was handed off.
    ///
    /// # Errors
    /// The same as [`Server::read`].
    pub fn try_read(&mut self) -> Result<Option<Exchange>> {
        self.runtime.run_pending()?;

        if let Some(Some(exchange)) = self.exchanges.next().now_or_never() {
            return Ok(Some(exchange));
        }

        let accept_loop = self.accept_loop.as_mut().ok_or(Error::AcceptLoopStopped)?;
        match accept_loop.now_or_never() {
            Some(error) => Err(self.accept_loop_died(error)),
            None => Ok(None),
        }
    }

    /// Answers the request behind `handle`.
    ///
    /// The handler is resumed and ready work is run once, so the response is
    /// written out even if `read` is not called again.
    ///
    /// # Errors
    /// [`Error::ForeignHandle`] hands back a handle produced by another
    /// server, untouched. [`Error::HandleAbandoned`] means the handler is
    /// gone and the response was discarded.
    pub fn write(&mut self, handle: UnitHandle, response: Response<()>, body: Bytes) -> Result<()> {
        if handle.prompt() != self.prompt.id() {
            warn!(prompt = self.prompt.id(), foreign = handle.prompt(), "unit handle from another server");
            return Err(Error::ForeignHandle(handle));
        }

        trace!(prompt = self.prompt.id(), status = response.status().as_u16(), "resuming handler");
        handle.resume(response, body)?;

        self.runtime.run_pending()?;

        Ok(())
    }

    /// Stops the server: every connection and the listening socket are
    /// closed, and handlers still waiting for a response are cancelled.
    pub fn close(self) {
        debug!(
            local_addr = %self.local_addr,
            tasks = self.runtime.live_tasks(),
            "closing server"
        );

        self.runtime.shutdown();
    }

    /// Address the listening socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The scheduler the server runs on. Tasks spawned on it are driven by
    /// `read`, `try_read` and `write`.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    fn accept_loop_died(&mut self, error: io::Error) -> Error {
        error!(local_addr = %self.local_addr, %error, "accept loop terminated");
        self.accept_loop = None;

        Error::AcceptLoop(error)
    }
}

/// Accepts connections and spawns one handler per client. Returns only when
/// `accept` fails for good.
async fn accept_loop(
    listener: TcpListener,
    prompt: Prompt,
    send_buffer_size: usize,
    read_buffer_size: usize,
) -> io::Error {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => return error,
        };

        if let Err(error) = stream.configure(send_buffer_size) {
            warn!(fd = stream.fd(), %peer, %error, "failed to configure client socket");
            continue;
        }

        trace!(fd = stream.fd(), %peer, "connection accepted");
        runtime::spawn(connection::serve(stream, peer, prompt.clone(), read_buffer_size));
    }
}
