//! Connection handler: one task per accepted client.
//!
//! The handler loops over three states until the connection is done:
//!
//! 1. **Reading**: parse a request head and body. A malformed request is
//!    answered with the canned `400` from [`wire::bad_request`] instead of
//!    being handed off.
//! 2. **Awaiting response**: suspend on the server's [`Prompt`] until the
//!    application resumes the unit handle with a response.
//! 3. **Writing**: serialize the response, write the body, flush. The
//!    connection goes back to reading only if [`keep_alive`] allows it and
//!    the client has not closed its side.
//!
//! Whatever ends the loop, the socket is closed exactly once; a failure to
//! close is logged and otherwise ignored.

use crate::error::{Error, Result};
use crate::net::buffered::BufferedStream;
use crate::net::tcp_stream::TcpStream;
use crate::prompt::Prompt;
use crate::wire;

use bytes::Bytes;
use http::{Response, Version};
use std::net::SocketAddr;
use tracing::{debug, trace, warn};

/// Whether the connection that produced `response` may carry another request.
///
/// Only statuses below 400, plus 404, qualify. HTTP/1.1 keeps the connection
/// unless a `connection: close` directive is present; HTTP/1.0 keeps it only
/// with `connection: keep-alive`; other versions never do.
pub fn keep_alive(response: &Response<()>) -> bool {
    let status = response.status().as_u16();
    if status >= 400 && status != 404 {
        return false;
    }

    let tokens = wire::connection_tokens(response.headers());
    let version = response.version();

    if version == Version::HTTP_11 {
        !tokens.iter().any(|token| token == "close")
    } else if version == Version::HTTP_10 {
        tokens.iter().any(|token| token == "keep-alive")
    } else {
        false
    }
}

/// Serves `stream` until the client leaves or a response ends the connection.
pub(crate) async fn serve(stream: TcpStream, peer: SocketAddr, prompt: Prompt, read_buffer_size: usize) {
    let fd = stream.fd();
    let mut stream = BufferedStream::new(stream, read_buffer_size);

    trace!(fd, %peer, prompt = prompt.id(), "connection handler started");

    match exchange(&mut stream, peer, &prompt).await {
        Ok(()) => trace!(fd, %peer, "connection finished"),
        Err(error) => debug!(fd, %peer, %error, "connection failed"),
    }

    if let Err(error) = stream.into_inner().close() {
        warn!(fd, %peer, %error, "failed to close connection");
    }
}

async fn exchange(stream: &mut BufferedStream, peer: SocketAddr, prompt: &Prompt) -> Result<()> {
    let fd = stream.get_ref().fd();

    loop {
        if stream.peek().await?.is_none() {
            trace!(fd, %peer, "client closed the connection");
            return Ok(());
        }

        let (response, body) = match read_request(stream).await {
            Ok((request, body)) => {
                debug!(fd, %peer, method = %request.method(), uri = %request.uri(), "request received");
                prompt.suspend(request, body).await?
            }
            Err(Error::Parse(reason)) => {
                warn!(fd, %peer, %reason, "malformed request");
                (wire::bad_request(), Bytes::new())
            }
            Err(error) => return Err(error),
        };

        wire::serialize_response(&response, &body, stream);
        stream.flush().await?;

        let keep_alive = keep_alive(&response);
        debug!(fd, %peer, status = response.status().as_u16(), keep_alive, "response written");

        if !keep_alive {
            return Ok(());
        }
    }
}

async fn read_request(stream: &mut BufferedStream) -> Result<(http::Request<()>, Bytes)> {
    let request = wire::parse_request(stream).await?;
    let body = wire::parse_body(&request, stream).await?;

    Ok((request, body))
}
