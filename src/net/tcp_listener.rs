//! Non-blocking TCP listener driven by the reactor.

use crate::net::future::AcceptFuture;
use crate::net::socket;
use crate::net::tcp_stream::TcpStream;
use crate::reactor::ReactorHandle;

use std::io;
use std::net::SocketAddr;
use std::os::unix::io::{IntoRawFd, RawFd};

/// A listening socket whose `accept` suspends the calling task instead of
/// blocking the thread.
pub(crate) struct TcpListener {
    fd: RawFd,
    reactor: ReactorHandle,
}

impl TcpListener {
    /// Creates, configures and binds a socket, then starts listening with
    /// `backlog`.
    pub(crate) fn bind(address: &SocketAddr, backlog: i32, reactor: ReactorHandle) -> io::Result<Self> {
        let fd = socket::bind_listener(address)?;
        let listener = Self { fd, reactor };

        socket::listen(listener.fd, backlog)?;

        Ok(listener)
    }

    /// Adopts a caller-supplied socket.
    ///
    /// The socket is switched to non-blocking mode and `listen` is issued again
    /// so the backlog matches `backlog` even if the caller chose another one.
    pub(crate) fn from_std(
        listener: std::net::TcpListener,
        backlog: i32,
        reactor: ReactorHandle,
    ) -> io::Result<Self> {
        let listener = Self {
            fd: listener.into_raw_fd(),
            reactor,
        };

        socket::set_cloexec(listener.fd)?;
        socket::set_nonblocking(listener.fd)?;
        socket::listen(listener.fd, backlog)?;

        Ok(listener)
    }

    /// Waits for the next connection. The returned stream is not configured
    /// yet, see [`TcpStream::configure`].
    pub(crate) async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let (fd, peer) = AcceptFuture::new(self.fd, &self.reactor).await?;

        Ok((TcpStream::new(fd, self.reactor.clone()), peer))
    }

    pub(crate) fn local_addr(&self) -> io::Result<SocketAddr> {
        socket::local_addr(self.fd)
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        self.reactor.deregister(self.fd);

        unsafe {
            libc::close(self.fd);
        }
    }
}
