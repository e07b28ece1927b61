//! Non-blocking TCP stream driven by the reactor.

use crate::net::future::{ReadFuture, WriteFuture};
use crate::net::socket;
use crate::reactor::ReactorHandle;

use std::io;
use std::os::unix::io::RawFd;

/// One side of an accepted connection.
///
/// The stream closes its descriptor when dropped; [`TcpStream::close`] does
/// the same but reports the result of `close(2)`.
pub(crate) struct TcpStream {
    fd: RawFd,
    reactor: ReactorHandle,
    open: bool,
}

impl TcpStream {
    pub(crate) fn new(fd: RawFd, reactor: ReactorHandle) -> Self {
        Self {
            fd,
            reactor,
            open: true,
        }
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    /// Applies the accepted-socket options (non-blocking mode, send buffer,
    /// `TCP_NODELAY`).
    pub(crate) fn configure(&self, send_buffer_size: usize) -> io::Result<()> {
        socket::configure_client(self.fd, send_buffer_size)
    }

    pub(crate) fn read<'a>(&'a self, buffer: &'a mut [u8]) -> ReadFuture<'a> {
        ReadFuture::new(self.fd, buffer, &self.reactor)
    }

    pub(crate) fn write<'a>(&'a self, buffer: &'a [u8]) -> WriteFuture<'a> {
        WriteFuture::new(self.fd, buffer, &self.reactor)
    }

    pub(crate) async fn write_all(&self, mut buffer: &[u8]) -> io::Result<()> {
        while !buffer.is_empty() {
            let written = self.write(buffer).await?;
            if written == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "write returned zero bytes",
                ));
            }

            buffer = &buffer[written..];
        }

        Ok(())
    }

    /// Closes the socket and reports any error from the operating system.
    pub(crate) fn close(mut self) -> io::Result<()> {
        self.open = false;
        self.reactor.deregister(self.fd);

        if unsafe { libc::close(self.fd) } < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

impl Drop for TcpStream {
    fn drop(&mut self) {
        if !self.open {
            return;
        }

        self.reactor.deregister(self.fd);

        unsafe {
            libc::close(self.fd);
        }
    }
}
