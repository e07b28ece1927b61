//! Accept, read and write futures for non-blocking sockets.
//!
//! Each future retries its syscall on every poll. When the operating system
//! reports `EAGAIN`/`EWOULDBLOCK` the caller's waker is parked on the reactor
//! and the future returns `Poll::Pending`; the reactor wakes the task once
//! the descriptor is ready again.

use crate::net::socket::SEND_FLAGS;
use crate::net::utils::raw_to_socketaddr;
use crate::reactor::ReactorHandle;

use libc::{sockaddr, sockaddr_storage, socklen_t};
use std::future::Future;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Resolves to the next connection accepted on a listening socket.
pub(crate) struct AcceptFuture<'a> {
    listener: RawFd,
    reactor: &'a ReactorHandle,
}

impl<'a> AcceptFuture<'a> {
    pub(crate) fn new(listener: RawFd, reactor: &'a ReactorHandle) -> Self {
        Self { listener, reactor }
    }
}

impl Future for AcceptFuture<'_> {
    type Output = io::Result<(RawFd, SocketAddr)>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
            let mut length = mem::size_of::<sockaddr_storage>() as socklen_t;

            let client = unsafe {
                libc::accept(
                    self.listener,
                    &mut storage as *mut _ as *mut sockaddr,
                    &mut length,
                )
            };

            if client >= 0 {
                return match raw_to_socketaddr(&storage) {
                    Ok(peer) => Poll::Ready(Ok((client, peer))),
                    Err(error) => {
                        unsafe { libc::close(client) };
                        Poll::Ready(Err(error))
                    }
                };
            }

            let error = io::Error::last_os_error();
            match error.kind() {
                io::ErrorKind::WouldBlock => {
                    return match self.reactor.register_read(self.listener, cx.waker()) {
                        Ok(()) => Poll::Pending,
                        Err(error) => Poll::Ready(Err(error)),
                    };
                }
                // The peer gave up between the handshake and accept.
                io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted => continue,
                _ => return Poll::Ready(Err(error)),
            }
        }
    }
}

/// Resolves to the number of bytes read; `0` means end of stream.
pub(crate) struct ReadFuture<'a> {
    fd: RawFd,
    buffer: &'a mut [u8],
    reactor: &'a ReactorHandle,
}

impl<'a> ReadFuture<'a> {
    pub(crate) fn new(fd: RawFd, buffer: &'a mut [u8], reactor: &'a ReactorHandle) -> Self {
        Self { fd, buffer, reactor }
    }
}

impl Future for ReadFuture<'_> {
    type Output = io::Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        loop {
            let result = unsafe {
                libc::read(
                    this.fd,
                    this.buffer.as_mut_ptr() as *mut libc::c_void,
                    this.buffer.len(),
                )
            };

            if result >= 0 {
                return Poll::Ready(Ok(result as usize));
            }

            let error = io::Error::last_os_error();
            match error.kind() {
                io::ErrorKind::WouldBlock => {
                    return match this.reactor.register_read(this.fd, cx.waker()) {
                        Ok(()) => Poll::Pending,
                        Err(error) => Poll::Ready(Err(error)),
                    };
                }
                io::ErrorKind::Interrupted => continue,
                _ => return Poll::Ready(Err(error)),
            }
        }
    }
}

/// Resolves to the number of bytes written.
pub(crate) struct WriteFuture<'a> {
    fd: RawFd,
    buffer: &'a [u8],
    reactor: &'a ReactorHandle,
}

impl<'a> WriteFuture<'a> {
    pub(crate) fn new(fd: RawFd, buffer: &'a [u8], reactor: &'a ReactorHandle) -> Self {
        Self { fd, buffer, reactor }
    }
}

impl Future for WriteFuture<'_> {
    type Output = io::Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            let result = unsafe {
                libc::send(
                    self.fd,
                    self.buffer.as_ptr() as *const libc::c_void,
                    self.buffer.len(),
                    SEND_FLAGS,
                )
            };

            if result >= 0 {
                return Poll::Ready(Ok(result as usize));
            }

            let error = io::Error::last_os_error();
            match error.kind() {
                io::ErrorKind::WouldBlock => {
                    return match self.reactor.register_write(self.fd, cx.waker()) {
                        Ok(()) => Poll::Pending,
                        Err(error) => Poll::Ready(Err(error)),
                    };
                }
                io::ErrorKind::Interrupted => continue,
                _ => return Poll::Ready(Err(error)),
            }
        }
    }
}
