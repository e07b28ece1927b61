//! Socket configuration for listening and accepted sockets.
//!
//! Listening sockets get address reuse, close-on-exec and non-blocking mode
//! before they are bound. Accepted sockets are made non-blocking, get a send
//! buffer sized for small interactive responses, and have Nagle's algorithm
//! turned off (best effort) because the connection flushes explicitly.
//!
//! Broken pipes never raise `SIGPIPE`: writes go through `send` with
//! `MSG_NOSIGNAL` wherever the platform has it (Linux, Android and the BSDs),
//! and sockets carry `SO_NOSIGPIPE` on Apple platforms. A write to a closed
//! peer is an ordinary `EPIPE`.

use crate::net::utils::{raw_to_socketaddr, socketaddr_to_raw};

use libc::{
    AF_INET, AF_INET6, F_GETFD, F_GETFL, F_SETFD, F_SETFL, FD_CLOEXEC, IPPROTO_TCP, O_NONBLOCK,
    SO_REUSEADDR, SO_SNDBUF, SOCK_STREAM, SOL_SOCKET, TCP_NODELAY, c_int, fcntl, getsockname,
    setsockopt, sockaddr, sockaddr_storage, socklen_t,
};
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::unix::io::{FromRawFd, IntoRawFd, OwnedFd, RawFd};

/// Flags passed to every `send` on a connection.
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
pub(crate) const SEND_FLAGS: c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
)))]
pub(crate) const SEND_FLAGS: c_int = 0;

/// Creates a socket bound to `address`, ready for `listen`.
pub(crate) fn bind_listener(address: &SocketAddr) -> io::Result<RawFd> {
    let family = match address {
        SocketAddr::V4(_) => AF_INET,
        SocketAddr::V6(_) => AF_INET6,
    };

    let fd = unsafe { libc::socket(family, SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    // Closes the descriptor if any step below fails.
    let socket = unsafe { OwnedFd::from_raw_fd(fd) };

    set_option(fd, SOL_SOCKET, SO_REUSEADDR, 1)?;
    set_cloexec(fd)?;

    let (storage, length) = socketaddr_to_raw(address);
    let ret = unsafe { libc::bind(fd, &storage as *const _ as *const sockaddr, length) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    set_nonblocking(fd)?;

    Ok(socket.into_raw_fd())
}

/// Puts a bound socket into listening mode.
pub(crate) fn listen(fd: RawFd, backlog: i32) -> io::Result<()> {
    let ret = unsafe { libc::listen(fd, backlog) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Applies the per-connection options to a freshly accepted socket.
pub(crate) fn configure_client(fd: RawFd, send_buffer_size: usize) -> io::Result<()> {
    set_cloexec(fd)?;
    set_nonblocking(fd)?;
    suppress_sigpipe(fd)?;

    let size = send_buffer_size.min(c_int::MAX as usize) as c_int;
    set_option(fd, SOL_SOCKET, SO_SNDBUF, size)?;

    // Fails on non-TCP sockets; the connection works the same without it.
    let _ = set_option(fd, IPPROTO_TCP, TCP_NODELAY, 1);

    Ok(())
}

pub(crate) fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

pub(crate) fn set_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { fcntl(fd, F_SETFD, flags | FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

pub(crate) fn local_addr(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut length = mem::size_of::<sockaddr_storage>() as socklen_t;

    let ret = unsafe { getsockname(fd, &mut storage as *mut _ as *mut sockaddr, &mut length) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    raw_to_socketaddr(&storage)
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn suppress_sigpipe(fd: RawFd) -> io::Result<()> {
    set_option(fd, SOL_SOCKET, libc::SO_NOSIGPIPE, 1)
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
fn suppress_sigpipe(_fd: RawFd) -> io::Result<()> {
    Ok(())
}

fn set_option(fd: RawFd, level: c_int, name: c_int, value: c_int) -> io::Result<()> {
    let ret = unsafe {
        setsockopt(
            fd,
            level,
            name,
            &value as *const c_int as *const libc::c_void,
            mem::size_of::<c_int>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use libc::getsockopt;
    use std::os::unix::io::AsRawFd;

    fn get_option(fd: RawFd, level: c_int, name: c_int) -> c_int {
        let mut value: c_int = 0;
        let mut length = mem::size_of::<c_int>() as socklen_t;
        let ret = unsafe {
            getsockopt(
                fd,
                level,
                name,
                &mut value as *mut c_int as *mut libc::c_void,
                &mut length,
            )
        };
        assert_eq!(ret, 0, "getsockopt failed");

        value
    }

    #[test]
    fn listener_is_reusable_nonblocking_and_cloexec() {
        let fd = bind_listener(&"127.0.0.1:0".parse().expect("address")).expect("bind");
        let socket = unsafe { OwnedFd::from_raw_fd(fd) };

        assert_ne!(get_option(fd, SOL_SOCKET, SO_REUSEADDR), 0);
        assert_ne!(unsafe { fcntl(fd, F_GETFL) } & O_NONBLOCK, 0);
        assert_ne!(unsafe { fcntl(fd, F_GETFD) } & FD_CLOEXEC, 0);

        let address = local_addr(socket.as_raw_fd()).expect("local address");
        assert!(address.ip().is_loopback());
        assert_ne!(address.port(), 0);
    }

    #[test]
    fn client_options_tolerate_non_tcp_sockets() {
        let (socket, _peer) = std::os::unix::net::UnixStream::pair().expect("socket pair");

        configure_client(socket.as_raw_fd(), 12 * 1024).expect("configure");

        assert_ne!(unsafe { fcntl(socket.as_raw_fd(), F_GETFL) } & O_NONBLOCK, 0);
    }

    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    #[test]
    fn sends_never_raise_sigpipe() {
        assert_ne!(SEND_FLAGS & libc::MSG_NOSIGNAL, 0);
    }

    #[test]
    fn write_to_departed_peer_is_broken_pipe() {
        use crate::Runtime;
        use crate::net::tcp_stream::TcpStream;
        use std::os::unix::io::IntoRawFd;

        let runtime = Runtime::new().expect("runtime");
        let (ours, theirs) = std::os::unix::net::UnixStream::pair().expect("socket pair");
        configure_client(ours.as_raw_fd(), 12 * 1024).expect("configure");
        drop(theirs);

        let stream = TcpStream::new(ours.into_raw_fd(), runtime.reactor());
        let result = runtime
            .run_until(stream.write_all(b"nobody is listening"))
            .expect("run")
            .expect("completed");

        let error = result.expect_err("peer is gone");
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn client_options_apply_to_tcp() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("listener");
        let client = std::net::TcpStream::connect(listener.local_addr().expect("addr")).expect("connect");

        configure_client(client.as_raw_fd(), 12 * 1024).expect("configure");

        assert_ne!(get_option(client.as_raw_fd(), IPPROTO_TCP, TCP_NODELAY), 0);
        // The kernel may round or double the requested size, never shrink it.
        assert!(get_option(client.as_raw_fd(), SOL_SOCKET, SO_SNDBUF) >= 12 * 1024);
    }
}
