//! Fluent configuration for opening a [`Server`].
//!
//! A server listens either on an address resolved from host, family and port,
//! or on a listening socket the caller already built. Socket tuning (backlog
//! and buffer sizes) applies in both cases.
//!
//! # Example
//! ```ignore
//! let server = ServerBuilder::new().port(0).open()?;
//! ```

use crate::error::{Error, Result};
use crate::net::tcp_listener::TcpListener;
use crate::reactor::ReactorHandle;
use crate::server::Server;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 8080;

/// Length of the kernel's queue of connections not yet accepted.
pub const DEFAULT_BACKLOG: i32 = 1024;

/// Send-buffer size requested for every accepted client socket.
pub const DEFAULT_SEND_BUFFER: usize = 12 * 1024;

/// Size of each connection's read buffer.
pub const DEFAULT_READ_BUFFER: usize = 1024;

/// Address family of the listening socket.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// IPv4.
    #[default]
    Inet,
    /// IPv6.
    Inet6,
}

impl Family {
    fn loopback(self) -> IpAddr {
        match self {
            Family::Inet => IpAddr::V4(Ipv4Addr::LOCALHOST),
            Family::Inet6 => IpAddr::V6(Ipv6Addr::LOCALHOST),
        }
    }

    fn matches(self, address: &SocketAddr) -> bool {
        match self {
            Family::Inet => address.is_ipv4(),
            Family::Inet6 => address.is_ipv6(),
        }
    }
}

/// Options for [`Server::open`].
#[derive(Debug)]
pub struct ServerBuilder {
    host: Option<String>,
    address: Option<IpAddr>,
    family: Family,
    port: u16,
    listener: Option<std::net::TcpListener>,
    backlog: i32,
    send_buffer_size: usize,
    read_buffer_size: usize,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    /// Loopback, port 8080, IPv4.
    pub fn new() -> Self {
        Self {
            host: None,
            address: None,
            family: Family::Inet,
            port: DEFAULT_PORT,
            listener: None,
            backlog: DEFAULT_BACKLOG,
            send_buffer_size: DEFAULT_SEND_BUFFER,
            read_buffer_size: DEFAULT_READ_BUFFER,
        }
    }

    /// Host name or address literal to resolve. Only addresses of the
    /// configured [`Family`] are considered.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the address family used for the default loopback address and
    /// for filtering the addresses a host resolves to.
    ///
    /// # Arguments
    /// * `family` - [`Family::Inet`] (the default) or [`Family::Inet6`]
    pub fn family(mut self, family: Family) -> Self {
        self.family = family;
        self
    }

    /// Binds to `address` directly, skipping host resolution. The family
    /// follows the address.
    pub fn address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }

    /// Port to bind; `0` lets the operating system pick one.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Serves on an already bound socket. Host, address, family and port are
    /// ignored.
    pub fn listener(mut self, listener: std::net::TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Sets how many fully established connections the kernel queues before
    /// they are accepted. Defaults to [`DEFAULT_BACKLOG`].
    ///
    /// Also applied to a listener passed to [`ServerBuilder::listener`].
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Sets the `SO_SNDBUF` size requested for every accepted client socket.
    /// Defaults to [`DEFAULT_SEND_BUFFER`].
    ///
    /// # Arguments
    /// * `size` - Buffer size in bytes; the kernel may round it up
    pub fn send_buffer_size(mut self, size: usize) -> Self {
        self.send_buffer_size = size;
        self
    }

    /// Sets the size of each connection's read buffer. Defaults to
    /// [`DEFAULT_READ_BUFFER`].
    ///
    /// # Arguments
    /// * `size` - Buffer size in bytes; `0` is treated as `1`
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Opens the server. Same as [`Server::open`].
    ///
    /// # Returns
    /// A listening [`Server`] whose accept loop runs once it is driven.
    pub fn open(self) -> Result<Server> {
        Server::open(self)
    }

    pub(crate) fn send_buffer(&self) -> usize {
        self.send_buffer_size
    }

    pub(crate) fn read_buffer(&self) -> usize {
        self.read_buffer_size
    }

    /// Produces the listening socket, binding a new one unless a listener
    /// was supplied.
    pub(crate) fn bind(&mut self, reactor: ReactorHandle) -> Result<TcpListener> {
        match self.listener.take() {
            Some(listener) => Ok(TcpListener::from_std(listener, self.backlog, reactor)?),
            None => {
                let address = self.resolve()?;
                Ok(TcpListener::bind(&address, self.backlog, reactor)?)
            }
        }
    }

    /// The socket address a new listener binds to.
    pub(crate) fn resolve(&self) -> Result<SocketAddr> {
        if let Some(address) = self.address {
            return Ok(SocketAddr::new(address, self.port));
        }

        let host = match &self.host {
            Some(host) => host,
            None => return Ok(SocketAddr::new(self.family.loopback(), self.port)),
        };

        let candidates = (host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|error| Error::AddressResolution(format!("{host}: {error}")))?;

        candidates
            .into_iter()
            .find(|candidate| self.family.matches(candidate))
            .ok_or_else(|| Error::AddressResolution(format!("no {:?} address for {host}", self.family)))
    }
}
