//! Non-blocking TCP networking.
//!
//! - [`socket`]: listening and accepted socket configuration
//! - [`tcp_listener`]: [`TcpListener`](tcp_listener::TcpListener) for accepting connections
//! - [`tcp_stream`]: [`TcpStream`](tcp_stream::TcpStream) for reading/writing data
//! - [`buffered`]: read buffer with peek, write buffer with explicit flush
//! - [`future`]: accept/read/write futures parked on the reactor
//! - [`utils`]: address conversion

pub(crate) mod buffered;
pub(crate) mod future;
pub(crate) mod socket;
pub(crate) mod tcp_listener;
pub(crate) mod tcp_stream;
pub(crate) mod utils;
