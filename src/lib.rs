//! Single-threaded HTTP/1.x transport on a minimal async runtime.
//!
//! This crate accepts TCP connections, parses requests off the wire and hands
//! each one to the code driving the server, then writes the response it gets
//! back and decides whether to keep the connection open. Every connection is
//! a cooperative task; all of them share one thread and one readiness poller.
//!
//! # Architecture
//!
//! - **Server**: open / read / write / close, the interface a web front-end drives
//! - **ServerBuilder**: fluent configuration for the listening socket
//! - **Connection handler**: per-client task that parses, suspends and writes
//! - **Prompt**: channel pair connecting suspended handlers to `Server::read`
//! - **Runtime**: task queue, wakers and the loop that drives them
//! - **Reactor**: maps file descriptors to parked wakers over epoll or kqueue
//!
//! # Example
//! ```no_run
//! use reactor_web::{Bytes, ServerBuilder};
//! use http::Response;
//!
//! let mut server = ServerBuilder::new().port(8080).open()?;
//!
//! loop {
//!     let exchange = server.read()?;
//!     let response = Response::builder().status(200).body(())?;
//!     server.write(exchange.handle, response, Bytes::from_static(b"hello"))?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]

mod builder;
mod connection;
mod error;
mod net;
mod prompt;
mod reactor;
mod runtime;
mod server;
mod task;
mod utils;
mod wire;

pub use builder::{DEFAULT_BACKLOG, DEFAULT_PORT, DEFAULT_READ_BUFFER, DEFAULT_SEND_BUFFER, Family, ServerBuilder};
pub use bytes::Bytes;
pub use connection::keep_alive;
pub use error::{Error, Result};
pub use prompt::{Exchange, UnitHandle};
pub use runtime::{Runtime, spawn};
pub use server::Server;
pub use task::JoinHandle;
pub use wire::{MAX_HEAD_BYTES, MAX_HEADERS, bad_request, connection_tokens, encode_head, version_pair};
