//! Error type shared by the server and its connection handlers.

use crate::prompt::UnitHandle;

use std::io;
use thiserror::Error;

/// Failures surfaced by [`Server`](crate::Server) operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A socket operation failed (bind, listen, read, write, ...).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The bytes read from a connection are not a valid HTTP request.
    #[error("malformed request: {0}")]
    Parse(String),

    /// The unit handle was produced by a different server. The handle is
    /// returned untouched so it can still be answered through its own server.
    #[error("unit handle belongs to another server")]
    ForeignHandle(UnitHandle),

    /// The connection handler behind the unit handle no longer exists.
    #[error("connection handler is no longer waiting for a response")]
    HandleAbandoned,

    /// The accept loop terminated; the server can no longer take connections.
    #[error("accept loop terminated: {0}")]
    AcceptLoop(#[source] io::Error),

    /// A previous call already reported the accept loop's termination.
    #[error("accept loop is not running")]
    AcceptLoopStopped,

    /// The server was dropped while a handler was trying to hand off a request.
    #[error("server is closed")]
    Closed,

    /// No address matches the requested host and family.
    #[error("cannot resolve listening address: {0}")]
    AddressResolution(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
