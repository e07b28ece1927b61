//! Event-driven I/O reactor.
//!
//! - [`core`]: descriptor registry mapping readiness to parked wakers
//! - [`handle`]: shared handle held by sockets and the runtime
//! - [`poller`]: epoll / kqueue wrappers

pub(crate) mod core;
pub(crate) mod handle;
pub(crate) mod poller;

pub(crate) use handle::ReactorHandle;
