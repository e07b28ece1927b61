//! Runtime subsystem modules.

pub(crate) mod context;
mod core;
pub(crate) mod queue;
pub(crate) mod waker;

pub use context::spawn;
pub use self::core::Runtime;
pub(crate) use waker::make_waker;
