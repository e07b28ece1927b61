//! Readiness polling over the operating system's event queue.
//!
//! - [`epoll`]: Linux
//! - [`kqueue`]: macOS and the BSDs
//!
//! Both pollers are level-triggered. The reactor removes interest as soon as
//! it has handed a readiness notification to a waker, which gives every
//! registration one-shot behaviour without relying on platform flags.

#[cfg(target_os = "linux")]
mod epoll;
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
mod kqueue;

#[cfg(target_os = "linux")]
pub(crate) use epoll::EpollPoller as Poller;
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub(crate) use kqueue::KqueuePoller as Poller;

use std::os::unix::io::RawFd;
use std::time::Duration;

/// Maximum number of readiness events collected by one wait.
const EVENT_CAPACITY: usize = 64;

/// Directions a file descriptor is waited on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

impl Interest {
    pub(crate) fn is_empty(self) -> bool {
        !self.read && !self.write
    }
}

/// A readiness notification for one file descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Readiness {
    pub(crate) fd: RawFd,
    pub(crate) readable: bool,
    pub(crate) writable: bool,
}

// Milliseconds for the poll timeout, rounded up so a short timeout never
// degrades into a busy loop. `-1` blocks indefinitely.
fn timeout_millis(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(duration) => {
            let mut millis = duration.as_millis();
            if Duration::from_millis(millis as u64) < duration {
                millis += 1;
            }

            millis.min(i32::MAX as u128) as i32
        }
    }
}
