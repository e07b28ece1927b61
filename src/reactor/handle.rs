use crate::reactor::core::{Direction, Reactor};

use std::cell::RefCell;
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::task::Waker;
use std::time::Duration;

/// Shared, single-threaded access to a runtime's [`Reactor`].
///
/// Sockets keep a handle so their futures can park wakers and so they can
/// deregister themselves when dropped.
#[derive(Clone)]
pub(crate) struct ReactorHandle {
    inner: Rc<RefCell<Reactor>>,
}

impl ReactorHandle {
    pub(crate) fn new(reactor: Reactor) -> Self {
        Self {
            inner: Rc::new(RefCell::new(reactor)),
        }
    }

    pub(crate) fn register_read(&self, fd: RawFd, waker: &Waker) -> io::Result<()> {
        self.inner
            .borrow_mut()
            .register(fd, Direction::Read, waker)
    }

    pub(crate) fn register_write(&self, fd: RawFd, waker: &Waker) -> io::Result<()> {
        self.inner
            .borrow_mut()
            .register(fd, Direction::Write, waker)
    }

    /// Drops any wakers parked on `fd`.
    ///
    /// Skipped when the reactor is already borrowed (a socket dropped while the
    /// reactor itself is being torn down); closing the descriptor removes it
    /// from the poller either way.
    pub(crate) fn deregister(&self, fd: RawFd) {
        let parked = match self.inner.try_borrow_mut() {
            Ok(mut reactor) => reactor.deregister(fd),
            Err(_) => return,
        };

        drop(parked);
    }

    pub(crate) fn poll(&self, timeout: Option<Duration>) -> io::Result<Vec<Waker>> {
        self.inner.borrow_mut().poll(timeout)
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.inner.borrow().is_idle()
    }

    pub(crate) fn clear(&self) {
        let parked = self.inner.borrow_mut().clear();

        drop(parked);
    }
}
