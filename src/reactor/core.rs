use crate::reactor::poller::{Interest, Poller, Readiness};

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::task::Waker;
use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub(crate) enum Direction {
    Read,
    Write,
}

/// Wakers parked on one file descriptor, at most one per direction.
#[derive(Default)]
struct Registration {
    reader: Option<Waker>,
    writer: Option<Waker>,
}

impl Registration {
    fn interest(&self) -> Interest {
        Interest {
            read: self.reader.is_some(),
            write: self.writer.is_some(),
        }
    }

    fn slot(&mut self, direction: Direction) -> &mut Option<Waker> {
        match direction {
            Direction::Read => &mut self.reader,
            Direction::Write => &mut self.writer,
        }
    }
}

/// Maps file descriptors to the tasks waiting on them.
///
/// A registration only lives until its readiness is reported: the waker is
/// handed back to the caller of [`Reactor::poll`] and the interest is removed
/// from the poller. A future that still cannot make progress registers again.
pub(crate) struct Reactor {
    poller: Poller,
    registry: HashMap<RawFd, Registration>,
    ready: Vec<Readiness>,
}

impl Reactor {
    pub(crate) fn new() -> io::Result<Self> {
        Ok(Self {
            poller: Poller::new()?,
            registry: HashMap::new(),
            ready: Vec::new(),
        })
    }

    /// Parks `waker` until `fd` is ready in `direction`.
    pub(crate) fn register(
        &mut self,
        fd: RawFd,
        direction: Direction,
        waker: &Waker,
    ) -> io::Result<()> {
        let entry = self.registry.entry(fd).or_default();
        let previous = entry.interest();

        let parked = entry.slot(direction);
        if parked.as_ref().is_some_and(|current| current.will_wake(waker)) {
            return Ok(());
        }
        let displaced = parked.replace(waker.clone());

        let interest = entry.interest();
        let result = if previous.is_empty() {
            self.poller.register(fd, interest)
        } else if previous != interest {
            self.poller.modify(fd, previous, interest)
        } else {
            Ok(())
        };

        if result.is_err() {
            *entry.slot(direction) = displaced;
            if entry.interest().is_empty() {
                self.registry.remove(&fd);
            }
        }

        result
    }

    /// Removes `fd` from the poller and returns the wakers parked on it.
    /// Called before the descriptor closes.
    pub(crate) fn deregister(&mut self, fd: RawFd) -> Vec<Waker> {
        let Some(mut entry) = self.registry.remove(&fd) else {
            return Vec::new();
        };

        let interest = entry.interest();
        if !interest.is_empty() {
            let _ = self.poller.deregister(fd, interest);
        }

        entry.reader.take().into_iter().chain(entry.writer.take()).collect()
    }

    /// Waits up to `timeout` for readiness and returns the wakers to notify.
    ///
    /// The wakers are returned rather than woken so the caller can release its
    /// borrow of the reactor first.
    pub(crate) fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Vec<Waker>> {
        self.poller.wait(timeout, &mut self.ready)?;

        let mut wakers = Vec::new();

        for readiness in self.ready.drain(..) {
            let Some(entry) = self.registry.get_mut(&readiness.fd) else {
                continue;
            };

            let previous = entry.interest();

            if readiness.readable {
                wakers.extend(entry.reader.take());
            }
            if readiness.writable {
                wakers.extend(entry.writer.take());
            }

            let interest = entry.interest();
            if interest.is_empty() {
                self.registry.remove(&readiness.fd);
                let _ = self.poller.deregister(readiness.fd, previous);
            } else if interest != previous {
                let _ = self.poller.modify(readiness.fd, previous, interest);
            }
        }

        Ok(wakers)
    }

    /// True when no task is waiting on any descriptor.
    pub(crate) fn is_idle(&self) -> bool {
        self.registry.is_empty()
    }

    /// Drops every parked waker and removes all descriptors from the poller.
    pub(crate) fn clear(&mut self) -> Vec<Waker> {
        let mut wakers = Vec::new();

        for (fd, mut entry) in self.registry.drain() {
            let interest = entry.interest();
            let _ = self.poller.deregister(fd, interest);

            wakers.extend(entry.reader.take());
            wakers.extend(entry.writer.take());
        }

        wakers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::task::{ArcWake, waker};
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingWake(AtomicUsize);

    impl ArcWake for CountingWake {
        fn wake_by_ref(arc_self: &Arc<Self>) {
            arc_self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn readiness_hands_back_the_waker_once() {
        let mut reactor = Reactor::new().expect("reactor");
        let (socket, mut peer) = UnixStream::pair().expect("socket pair");
        let counter = Arc::new(CountingWake(AtomicUsize::new(0)));
        let waker = waker(counter.clone());

        reactor
            .register(socket.as_raw_fd(), Direction::Read, &waker)
            .expect("register");
        assert!(!reactor.is_idle());

        peer.write_all(b"ready").expect("write");

        let wakers = reactor
            .poll(Some(Duration::from_secs(5)))
            .expect("poll");
        assert_eq!(wakers.len(), 1);
        assert!(reactor.is_idle());

        wakers.into_iter().for_each(Waker::wake);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        // Interest was dropped with the notification, nothing fires again.
        let wakers = reactor.poll(Some(Duration::ZERO)).expect("poll");
        assert!(wakers.is_empty());
    }

    #[test]
    fn directions_are_tracked_independently() {
        let mut reactor = Reactor::new().expect("reactor");
        let (socket, _peer) = UnixStream::pair().expect("socket pair");
        let fd = socket.as_raw_fd();
        let reader = waker(Arc::new(CountingWake(AtomicUsize::new(0))));
        let writer = waker(Arc::new(CountingWake(AtomicUsize::new(0))));

        reactor.register(fd, Direction::Read, &reader).expect("read");
        reactor.register(fd, Direction::Write, &writer).expect("write");

        // Only the write side is ready on a fresh socket pair.
        let wakers = reactor
            .poll(Some(Duration::from_secs(5)))
            .expect("poll");
        assert_eq!(wakers.len(), 1);
        assert!(wakers[0].will_wake(&writer));
        assert!(!reactor.is_idle());

        reactor.deregister(fd);
        assert!(reactor.is_idle());
    }

    #[test]
    fn clear_returns_parked_wakers() {
        let mut reactor = Reactor::new().expect("reactor");
        let (socket, _peer) = UnixStream::pair().expect("socket pair");
        let waker = waker(Arc::new(CountingWake(AtomicUsize::new(0))));

        reactor
            .register(socket.as_raw_fd(), Direction::Read, &waker)
            .expect("register");

        assert_eq!(reactor.clear().len(), 1);
        assert!(reactor.is_idle());
    }
}
