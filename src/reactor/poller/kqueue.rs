use super::{EVENT_CAPACITY, Interest, Readiness, timeout_millis};

use libc::{EV_ADD, EV_DELETE, EV_ENABLE, EV_EOF, EV_ERROR, EVFILT_READ, EVFILT_WRITE, close, kevent, kqueue};
use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

pub(crate) struct KqueuePoller {
    kqueue: RawFd,
    events: Vec<kevent>,
}

impl KqueuePoller {
    pub(crate) fn new() -> io::Result<Self> {
        let kqueue = unsafe { kqueue() };
        if kqueue < 0 {
            return Err(io::Error::last_os_error());
        }

        let events = (0..EVENT_CAPACITY).map(|_| empty_event()).collect();

        Ok(Self { kqueue, events })
    }

    pub(crate) fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.modify(fd, Interest::default(), interest)
    }

    pub(crate) fn modify(&self, fd: RawFd, previous: Interest, interest: Interest) -> io::Result<()> {
        if interest.read && !previous.read {
            self.submit(fd, EVFILT_READ, EV_ADD | EV_ENABLE)?;
        }
        if !interest.read && previous.read {
            self.submit(fd, EVFILT_READ, EV_DELETE)?;
        }
        if interest.write && !previous.write {
            self.submit(fd, EVFILT_WRITE, EV_ADD | EV_ENABLE)?;
        }
        if !interest.write && previous.write {
            self.submit(fd, EVFILT_WRITE, EV_DELETE)?;
        }

        Ok(())
    }

    pub(crate) fn deregister(&self, fd: RawFd, previous: Interest) -> io::Result<()> {
        self.modify(fd, previous, Interest::default())
    }

    /// Waits for readiness and appends one [`Readiness`] per fired filter.
    ///
    /// An interrupted wait returns without events rather than an error.
    pub(crate) fn wait(
        &mut self,
        timeout: Option<Duration>,
        ready: &mut Vec<Readiness>,
    ) -> io::Result<()> {
        let millis = timeout_millis(timeout);
        let spec = libc::timespec {
            tv_sec: (millis.max(0) / 1000) as _,
            tv_nsec: ((millis.max(0) % 1000) * 1_000_000) as _,
        };
        let spec_ptr = if millis < 0 {
            ptr::null()
        } else {
            &spec as *const libc::timespec
        };

        let count = unsafe {
            kevent(
                self.kqueue,
                ptr::null(),
                0,
                self.events.as_mut_ptr(),
                self.events.len() as _,
                spec_ptr,
            )
        };

        if count < 0 {
            let error = io::Error::last_os_error();
            if error.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }

            return Err(error);
        }

        for event in &self.events[..count as usize] {
            let failed = event.flags & (EV_EOF | EV_ERROR) != 0;

            ready.push(Readiness {
                fd: event.ident as RawFd,
                readable: event.filter == EVFILT_READ || failed,
                writable: event.filter == EVFILT_WRITE || failed,
            });
        }

        Ok(())
    }

    fn submit(&self, fd: RawFd, filter: i16, flags: u16) -> io::Result<()> {
        let mut event = empty_event();
        event.ident = fd as _;
        event.filter = filter as _;
        event.flags = flags as _;

        let ret = unsafe { kevent(self.kqueue, &event, 1, ptr::null_mut(), 0, ptr::null()) };
        if ret < 0 {
            let error = io::Error::last_os_error();
            // Deleting a filter the kernel already dropped (closed descriptor).
            if flags & EV_DELETE != 0 && error.raw_os_error() == Some(libc::ENOENT) {
                return Ok(());
            }

            return Err(error);
        }

        Ok(())
    }
}

fn empty_event() -> kevent {
    unsafe { mem::zeroed() }
}

impl Drop for KqueuePoller {
    fn drop(&mut self) {
        unsafe {
            close(self.kqueue);
        }
    }
}
