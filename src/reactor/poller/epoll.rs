use super::{EVENT_CAPACITY, Interest, Readiness, timeout_millis};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLOUT, EPOLLRDHUP, close, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

const READ_FLAGS: u32 = (EPOLLIN | EPOLLRDHUP) as u32;
const WRITE_FLAGS: u32 = EPOLLOUT as u32;
const FAILURE_FLAGS: u32 = (EPOLLERR | EPOLLHUP) as u32;

pub(crate) struct EpollPoller {
    epoll: RawFd,
    events: Vec<epoll_event>,
}

impl EpollPoller {
    pub(crate) fn new() -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            epoll,
            events: vec![epoll_event { events: 0, u64: 0 }; EVENT_CAPACITY],
        })
    }

    pub(crate) fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.control(EPOLL_CTL_ADD, fd, interest)
    }

    pub(crate) fn modify(&self, fd: RawFd, _previous: Interest, interest: Interest) -> io::Result<()> {
        self.control(EPOLL_CTL_MOD, fd, interest)
    }

    pub(crate) fn deregister(&self, fd: RawFd, _previous: Interest) -> io::Result<()> {
        let ret = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, ptr::null_mut()) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Waits for readiness and appends one [`Readiness`] per ready descriptor.
    ///
    /// An interrupted wait returns without events rather than an error.
    pub(crate) fn wait(
        &mut self,
        timeout: Option<Duration>,
        ready: &mut Vec<Readiness>,
    ) -> io::Result<()> {
        let count = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.events.len() as i32,
                timeout_millis(timeout),
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
            let flags = event.events;
            let fd = event.u64 as RawFd;

            ready.push(Readiness {
                fd,
                readable: flags & (READ_FLAGS | FAILURE_FLAGS) != 0,
                writable: flags & (WRITE_FLAGS | FAILURE_FLAGS) != 0,
            });
        }

        Ok(())
    }

    fn control(&self, operation: i32, fd: RawFd, interest: Interest) -> io::Result<()> {
        let mut flags = 0;
        if interest.read {
            flags |= READ_FLAGS;
        }
        if interest.write {
            flags |= WRITE_FLAGS;
        }

        let mut event = epoll_event {
            events: flags,
            u64: fd as u64,
        };

        let ret = unsafe { epoll_ctl(self.epoll, operation, fd, &mut event) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe {
            close(self.epoll);
        }
    }
}
