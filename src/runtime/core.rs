//! Single-threaded runtime: the scheduler handle a server owns.
//!
//! The runtime interleaves every task on the calling thread. Tasks suspend at
//! socket operations that would block (parking a waker on the reactor) or on
//! channels; the runtime alternates between polling ready tasks and waiting
//! on the reactor until the future it was asked to drive completes.

use crate::reactor::ReactorHandle;
use crate::reactor::core::Reactor;
use crate::runtime::context::{Handle, enter_context};
use crate::runtime::queue::TaskQueue;
use crate::task::JoinHandle;

use futures::task::{ArcWake, waker};
use std::future::Future;
use std::io;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{debug, trace};

/// Wake flag for the future driven by [`Runtime::run_until`].
struct Notify {
    woken: AtomicBool,
}

impl ArcWake for Notify {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.woken.store(true, Ordering::Release);
    }
}

/// A cooperative scheduler bound to one reactor.
///
/// Dropping the runtime (or calling [`Runtime::shutdown`]) cancels every task
/// that has not finished, releasing whatever the task owned.
pub struct Runtime {
    handle: Handle,
}

impl Runtime {
    /// Creates a runtime with an empty task queue and a fresh reactor.
    ///
    /// # Errors
    /// Fails if the operating system refuses to create the poller.
    pub fn new() -> io::Result<Self> {
        let reactor = ReactorHandle::new(Reactor::new()?);

        Ok(Self {
            handle: Handle {
                queue: Arc::new(TaskQueue::new()),
                reactor,
            },
        })
    }

    pub(crate) fn reactor(&self) -> ReactorHandle {
        self.handle.reactor.clone()
    }

    /// Spawns a task. It first runs during the next call that drives the
    /// runtime.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.handle.spawn(future)
    }

    /// Number of spawned tasks that have neither finished nor been cancelled.
    pub fn live_tasks(&self) -> usize {
        self.handle.queue.live_count()
    }

    /// Drives tasks and I/O until `future` completes.
    ///
    /// Returns `Ok(None)` when `future` is still pending but nothing can ever
    /// wake it: no task is ready and no task waits on the reactor.
    pub fn run_until<F: Future>(&self, future: F) -> io::Result<Option<F::Output>> {
        enter_context(&self.handle, || {
            let mut future = pin!(future);

            let notify = Arc::new(Notify {
                woken: AtomicBool::new(true),
            });
            let waker = waker(notify.clone());
            let mut context = Context::from_waker(&waker);

            loop {
                if notify.woken.swap(false, Ordering::AcqRel) {
                    if let Poll::Ready(output) = future.as_mut().poll(&mut context) {
                        return Ok(Some(output));
                    }
                }

                self.run_ready();
                if notify.woken.load(Ordering::Acquire) {
                    continue;
                }

                self.poll_reactor(Some(Duration::ZERO))?;
                if notify.woken.load(Ordering::Acquire) || !self.handle.queue.is_empty() {
                    continue;
                }

                if self.handle.reactor.is_idle() {
                    trace!("runtime has no pending work");
                    return Ok(None);
                }

                self.poll_reactor(None)?;
            }
        })
    }

    /// Makes one bounded pass over pending work without waiting on I/O.
    ///
    /// Tasks already queued are polled once, the reactor is polled with a zero
    /// timeout, and the tasks it woke are polled once. Work scheduled during
    /// the pass is left for the next call.
    pub fn run_pending(&self) -> io::Result<()> {
        enter_context(&self.handle, || {
            self.run_ready();
            self.poll_reactor(Some(Duration::ZERO))?;
            self.run_ready();

            Ok(())
        })
    }

    /// Cancels every unfinished task and drops all parked wakers.
    ///
    /// Cancelling drops a task's future in place, so sockets it owned are
    /// closed. Tasks spawned afterwards never run.
    pub fn shutdown(&self) {
        let tasks = self.handle.queue.shutdown();
        if !tasks.is_empty() {
            debug!(tasks = tasks.len(), "cancelling unfinished tasks");
        }

        for task in &tasks {
            drop(task.cancel());
        }

        self.handle.reactor.clear();
    }

    // Only the tasks queued on entry, so a task that keeps waking itself
    // cannot hold the thread.
    fn run_ready(&self) {
        for _ in 0..self.handle.queue.len() {
            match self.handle.queue.pop() {
                Some(task) => task.run(),
                None => break,
            }
        }
    }

    fn poll_reactor(&self, timeout: Option<Duration>) -> io::Result<()> {
        let wakers = self.handle.reactor.poll(timeout)?;

        for waker in wakers {
            waker.wake();
        }

        Ok(())
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
