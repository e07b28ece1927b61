//! Units of work scheduled by the runtime.
//!
//! A [`Task`] owns a boxed future and is re-queued by its waker whenever the
//! reactor or a channel reports progress. Spawning returns a [`JoinHandle`]
//! that resolves to the future's output.
//!
//! # How Tasks Work
//!
//! 1. A future is wrapped in a [`Task`] and tracked by the runtime's queue
//! 2. The task is pushed onto the ready queue
//! 3. The runtime polls it with a waker pointing back at the task
//! 4. On `Poll::Pending` the future stays in the task, parked on whatever it awaits
//! 5. A wake pushes the task onto the ready queue again (at most once)
//! 6. On `Poll::Ready` the future is dropped and the task leaves the registry

use crate::runtime::make_waker;
use crate::runtime::queue::TaskQueue;

use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

/// A spawned future together with the queue it is scheduled on.
pub(crate) struct Task {
    key: usize,
    future: Mutex<Option<LocalBoxFuture<'static, ()>>>,
    queue: Arc<TaskQueue>,
    scheduled: AtomicBool,
}

// SAFETY: a task's future is only ever polled or dropped on the thread that
// owns its runtime. Wakers may be cloned freely, but waking only pushes the
// `Arc<Task>` onto the mutex-protected ready queue.
unsafe impl Send for Task {}
unsafe impl Sync for Task {}

impl Task {
    /// Wraps `future`, registers it with `queue` and schedules its first poll.
    ///
    /// Returns `None` if the queue has already been shut down.
    pub(crate) fn spawn(future: LocalBoxFuture<'static, ()>, queue: &Arc<TaskQueue>) -> Option<Arc<Self>> {
        let task = queue.track(|key| {
            Arc::new(Self {
                key,
                future: Mutex::new(Some(future)),
                queue: queue.clone(),
                scheduled: AtomicBool::new(false),
            })
        })?;

        task.schedule();

        Some(task)
    }

    /// Pushes the task onto the ready queue unless it is already there.
    pub(crate) fn schedule(self: &Arc<Self>) {
        if self.queue.is_shutdown() {
            return;
        }

        if !self.scheduled.swap(true, Ordering::AcqRel) {
            self.queue.push(self.clone());
        }
    }

    /// Polls the future once. A finished future is dropped and the task
    /// removed from the registry.
    pub(crate) fn run(self: &Arc<Self>) {
        self.scheduled.store(false, Ordering::Release);

        let waker = make_waker(self.clone());
        let mut context = Context::from_waker(&waker);

        let mut slot = self.future.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(future) = slot.as_mut() else {
            return;
        };

        if future.as_mut().poll(&mut context).is_pending() {
            return;
        }

        let finished = slot.take();
        drop(slot);
        drop(finished);

        self.queue.release(self.key);
    }

    /// Removes the future without polling it again. Used to cancel the task.
    pub(crate) fn cancel(&self) -> Option<LocalBoxFuture<'static, ()>> {
        self.future
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

struct JoinState<T> {
    output: Option<T>,
    waiter: Option<Waker>,
}

/// Resolves to the output of a spawned future.
///
/// Dropping the handle detaches the task; it keeps running. A handle whose
/// task was cancelled by a runtime shutdown never resolves.
pub struct JoinHandle<T> {
    state: Rc<RefCell<JoinState<T>>>,
}

impl<T: 'static> JoinHandle<T> {
    /// Splits `future` into a unit task body that stores its output, and the
    /// handle that reads it.
    pub(crate) fn wrap<F>(future: F) -> (LocalBoxFuture<'static, ()>, Self)
    where
        F: Future<Output = T> + 'static,
    {
        let state = Rc::new(RefCell::new(JoinState {
            output: None,
            waiter: None,
        }));
        let completion = state.clone();

        let body = Box::pin(async move {
            let output = future.await;

            let waiter = {
                let mut state = completion.borrow_mut();
                state.output = Some(output);
                state.waiter.take()
            };

            if let Some(waiter) = waiter {
                waiter.wake();
            }
        });

        (body, Self { state })
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();

        match state.output.take() {
            Some(output) => Poll::Ready(output),
            None => {
                state.waiter = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
