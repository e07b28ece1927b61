//! Ready queue and live-task registry shared by a runtime and its wakers.

use crate::task::Task;
use crate::utils::slab::Slab;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// FIFO of tasks ready to be polled, plus every task that has not finished.
///
/// The registry is what lets [`Runtime::shutdown`](crate::Runtime::shutdown)
/// reach tasks that are parked on the reactor or on a channel and would
/// otherwise never be polled again.
pub(crate) struct TaskQueue {
    ready: Mutex<VecDeque<Arc<Task>>>,
    live: Mutex<Slab<Arc<Task>>>,
    shutdown: AtomicBool,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            ready: Mutex::new(VecDeque::new()),
            live: Mutex::new(Slab::new()),
            shutdown: AtomicBool::new(false),
        }
    }

    pub(crate) fn push(&self, task: Arc<Task>) {
        lock(&self.ready).push_back(task);
    }

    pub(crate) fn pop(&self) -> Option<Arc<Task>> {
        lock(&self.ready).pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        lock(&self.ready).is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.ready).len()
    }

    /// Builds a task with the key it will occupy in the registry and tracks it.
    ///
    /// Returns `None` once the queue has been shut down.
    pub(crate) fn track(&self, build: impl FnOnce(usize) -> Arc<Task>) -> Option<Arc<Task>> {
        if self.is_shutdown() {
            return None;
        }

        let mut live = lock(&self.live);
        let task = build(live.vacant_key());
        live.insert(task.clone());

        Some(task)
    }

    /// Forgets a finished task.
    pub(crate) fn release(&self, key: usize) {
        let task = lock(&self.live).remove(key);

        drop(task);
    }

    pub(crate) fn live_count(&self) -> usize {
        lock(&self.live).len()
    }

    /// Marks the queue as shut down and hands back every unfinished task.
    pub(crate) fn shutdown(&self) -> Vec<Arc<Task>> {
        self.shutdown.store(true, Ordering::SeqCst);

        let ready = std::mem::take(&mut *lock(&self.ready));
        drop(ready);

        lock(&self.live).drain()
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

// A panic inside a task never leaves the queue half-updated, so a poisoned
// lock is still safe to use.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
