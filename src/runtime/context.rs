//! Thread-local runtime context.
//!
//! While a runtime drives its tasks it installs a [`Handle`] for the current
//! thread, which is what lets [`spawn`] work without an explicit runtime
//! reference (the accept loop spawns connection handlers this way).

use crate::reactor::ReactorHandle;
use crate::runtime::queue::TaskQueue;
use crate::task::{JoinHandle, Task};

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

/// Everything a task needs to reach its runtime.
#[derive(Clone)]
pub(crate) struct Handle {
    pub(crate) queue: Arc<TaskQueue>,
    pub(crate) reactor: ReactorHandle,
}

impl Handle {
    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let (body, handle) = JoinHandle::wrap(future);
        let _ = Task::spawn(body, &self.queue);

        handle
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Handle>> = const { RefCell::new(None) };
}

// Restores the previously installed handle, also when unwinding.
struct Restore(Option<Handle>);

impl Drop for Restore {
    fn drop(&mut self) {
        let previous = self.0.take();
        let _ = CURRENT.try_with(|current| *current.borrow_mut() = previous);
    }
}

/// Runs `function` with `handle` installed as the current runtime.
pub(crate) fn enter_context<R>(handle: &Handle, function: impl FnOnce() -> R) -> R {
    let previous = CURRENT.with(|current| current.borrow_mut().replace(handle.clone()));
    let _restore = Restore(previous);

    function()
}

/// Spawns a future on the runtime currently driving this thread.
///
/// # Panics
/// Panics if called outside of a runtime context, i.e. not from a task or a
/// future driven by [`Runtime::run_until`](crate::Runtime::run_until).
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    let handle = CURRENT
        .with(|current| current.borrow().clone())
        .expect("spawn() called outside of a runtime context");

    handle.spawn(future)
}
