//! Waker that re-queues its task.
//!
//! Built directly on `RawWaker`: the data pointer is an `Arc<Task>` turned
//! into a raw pointer, so cloning and dropping are reference-count updates.

use crate::task::Task;

use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_raw, wake_raw, wake_by_ref_raw, drop_raw);

fn clone_raw(ptr: *const ()) -> RawWaker {
    unsafe {
        Arc::increment_strong_count(ptr as *const Task);
    }

    RawWaker::new(ptr, &VTABLE)
}

fn wake_raw(ptr: *const ()) {
    let task = unsafe { Arc::from_raw(ptr as *const Task) };

    task.schedule();
}

fn wake_by_ref_raw(ptr: *const ()) {
    let task = ManuallyDrop::new(unsafe { Arc::from_raw(ptr as *const Task) });

    task.schedule();
}

fn drop_raw(ptr: *const ()) {
    unsafe {
        drop(Arc::from_raw(ptr as *const Task));
    }
}

/// Creates a waker that schedules `task` when woken.
pub(crate) fn make_waker(task: Arc<Task>) -> Waker {
    let raw = RawWaker::new(Arc::into_raw(task) as *const (), &VTABLE);

    unsafe { Waker::from_raw(raw) }
}
