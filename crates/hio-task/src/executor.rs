//! Per-worker local executor.
//!
//! The ready queue and every `Task` it drives live on exactly one OS
//! thread — the worker that spawned them. `hio-pool::Worker` drains
//! completions from its `IoRing`, wakes the coroutines they belong to
//! (which pushes them onto this queue), then calls [`run_ready`] once per
//! event-loop tick.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::task::{RawWaker, RawWakerVTable, Waker};

thread_local! {
    static READY: RefCell<VecDeque<Rc<dyn ErasedTask>>> = RefCell::new(VecDeque::new());
}

/// Type-erased handle to a spawned task, used only by the executor and
/// the waker it hands out. Not part of the public API — callers use
/// [`crate::Task`].
pub(crate) trait ErasedTask {
    fn poll_once(self: Rc<Self>);
}

pub(crate) fn enqueue(task: Rc<dyn ErasedTask>) {
    READY.with(|q| q.borrow_mut().push_back(task));
}

/// Poll every task currently sitting in the ready queue, once each.
///
/// A task that re-arms itself (submits another I/O op and returns
/// `Pending`) is not polled again until the *next* call — this keeps a
/// single event-loop tick bounded instead of spinning forever on a task
/// that is always "ready."
pub fn run_ready() {
    let batch: Vec<_> = READY.with(|q| q.borrow_mut().drain(..).collect());
    for task in batch {
        task.poll_once();
    }
}

/// True if the local ready queue has work the worker hasn't drained yet.
pub fn has_ready() -> bool {
    READY.with(|q| !q.borrow().is_empty())
}

static VTABLE: RawWakerVTable = RawWakerVTable::new(
    raw_waker_clone,
    raw_waker_wake,
    raw_waker_wake_by_ref,
    raw_waker_drop,
);

fn raw_waker_clone(ptr: *const ()) -> RawWaker {
    let handle = unsafe { &*(ptr as *const Rc<dyn ErasedTask>) };
    let boxed = Box::new(handle.clone());
    RawWaker::new(Box::into_raw(boxed) as *const (), &VTABLE)
}

fn raw_waker_wake(ptr: *const ()) {
    let boxed = unsafe { Box::from_raw(ptr as *mut Rc<dyn ErasedTask>) };
    enqueue(*boxed);
}

fn raw_waker_wake_by_ref(ptr: *const ()) {
    let handle = unsafe { &*(ptr as *const Rc<dyn ErasedTask>) };
    enqueue(handle.clone());
}

fn raw_waker_drop(ptr: *const ()) {
    unsafe { drop(Box::from_raw(ptr as *mut Rc<dyn ErasedTask>)) };
}

/// Build a [`Waker`] that re-enqueues `task` onto this thread's ready
/// queue when woken.
///
/// # Safety invariant
///
/// `std::task::Waker` is unconditionally `Send + Sync`, so the compiler
/// will happily let this waker cross a thread boundary. Doing so would be
/// unsound: the underlying `Rc`'s refcount is not atomic. Every `hio`
/// component that hands out a waker built here guarantees it is only
/// cloned, woken, or dropped on the worker thread that owns the
/// executor — the same invariant `ksvc-module`'s per-worker ring and
/// buffer state relies on.
pub(crate) fn waker_for(task: Rc<dyn ErasedTask>) -> Waker {
    let boxed = Box::new(task);
    let raw = RawWaker::new(Box::into_raw(boxed) as *const (), &VTABLE);
    unsafe { Waker::from_raw(raw) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    struct Noop;
    impl ErasedTask for Noop {
        fn poll_once(self: Rc<Self>) {}
    }

    #[test]
    fn ready_queue_drains_once_per_call() {
        READY.with(|q| q.borrow_mut().clear());
        assert!(!has_ready());
        enqueue(Rc::new(Noop));
        assert!(has_ready());
        run_ready();
        assert!(!has_ready());
    }

    // Exercises the waker vtable end-to-end: a future that yields Pending
    // once, records the waker, then wakes itself from inside `poll`.
    struct SelfWaking {
        polled: std::cell::Cell<u32>,
    }
    impl Future for SelfWaking {
        type Output = ();
        fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            let n = self.polled.get();
            self.polled.set(n + 1);
            if n == 0 {
                cx.waker().wake_by_ref();
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        }
    }

    #[test]
    fn waker_reenqueues_task() {
        let task = crate::spawn(SelfWaking {
            polled: std::cell::Cell::new(0),
        });
        run_ready(); // first poll: Pending, self-wakes
        assert!(has_ready());
        run_ready(); // second poll: Ready
        assert!(task.is_finished());
    }
}
