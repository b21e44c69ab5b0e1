//! `IoOp` — the completion tag.
//!
//! A heap-stable record associated with one in-flight I/O operation (or,
//! for multishot accept, a whole stream of completions). Its address is
//! handed to the kernel as the SQE's `user_data`; when a completion
//! arrives, [`IoRing::drain_completions`](crate::gateway::IoRing::drain_completions)
//! reconstructs a reference from that address and calls [`IoOp::complete`],
//! which wakes whatever coroutine is suspended on it.

use std::cell::{Cell, RefCell};
use std::task::Waker;

use hio_core::constants::comp_flags;

pub struct IoOp {
    waker: RefCell<Option<Waker>>,
    result: Cell<i64>,
    flags: Cell<u32>,
    /// True once at least one completion has been delivered. Distinguishes
    /// "never submitted" from "result is a legitimate 0."
    delivered: Cell<bool>,
}

// Safety: an `IoOp` is allocated by, and only ever completed/dropped on,
// the worker thread that owns the `IoRing` it was submitted to — see the
// same invariant documented on `hio_task::executor::waker_for`. These
// markers exist only so the `Waker` stored inside satisfies its own
// unconditional `Send + Sync` bound.
unsafe impl Send for IoOp {}
unsafe impl Sync for IoOp {}

impl IoOp {
    pub fn new() -> Box<Self> {
        Box::new(Self {
            waker: RefCell::new(None),
            result: Cell::new(0),
            flags: Cell::new(0),
            delivered: Cell::new(false),
        })
    }

    /// Stable address to hand the kernel as `user_data`. Valid for as
    /// long as the `Box<IoOp>` that owns this value is alive.
    pub fn user_data(&self) -> u64 {
        self as *const Self as u64
    }

    /// Record the awaiting coroutine's waker so `complete` can resume it.
    pub fn set_waker(&self, waker: &Waker) {
        *self.waker.borrow_mut() = Some(waker.clone());
    }

    pub fn result(&self) -> i64 {
        self.result.get()
    }

    pub fn flags(&self) -> u32 {
        self.flags.get()
    }

    pub fn has_delivered(&self) -> bool {
        self.delivered.get()
    }

    /// Reset for re-arming a multishot op (e.g. accept re-submission).
    pub fn reset(&self) {
        self.delivered.set(false);
    }

    /// True if the kernel signalled more completions are coming for this
    /// tag (multishot). Must be a bitwise-AND test against the flag bit,
    /// not a bitwise-OR — an OR is always true once any flag bit is set.
    pub fn has_more(&self) -> bool {
        self.flags.get() & comp_flags::MORE != 0
    }

    /// True if the completion carries a provided-buffer id.
    pub fn has_buffer(&self) -> bool {
        self.flags.get() & comp_flags::BUFFER != 0
    }

    /// Extract the provided-buffer id the kernel selected, per the
    /// `IORING_CQE_BUFFER_SHIFT` convention (upper 16 bits of `flags`).
    pub fn buffer_id(&self) -> Option<u16> {
        if self.has_buffer() {
            Some((self.flags.get() >> 16) as u16)
        } else {
            None
        }
    }

    /// Called by the ring gateway when a completion naming this tag
    /// arrives. Wakes whichever coroutine is suspended on it, if any.
    pub(crate) fn complete(&self, result: i64, flags: u32) {
        self.result.set(result);
        self.flags.set(flags);
        self.delivered.set(true);
        if let Some(waker) = self.waker.borrow_mut().take() {
            waker.wake();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn more_flag_uses_bitwise_and() {
        let op = IoOp::new();
        op.complete(4, comp_flags::MORE);
        assert!(op.has_more());
        let op = IoOp::new();
        op.complete(4, 0);
        assert!(!op.has_more());
    }

    #[test]
    fn buffer_id_round_trips_through_flags() {
        let op = IoOp::new();
        let id: u16 = 7;
        op.complete(128, comp_flags::BUFFER | ((id as u32) << 16));
        assert_eq!(op.buffer_id(), Some(id));
    }
}
