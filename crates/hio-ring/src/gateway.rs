//! Ring gateway — owns one SQ/CQ ring, submits I/O, drains completions.
//!
//! Exactly one `IoRing` lives per worker thread, stored thread-locally
//! rather than behind a process-wide singleton: the public "current
//! worker's ring" accessor is a thread-local lookup, not global mutable
//! state.

use std::cell::RefCell;
use std::os::unix::io::{AsRawFd, RawFd};

use io_uring::{opcode, squeue, types, IoUring};

use hio_core::error::{last_os_errno, HioError, Result};

use crate::op::IoOp;

/// Sentinel `user_data` used for `AsyncCancel` SQEs themselves — their
/// completion reports whether the cancel matched anything, but no
/// coroutine is waiting on the cancel request itself.
const CANCEL_SENTINEL: u64 = u64::MAX;

pub struct RingConfig {
    /// Number of SQ entries. Must be a power of two.
    pub sq_entries: u32,
    /// Number of CQ entries. Defaults to `2 * sq_entries`.
    pub cq_entries: Option<u32>,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            sq_entries: hio_core::constants::DEFAULT_SQ_ENTRIES,
            cq_entries: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RingStats {
    pub submitted: u64,
    pub completed: u64,
    pub cancelled: u64,
}

struct Heartbeat {
    op: Box<IoOp>,
    ts: Box<types::Timespec>,
    armed: bool,
}

pub struct IoRing {
    ring: IoUring,
    stats: RingStats,
    heartbeat: Option<Heartbeat>,
}

impl IoRing {
    pub fn new(config: RingConfig) -> Result<Self> {
        let mut builder = IoUring::builder();
        if let Some(cq) = config.cq_entries {
            builder.setup_cqsize(cq);
        }
        let ring = builder
            .build(config.sq_entries)
            .map_err(|e| HioError::RingSetup(e.raw_os_error().unwrap_or(-1)))?;
        Ok(Self {
            ring,
            stats: RingStats::default(),
            heartbeat: None,
        })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.ring.as_raw_fd()
    }

    pub fn stats(&self) -> RingStats {
        self.stats
    }

    /// Register a provided-buffer ring (`io_uring_register(IORING_REGISTER_PBUF_RING)`)
    /// with this ring's kernel instance. Used by [`crate::BufferPool::register`].
    pub(crate) fn register_buf_ring(&self, ring_addr: u64, n_entries: u16, bgid: u16) -> Result<()> {
        unsafe {
            self.ring
                .submitter()
                .register_buf_ring(ring_addr, n_entries, bgid)
        }
        .map_err(|e| HioError::BufferRingSetup(e.raw_os_error().unwrap_or(-1)))
    }

    pub(crate) fn unregister_buf_ring(&self, bgid: u16) -> Result<()> {
        self.ring
            .submitter()
            .unregister_buf_ring(bgid)
            .map_err(|e| HioError::BufferRingSetup(e.raw_os_error().unwrap_or(-1)))
    }

    fn push(&mut self, entry: &squeue::Entry) -> std::result::Result<(), ()> {
        unsafe { self.ring.submission().push(entry).map_err(|_| ()) }
    }

    /// Push an SQE, forcing a submit-and-retry if the SQ is full.
    fn push_forced(&mut self, entry: squeue::Entry) {
        if self.push(&entry).is_err() {
            let _ = self.ring.submit();
            // If it's still full after a flush the ring is misconfigured
            // far beyond what a retry can fix; drop the submission rather
            // than spin forever. Setup-fatal conditions are caught at
            // `IoRing::new` time, not here.
            let _ = self.push(&entry);
        }
        self.stats.submitted += 1;
    }

    /// Submit a persistent accept. Each incoming connection produces one
    /// completion tagged with `op`; the "more" flag tells the caller
    /// whether the kernel will keep delivering more without re-arming.
    pub fn submit_multishot_accept(
        &mut self,
        op: &IoOp,
        fd: RawFd,
        addr: *mut libc::sockaddr,
        addr_len: *mut libc::socklen_t,
    ) {
        let sqe = opcode::AcceptMulti::new(types::Fd(fd))
            .build()
            .user_data(op.user_data());
        let _ = (addr, addr_len); // kernel fills peer address in-place; unused by callers today
        self.push_forced(sqe);
    }

    /// Re-arm a single-shot accept fallback (used if the kernel/backend
    /// doesn't honor multishot for this listener). Kept separate from
    /// `submit_multishot_accept` so `ServerSocket` can always re-arm with
    /// the same call shape.
    pub fn submit_accept(
        &mut self,
        op: &IoOp,
        fd: RawFd,
        addr: *mut libc::sockaddr,
        addr_len: *mut libc::socklen_t,
    ) {
        let sqe = opcode::Accept::new(types::Fd(fd), addr, addr_len)
            .flags(libc::SOCK_CLOEXEC)
            .build()
            .user_data(op.user_data());
        self.push_forced(sqe);
    }

    /// Provided-buffer receive: the kernel selects a buffer from
    /// `buf_group` and writes up to `length` bytes into it.
    pub fn submit_recv(&mut self, op: &IoOp, fd: RawFd, length: u32, buf_group: u16) {
        let sqe = opcode::Recv::new(types::Fd(fd), std::ptr::null_mut(), length)
            .buf_group(buf_group)
            .build()
            .flags(squeue::Flags::BUFFER_SELECT)
            .user_data(op.user_data());
        self.push_forced(sqe);
    }

    /// Send `length` bytes starting at `buffer`'s current position.
    pub fn submit_send(&mut self, op: &IoOp, fd: RawFd, buffer: *const u8, length: u32) {
        let sqe = opcode::Send::new(types::Fd(fd), buffer, length)
            .build()
            .user_data(op.user_data());
        self.push_forced(sqe);
    }

    /// Move up to `length` bytes between `fd_in` and `fd_out` (one end
    /// must be a pipe).
    pub fn submit_splice(&mut self, op: &IoOp, fd_in: RawFd, fd_out: RawFd, length: u32) {
        let sqe = opcode::Splice::new(types::Fd(fd_in), -1, types::Fd(fd_out), -1, length)
            .build()
            .user_data(op.user_data());
        self.push_forced(sqe);
    }

    /// Cancel whatever operation is in flight under `op`'s tag.
    pub fn submit_cancel(&mut self, op: &IoOp) {
        let sqe = opcode::AsyncCancel::new(op.user_data())
            .build()
            .user_data(CANCEL_SENTINEL);
        self.push_forced(sqe);
        self.stats.cancelled += 1;
    }

    /// One event-loop tick: flush and
    /// wait for at least one completion, then drain. A heartbeat timeout
    /// is kept perpetually re-armed underneath so the wait can never
    /// block past `heartbeat_millis` even when the worker is otherwise
    /// idle — without it a stop request would never be observed on a
    /// quiet server.
    pub fn tick(&mut self, heartbeat_millis: u64) -> Result<usize> {
        if self.heartbeat.is_none() {
            self.heartbeat = Some(Heartbeat {
                op: IoOp::new(),
                ts: Box::new(types::Timespec::new()),
                armed: false,
            });
        }
        let hb = self.heartbeat.as_mut().unwrap();
        if !hb.armed {
            let millis = heartbeat_millis;
            *hb.ts = types::Timespec::new()
                .sec(millis / 1000)
                .nsec(((millis % 1000) * 1_000_000) as u32);
            let sqe = opcode::Timeout::new(hb.ts.as_ref() as *const _)
                .build()
                .user_data(hb.op.user_data());
            self.push_forced(sqe);
            let hb = self.heartbeat.as_mut().unwrap();
            hb.armed = true;
        }

        self.submit_and_wait(1)?;
        let n = self.drain_completions();

        let hb = self.heartbeat.as_mut().unwrap();
        if hb.op.has_delivered() {
            hb.op.reset();
            hb.armed = false;
        }
        Ok(n)
    }

    /// Flush all pending submissions and block until at least `n`
    /// completions are available.
    pub fn submit_and_wait(&mut self, n: usize) -> Result<()> {
        match self.ring.submit_and_wait(n) {
            Ok(_) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EINTR) => Ok(()),
            Err(e) => Err(HioError::RingSubmit(e.raw_os_error().unwrap_or(last_os_errno()))),
        }
    }

    /// Drain the completion queue, dispatching each completion to the
    /// `IoOp` it names (which wakes the coroutine suspended on it, if
    /// any). Returns the number of completions processed. Cancel-request
    /// completions (tagged with `CANCEL_SENTINEL`) are consumed here and
    /// not dispatched anywhere — nothing awaits a cancel itself.
    pub fn drain_completions(&mut self) -> usize {
        let mut n = 0;
        let completion_queue = self.ring.completion();
        for cqe in completion_queue {
            n += 1;
            let user_data = cqe.user_data();
            if user_data == CANCEL_SENTINEL {
                continue;
            }
            // Safety: every `user_data` we hand the kernel is the address
            // of a live `Box<IoOp>` owned by the awaitable that submitted
            // it. Awaitables that drop early submit a cancel and drain
            // the resulting completion (see `hio_io`'s guard types)
            // before freeing the box, so this pointer is never dangling
            // when a completion naming it arrives.
            let op = unsafe { &*(user_data as *const IoOp) };
            op.complete(cqe.result() as i64, cqe.flags());
        }
        self.stats.completed += n as u64;
        n
    }

    /// Best-effort: consume any completions already queued without
    /// submitting or blocking. Used by cancellation paths that must drain
    /// a stale tag's completion before freeing its `IoOp`.
    pub fn drain_available(&mut self) -> usize {
        self.drain_completions()
    }
}

thread_local! {
    static CURRENT_RING: RefCell<Option<IoRing>> = RefCell::new(None);
}

/// Bind `ring` as this thread's ring gateway. Called once per worker
/// during startup.
pub fn install(ring: IoRing) {
    CURRENT_RING.with(|cell| *cell.borrow_mut() = Some(ring));
}

pub fn is_installed() -> bool {
    CURRENT_RING.with(|cell| cell.borrow().is_some())
}

/// Run `f` against the calling thread's ring. Panics if no ring has been
/// installed on this thread — this is a thread-local lookup, and calling
/// it off a worker thread is a programmer error.
pub fn with_ring<R>(f: impl FnOnce(&mut IoRing) -> R) -> R {
    CURRENT_RING.with(|cell| {
        let mut guard = cell.borrow_mut();
        let ring = guard
            .as_mut()
            .expect("hio_ring::with_ring called on a thread with no installed IoRing");
        f(ring)
    })
}

/// Remove and return this thread's ring, if any (used at worker shutdown
/// so the ring's `Drop` runs after completions have been drained).
pub fn take() -> Option<IoRing> {
    CURRENT_RING.with(|cell| cell.borrow_mut().take())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ring_config_matches_constants() {
        let config = RingConfig::default();
        assert_eq!(config.sq_entries, hio_core::constants::DEFAULT_SQ_ENTRIES);
        assert!(config.cq_entries.is_none());
    }

    #[test]
    fn ring_stats_start_at_zero() {
        let stats = RingStats::default();
        assert_eq!(stats.submitted, 0);
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.cancelled, 0);
    }

    #[test]
    fn install_take_round_trips_without_a_real_ring() {
        assert!(!is_installed());
        if let Ok(ring) = IoRing::new(RingConfig { sq_entries: 8, cq_entries: None }) {
            install(ring);
            assert!(is_installed());
            assert!(take().is_some());
            assert!(!is_installed());
        }
    }
}
