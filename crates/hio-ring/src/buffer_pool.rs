//! Kernel-registered provided-buffer pool.
//!
//! The pool owns one contiguous allocation of `n * buf_size` bytes plus
//! the `io_uring_buf_ring` array that describes it to the kernel. Buffers
//! are lent out by id when a recv completion reports one selected, and
//! must be returned before the kernel will hand them out again — the
//! lend/return discipline is enforced here with a borrowed-bitset rather
//! than trusted to callers.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::cell::Cell;

use io_uring::types::BufRingEntry;

use hio_core::constants::{DEFAULT_BUF_GROUP, MAX_BUFFER_RING_SIZE};
use hio_core::error::{HioError, Result};

use crate::gateway::IoRing;

pub struct BufferPool {
    storage: Box<[u8]>,
    ring_mem: *mut BufRingEntry,
    ring_layout: Layout,
    buf_size: usize,
    n: u16,
    mask: u16,
    borrowed: Box<[Cell<bool>]>,
    tail: Cell<u16>,
    bgid: u16,
    returns_issued: Cell<u64>,
    /// The ring this pool registered its buffers with. Used only at
    /// `Drop` time to unregister before freeing `ring_mem` — never
    /// dereferenced mutably, so a raw pointer captured at `register()`
    /// time is enough. Callers must keep that `IoRing` alive (and at a
    /// stable address — e.g. installed in thread-local storage rather
    /// than left on the stack) for as long as the pool lives.
    ring: *const IoRing,
}

// Safety: a `BufferPool` is created, borrowed from, and returned to only
// on the worker thread that owns the `IoRing` it was registered against,
// mirroring every other per-worker type in this crate.
unsafe impl Send for BufferPool {}
unsafe impl Sync for BufferPool {}

impl BufferPool {
    /// Allocate `n` buffers of `buf_size` bytes each and register them
    /// with `ring` under buffer group `bgid`. `n` must be a power of two
    /// and at most [`MAX_BUFFER_RING_SIZE`].
    pub fn register(ring: &IoRing, n: u16, buf_size: usize, bgid: u16) -> Result<Self> {
        if n == 0 || !n.is_power_of_two() || n > MAX_BUFFER_RING_SIZE {
            return Err(HioError::BufferInvariant { id: n });
        }

        let storage_layout = Layout::array::<u8>(n as usize * buf_size)
            .map_err(|_| HioError::BufferInvariant { id: n })?;
        let storage = unsafe {
            let ptr = alloc_zeroed(storage_layout);
            if ptr.is_null() {
                return Err(HioError::BufferInvariant { id: n });
            }
            Box::from_raw(std::slice::from_raw_parts_mut(ptr, storage_layout.size()))
        };

        let ring_layout = Layout::from_size_align(
            (n as usize + 1) * std::mem::size_of::<BufRingEntry>(),
            4096,
        )
        .expect("buf ring layout");
        let ring_mem = unsafe {
            let ptr = alloc_zeroed(ring_layout) as *mut BufRingEntry;
            if ptr.is_null() {
                return Err(HioError::BufferInvariant { id: n });
            }
            ptr
        };

        let pool = Self {
            storage,
            ring_mem,
            ring_layout,
            buf_size,
            n,
            mask: n - 1,
            borrowed: (0..n).map(|_| Cell::new(false)).collect(),
            tail: Cell::new(0),
            bgid,
            returns_issued: Cell::new(0),
            ring: ring as *const IoRing,
        };

        ring.register_buf_ring(ring_mem as u64, n, bgid)?;
        for id in 0..n {
            pool.push_to_kernel(id);
        }
        Ok(pool)
    }

    pub fn register_default(ring: &IoRing, n: u16, buf_size: usize) -> Result<Self> {
        Self::register(ring, n, buf_size, DEFAULT_BUF_GROUP)
    }

    pub fn group_id(&self) -> u16 {
        self.bgid
    }

    /// Publish buffer `id` to the kernel's ring at the current tail, then
    /// advance the tail. Called both at startup (for every buffer) and
    /// from [`Self::return_buffer`] (for one buffer at a time).
    fn push_to_kernel(&self, id: u16) {
        let tail = self.tail.get();
        let slot = unsafe { &mut *self.ring_mem.add((tail & self.mask) as usize) };
        let addr = self.buffer_ptr(id) as u64;
        slot.set_addr(addr);
        slot.set_len(self.buf_size as u32);
        slot.set_bid(id);
        self.tail.set(tail.wrapping_add(1));
        // Publish the new tail: `io_uring_buf_ring` overlays its tail
        // counter on the `resv` field of the ring's first entry (the
        // kernel's union layout, not an extra slot at the end).
        let tail_ptr = unsafe { BufRingEntry::tail(self.ring_mem) } as *mut u16;
        unsafe { *tail_ptr = self.tail.get() };
    }

    fn buffer_ptr(&self, id: u16) -> *const u8 {
        debug_assert!(id < self.n, "buffer id {id} out of range (n={})", self.n);
        unsafe { self.storage.as_ptr().add(id as usize * self.buf_size) }
    }

    /// Borrow buffer `id`, returning the `len` bytes the kernel reported
    /// as filled. Panics if `id` is already on loan — a double-borrow is
    /// a programmer error in the caller's completion handling, not a
    /// recoverable condition.
    pub fn borrow(&self, id: u16, len: usize) -> &[u8] {
        assert!(id < self.n, "buffer id {id} out of range (n={})", self.n);
        assert!(!self.borrowed[id as usize].get(), "buffer {id} already on loan");
        assert!(len <= self.buf_size, "completion length {len} exceeds buffer size {}", self.buf_size);
        self.borrowed[id as usize].set(true);
        unsafe { std::slice::from_raw_parts(self.buffer_ptr(id), len) }
    }

    /// Return buffer `id` to the kernel's free list so it can be selected
    /// for a future receive. Panics if `id` was not on loan.
    pub fn return_buffer(&self, id: u16) {
        assert!(id < self.n, "buffer id {id} out of range (n={})", self.n);
        assert!(self.borrowed[id as usize].get(), "returning buffer {id} that was never borrowed");
        self.borrowed[id as usize].set(false);
        self.returns_issued.set(self.returns_issued.get() + 1);
        self.push_to_kernel(id);
    }

    pub fn buffer_size(&self) -> usize {
        self.buf_size
    }

    pub fn count(&self) -> u16 {
        self.n
    }

    /// Snapshot of the pool's current loan state, for the periodic stats
    /// line: how many buffers are out on loan right now, and how many
    /// returns have been issued since registration.
    pub fn stats(&self) -> BufferPoolStats {
        BufferPoolStats {
            borrowed: self.borrowed.iter().filter(|b| b.get()).count() as u16,
            returns_issued: self.returns_issued.get(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BufferPoolStats {
    pub borrowed: u16,
    pub returns_issued: u64,
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        unsafe {
            // Tell the kernel to forget this buffer group before freeing
            // the memory it describes. `self.ring` must still point at a
            // live `IoRing` here — true for every worker pool, which is
            // installed in thread-local storage (address-stable) before
            // registration and torn down only after the pool is dropped.
            let _ = (*self.ring).unregister_buf_ring(self.bgid);
            dealloc(self.ring_mem as *mut u8, self.ring_layout);
        }
        // `self.storage` is a `Box<[u8]>` built over `alloc_zeroed`
        // memory of matching layout; its own `Drop` frees it correctly.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{IoRing, RingConfig};

    fn test_ring() -> IoRing {
        IoRing::new(RingConfig { sq_entries: 32, cq_entries: None })
            .expect("io_uring unavailable in this environment")
    }

    #[test]
    fn borrow_then_return_round_trips_bytes() {
        let ring = test_ring();
        let pool = BufferPool::register_default(&ring, 4, 256).unwrap();
        {
            let slice = pool.borrow(0, 256);
            assert_eq!(slice.len(), 256);
        }
        pool.return_buffer(0);
    }

    #[test]
    #[should_panic(expected = "already on loan")]
    fn double_borrow_panics() {
        let ring = test_ring();
        let pool = BufferPool::register_default(&ring, 2, 64).unwrap();
        let _a = pool.borrow(0, 64);
        let _b = pool.borrow(0, 64);
    }

    #[test]
    fn rejects_non_power_of_two_count() {
        let ring = test_ring();
        assert!(BufferPool::register_default(&ring, 3, 64).is_err());
    }

    #[test]
    fn stats_track_outstanding_loans_and_returns() {
        let ring = test_ring();
        let pool = BufferPool::register_default(&ring, 4, 256).unwrap();
        assert_eq!(pool.stats().borrowed, 0);
        assert_eq!(pool.stats().returns_issued, 0);

        let _a = pool.borrow(0, 256);
        let _b = pool.borrow(1, 256);
        assert_eq!(pool.stats().borrowed, 2);

        pool.return_buffer(0);
        assert_eq!(pool.stats().borrowed, 1);
        assert_eq!(pool.stats().returns_issued, 1);
    }
}
