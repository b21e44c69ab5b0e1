//! Owning file-descriptor wrapper shared by sockets and files.
//!
//! A movable, non-`Copy` owner that closes its descriptor on drop. Moving
//! it out (via [`OwnedFd::take`]) empties the source so it no longer
//! closes anything — the same discipline `GvtStream`/`GvtListener` get for
//! free from Rust's move semantics, made explicit here because callers
//! sometimes need to hand a raw fd to the kernel (accept, splice) while
//! still owning the wrapper.

use std::os::unix::io::RawFd;

pub struct OwnedFd(Option<RawFd>);

impl OwnedFd {
    pub fn new(fd: RawFd) -> Self {
        debug_assert!(fd >= 0, "refusing to own a negative fd ({fd})");
        Self(Some(fd))
    }

    /// The raw descriptor. Panics if this owner has been emptied by
    /// [`Self::take`].
    pub fn raw(&self) -> RawFd {
        self.0.expect("use of a moved-from OwnedFd")
    }

    /// Empty this owner, returning the descriptor. The returned fd is no
    /// longer closed by this wrapper.
    pub fn take(&mut self) -> RawFd {
        self.0.take().expect("double take of an OwnedFd")
    }
}

impl Drop for OwnedFd {
    fn drop(&mut self) {
        if let Some(fd) = self.0.take() {
            unsafe {
                libc::close(fd);
            }
        }
    }
}

impl PartialEq for OwnedFd {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for OwnedFd {}

impl PartialOrd for OwnedFd {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OwnedFd {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}
