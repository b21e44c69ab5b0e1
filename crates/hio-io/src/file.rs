//! File handle and splice.

use std::cell::Cell;
use std::future::Future;
use std::os::unix::io::{AsRawFd, RawFd};
use std::pin::Pin;
use std::task::{Context, Poll};

use hio_core::error::{last_os_errno, HioError, Result};
use hio_ring::{with_ring, IoOp};

use crate::fd::OwnedFd;

/// Chunk size for one pipe hop of a splice; bounds how much of a large
/// transfer is ever in flight through the intermediate pipe at once.
const SPLICE_CHUNK: u32 = 1 << 20;

pub struct File {
    fd: OwnedFd,
}

impl File {
    /// Open `path` read-only.
    pub fn open(path: &str) -> Result<Self> {
        let c_path = std::ffi::CString::new(path).map_err(|_| HioError::Setup("open", libc::EINVAL))?;
        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDONLY | libc::O_CLOEXEC) };
        if fd < 0 {
            return Err(HioError::Setup("open", last_os_errno()));
        }
        Ok(Self { fd: OwnedFd::new(fd) })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.raw()
    }
}

/// Move `length` bytes from `fd_in` to `fd_out` through an anonymous
/// pipe, since `splice(2)` requires one end to be a pipe. Returns total
/// bytes transferred, or `-1` on any negative intermediate result.
pub async fn splice(fd_in: RawFd, fd_out: RawFd, length: u64) -> i64 {
    let (pipe_read, pipe_write) = match nix::unistd::pipe() {
        Ok(pair) => pair,
        Err(_) => return -1,
    };
    let pipe_read = pipe_read.as_raw_fd();
    let pipe_write = pipe_write.as_raw_fd();

    let mut total: u64 = 0;
    while total < length {
        let chunk = std::cmp::min(length - total, SPLICE_CHUNK as u64) as u32;
        let moved_in = splice_once(fd_in, pipe_write, chunk).await;
        if moved_in < 0 {
            return -1;
        }
        if moved_in == 0 {
            break; // input exhausted before `length` was reached
        }

        let mut moved_out = 0i64;
        while moved_out < moved_in {
            let n = splice_once(pipe_read, fd_out, (moved_in - moved_out) as u32).await;
            if n < 0 {
                return -1;
            }
            moved_out += n;
        }
        total += moved_in as u64;
    }
    total as i64
}

struct SpliceOnceFuture {
    fd_in: RawFd,
    fd_out: RawFd,
    length: u32,
    op: Box<IoOp>,
    submitted: Cell<bool>,
}

fn splice_once(fd_in: RawFd, fd_out: RawFd, length: u32) -> SpliceOnceFuture {
    SpliceOnceFuture { fd_in, fd_out, length, op: IoOp::new(), submitted: Cell::new(false) }
}

impl Future for SpliceOnceFuture {
    type Output = i64;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<i64> {
        if !self.submitted.get() {
            with_ring(|ring| ring.submit_splice(&self.op, self.fd_in, self.fd_out, self.length));
            self.submitted.set(true);
        }
        self.op.set_waker(cx.waker());
        if self.op.has_delivered() {
            Poll::Ready(self.op.result())
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_file_is_an_error() {
        assert!(File::open("/no/such/path/hio-test").is_err());
    }
}
