//! hio error types.

use std::fmt;

#[derive(Debug)]
pub enum HioError {
    /// Submission queue is full even after a forced submit.
    RingFull,
    /// io_uring instance creation failed.
    RingSetup(i32),
    /// io_uring_enter (submit/wait) failed.
    RingSubmit(i32),
    /// Registering the provided-buffer ring with the kernel failed.
    BufferRingSetup(i32),
    /// `borrow()` was called on a buffer id that is out of range or
    /// already borrowed.
    BufferInvariant { id: u16 },
    /// Setup-fatal error: socket/bind/listen/pipe/open failed.
    Setup(&'static str, i32),
    /// A worker thread function was called off its owning worker thread.
    NotOnWorker,
    /// OS error with a raw errno.
    Os(i32),
}

impl fmt::Display for HioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RingFull => write!(f, "submission ring full"),
            Self::RingSetup(e) => write!(f, "io_uring setup failed: errno {e}"),
            Self::RingSubmit(e) => write!(f, "io_uring submit failed: errno {e}"),
            Self::BufferRingSetup(e) => write!(f, "buffer ring registration failed: errno {e}"),
            Self::BufferInvariant { id } => {
                write!(f, "buffer pool invariant violated for buffer {id}")
            }
            Self::Setup(what, e) => write!(f, "{what} failed: errno {e}"),
            Self::NotOnWorker => write!(f, "called off the owning worker thread"),
            Self::Os(e) => write!(f, "OS error: errno {e}"),
        }
    }
}

impl std::error::Error for HioError {}

pub type Result<T> = std::result::Result<T, HioError>;

/// Fetch the calling thread's current `errno`.
pub fn last_os_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(-1)
}
