//! # hio-task
//!
//! A `Task<T>` wrapper around a lazily-polled `Future`, plus a per-worker
//! local executor that resumes tasks when their I/O completes. This crate
//! knows nothing about io_uring or sockets — `hio-io`'s awaitables and
//! `hio-pool`'s worker loop are the only things that create `IoOp`-backed
//! futures and drive this executor.
//!
//! Built on Rust's native `async`/`await` rather than stackful coroutine
//! frames: the executor stays a thread-local ready queue of boxed futures
//! instead of swapping real call stacks.

mod executor;
mod task;

pub use executor::{has_ready, run_ready};
pub use task::{spawn, spawn_boxed, Task, TaskState};
