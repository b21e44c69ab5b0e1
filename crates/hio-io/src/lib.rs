//! # hio-io
//!
//! Socket and file primitives built as suspendable operations over
//! `hio-ring`'s `IoOp`/`IoRing`. Nothing here spawns tasks or owns a
//! buffer pool — `hio-pool::worker` wires these awaitables together with
//! `hio-task::spawn` and a `BufferPool`.

mod fd;
mod file;
mod socket;

pub use fd::OwnedFd;
pub use file::{splice, File};
pub use socket::{AcceptFuture, ClientSocket, RecvFuture, ServerSocket};
