//! # hio-ring
//!
//! The ring gateway and provided-buffer pool: the layer that talks to
//! io_uring directly. Everything above this crate (`hio-io`, `hio-pool`)
//! only ever sees `IoOp` tags and `IoRing`/`BufferPool` handles, never raw
//! SQEs or CQEs.

mod buffer_pool;
mod gateway;
mod op;

pub use buffer_pool::{BufferPool, BufferPoolStats};
pub use gateway::{install, is_installed, take, with_ring, IoRing, RingConfig, RingStats};
pub use op::IoOp;
