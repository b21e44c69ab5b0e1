//! # hio-pool
//!
//! The worker event loop and thread pool: the layer that ties `hio-ring`,
//! `hio-task`, and `hio-io` together into a running server, plus the
//! cross-worker `schedule()` hand-off.

mod pool;
mod schedule;
mod stats;
mod worker;

pub use pool::ThreadPool;
pub use schedule::ScheduleQueue;
pub use stats::Stats;
pub use worker::{Handler, Responded, WorkerConfig};
