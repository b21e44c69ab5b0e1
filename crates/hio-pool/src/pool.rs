//! Fixed-size set of workers, each with its own ring.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::schedule::ScheduleQueue;
use crate::worker::{self, Handler, WorkerConfig};

pub struct ThreadPool {
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawn `thread_count` workers, each binding `config.port` under
    /// `SO_REUSEPORT` and running its own event loop.
    /// `build_handler` is called once per worker thread so each gets its
    /// own `Rc<Handler>` without requiring the handler to be `Send`.
    pub fn new<F>(thread_count: usize, config: WorkerConfig, build_handler: F) -> Self
    where
        F: Fn() -> Box<Handler> + Send + Sync + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let schedule = ScheduleQueue::new();
        let build_handler = Arc::new(build_handler);
        let config = Arc::new(config);

        let handles = (0..thread_count)
            .map(|id| {
                let stop = stop.clone();
                let schedule = schedule.clone();
                let build_handler = build_handler.clone();
                let config = config.clone();
                std::thread::Builder::new()
                    .name(format!("hio-worker-{id}"))
                    .spawn(move || {
                        let handler: Rc<Handler> = Rc::from(build_handler());
                        worker::run(id, &config, handler, schedule, &stop);
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { stop, handles }
    }

    /// Block the calling thread until every worker exits — the process
    /// entry point's `listen(port)` contract. In release builds the
    /// workspace panics with `panic = "abort"`, so a worker thread that
    /// panics takes the whole process down before `join` could ever
    /// observe an `Err` here; this loop is a clean wait, not error
    /// handling.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }

    /// Request cooperative stop. Workers notice at their next
    /// `submit_and_wait` tick (bounded by io_uring's wait, not instant).
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::Responded;
    use hio_http::{Request, Response};

    #[test]
    fn zero_workers_spawns_nothing_and_joins_immediately() {
        let config = WorkerConfig {
            port: 0,
            sq_entries: 32,
            buffer_count: 8,
            buffer_size: 4096,
            max_conns: 1,
        };
        let pool = ThreadPool::new(0, config, || {
            Box::new(|_req: &Request| -> Responded {
                Responded::Buffered(Response::ok("text/plain", 0), Vec::new())
            })
        });
        assert!(pool.handles.is_empty());
        pool.stop();
        pool.join();
    }
}
