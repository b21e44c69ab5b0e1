//! Cross-worker `schedule()`: a mutex/condvar-guarded
//! queue any idle worker drains.
//!
//! A suspended coroutine here is a `Future` pinned to its spawning
//! worker's thread-local executor and waker — it cannot migrate to
//! another OS thread the way a stackful coroutine frame could. What
//! crosses the queue instead is the *work*: a `Send` closure that builds
//! and spawns a fresh task on whichever worker dequeues it. Per-connection
//! work still never leaves its accepting worker — this path exists only
//! for the rare cross-thread hand-off.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};

use hio_task::Task;

type Job = Box<dyn FnOnce() -> Pin<Box<dyn std::future::Future<Output = ()>>> + Send>;

#[derive(Default)]
struct Inner {
    queue: Mutex<VecDeque<Job>>,
    condvar: Condvar,
}

/// Shared handle to the scheduling queue, cloned into every worker.
#[derive(Clone, Default)]
pub struct ScheduleQueue(Arc<Inner>);

impl ScheduleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a job for any idle worker to pick up and spawn locally.
    pub fn schedule<F, Fut>(&self, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + 'static,
    {
        let boxed: Job = Box::new(move || Box::pin(job()));
        self.0.queue.lock().unwrap().push_back(boxed);
        self.0.condvar.notify_one();
    }

    /// Drain all jobs currently queued, spawning each as a detached task
    /// on the calling (i.e. dequeuing) worker. Non-blocking.
    pub fn drain_local(&self) {
        let mut queue = self.0.queue.lock().unwrap();
        while let Some(job) = queue.pop_front() {
            let fut = job();
            let task: Task<()> = hio_task::spawn_boxed(fut);
            task.detach();
        }
    }

    /// Block until a job is available or `timeout` elapses, then drain.
    /// Lets an idle worker avoid busy-polling an empty queue.
    pub fn wait_and_drain(&self, timeout: std::time::Duration) {
        let mut queue = self.0.queue.lock().unwrap();
        if queue.is_empty() {
            queue = match self.0.condvar.wait_timeout(queue, timeout) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        drop(queue);
        self.drain_local();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn scheduled_job_runs_after_drain_local() {
        let queue = ScheduleQueue::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_in_job = ran.clone();
        queue.schedule(move || async move {
            ran_in_job.store(true, Ordering::SeqCst);
        });
        queue.drain_local();
        hio_task::run_ready();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn wait_and_drain_returns_promptly_when_empty() {
        let queue = ScheduleQueue::new();
        let start = std::time::Instant::now();
        queue.wait_and_drain(std::time::Duration::from_millis(20));
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }
}
