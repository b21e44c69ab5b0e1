//! Per-worker stats, printed periodically to stderr.

use hio_ring::BufferPoolStats;

#[derive(Default)]
pub struct Stats {
    pub accepts: u64,
    pub requests: u64,
    pub responses: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub errors: u64,
}

impl Stats {
    pub fn print(&self, worker_id: usize, elapsed_secs: f64, active_conns: u64, buffers: BufferPoolStats) {
        let rps = if elapsed_secs > 0.0 { self.responses as f64 / elapsed_secs } else { 0.0 };
        eprintln!(
            "[w{worker_id}] conns={active_conns} accepts={} req={} resp={} rps={rps:.0} bytes_in={} bytes_out={} err={} bufs_out={} bufs_returned={}",
            self.accepts, self.requests, self.responses, self.bytes_in, self.bytes_out, self.errors,
            buffers.borrowed, buffers.returns_issued,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_all_zero_counters() {
        let stats = Stats::default();
        assert_eq!(stats.accepts, 0);
        assert_eq!(stats.requests, 0);
        assert_eq!(stats.responses, 0);
        assert_eq!(stats.bytes_in, 0);
        assert_eq!(stats.bytes_out, 0);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn print_does_not_panic_on_zero_elapsed() {
        let stats = Stats { responses: 5, ..Stats::default() };
        stats.print(0, 0.0, 3, BufferPoolStats::default());
    }
}
