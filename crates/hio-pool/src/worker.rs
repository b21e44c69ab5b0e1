//! One worker per OS thread: its own ring, buffer pool, executor, server
//! socket, and event loop.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use hio_core::constants::{MAX_BUFFER_SIZE, STATS_INTERVAL_SECS};
use hio_io::{splice, ClientSocket, File, ServerSocket};
use hio_http::{parse_request, Request, Response};
use hio_ring::{BufferPool, IoRing, RingConfig};

use crate::schedule::ScheduleQueue;
use crate::stats::Stats;

/// What a request handler wants done with a parsed request.
pub enum Responded {
    /// Send `response` followed by `body` in full.
    Buffered(Response, Vec<u8>),
    /// Send `response` (headers only) then splice `file`'s remaining
    /// `len` bytes straight into the socket — the zero-copy path.
    Spliced(Response, File, u64),
}

/// A request handler: pure function from a parsed request to what to
/// send back. Owns nothing about sockets or buffers — `handle_client`
/// drives the actual I/O.
pub type Handler = dyn Fn(&Request) -> Responded;

pub struct WorkerConfig {
    pub port: u16,
    pub sq_entries: u32,
    pub buffer_count: u16,
    pub buffer_size: usize,
    pub max_conns: usize,
}

/// Runs one worker's whole lifetime: ring + buffer pool setup, the
/// detached accept loop, and the `submit_and_wait` / drain / resume tick.
/// Blocks until `stop` is observed.
pub fn run(
    id: usize,
    config: &WorkerConfig,
    handler: Rc<Handler>,
    schedule: ScheduleQueue,
    stop: &std::sync::atomic::AtomicBool,
) {
    let ring = IoRing::new(RingConfig { sq_entries: config.sq_entries, cq_entries: None })
        .unwrap_or_else(|e| panic!("worker[{id}]: ring setup failed: {e}"));
    // Install before registering the buffer pool: the pool keeps a raw
    // pointer back to its ring for teardown, and that pointer must name
    // the thread-local (address-stable) copy, not this soon-to-move
    // local.
    hio_ring::install(ring);
    let pool = hio_ring::with_ring(|ring| {
        BufferPool::register_default(ring, config.buffer_count, config.buffer_size)
    })
    .unwrap_or_else(|e| panic!("worker[{id}]: buffer pool setup failed: {e}"));
    let pool = Rc::new(pool);

    let server = Rc::new(
        ServerSocket::bind(config.port).unwrap_or_else(|e| panic!("worker[{id}]: bind failed: {e}")),
    );

    let stats = Rc::new(RefCell::new(Stats::default()));
    let active = Rc::new(Cell::new(0usize));

    spawn_accept_loop(id, server, pool.clone(), handler, stats.clone(), active.clone(), config.max_conns);

    const HEARTBEAT_MILLIS: u64 = 1000;

    let mut last_stats = Instant::now();
    while !stop.load(std::sync::atomic::Ordering::Relaxed) {
        hio_ring::with_ring(|ring| {
            let _ = ring.tick(HEARTBEAT_MILLIS);
        });
        hio_task::run_ready();
        schedule.drain_local();

        if last_stats.elapsed() >= Duration::from_secs(STATS_INTERVAL_SECS) {
            stats.borrow().print(
                id,
                last_stats.elapsed().as_secs_f64(),
                active.get() as u64,
                pool.stats(),
            );
            last_stats = Instant::now();
        }
    }

    // Drain whatever is already queued so no completion is delivered to
    // a freed `IoOp` after the ring goes away.
    hio_ring::with_ring(|ring| {
        ring.drain_available();
    });
}

#[allow(clippy::too_many_arguments)]
fn spawn_accept_loop(
    id: usize,
    server: Rc<ServerSocket>,
    pool: Rc<BufferPool>,
    handler: Rc<Handler>,
    stats: Rc<RefCell<Stats>>,
    active: Rc<Cell<usize>>,
    max_conns: usize,
) {
    hio_task::spawn(async move {
        loop {
            let fd = server.accept().await;
            if fd < 0 {
                stats.borrow_mut().errors += 1;
                continue;
            }
            stats.borrow_mut().accepts += 1;

            if active.get() >= max_conns {
                unsafe { libc::close(fd) };
                continue;
            }
            active.set(active.get() + 1);

            let client = ClientSocket::from_raw(fd, pool.group_id());
            let pool = pool.clone();
            let handler = handler.clone();
            let stats = stats.clone();
            let active = active.clone();
            hio_task::spawn(async move {
                handle_client(client, &pool, handler.as_ref(), &stats).await;
                active.set(active.get() - 1);
            })
            .detach();
        }
    })
    .detach();
    let _ = id; // reserved for future per-worker tagging of accept errors
}

/// HTTP/1.1 keep-alive contract: one outstanding receive
/// at a time, borrow → parse → respond → return, repeated until the
/// peer closes or an error occurs.
async fn handle_client(client: ClientSocket, pool: &BufferPool, handler: &Handler, stats: &RefCell<Stats>) {
    let mut pending = Vec::new();

    loop {
        let (buffer_id, n) = client.recv(MAX_BUFFER_SIZE as u32).await;
        if n <= 0 {
            if n < 0 {
                stats.borrow_mut().errors += 1;
            }
            return; // peer closed or transient I/O error: close the connection
        }
        stats.borrow_mut().bytes_in += n as u64;

        let chunk = pool.borrow(buffer_id, n as usize);
        pending.extend_from_slice(chunk);
        pool.return_buffer(buffer_id);

        let Some((consumed, request)) = parse_request(&pending) else {
            if pending.len() >= MAX_BUFFER_SIZE * 4 {
                return; // header never completed within a sane bound: drop
            }
            continue;
        };
        pending.drain(..consumed);
        stats.borrow_mut().requests += 1;

        match handler(&request) {
            Responded::Buffered(response, body) => {
                let bytes = response.serialize(&body);
                let sent = client.send(&bytes).await;
                if sent < 0 {
                    stats.borrow_mut().errors += 1;
                    return;
                }
                stats.borrow_mut().bytes_out += sent as u64;
            }
            Responded::Spliced(response, file, len) => {
                let head = response.serialize(&[]);
                let sent = client.send(&head).await;
                if sent < 0 {
                    stats.borrow_mut().errors += 1;
                    return;
                }
                let moved = splice(file.raw_fd(), client.raw_fd(), len).await;
                if moved < 0 {
                    stats.borrow_mut().errors += 1;
                    return;
                }
                stats.borrow_mut().bytes_out += sent as u64 + moved as u64;
            }
        }
        stats.borrow_mut().responses += 1;
    }
}
