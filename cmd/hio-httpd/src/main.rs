//! # hio HTTP/1.1 Server
//!
//! CLI entry point for the per-worker io_uring event loop in `hio-pool`.
//! Default mode returns a canned body for every request; `--dir` serves
//! static files, exercising the splice path for anything past a small
//! size threshold.
//!
//! ## Usage
//!
//!     cargo run -p hio-httpd --release -- [--port 8080] [--workers 4] [--dir ./www]
//!
//! ## Benchmark
//!
//!     wrk -t4 -c100 -d10s http://127.0.0.1:8080/

use std::sync::atomic::{AtomicBool, Ordering};

use hio_http::{Request, Response};
use hio_io::File;
use hio_pool::{Responded, ThreadPool, WorkerConfig};

const HELLO_BODY: &[u8] = b"Hello from hio!\n";

/// Bytes past which a static file is served via splice instead of being
/// read fully into memory first.
const SPLICE_THRESHOLD: u64 = 64 * 1024;

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn handle_signal(_sig: libc::c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}

struct Config {
    port: u16,
    workers: usize,
    max_conns: usize,
    sq_entries: u32,
    buffer_count: u16,
    buffer_size: usize,
    dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            max_conns: 10_000,
            sq_entries: hio_core::constants::DEFAULT_SQ_ENTRIES,
            buffer_count: hio_core::constants::DEFAULT_BUFFER_COUNT,
            buffer_size: hio_core::constants::MAX_BUFFER_SIZE,
            dir: None,
        }
    }
}

fn parse_config() -> Config {
    let mut config = Config::default();

    // Env vars first, CLI flags below take precedence.
    if let Ok(v) = std::env::var("HIO_PORT") {
        if let Ok(p) = v.parse() {
            config.port = p;
        }
    }
    if let Ok(v) = std::env::var("HIO_WORKERS") {
        if let Ok(w) = v.parse() {
            config.workers = w;
        }
    }

    // CLI flags override env vars.
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => { i += 1; if let Some(v) = args.get(i).and_then(|s| s.parse().ok()) { config.port = v; } }
            "--workers" => { i += 1; if let Some(v) = args.get(i).and_then(|s| s.parse().ok()) { config.workers = v; } }
            "--max-conns" => { i += 1; if let Some(v) = args.get(i).and_then(|s| s.parse().ok()) { config.max_conns = v; } }
            "--sq-entries" => { i += 1; if let Some(v) = args.get(i).and_then(|s| s.parse().ok()) { config.sq_entries = v; } }
            "--buffers" => { i += 1; if let Some(v) = args.get(i).and_then(|s| s.parse().ok()) { config.buffer_count = v; } }
            "--buffer-size" => { i += 1; if let Some(v) = args.get(i).and_then(|s| s.parse().ok()) { config.buffer_size = v; } }
            "--dir" => { i += 1; config.dir = args.get(i).cloned(); }
            _ => {}
        }
        i += 1;
    }
    config
}

fn make_hello_response() -> Responded {
    Responded::Buffered(Response::ok("text/plain", HELLO_BODY.len()), HELLO_BODY.to_vec())
}

fn make_not_found() -> Responded {
    let body = b"404 Not Found\n".to_vec();
    Responded::Buffered(Response::not_found(body.len()), body)
}

fn guess_content_type(path: &str) -> &'static str {
    if path.ends_with(".html") || path.ends_with(".htm") { "text/html" }
    else if path.ends_with(".css") { "text/css" }
    else if path.ends_with(".js") { "application/javascript" }
    else if path.ends_with(".json") { "application/json" }
    else if path.ends_with(".png") { "image/png" }
    else if path.ends_with(".jpg") || path.ends_with(".jpeg") { "image/jpeg" }
    else { "application/octet-stream" }
}

/// Serve `req.url` out of `dir`. Rejects any path containing `..` to stay
/// inside the served directory.
fn serve_file(dir: &str, req: &Request) -> Responded {
    if req.url.contains("..") {
        return make_not_found();
    }
    let rel = req.url.trim_start_matches('/');
    let rel = if rel.is_empty() { "index.html" } else { rel };
    let path = format!("{dir}/{rel}");

    let file = match File::open(&path) {
        Ok(f) => f,
        Err(_) => return make_not_found(),
    };

    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::fstat(file.raw_fd(), &mut stat) };
    if rc != 0 {
        return make_not_found();
    }
    let len = stat.st_size as u64;
    let content_type = guess_content_type(&path);

    if len > SPLICE_THRESHOLD {
        Responded::Spliced(Response::ok(content_type, len as usize), file, len)
    } else {
        let mut body = vec![0u8; len as usize];
        let n = unsafe { libc::read(file.raw_fd(), body.as_mut_ptr() as *mut libc::c_void, body.len()) };
        if n < 0 {
            return make_not_found();
        }
        body.truncate(n as usize);
        Responded::Buffered(Response::ok(content_type, body.len()), body)
    }
}

fn main() {
    let config = parse_config();

    unsafe {
        libc::signal(libc::SIGINT, handle_signal as usize);
        libc::signal(libc::SIGTERM, handle_signal as usize);
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }

    eprintln!(
        "hio-httpd: port={} workers={} max_conns={} sq_entries={} buffers={}x{} dir={:?}",
        config.port, config.workers, config.max_conns, config.sq_entries,
        config.buffer_count, config.buffer_size, config.dir,
    );

    let worker_config = WorkerConfig {
        port: config.port,
        sq_entries: config.sq_entries,
        buffer_count: config.buffer_count,
        buffer_size: config.buffer_size,
        max_conns: config.max_conns,
    };

    let dir = config.dir.clone();
    let pool = ThreadPool::new(config.workers, worker_config, move || {
        let dir = dir.clone();
        Box::new(move |req: &Request| -> Responded {
            match &dir {
                Some(dir) => serve_file(dir, req),
                None => make_hello_response(),
            }
        })
    });

    while RUNNING.load(Ordering::Relaxed) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }
    pool.stop();
    pool.join();
}
