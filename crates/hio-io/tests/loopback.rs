//! Real loopback exercises for the socket primitives. Drives futures directly against an installed
//! `IoRing` without the full worker/executor stack — just enough to
//! prove accept/recv/send round-trip real kernel completions.

use std::future::Future;
use std::net::TcpStream;
use std::pin::{pin, Pin};
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use hio_io::{splice, ClientSocket, File, ServerSocket};
use hio_ring::{IoRing, RingConfig};

fn noop_waker() -> Waker {
    fn clone(_: *const ()) -> RawWaker {
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    fn noop(_: *const ()) {}
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
    unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
}

/// Poll `fut` to completion, pumping the installed ring's completion
/// queue between attempts. Only usable in single-threaded tests that
/// have already called `hio_ring::install`.
fn drive<F: Future>(mut fut: Pin<&mut F>) -> F::Output {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    loop {
        if let Poll::Ready(v) = fut.as_mut().poll(&mut cx) {
            return v;
        }
        hio_ring::with_ring(|ring| {
            let _ = ring.submit_and_wait(1);
            ring.drain_completions();
        });
    }
}

fn install_test_ring() -> bool {
    match IoRing::new(RingConfig { sq_entries: 64, cq_entries: None }) {
        Ok(ring) => {
            hio_ring::install(ring);
            true
        }
        Err(_) => false,
    }
}

#[test]
fn accept_recv_and_echo_round_trip() {
    use std::io::{Read, Write};

    if !install_test_ring() {
        eprintln!("skipping: io_uring unavailable in this environment");
        return;
    }
    let pool = hio_ring::with_ring(|ring| hio_ring::BufferPool::register_default(ring, 8, 4096))
        .expect("buffer pool registration");

    let server = ServerSocket::bind(18081).expect("bind 18081");
    let connector = std::thread::spawn(|| {
        let mut stream = TcpStream::connect("127.0.0.1:18081").expect("connect");
        stream.write_all(b"ping").unwrap();
        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply).unwrap();
        reply
    });

    let fd = drive(pin!(server.accept()));
    assert!(fd >= 0, "accept failed: {fd}");

    let client = ClientSocket::from_raw(fd, pool.group_id());
    let (buffer_id, n) = drive(pin!(client.recv(4096)));
    assert_eq!(n, 4);
    let received = pool.borrow(buffer_id, n as usize).to_vec();
    pool.return_buffer(buffer_id);
    assert_eq!(&received, b"ping");

    let sent = drive(pin!(client.send(&received)));
    assert_eq!(sent, 4);

    let reply = connector.join().unwrap();
    assert_eq!(&reply, b"ping");
}

#[test]
fn sequential_requests_on_one_connection_round_trip_in_order() {
    use std::io::{Read, Write};

    if !install_test_ring() {
        eprintln!("skipping: io_uring unavailable in this environment");
        return;
    }
    let pool = hio_ring::with_ring(|ring| hio_ring::BufferPool::register_default(ring, 8, 4096))
        .expect("buffer pool registration");

    let server = ServerSocket::bind(18082).expect("bind 18082");
    let connector = std::thread::spawn(|| {
        let mut stream = TcpStream::connect("127.0.0.1:18082").expect("connect");
        for msg in [&b"first msg"[..], &b"second msg"[..]] {
            stream.write_all(msg).unwrap();
            let mut reply = vec![0u8; msg.len()];
            stream.read_exact(&mut reply).unwrap();
            assert_eq!(&reply, msg);
        }
    });

    let fd = drive(pin!(server.accept()));
    assert!(fd >= 0, "accept failed: {fd}");
    let client = ClientSocket::from_raw(fd, pool.group_id());

    // One accept, two back-to-back borrow/echo/return cycles on the same
    // connection — the keep-alive contract a single recv-at-a-time loop
    // must uphold.
    for _ in 0..2 {
        let (buffer_id, n) = drive(pin!(client.recv(4096)));
        assert!(n > 0);
        let received = pool.borrow(buffer_id, n as usize).to_vec();
        pool.return_buffer(buffer_id);

        let sent = drive(pin!(client.send(&received)));
        assert_eq!(sent, n);
    }

    connector.join().unwrap();
}

#[test]
fn splice_forwards_a_real_file_byte_for_byte() {
    use std::io::{Read, Write};

    if !install_test_ring() {
        eprintln!("skipping: io_uring unavailable in this environment");
        return;
    }

    let mut path = std::env::temp_dir();
    path.push(format!("hio-splice-test-{}", std::process::id()));
    let contents: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, &contents).expect("write fixture file");

    let server = ServerSocket::bind(18083).expect("bind 18083");
    let expected_len = contents.len();
    let connector = std::thread::spawn(move || {
        let mut stream = TcpStream::connect("127.0.0.1:18083").expect("connect");
        let mut received = Vec::with_capacity(expected_len);
        stream.read_to_end(&mut received).unwrap();
        received
    });

    let fd = drive(pin!(server.accept()));
    assert!(fd >= 0, "accept failed: {fd}");

    let file = File::open(path.to_str().unwrap()).expect("open fixture file");
    let moved = drive(pin!(splice(file.raw_fd(), fd, contents.len() as u64)));
    assert_eq!(moved, contents.len() as i64);
    unsafe { libc::shutdown(fd, libc::SHUT_WR) };

    let received = connector.join().unwrap();
    assert_eq!(received, contents);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn peer_close_yields_zero_byte_recv() {
    if !install_test_ring() {
        eprintln!("skipping: io_uring unavailable in this environment");
        return;
    }
    let pool = hio_ring::with_ring(|ring| hio_ring::BufferPool::register_default(ring, 8, 4096))
        .expect("buffer pool registration");

    let server = ServerSocket::bind(18080).expect("bind 18080");
    let connector = std::thread::spawn(|| {
        let stream = TcpStream::connect("127.0.0.1:18080").expect("connect");
        drop(stream); // close immediately
    });

    let fd = drive(pin!(server.accept()));
    assert!(fd >= 0, "accept failed: {fd}");
    connector.join().unwrap();

    let client = ClientSocket::from_raw(fd, pool.group_id());
    let (_buffer_id, n) = drive(pin!(client.recv(4096)));
    assert_eq!(n, 0, "expected peer-close to report zero bytes");
}
