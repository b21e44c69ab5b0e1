//! Server and client socket primitives: bind/listen, the
//! multishot-accept awaitable, and provided-buffer recv/send.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use hio_core::constants::SOCKET_LISTEN_QUEUE_SIZE;
use hio_core::error::{last_os_errno, HioError, Result};
use hio_ring::{with_ring, IoOp};

use crate::fd::OwnedFd;

/// The in-flight multishot accept plus its re-arm bookkeeping. Lives for
/// as long as the [`ServerSocket`] that owns it; its destructor cancels
/// the outstanding accept and drains the resulting completion so no stale
/// completion ever names a freed `IoOp`.
struct MultishotAcceptGuard {
    op: Box<IoOp>,
    armed: Cell<bool>,
}

impl Drop for MultishotAcceptGuard {
    fn drop(&mut self) {
        if self.armed.get() {
            with_ring(|ring| {
                ring.submit_cancel(&self.op);
                let _ = ring.submit_and_wait(0);
                ring.drain_available();
            });
        }
    }
}

pub struct ServerSocket {
    fd: OwnedFd,
    guard: MultishotAcceptGuard,
}

impl ServerSocket {
    /// Bind a TCP listener to `port` on every interface, honoring
    /// `SO_REUSEADDR`/`SO_REUSEPORT` so every worker can bind the same
    /// port.
    pub fn bind(port: u16) -> Result<Self> {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
        if fd < 0 {
            return Err(HioError::Setup("socket", last_os_errno()));
        }
        let fd = OwnedFd::new(fd);

        let opt: libc::c_int = 1;
        unsafe {
            libc::setsockopt(
                fd.raw(),
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                &opt as *const _ as *const libc::c_void,
                std::mem::size_of_val(&opt) as u32,
            );
            libc::setsockopt(
                fd.raw(),
                libc::SOL_SOCKET,
                libc::SO_REUSEPORT,
                &opt as *const _ as *const libc::c_void,
                std::mem::size_of_val(&opt) as u32,
            );
        }

        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        addr.sin_family = libc::AF_INET as u16;
        addr.sin_addr.s_addr = 0; // INADDR_ANY
        addr.sin_port = port.to_be();

        let bind_ret = unsafe {
            libc::bind(
                fd.raw(),
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of_val(&addr) as u32,
            )
        };
        if bind_ret != 0 {
            return Err(HioError::Setup("bind", last_os_errno()));
        }

        let listen_ret = unsafe { libc::listen(fd.raw(), SOCKET_LISTEN_QUEUE_SIZE) };
        if listen_ret != 0 {
            return Err(HioError::Setup("listen", last_os_errno()));
        }

        Ok(Self {
            fd,
            guard: MultishotAcceptGuard { op: IoOp::new(), armed: Cell::new(false) },
        })
    }

    pub fn raw_fd(&self) -> std::os::unix::io::RawFd {
        self.fd.raw()
    }

    /// The singleton multishot-accept awaitable tied to this socket
    ///. Each `.await` of the returned future yields one
    /// accepted descriptor (or a negative errno); re-arming across the
    /// "more" boundary is handled internally.
    pub fn accept(&self) -> AcceptFuture<'_> {
        AcceptFuture { guard: &self.guard, fd: self.fd.raw() }
    }
}

pub struct AcceptFuture<'a> {
    guard: &'a MultishotAcceptGuard,
    fd: std::os::unix::io::RawFd,
}

impl Future for AcceptFuture<'_> {
    type Output = i32;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<i32> {
        let guard = self.guard;
        if !guard.armed.get() {
            with_ring(|ring| {
                ring.submit_multishot_accept(
                    &guard.op,
                    self.fd,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                )
            });
            guard.armed.set(true);
        }
        guard.op.set_waker(cx.waker());
        if guard.op.has_delivered() {
            let result = guard.op.result();
            let more = guard.op.has_more();
            guard.op.reset();
            if !more {
                guard.armed.set(false);
            }
            Poll::Ready(result as i32)
        } else {
            Poll::Pending
        }
    }
}

/// An accepted connection. Must not be awaited from two coroutines at
/// once — the per-connection task model enforces this by
/// construction, since exactly one task owns each `ClientSocket`.
pub struct ClientSocket {
    fd: OwnedFd,
    buf_group: u16,
}

impl ClientSocket {
    pub fn from_raw(fd: std::os::unix::io::RawFd, buf_group: u16) -> Self {
        Self { fd: OwnedFd::new(fd), buf_group }
    }

    pub fn raw_fd(&self) -> std::os::unix::io::RawFd {
        self.fd.raw()
    }

    /// Provided-buffer receive. Resolves to `(buffer_id, byte_count)`;
    /// `byte_count == 0` is peer closure, negative is an error — in
    /// neither case does the kernel hand back a buffer worth borrowing,
    /// so `buffer_id` is only meaningful when `byte_count > 0`.
    pub fn recv(&self, length: u32) -> RecvFuture {
        RecvFuture {
            fd: self.fd.raw(),
            buf_group: self.buf_group,
            length,
            op: IoOp::new(),
            submitted: Cell::new(false),
        }
    }

    /// Send `buf` in full, looping the inner single-shot send until every
    /// byte is written or an error occurs.
    pub async fn send(&self, buf: &[u8]) -> i64 {
        let total = buf.len();
        let mut offset = 0usize;
        while offset < total {
            let remaining = &buf[offset..];
            let n = SendOnceFuture {
                fd: self.fd.raw(),
                ptr: remaining.as_ptr(),
                len: remaining.len() as u32,
                op: IoOp::new(),
                submitted: Cell::new(false),
            }
            .await;
            if n <= 0 {
                return -1;
            }
            offset += n as usize;
        }
        total as i64
    }
}

pub struct RecvFuture {
    fd: std::os::unix::io::RawFd,
    buf_group: u16,
    length: u32,
    op: Box<IoOp>,
    submitted: Cell<bool>,
}

impl Future for RecvFuture {
    type Output = (u16, i64);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<(u16, i64)> {
        if !self.submitted.get() {
            with_ring(|ring| ring.submit_recv(&self.op, self.fd, self.length, self.buf_group));
            self.submitted.set(true);
        }
        self.op.set_waker(cx.waker());
        if self.op.has_delivered() {
            let result = self.op.result();
            let buffer_id = self.op.buffer_id().unwrap_or(0);
            Poll::Ready((buffer_id, result))
        } else {
            Poll::Pending
        }
    }
}

struct SendOnceFuture {
    fd: std::os::unix::io::RawFd,
    ptr: *const u8,
    len: u32,
    op: Box<IoOp>,
    submitted: Cell<bool>,
}

impl Future for SendOnceFuture {
    type Output = i64;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<i64> {
        if !self.submitted.get() {
            with_ring(|ring| ring.submit_send(&self.op, self.fd, self.ptr, self.len));
            self.submitted.set(true);
        }
        self.op.set_waker(cx.waker());
        if self.op.has_delivered() {
            Poll::Ready(self.op.result())
        } else {
            Poll::Pending
        }
    }
}
