//! Per-client connection state and the worker-side I/O steps.
//!
//! A connection moves through `Reading ⇄ Writing → Closed`. Its poller
//! registration is always one-shot: after an event fires, nothing else is
//! dispatched for the descriptor until the task that handled the event
//! re-arms it. That gives every connection at most one task in flight,
//! so the session lock below is never contended.

use super::command::Command;
use super::context::Context;
use super::poller::Interest;
use super::poller::platform::{sys_close, sys_shutdown, sys_writev};
use crate::handler::{Handler, Outcome};
use crate::utils::Buffer;

use bytes::{Buf, Bytes};
use parking_lot::Mutex;
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::os::fd::RawFd;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// What a worker does with the connection once its step is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Read,
    Write,
    Close,
}

/// Mutable per-connection state, touched by one task at a time.
struct Session<H> {
    read_buf: Buffer,

    /// Response head produced by the handler.
    write_buf: Buffer,

    /// Response body, sent after `write_buf`.
    body: Bytes,

    keep_alive: bool,
    handler: H,
}

/// A connected client.
///
/// Owned by the reactor's connection table; worker tasks and the idle
/// timer borrow it through an `Arc`. The descriptor is closed when the
/// last reference drops, so its number cannot be reused by a new client
/// while any task still holds this connection.
pub(crate) struct Connection<H> {
    fd: RawFd,
    addr: SocketAddr,

    /// Set once by the first `close`; never cleared.
    closed: AtomicBool,

    session: Mutex<Session<H>>,
}

impl<H: Handler> Connection<H> {
    pub(crate) fn new(fd: RawFd, addr: SocketAddr, handler: H) -> Self {
        Self {
            fd,
            addr,
            closed: AtomicBool::new(false),
            session: Mutex::new(Session {
                read_buf: Buffer::new(),
                write_buf: Buffer::new(),
                body: Bytes::new(),
                keep_alive: false,
                handler,
            }),
        }
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    pub(crate) fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the connection.
    ///
    /// Only the first call has any effect: it deregisters the descriptor,
    /// shuts the socket down, decrements the live count and asks the
    /// reactor to release the table entry. Safe to call from any thread,
    /// including while a task for this connection is still running.
    pub(crate) fn close(&self, ctx: &Context) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Err(e) = ctx.poller.deregister(self.fd) {
            debug!(fd = self.fd, error = %e, "deregister failed");
        }
        let _ = sys_shutdown(self.fd, Shutdown::Both);

        let live = ctx.connection_closed();
        info!(fd = self.fd, addr = %self.addr, live, "client quit");

        ctx.send(Command::Release(self.fd));
    }

    /// Read task: drain the socket, run the handler, re-arm.
    pub(crate) fn on_read(&self, ctx: &Context) {
        let next = {
            let Some(mut session) = self.session.try_lock() else {
                warn!(fd = self.fd, "session busy on read, closing");
                self.close(ctx);
                return;
            };

            if self.is_closed() {
                return;
            }

            match session.fill(self.fd, ctx.conn_interest.edge) {
                Ok(true) => session.run_handler(self.fd),
                Ok(false) => {
                    debug!(fd = self.fd, "peer closed");
                    Next::Close
                }
                Err(e) => {
                    debug!(fd = self.fd, error = %e, "read failed");
                    Next::Close
                }
            }
        };

        self.advance(ctx, next);
    }

    /// Write task: flush pending output, then continue or close.
    pub(crate) fn on_write(&self, ctx: &Context) {
        let next = {
            let Some(mut session) = self.session.try_lock() else {
                warn!(fd = self.fd, "session busy on write, closing");
                self.close(ctx);
                return;
            };

            if self.is_closed() {
                return;
            }

            match session.flush(self.fd, ctx.conn_interest.edge, ctx.write_loop_threshold) {
                Ok(true) if session.keep_alive => session.run_handler(self.fd),
                Ok(true) => Next::Close,
                Ok(false) => Next::Write,
                Err(e) => {
                    debug!(fd = self.fd, error = %e, "write failed");
                    Next::Close
                }
            }
        };

        self.advance(ctx, next);
    }

    fn advance(&self, ctx: &Context, next: Next) {
        match next {
            Next::Read => self.rearm(ctx, ctx.conn_interest.readable()),
            Next::Write => self.rearm(ctx, ctx.conn_interest.writable()),
            Next::Close => self.close(ctx),
        }
    }

    fn rearm(&self, ctx: &Context, interest: Interest) {
        if self.is_closed() {
            return;
        }

        if let Err(e) = ctx.poller.modify(self.fd, interest) {
            // ENOENT here means the reactor closed us concurrently.
            if !self.is_closed() {
                warn!(fd = self.fd, error = %e, "re-arm failed");
            }
            self.close(ctx);
        }
    }
}

impl<H> Drop for Connection<H> {
    fn drop(&mut self) {
        sys_close(self.fd);
    }
}

impl<H: Handler> Session<H> {
    /// Reads everything currently available.
    ///
    /// Edge-triggered sockets are drained until they would block; in
    /// level-triggered mode a single read is enough. Returns `Ok(false)`
    /// when the peer closed its side.
    fn fill(&mut self, fd: RawFd, edge: bool) -> io::Result<bool> {
        loop {
            match self.read_buf.read_fd(fd) {
                Ok(0) => return Ok(false),
                Ok(_) if edge => continue,
                Ok(_) => return Ok(true),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// [`process`](Self::process), closing the connection if the handler
    /// panics.
    fn run_handler(&mut self, fd: RawFd) -> Next {
        match panic::catch_unwind(AssertUnwindSafe(|| self.process())) {
            Ok(next) => next,
            Err(_) => {
                error!(fd, "handler panicked");
                Next::Close
            }
        }
    }

    /// Hands buffered input to the handler.
    fn process(&mut self) -> Next {
        if self.read_buf.is_empty() {
            return Next::Read;
        }

        match self.handler.handle(&mut self.read_buf, &mut self.write_buf) {
            Outcome::Incomplete => Next::Read,
            Outcome::Response { body, keep_alive } => {
                self.body = body;
                self.keep_alive = keep_alive;
                Next::Write
            }
        }
    }

    fn pending(&self) -> usize {
        self.write_buf.readable_bytes() + self.body.len()
    }

    /// Sends the response head and body with gather writes.
    ///
    /// Keeps writing while edge-triggered or while more than `threshold`
    /// bytes remain. Returns `Ok(true)` once everything has been sent and
    /// `Ok(false)` when the socket stopped accepting data.
    fn flush(&mut self, fd: RawFd, edge: bool, threshold: usize) -> io::Result<bool> {
        loop {
            if self.pending() == 0 {
                return Ok(true);
            }

            match sys_writev(fd, self.write_buf.peek(), &self.body) {
                Ok(0) => return Ok(false),
                Ok(n) => self.consume(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            let remaining = self.pending();
            if remaining == 0 {
                return Ok(true);
            }
            if !edge && remaining <= threshold {
                return Ok(false);
            }
        }
    }

    fn consume(&mut self, n: usize) {
        let head = self.write_buf.readable_bytes();

        if n < head {
            self.write_buf.retrieve(n);
        } else {
            self.write_buf.retrieve_all();
            self.body.advance(n - head);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use super::super::poller::Poller;
    use std::io::{Read, Write};
    use std::os::fd::{AsRawFd, IntoRawFd};
    use std::os::unix::net::UnixStream;
    use std::sync::mpsc;

    /// Answers every `\n`-terminated line with its upper-cased copy.
    struct Shout;

    impl Handler for Shout {
        fn handle(&mut self, input: &mut Buffer, output: &mut Buffer) -> Outcome {
            let Some(end) = input.find(b"\n") else {
                return Outcome::Incomplete;
            };

            let line = input.peek()[..=end].to_ascii_uppercase();
            input.retrieve(end + 1);
            output.append(&line);

            Outcome::Response {
                body: Bytes::from_static(b"!"),
                keep_alive: true,
            }
        }
    }

    fn session() -> Session<Shout> {
        Session {
            read_buf: Buffer::new(),
            write_buf: Buffer::new(),
            body: Bytes::new(),
            keep_alive: false,
            handler: Shout,
        }
    }

    #[test]
    fn test_process_waits_for_complete_input() {
        let mut session = session();
        assert_eq!(session.process(), Next::Read);

        session.read_buf.append(b"hel");
        assert_eq!(session.process(), Next::Read);

        session.read_buf.append(b"lo\n");
        assert_eq!(session.process(), Next::Write);
        assert_eq!(session.write_buf.peek(), b"HELLO\n");
        assert!(session.keep_alive);
    }

    #[test]
    fn test_fill_reports_peer_close() {
        let (mut tx, rx) = UnixStream::pair().unwrap();
        rx.set_nonblocking(true).unwrap();
        let mut session = session();

        tx.write_all(b"ping\n").unwrap();
        assert!(session.fill(rx.as_raw_fd(), true).unwrap());
        assert_eq!(session.read_buf.peek(), b"ping\n");

        drop(tx);
        assert!(!session.fill(rx.as_raw_fd(), true).unwrap());
    }

    #[test]
    fn test_flush_sends_head_then_body() {
        let (tx, mut rx) = UnixStream::pair().unwrap();
        tx.set_nonblocking(true).unwrap();
        let mut session = session();

        session.write_buf.append(b"HEAD:");
        session.body = Bytes::from_static(b"body");

        assert!(session.flush(tx.as_raw_fd(), false, 10240).unwrap());
        assert_eq!(session.pending(), 0);

        let mut received = [0u8; 9];
        rx.read_exact(&mut received).unwrap();
        assert_eq!(&received, b"HEAD:body");
    }

    #[test]
    fn test_flush_stops_when_socket_is_full() {
        let (tx, mut rx) = UnixStream::pair().unwrap();
        tx.set_nonblocking(true).unwrap();
        let mut session = session();

        let payload = vec![7u8; 4 * 1024 * 1024];
        session.write_buf.append(b"HEAD");
        session.body = Bytes::from(payload.clone());

        assert!(!session.flush(tx.as_raw_fd(), true, 10240).unwrap());
        let left = session.pending();
        assert!(left > 0);
        assert!(session.write_buf.is_empty());

        let mut received = vec![0u8; 4 + payload.len() - left];
        rx.read_exact(&mut received).unwrap();
        assert_eq!(&received[..4], b"HEAD");
        assert!(received[4..].iter().all(|&b| b == 7));
    }

    struct Boom;

    impl Handler for Boom {
        fn handle(&mut self, _input: &mut Buffer, _output: &mut Buffer) -> Outcome {
            panic!("handler failure");
        }
    }

    #[test]
    fn test_panicking_handler_closes() {
        let mut session = Session {
            read_buf: Buffer::new(),
            write_buf: Buffer::new(),
            body: Bytes::new(),
            keep_alive: false,
            handler: Boom,
        };

        assert_eq!(session.run_handler(3), Next::Read);

        session.read_buf.append(b"anything");
        assert_eq!(session.run_handler(3), Next::Close);
    }

    #[test]
    fn test_busy_session_closes_connection() {
        let (_tx, rx) = UnixStream::pair().unwrap();
        let (sender, receiver) = mpsc::channel();
        let interest = Interest {
            read: true,
            oneshot: true,
            ..Interest::default()
        };
        let ctx = Context::new(Poller::new().unwrap(), sender, interest, 10240);

        let fd = rx.into_raw_fd();
        ctx.poller.register(fd, interest).unwrap();
        ctx.connection_opened();
        let conn = Connection::new(fd, "127.0.0.1:9".parse().unwrap(), Shout);

        let held = conn.session.lock();
        conn.on_read(&ctx);
        drop(held);

        assert!(conn.is_closed());
        assert_eq!(ctx.live(), 0);
        assert_eq!(receiver.try_recv().unwrap(), Command::Release(fd));
    }

    #[test]
    fn test_consume_crosses_segments() {
        let mut session = session();
        session.write_buf.append(b"abc");
        session.body = Bytes::from_static(b"defgh");

        session.consume(2);
        assert_eq!(session.write_buf.peek(), b"c");
        assert_eq!(session.body.len(), 5);

        session.consume(3);
        assert!(session.write_buf.is_empty());
        assert_eq!(&session.body[..], b"fgh");
    }
}
