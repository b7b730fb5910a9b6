//! Linux `epoll`-based poller implementation.
//!
//! Responsibilities:
//! - Register, re-arm and remove descriptors with explicit interest sets
//! - Block waiting for I/O readiness, bounded by an optional timeout
//! - Wake the reactor when another thread posts a command
//!
//! Registration changes are safe to issue from any thread: worker threads
//! re-arm one-shot connections while the reactor thread sits in `wait`.

use super::common::{Event, Interest, Waker};

use libc::{
    EFD_CLOEXEC, EFD_NONBLOCK, EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD,
    EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN, EPOLLONESHOT, EPOLLOUT, EPOLLRDHUP, epoll_create1,
    epoll_ctl, epoll_event, epoll_wait, eventfd,
};
use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Duration;

/// Reserved token used internally for the wake-up event.
///
/// Descriptors are never negative, so `u64::MAX` cannot collide with a
/// registered socket.
const WAKE_TOKEN: u64 = u64::MAX;

/// Default capacity of an [`Events`] buffer.
pub(crate) const DEFAULT_EVENTS: usize = 1024;

/// Pre-sized buffer receiving the results of one [`EpollPoller::wait`].
pub(crate) struct Events {
    raw: Vec<epoll_event>,
    len: usize,
}

impl Events {
    /// Creates a buffer able to hold `capacity` events per wait.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: vec![epoll_event { events: 0, u64: 0 }; capacity.max(1)],
            len: 0,
        }
    }

    /// Iterates over the events collected by the last wait.
    ///
    /// The internal wake-up event is filtered out.
    pub(crate) fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.raw[..self.len]
            .iter()
            .filter(|ev| ev.u64 != WAKE_TOKEN)
            .map(|ev| {
                let flags = ev.events;

                Event {
                    token: ev.u64 as RawFd,
                    readable: flags & EPOLLIN as u32 != 0,
                    writable: flags & EPOLLOUT as u32 != 0,
                    hangup: flags & (EPOLLRDHUP | EPOLLHUP | EPOLLERR) as u32 != 0,
                }
            })
    }
}

/// Linux `epoll` poller.
///
/// This poller owns:
/// - an `epoll` instance,
/// - an internal `eventfd` used as a wake-up signal.
///
/// The event buffer lives outside the poller so that registration calls
/// only need `&self` and can be shared across threads behind an `Arc`.
pub(crate) struct EpollPoller {
    /// Epoll file descriptor.
    epoll: RawFd,

    /// Waker wrapping the internal eventfd.
    waker: Arc<Waker>,
}

unsafe impl Send for EpollPoller {}
unsafe impl Sync for EpollPoller {}

impl Waker {
    /// Wake the poller.
    ///
    /// This writes to the internal `eventfd`, causing `epoll_wait`
    /// to return immediately.
    pub(crate) fn wake(&self) {
        let buf: u64 = 1;
        unsafe {
            libc::write(self.0, &buf as *const _ as *const _, 8);
        }
    }

    /// Resets the eventfd counter after a wake-up was observed.
    fn drain(&self) {
        let mut buf = 0u64;
        unsafe {
            libc::read(self.0, &mut buf as *mut _ as *mut _, 8);
        }
    }
}

impl EpollPoller {
    /// Create a new `EpollPoller`.
    ///
    /// This:
    /// - creates the epoll instance,
    /// - creates a non-blocking `eventfd`,
    /// - registers the eventfd into epoll as a persistent wake source.
    pub(crate) fn new() -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        let wake_fd = unsafe { eventfd(0, EFD_NONBLOCK | EFD_CLOEXEC) };
        if wake_fd < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(epoll) };
            return Err(err);
        }

        let mut event = epoll_event {
            events: EPOLLIN as u32,
            u64: WAKE_TOKEN,
        };

        let rc = unsafe { epoll_ctl(epoll, EPOLL_CTL_ADD, wake_fd, &mut event) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(wake_fd);
                libc::close(epoll);
            }
            return Err(err);
        }

        Ok(Self {
            epoll,
            waker: Arc::new(Waker(wake_fd)),
        })
    }

    /// Return the poller waker.
    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    /// Register a file descriptor with the poller.
    pub(crate) fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, interest)
    }

    /// Update interest flags for an already registered descriptor.
    ///
    /// This is also how a fired one-shot registration is re-armed.
    pub(crate) fn modify(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, interest)
    }

    /// Remove a file descriptor from the poller.
    pub(crate) fn deregister(&self, fd: RawFd) -> io::Result<()> {
        if fd < 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }

        let mut event = epoll_event { events: 0, u64: 0 };
        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, &mut event) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Poll for I/O readiness events.
    ///
    /// Blocks until:
    /// - at least one file descriptor becomes ready,
    /// - the wake event is triggered,
    /// - or the optional timeout expires.
    ///
    /// Returns the number of slots filled in `events`, wake-ups included.
    /// An interrupted wait is reported as zero events.
    pub(crate) fn wait(&self, events: &mut Events, timeout: Option<Duration>) -> io::Result<usize> {
        let timeout_ms = timeout
            .map(|t| {
                // Round up so a sub-millisecond deadline does not spin.
                let ms = t.as_millis() + u128::from(t.subsec_nanos() % 1_000_000 != 0);
                ms.min(i32::MAX as u128) as i32
            })
            .unwrap_or(-1);

        let n = unsafe {
            epoll_wait(
                self.epoll,
                events.raw.as_mut_ptr(),
                events.raw.len() as i32,
                timeout_ms,
            )
        };

        if n < 0 {
            events.len = 0;
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        events.len = n as usize;

        if events.raw[..events.len].iter().any(|ev| ev.u64 == WAKE_TOKEN) {
            self.waker.drain();
        }

        Ok(events.len)
    }

    fn ctl(&self, op: i32, fd: RawFd, interest: Interest) -> io::Result<()> {
        if fd < 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }

        let mut flags = 0;

        if interest.read {
            flags |= EPOLLIN;
        }
        if interest.write {
            flags |= EPOLLOUT;
        }
        if interest.hangup {
            flags |= EPOLLRDHUP;
        }
        if interest.edge {
            flags |= EPOLLET;
        }
        if interest.oneshot {
            flags |= EPOLLONESHOT;
        }

        let mut event = epoll_event {
            events: flags as u32,
            u64: fd as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll, op, fd, &mut event) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.waker.0);
            libc::close(self.epoll);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    fn read_interest() -> Interest {
        Interest {
            read: true,
            ..Interest::default()
        }
    }

    #[test]
    fn test_wait_times_out_without_events() {
        let poller = EpollPoller::new().unwrap();
        let mut events = Events::with_capacity(8);

        let n = poller
            .wait(&mut events, Some(Duration::from_millis(10)))
            .unwrap();

        assert_eq!(n, 0);
        assert_eq!(events.iter().count(), 0);
    }

    #[test]
    fn test_readable_event_reports_token() {
        let poller = EpollPoller::new().unwrap();
        let mut events = Events::with_capacity(8);
        let (mut tx, rx) = UnixStream::pair().unwrap();

        poller.register(rx.as_raw_fd(), read_interest()).unwrap();
        tx.write_all(b"x").unwrap();

        poller
            .wait(&mut events, Some(Duration::from_secs(1)))
            .unwrap();

        let ready: Vec<Event> = events.iter().collect();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].token, rx.as_raw_fd());
        assert!(ready[0].readable);
        assert!(!ready[0].hangup);
    }

    #[test]
    fn test_oneshot_requires_rearm() {
        let poller = EpollPoller::new().unwrap();
        let mut events = Events::with_capacity(8);
        let (mut tx, rx) = UnixStream::pair().unwrap();
        let interest = Interest {
            oneshot: true,
            ..read_interest()
        };

        poller.register(rx.as_raw_fd(), interest).unwrap();
        tx.write_all(b"x").unwrap();

        poller
            .wait(&mut events, Some(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(events.iter().count(), 1);

        // Data is still pending (level-triggered), but the registration is disarmed.
        poller
            .wait(&mut events, Some(Duration::from_millis(20)))
            .unwrap();
        assert_eq!(events.iter().count(), 0);

        poller.modify(rx.as_raw_fd(), interest).unwrap();
        poller
            .wait(&mut events, Some(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(events.iter().count(), 1);
    }

    #[test]
    fn test_waker_interrupts_wait() {
        let poller = EpollPoller::new().unwrap();
        let mut events = Events::with_capacity(8);

        poller.waker().wake();
        let n = poller
            .wait(&mut events, Some(Duration::from_secs(5)))
            .unwrap();

        assert_eq!(n, 1);
        assert_eq!(events.iter().count(), 0);
    }

    #[test]
    fn test_peer_close_reports_hangup() {
        let poller = EpollPoller::new().unwrap();
        let mut events = Events::with_capacity(8);
        let (tx, rx) = UnixStream::pair().unwrap();
        let interest = Interest {
            hangup: true,
            ..read_interest()
        };

        poller.register(rx.as_raw_fd(), interest).unwrap();
        drop(tx);

        poller
            .wait(&mut events, Some(Duration::from_secs(1)))
            .unwrap();

        let ready: Vec<Event> = events.iter().collect();
        assert_eq!(ready.len(), 1);
        assert!(ready[0].hangup);
    }

    #[test]
    fn test_modify_unregistered_fd_fails() {
        let poller = EpollPoller::new().unwrap();
        let (_tx, rx) = UnixStream::pair().unwrap();

        let err = poller.modify(rx.as_raw_fd(), read_interest()).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
        assert!(poller.deregister(rx.as_raw_fd()).is_err());
    }
}
