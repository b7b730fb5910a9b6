//! Readiness multiplexer used by the reactor.
//!
//! The poller is used by the reactor to:
//! - wait for I/O readiness events on the listener and every connection,
//! - let worker threads re-arm one-shot connection interest,
//! - wake the reactor when a command is posted from another thread.
//!
//! Only Linux `epoll` is supported; the server relies on `EPOLLONESHOT`
//! and `EPOLLRDHUP` semantics.

pub(crate) mod common;

#[cfg(target_os = "linux")]
mod epoll;

pub(crate) use common::{Event, Interest, Waker};

#[cfg(target_os = "linux")]
pub(crate) use epoll::{DEFAULT_EVENTS, Events};

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;
