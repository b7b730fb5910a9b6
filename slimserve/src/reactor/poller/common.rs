use std::os::fd::RawFd;

/// Readiness interest for a registered descriptor.
///
/// `read` and `write` select the readiness kinds to report. The remaining
/// flags shape *how* readiness is reported:
///
/// - `hangup` asks for peer-closed notifications (`EPOLLRDHUP`),
/// - `edge` switches from level- to edge-triggered delivery,
/// - `oneshot` disables the registration after one notification until it
///   is re-armed with [`Poller::modify`](super::Poller::modify).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
    pub(crate) hangup: bool,
    pub(crate) edge: bool,
    pub(crate) oneshot: bool,
}

impl Interest {
    /// Returns a copy of this interest that waits for readability only.
    pub(crate) fn readable(self) -> Self {
        Self {
            read: true,
            write: false,
            ..self
        }
    }

    /// Returns a copy of this interest that waits for writability only.
    pub(crate) fn writable(self) -> Self {
        Self {
            read: false,
            write: true,
            ..self
        }
    }
}

/// An I/O event reported by the poller.
///
/// The token is the descriptor the event belongs to; the reactor keys its
/// connection table by descriptor, so no separate token space is needed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Event {
    /// Descriptor the event was reported for.
    pub(crate) token: RawFd,

    /// The descriptor is readable.
    pub(crate) readable: bool,

    /// The descriptor is writable.
    pub(crate) writable: bool,

    /// The peer hung up or the descriptor is in an error state.
    pub(crate) hangup: bool,
}

/// Wake-up handle wrapping the poller's `eventfd`.
pub(crate) struct Waker(pub(crate) RawFd);

unsafe impl Send for Waker {}
unsafe impl Sync for Waker {}
