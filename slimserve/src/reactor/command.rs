use std::os::fd::RawFd;

/// Messages posted to the reactor thread from other threads.
///
/// Every send is followed by a poller wake-up so the reactor picks the
/// command up even while blocked in `wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// A connection was closed; drop its table entry and timer.
    Release(RawFd),

    /// Stop the event loop.
    Shutdown,
}
