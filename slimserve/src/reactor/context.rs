use super::command::Command;
use super::poller::{Interest, Poller, Waker};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use tracing::debug;

/// State shared by the reactor thread and every worker task.
///
/// Workers only ever touch the poller (to re-arm or deregister their
/// connection), the live counter and the command channel.
pub(crate) struct Context {
    /// Readiness multiplexer; registration calls are thread-safe.
    pub(crate) poller: Poller,

    /// Wakes the reactor after a command has been sent.
    waker: Arc<Waker>,

    /// Command channel into the reactor.
    commands: Sender<Command>,

    /// Number of open client connections.
    live: AtomicUsize,

    /// Interest template for client sockets (hang-up, one-shot, trigger).
    pub(crate) conn_interest: Interest,

    /// A write task keeps looping while more than this many bytes remain,
    /// even in level-triggered mode.
    pub(crate) write_loop_threshold: usize,
}

impl Context {
    pub(crate) fn new(
        poller: Poller,
        commands: Sender<Command>,
        conn_interest: Interest,
        write_loop_threshold: usize,
    ) -> Self {
        let waker = poller.waker();

        Self {
            poller,
            waker,
            commands,
            live: AtomicUsize::new(0),
            conn_interest,
            write_loop_threshold,
        }
    }

    /// Posts a command to the reactor and wakes it.
    ///
    /// A reactor that has already stopped simply never reads it.
    pub(crate) fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!(?command, "reactor gone, command dropped");
            return;
        }
        self.waker.wake();
    }

    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn connection_opened(&self) -> usize {
        self.live.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn connection_closed(&self) -> usize {
        self.live.fetch_sub(1, Ordering::AcqRel).saturating_sub(1)
    }
}
