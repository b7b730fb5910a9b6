use crate::error::Result;
use crate::handler::Handler;
use crate::reactor::{Command, Context, Reactor};

use std::net::SocketAddr;
use std::sync::Arc;

/// A configured server, ready to run.
///
/// Built by [`ServerBuilder`](super::builder::ServerBuilder). [`run`](Self::run)
/// blocks the calling thread in the event loop; use a [`ServerHandle`]
/// to observe or stop it from elsewhere.
pub struct Server<H> {
    reactor: Reactor<H>,
    ctx: Arc<Context>,
}

impl<H: Handler> Server<H> {
    pub(crate) fn new(reactor: Reactor<H>, ctx: Arc<Context>) -> Self {
        Self { reactor, ctx }
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.reactor.local_addr()
    }

    /// Returns a handle that can stop the server from another thread.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            local_addr: self.local_addr(),
            ctx: self.ctx.clone(),
        }
    }

    /// Runs the event loop until [`ServerHandle::shutdown`] is called.
    ///
    /// On return the worker pool has drained its tasks and every client
    /// connection is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting on the poller fails.
    pub fn run(mut self) -> Result<()> {
        self.reactor.run()
    }
}

/// Cloneable remote control for a running [`Server`].
#[derive(Clone)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    ctx: Arc<Context>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of currently open client connections.
    pub fn connection_count(&self) -> usize {
        self.ctx.live()
    }

    /// Asks the event loop to stop; returns immediately.
    pub fn shutdown(&self) {
        self.ctx.send(Command::Shutdown);
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.local_addr)
            .field("connections", &self.connection_count())
            .finish()
    }
}
