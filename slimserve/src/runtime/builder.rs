use super::core::Server;
use super::pool::WorkerPool;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::handler::{Handler, HandlerFactory};
use crate::reactor::poller::{Interest, Poller};
use crate::reactor::{Context, Listener, Reactor, ReactorSettings};

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;
use tracing::info;

/// Which sockets use edge-triggered readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Listener and connections are level-triggered.
    Level,

    /// Connections are edge-triggered.
    ConnectionEdge,

    /// The listener is edge-triggered.
    ListenerEdge,

    /// Listener and connections are edge-triggered.
    Edge,
}

impl TriggerMode {
    /// Maps the numeric mode; anything above 2 is [`TriggerMode::Edge`].
    pub fn from_mode(mode: u8) -> Self {
        match mode {
            0 => TriggerMode::Level,
            1 => TriggerMode::ConnectionEdge,
            2 => TriggerMode::ListenerEdge,
            _ => TriggerMode::Edge,
        }
    }

    fn listener_edge(self) -> bool {
        matches!(self, TriggerMode::ListenerEdge | TriggerMode::Edge)
    }

    fn connection_edge(self) -> bool {
        matches!(self, TriggerMode::ConnectionEdge | TriggerMode::Edge)
    }
}

/// Builder for configuring and starting a [`Server`].
///
/// # Examples
///
/// ```rust,no_run
/// use slimserve::{HttpHandler, MemoryStore, ServerBuilder};
/// use std::sync::Arc;
///
/// let server = ServerBuilder::new()
///     .port(8080)
///     .workers(4)
///     .build(HttpHandler::factory("resources", Arc::new(MemoryStore::default())))?;
///
/// server.run()?;
/// # Ok::<(), slimserve::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    port: u16,
    trigger_mode: TriggerMode,
    timeout: Option<Duration>,
    linger: bool,
    workers: usize,
    backlog: i32,
    max_connections: usize,
    write_loop_threshold: usize,
}

impl ServerBuilder {
    /// Creates a builder with the default server settings.
    pub fn new() -> Self {
        Self::from_server_config(&ServerConfig::default())
    }

    fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            port: config.port,
            trigger_mode: TriggerMode::from_mode(config.trigger_mode),
            timeout: (config.timeout_ms > 0).then(|| Duration::from_millis(config.timeout_ms)),
            linger: config.linger,
            workers: config.workers,
            backlog: config.backlog,
            max_connections: config.max_connections,
            write_loop_threshold: config.write_loop_threshold,
        }
    }

    /// Creates a builder from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero worker count, a privileged
    /// port or a zero connection ceiling.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        if config.workers == 0 {
            return Err(Error::Config("workers must be > 0".into()));
        }
        if config.max_connections == 0 {
            return Err(Error::Config("max_connections must be > 0".into()));
        }

        let builder = Self::from_server_config(config);
        builder.validate()?;
        Ok(builder)
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn trigger_mode(mut self, mode: TriggerMode) -> Self {
        self.trigger_mode = mode;
        self
    }

    /// Idle timeout; `None` or zero disables eviction.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn linger(mut self, linger: bool) -> Self {
        self.linger = linger;
        self
    }

    /// Sets the number of worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn workers(mut self, n: usize) -> Self {
        assert!(n > 0, "workers must be > 0");

        self.workers = n;
        self
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Sets the connection ceiling.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn max_connections(mut self, n: usize) -> Self {
        assert!(n > 0, "max_connections must be > 0");

        self.max_connections = n;
        self
    }

    pub fn write_loop_threshold(mut self, bytes: usize) -> Self {
        self.write_loop_threshold = bytes;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.port != 0 && self.port < 1024 {
            return Err(Error::Config(format!("port {} is privileged", self.port)));
        }
        Ok(())
    }

    fn listen_interest(&self) -> Interest {
        Interest {
            read: true,
            hangup: true,
            edge: self.trigger_mode.listener_edge(),
            ..Interest::default()
        }
    }

    fn connection_interest(&self) -> Interest {
        Interest {
            read: true,
            hangup: true,
            oneshot: true,
            edge: self.trigger_mode.connection_edge(),
            ..Interest::default()
        }
    }

    /// Binds the listener, starts the worker pool and prepares the event
    /// loop. Nothing is served until [`Server::run`].
    ///
    /// # Errors
    ///
    /// Fails on an invalid port, or when the socket, the poller or the
    /// worker threads cannot be created.
    pub fn build<H, F>(self, factory: F) -> Result<Server<H>>
    where
        H: Handler,
        F: HandlerFactory<H>,
    {
        self.validate()?;

        let listener = Listener::bind(self.port, self.backlog, self.linger)?;
        let poller = Poller::new()?;
        let (sender, receiver) = mpsc::channel();

        let ctx = Arc::new(Context::new(
            poller,
            sender,
            self.connection_interest(),
            self.write_loop_threshold,
        ));

        let pool = WorkerPool::new(self.workers)?;

        let settings = ReactorSettings {
            idle_timeout: self.timeout,
            max_connections: self.max_connections,
            listen_interest: self.listen_interest(),
        };

        let reactor = Reactor::new(
            ctx.clone(),
            receiver,
            listener,
            pool,
            Box::new(factory),
            settings,
        )?;

        info!(
            addr = %reactor.local_addr(),
            trigger_mode = ?self.trigger_mode,
            timeout = ?self.timeout,
            workers = self.workers,
            "server configured"
        );

        Ok(Server::new(reactor, ctx))
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
