use super::command::Command;
use super::connection::Connection;
use super::context::Context;
use super::listener::Listener;
use super::poller::platform::{sys_close, sys_send};
use super::poller::{DEFAULT_EVENTS, Event, Events, Interest};
use super::timer::HeapTimer;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::runtime::pool::WorkerPool;

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Builds the handler for a newly accepted client.
pub(crate) type Factory<H> = Box<dyn Fn(SocketAddr) -> H + Send + Sync>;

/// Message sent to clients refused because the server is full.
const BUSY_MESSAGE: &[u8] = b"Server Busy!";

/// Tunables consumed by the event loop.
pub(crate) struct ReactorSettings {
    /// Idle eviction delay; `None` disables the timer.
    pub(crate) idle_timeout: Option<Duration>,

    /// Maximum number of simultaneously open client connections.
    pub(crate) max_connections: usize,

    /// Interest used for the listening socket.
    pub(crate) listen_interest: Interest,
}

/// The event loop.
///
/// Owns the listener, the connection table, the idle timer and the worker
/// pool. Only the reactor thread inserts or removes table entries; workers
/// report closed connections through [`Command::Release`].
pub(crate) struct Reactor<H> {
    ctx: Arc<Context>,
    receiver: Receiver<Command>,

    listener: Listener,
    connections: HashMap<RawFd, Arc<Connection<H>>>,
    timer: HeapTimer<RawFd>,
    pool: WorkerPool,

    factory: Factory<H>,
    settings: ReactorSettings,
}

impl<H: Handler> Reactor<H> {
    pub(crate) fn new(
        ctx: Arc<Context>,
        receiver: Receiver<Command>,
        listener: Listener,
        pool: WorkerPool,
        factory: Factory<H>,
        settings: ReactorSettings,
    ) -> Result<Self> {
        ctx.poller
            .register(listener.fd(), settings.listen_interest)
            .map_err(|source| Error::Poller {
                fd: listener.fd(),
                source,
            })?;

        Ok(Self {
            ctx,
            receiver,
            listener,
            connections: HashMap::new(),
            timer: HeapTimer::new(),
            pool,
            factory,
            settings,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Runs until a [`Command::Shutdown`] arrives or the poller fails.
    ///
    /// Each turn:
    /// 1. applies pending commands,
    /// 2. expires idle connections and computes the wait bound,
    /// 3. blocks in the poller,
    /// 4. dispatches the ready events.
    pub(crate) fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(DEFAULT_EVENTS);

        info!(
            addr = %self.local_addr(),
            workers = self.pool.threads(),
            "server started"
        );

        let outcome = loop {
            if !self.drain_commands() {
                break Ok(());
            }

            let timeout = match self.settings.idle_timeout {
                Some(_) => self.timer.next_delay(),
                None => None,
            };

            if let Err(e) = self.ctx.poller.wait(&mut events, timeout) {
                error!(error = %e, "poller wait failed");
                break Err(Error::Io(e));
            }

            for event in events.iter() {
                self.dispatch(event);
            }
        };

        self.shutdown();
        outcome
    }

    /// Applies queued commands; returns `false` on shutdown.
    fn drain_commands(&mut self) -> bool {
        while let Ok(command) = self.receiver.try_recv() {
            match command {
                Command::Release(fd) => {
                    self.connections.remove(&fd);
                    self.timer.cancel(fd);
                }
                Command::Shutdown => {
                    info!("shutdown requested");
                    return false;
                }
            }
        }

        true
    }

    fn dispatch(&mut self, event: Event) {
        if event.token == self.listener.fd() {
            self.accept();
            return;
        }

        let Some(conn) = self.connections.get(&event.token).cloned() else {
            debug!(fd = event.token, "event for unknown descriptor");
            return;
        };

        if conn.is_closed() {
            return;
        }

        if event.hangup {
            // Timed connections close through their timer entry.
            if !self.timer.expire(conn.fd()) {
                conn.close(&self.ctx);
            }
        } else if event.readable {
            self.refresh(conn.fd());
            self.submit(conn, Connection::on_read);
        } else if event.writable {
            self.refresh(conn.fd());
            self.submit(conn, Connection::on_write);
        } else {
            warn!(fd = event.token, ?event, "unexpected event");
        }
    }

    fn refresh(&mut self, fd: RawFd) {
        if let Some(timeout) = self.settings.idle_timeout {
            self.timer.adjust(fd, timeout);
        }
    }

    fn submit(&self, conn: Arc<Connection<H>>, step: fn(&Connection<H>, &Context)) {
        let ctx = self.ctx.clone();
        let task_conn = conn.clone();

        if let Err(e) = self.pool.submit(move || step(&task_conn, &ctx)) {
            warn!(fd = conn.fd(), error = %e, "task rejected");
            conn.close(&self.ctx);
        }
    }

    fn accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((fd, addr)) => {
                    if self.ctx.live() >= self.settings.max_connections {
                        let _ = sys_send(fd, BUSY_MESSAGE);
                        sys_close(fd);
                        warn!(%addr, "clients are full");
                    } else {
                        self.add_client(fd, addr);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
                    ) => {}
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return;
                }
            }

            if !self.settings.listen_interest.edge {
                return;
            }
        }
    }

    fn add_client(&mut self, fd: RawFd, addr: SocketAddr) {
        let conn = Arc::new(Connection::new(fd, addr, (self.factory)(addr)));

        if let Err(e) = self
            .ctx
            .poller
            .register(fd, self.ctx.conn_interest.readable())
        {
            // Dropping the only reference closes the descriptor.
            warn!(fd, %addr, error = %e, "register failed");
            return;
        }

        let live = self.ctx.connection_opened();

        if let Some(timeout) = self.settings.idle_timeout {
            let ctx = self.ctx.clone();
            let expiring = conn.clone();
            self.timer.add(
                fd,
                timeout,
                Box::new(move || {
                    debug!(fd = expiring.fd(), "timer closing connection");
                    expiring.close(&ctx);
                }),
            );
        }

        info!(fd, addr = %conn.addr(), live, "client in");
        self.connections.insert(fd, conn);
    }

    /// Stops the pool, then closes every remaining connection.
    fn shutdown(&mut self) {
        self.pool.close();

        for conn in self.connections.values() {
            conn.close(&self.ctx);
        }

        debug!(pending = self.timer.len(), "dropping timers");
        self.connections.clear();
        self.timer.clear();
        while self.receiver.try_recv().is_ok() {}

        info!("server stopped");
    }
}
