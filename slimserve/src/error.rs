use std::io;

use thiserror::Error;

/// Errors surfaced by the server and its supporting components.
///
/// Per-connection I/O failures never reach this type: they close the
/// offending connection and are logged. Only failures that prevent the
/// server (or one of its subsystems) from starting or continuing end up
/// here.
#[derive(Error, Debug)]
pub enum Error {
    /// An operating-system call failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// The readiness multiplexer rejected a registration change.
    #[error("poller error on fd {fd}: {source}")]
    Poller {
        fd: i32,
        #[source]
        source: io::Error,
    },

    /// A task was submitted after the worker pool was closed.
    #[error("worker pool is closed")]
    PoolClosed,

    /// The logging subsystem could not be installed.
    #[error("log setup failed: {0}")]
    Log(String),
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
