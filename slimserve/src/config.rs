//! Server configuration.
//!
//! Loaded from a TOML file at startup. Every field has a default, so a
//! missing file or a partial one is fine:
//!
//! ```toml
//! [server]
//! port = 1316
//! trigger_mode = 3
//! timeout_ms = 60000
//!
//! [log]
//! level = 1
//! queue_capacity = 1024
//!
//! [http]
//! resources = "resources"
//! ```

use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "SLIMSERVE_CONFIG";

/// Path used when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "slimserve.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Listener, reactor and worker settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,

    /// Static-file handler settings
    #[serde(default)]
    pub http: HttpConfig,
}

/// Listener, reactor and worker settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// TCP port; `0` lets the kernel pick one.
    #[serde(default = "default_port")]
    pub port: u16,

    /// 0: all level-triggered, 1: connections edge-triggered,
    /// 2: listener edge-triggered, 3 (or anything else): both.
    #[serde(default = "default_trigger_mode")]
    pub trigger_mode: u8,

    /// Idle timeout in milliseconds; `0` disables eviction.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Apply a one-second `SO_LINGER` to the listener.
    #[serde(default)]
    pub linger: bool,

    /// Number of worker threads.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// `listen(2)` backlog.
    #[serde(default = "default_backlog")]
    pub backlog: i32,

    /// Maximum number of open client connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Level-triggered write tasks keep looping above this many pending bytes.
    #[serde(default = "default_write_loop_threshold")]
    pub write_loop_threshold: usize,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LogConfig {
    /// Install the log subscriber at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 0 DEBUG, 1 INFO, 2 WARN, 3 ERROR.
    #[serde(default = "default_log_level")]
    pub level: u8,

    /// Capacity of the asynchronous log queue; `0` writes synchronously.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Directory receiving the daily log files.
    #[serde(default = "default_log_dir")]
    pub directory: PathBuf,

    /// Write to standard output instead of files.
    #[serde(default)]
    pub stdout: bool,
}

/// Static-file handler settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Document root.
    #[serde(default = "default_resources")]
    pub resources: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            trigger_mode: default_trigger_mode(),
            timeout_ms: default_timeout_ms(),
            linger: false,
            workers: default_workers(),
            backlog: default_backlog(),
            max_connections: default_max_connections(),
            write_loop_threshold: default_write_loop_threshold(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            queue_capacity: default_queue_capacity(),
            directory: default_log_dir(),
            stdout: false,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            resources: default_resources(),
        }
    }
}

fn default_port() -> u16 {
    1316
}

fn default_trigger_mode() -> u8 {
    3
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_workers() -> usize {
    6
}

fn default_backlog() -> i32 {
    128
}

fn default_max_connections() -> usize {
    65536
}

fn default_write_loop_threshold() -> usize {
    10240
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> u8 {
    1
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("log")
}

fn default_resources() -> PathBuf {
    PathBuf::from("resources")
}

impl Config {
    /// Loads the file named by `SLIMSERVE_CONFIG`, or `slimserve.toml`.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file exists but cannot be read or
    /// parsed.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_path(path)
    }

    /// Loads a specific file; a missing file yields the defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Config(format!("{}: {e}", path.display()))),
        }
    }

    /// Parses TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }
}
