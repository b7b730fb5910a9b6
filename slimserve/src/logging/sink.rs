use crate::error::{Error, Result};

use parking_lot::Mutex;
use std::io::{self, Write};
use std::path::Path;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

/// Final destination of formatted log lines.
///
/// Lines arrive fully formatted, newline included. Implementations are
/// called from the log writer thread, or from any thread when logging is
/// synchronous.
pub trait LogSink: Send + Sync {
    fn write(&self, level: Level, line: &str);

    fn flush(&self) {}
}

/// Daily-rotating files named `slimserve.<date>.log`.
pub struct FileSink {
    appender: Mutex<RollingFileAppender>,
}

impl FileSink {
    /// Opens the appender, creating `directory` if needed.
    pub fn new(directory: &Path) -> Result<Self> {
        std::fs::create_dir_all(directory)
            .map_err(|e| Error::Log(format!("{}: {e}", directory.display())))?;

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("slimserve")
            .filename_suffix("log")
            .build(directory)
            .map_err(|e| Error::Log(e.to_string()))?;

        Ok(Self {
            appender: Mutex::new(appender),
        })
    }
}

impl LogSink for FileSink {
    fn write(&self, _level: Level, line: &str) {
        let _ = self.appender.lock().write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = self.appender.lock().flush();
    }
}

/// Writes to standard output.
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write(&self, _level: Level, line: &str) {
        let _ = io::stdout().lock().write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
    }
}
