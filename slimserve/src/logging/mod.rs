//! Logging setup.
//!
//! Events are formatted by a `tracing_subscriber::fmt` subscriber and
//! handed, one line per event, to a [`LogSink`]:
//!
//! - synchronously when `queue_capacity` is `0`,
//! - otherwise through a [`BoundedQueue`] drained by a background thread
//!   named `slimserve-log`. A full queue blocks the logging thread.
//!
//! Nothing here is global until [`init`] installs the subscriber; the
//! returned [`LogGuard`] must be kept alive for as long as lines should be
//! written.

mod sink;
mod writer;

pub use sink::{FileSink, LogSink, StdoutSink};
pub use writer::{EventWriter, LogLine, LogWriter};

use crate::config::LogConfig;
use crate::error::{Error, Result};
use crate::utils::BoundedQueue;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::Dispatch;
use tracing::level_filters::LevelFilter;

/// Maps the numeric config level onto a filter.
///
/// 0 DEBUG, 1 INFO, 2 WARN, anything higher ERROR.
pub fn level_filter(level: u8) -> LevelFilter {
    match level {
        0 => LevelFilter::DEBUG,
        1 => LevelFilter::INFO,
        2 => LevelFilter::WARN,
        _ => LevelFilter::ERROR,
    }
}

/// Keeps the log writer alive.
///
/// Dropping the guard waits for queued lines to be written, closes the
/// queue, joins the writer thread and flushes the sink.
pub struct LogGuard {
    queue: Option<Arc<BoundedQueue<LogLine>>>,
    writer: Option<JoinHandle<()>>,
    sink: Arc<dyn LogSink>,
}

impl LogGuard {
    /// Returns `true` when lines go through the background writer.
    pub fn is_async(&self) -> bool {
        self.queue.is_some()
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.take() {
            queue.wait_until_empty();
            queue.close();
        }

        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }

        self.sink.flush();
    }
}

/// Builds a dispatcher writing to the sink selected by `config`.
///
/// Returns `None` when logging is disabled.
pub fn build(config: &LogConfig) -> Result<Option<(Dispatch, LogGuard)>> {
    if !config.enabled {
        return Ok(None);
    }

    let sink: Arc<dyn LogSink> = if config.stdout {
        Arc::new(StdoutSink)
    } else {
        Arc::new(FileSink::new(&config.directory)?)
    };

    with_sink(config, sink).map(Some)
}

/// Builds a dispatcher writing to a caller-provided sink.
pub fn with_sink(config: &LogConfig, sink: Arc<dyn LogSink>) -> Result<(Dispatch, LogGuard)> {
    let (writer, guard) = if config.queue_capacity > 0 {
        let queue = Arc::new(BoundedQueue::<LogLine>::new(config.queue_capacity));

        let handle = {
            let queue = queue.clone();
            let sink = sink.clone();
            thread::Builder::new()
                .name("slimserve-log".into())
                .spawn(move || {
                    while let Some(line) = queue.pop_front() {
                        sink.write(line.level, &line.text);
                    }
                })
                .map_err(|e| Error::Log(e.to_string()))?
        };

        (
            LogWriter::queued(queue.clone(), sink.clone()),
            LogGuard {
                queue: Some(queue),
                writer: Some(handle),
                sink,
            },
        )
    } else {
        (
            LogWriter::sync(sink.clone()),
            LogGuard {
                queue: None,
                writer: None,
                sink,
            },
        )
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level_filter(config.level))
        .with_thread_names(true)
        .with_writer(writer)
        .finish();

    Ok((Dispatch::new(subscriber), guard))
}

/// Installs the global subscriber described by `config`.
///
/// # Errors
///
/// Returns [`Error::Log`] if the sink cannot be opened or a global
/// subscriber is already installed.
pub fn init(config: &LogConfig) -> Result<Option<LogGuard>> {
    let Some((dispatch, guard)) = build(config)? else {
        return Ok(None);
    };

    tracing::dispatcher::set_global_default(dispatch).map_err(|e| Error::Log(e.to_string()))?;

    tracing::info!(
        level = config.level,
        queue_capacity = config.queue_capacity,
        "log system initialized"
    );

    Ok(Some(guard))
}
