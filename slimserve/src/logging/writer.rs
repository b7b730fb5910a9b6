use super::sink::LogSink;
use crate::utils::{BoundedQueue, Closed};

use std::io;
use std::sync::Arc;
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;

/// A formatted line waiting in the asynchronous log queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: Level,
    pub text: String,
}

/// Where finished lines go.
#[derive(Clone)]
enum Route {
    /// Straight to the sink, on the logging thread.
    Sync(Arc<dyn LogSink>),

    /// Through the queue to the writer thread. Once the queue is closed,
    /// lines fall back to the sink directly.
    Async {
        queue: Arc<BoundedQueue<LogLine>>,
        sink: Arc<dyn LogSink>,
    },
}

/// [`MakeWriter`] handing each formatted event to a [`LogSink`].
///
/// The fmt layer asks for one writer per event; the line is dispatched
/// when that writer drops, so one event always becomes one sink call.
#[derive(Clone)]
pub struct LogWriter {
    route: Route,
}

impl LogWriter {
    /// Writes synchronously.
    pub fn sync(sink: Arc<dyn LogSink>) -> Self {
        Self {
            route: Route::Sync(sink),
        }
    }

    /// Enqueues lines; pushes block while the queue is full.
    pub fn queued(queue: Arc<BoundedQueue<LogLine>>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            route: Route::Async { queue, sink },
        }
    }
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = EventWriter;

    fn make_writer(&'a self) -> Self::Writer {
        EventWriter::new(self.route.clone(), Level::INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        EventWriter::new(self.route.clone(), *meta.level())
    }
}

/// Collects one event's bytes and dispatches them on drop.
pub struct EventWriter {
    route: Route,
    level: Level,
    buf: Vec<u8>,
}

impl EventWriter {
    fn new(route: Route, level: Level) -> Self {
        Self {
            route,
            level,
            buf: Vec::with_capacity(256),
        }
    }
}

impl io::Write for EventWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }

        let text = String::from_utf8_lossy(&self.buf).into_owned();

        match &self.route {
            Route::Sync(sink) => sink.write(self.level, &text),
            Route::Async { queue, sink } => {
                let line = LogLine {
                    level: self.level,
                    text,
                };
                if let Err(Closed(line)) = queue.push_back(line) {
                    sink.write(line.level, &line.text);
                }
            }
        }
    }
}
