//! In-memory log capture for tests.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::format::{json_subscriber, LogFormat};

/// Collects rendered log lines so tests can assert on them as JSON.
///
/// Install with `tracing::subscriber::with_default` or `set_default`, emit,
/// then inspect [`LogCapture::lines`].
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Creates an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscriber that renders every event (all levels) into this capture.
    #[must_use]
    pub fn subscriber(
        &self,
        format: LogFormat,
        service_name: Option<&str>,
    ) -> impl Subscriber + Send + Sync + 'static {
        json_subscriber(
            format,
            service_name.map(str::to_owned),
            EnvFilter::new("trace"),
            self.clone(),
        )
    }

    /// Everything written so far.
    #[must_use]
    pub fn raw(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Every non-blank line parsed as JSON. Lines that fail to parse are
    /// returned as JSON strings so assertions point at them.
    #[must_use]
    pub fn lines(&self) -> Vec<Value> {
        self.raw()
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).unwrap_or_else(|_| Value::String(line.to_owned())))
            .collect()
    }

    /// Lines whose `key` equals `value`.
    #[must_use]
    pub fn lines_where(&self, key: &str, value: &str) -> Vec<Value> {
        self.lines()
            .into_iter()
            .filter(|line| line.get(key).and_then(Value::as_str) == Some(value))
            .collect()
    }
}

/// Writer handed out by [`LogCapture`].
#[derive(Debug)]
pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}
