//! Raw log event as supplied by a call site.

use std::error::Error;
use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::Level;

/// Fields supplied by a log call site, before the renderer adds the envelope
/// and the ambient identifiers.
///
/// `fields` is an ordered list; the renderers merge it deterministically
/// (reserved keys and `null` values are skipped, later duplicates win).
#[derive(Debug, Clone)]
pub struct LogEvent {
    /// Severity.
    pub level: Level,
    /// Human-readable message. Empty messages are not rendered.
    pub message: String,
    /// Extra attributes in call-site order.
    pub fields: Vec<(String, Value)>,
    /// Formatted error chain, if the event carries one.
    pub exception: Option<String>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            fields: Vec::new(),
            exception: None,
            timestamp: Utc::now(),
        }
    }

    /// Appends an extra attribute.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Attaches a formatted exception.
    #[must_use]
    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    /// Last non-null string value supplied for `key`.
    pub(crate) fn string_field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(name, _)| name == key)
            .and_then(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
    }

    /// Last non-null value supplied for `key`.
    pub(crate) fn field(&self, key: &str) -> Option<&Value> {
        self.fields
            .iter()
            .rev()
            .find(|(name, value)| name == key && !value.is_null())
            .map(|(_, value)| value)
    }
}

/// Level name as rendered in log lines.
#[must_use]
pub fn level_name(level: Level) -> &'static str {
    match level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARNING",
        Level::ERROR => "ERROR",
    }
}

/// ISO-8601 UTC timestamp with explicit offset.
#[must_use]
pub fn render_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Formats an error and its `source()` chain.
#[must_use]
pub fn format_error_chain(error: &(dyn Error + 'static)) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    if source.is_some() {
        out.push_str("\n\nCaused by:");
    }
    let mut index = 0;
    while let Some(cause) = source {
        let _ = write!(out, "\n    {index}: {cause}");
        index += 1;
        source = cause.source();
    }
    out
}
