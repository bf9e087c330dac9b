//! Structured JSON log rendering.
//!
//! - [`request`]: request-oriented formatter (`uuid`, `uuid_server` envelope keys)
//! - [`job`]: job-oriented formatter (fixed key set, everything else under `payload`)
//! - [`lines`]: `tracing-subscriber` event format producing one JSON document per line
//!
//! Both formatters read the ambient [`IdentifierContext`] by reference and
//! never mutate the event they render.

pub mod job;
pub mod lines;
pub mod request;

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::context::IdentifierContext;
use crate::event::LogEvent;

pub use job::JobJsonFormatter;
pub use lines::{json_subscriber, JsonLines};
pub use request::RequestJsonFormatter;

/// Renders a [`LogEvent`] plus the ambient identifiers into a JSON object.
pub trait LogFormatter: Send + Sync {
    /// Builds the JSON document for one event.
    fn render(&self, event: &LogEvent, context: &IdentifierContext) -> Map<String, Value>;

    /// Builds the single-line serialized form.
    fn render_line(&self, event: &LogEvent, context: &IdentifierContext) -> String {
        Value::Object(self.render(event, context)).to_string()
    }
}

/// Selects which formatter a log sink uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// [`RequestJsonFormatter`], for HTTP-serving processes.
    #[default]
    Request,
    /// [`JobJsonFormatter`], for background workers.
    Job,
}

impl LogFormat {
    /// Builds the formatter for this format.
    #[must_use]
    pub fn formatter(self, service_name: Option<String>) -> Box<dyn LogFormatter> {
        match self {
            Self::Request => Box::new(RequestJsonFormatter::new(service_name)),
            Self::Job => Box::new(JobJsonFormatter::new(service_name)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::Job => f.write_str("job"),
        }
    }
}

/// Error for an unrecognized [`LogFormat`] name.
#[derive(Debug, thiserror::Error)]
#[error("unknown log format: {0} (expected `request` or `job`)")]
pub struct UnknownLogFormat(String);

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "request" => Ok(Self::Request),
            "job" => Ok(Self::Job),
            _ => Err(UnknownLogFormat(s.to_owned())),
        }
    }
}

/// Keys that belong to the logging machinery rather than to the call site.
pub(crate) fn is_internal_key(key: &str) -> bool {
    key.starts_with('_') || key.starts_with("log.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("Job".parse::<LogFormat>().unwrap(), LogFormat::Job);
        assert_eq!("request".parse::<LogFormat>().unwrap(), LogFormat::Request);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn internal_keys_are_recognized() {
        assert!(is_internal_key("_private"));
        assert!(is_internal_key("log.target"));
        assert!(!is_internal_key("request_method"));
    }
}
