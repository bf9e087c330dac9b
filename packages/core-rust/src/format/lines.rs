//! Bridge from `tracing` events to single-line JSON documents.
//!
//! Event fields become [`LogEvent`] fields: scalars map to JSON scalars,
//! `Display`/`Debug` values whose text is a JSON object or array are embedded
//! as structured JSON, and a value recorded as `&dyn Error` becomes the
//! exception. The formatted line is handed to the writer in one piece, so
//! concurrent events never interleave partial lines.

use std::fmt;

use serde_json::{Number, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use super::{LogFormat, LogFormatter};
use crate::context::IdentifierContext;
use crate::event::{format_error_chain, LogEvent};

/// `tracing-subscriber` event format rendering through a [`LogFormatter`].
pub struct JsonLines {
    formatter: Box<dyn LogFormatter>,
}

impl JsonLines {
    /// Wraps an arbitrary formatter.
    #[must_use]
    pub fn new(formatter: impl LogFormatter + 'static) -> Self {
        Self {
            formatter: Box::new(formatter),
        }
    }

    /// Builds the formatter selected by `format`.
    #[must_use]
    pub fn for_format(format: LogFormat, service_name: Option<String>) -> Self {
        Self {
            formatter: format.formatter(service_name),
        }
    }
}

impl fmt::Debug for JsonLines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLines").finish_non_exhaustive()
    }
}

impl<S, N> FormatEvent<S, N> for JsonLines
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let log_event = to_log_event(event);
        let context = IdentifierContext::current();
        let line = self.formatter.render_line(&log_event, &context);
        writeln!(writer, "{line}")
    }
}

/// Builds a subscriber writing JSON lines to `writer`.
pub fn json_subscriber<W>(
    format: LogFormat,
    service_name: Option<String>,
    filter: EnvFilter,
    writer: W,
) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .event_format(JsonLines::for_format(format, service_name))
        .finish()
}

fn to_log_event(event: &Event<'_>) -> LogEvent {
    let mut visitor = FieldVisitor::default();
    event.record(&mut visitor);
    let mut log_event = LogEvent::new(*event.metadata().level(), visitor.message);
    log_event.fields = visitor.fields;
    log_event.exception = visitor.exception;
    log_event
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<(String, Value)>,
    exception: Option<String>,
}

impl FieldVisitor {
    fn push(&mut self, field: &Field, value: Value) {
        self.fields.push((field.name().to_owned(), value));
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = Number::from_f64(value).map_or(Value::Null, Value::Number);
        self.push(field, value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            value.clone_into(&mut self.message);
        } else {
            self.push(field, value.into());
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let chain = format_error_chain(value);
        if self.exception.is_none() {
            self.exception = Some(chain);
        } else {
            self.push(field, chain.into());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let text = format!("{value:?}");
        if field.name() == "message" {
            self.message = text;
        } else {
            self.push(field, structured_or_text(text));
        }
    }
}

fn structured_or_text(text: String) -> Value {
    if text.starts_with('{') || text.starts_with('[') {
        if let Ok(value @ (Value::Object(_) | Value::Array(_))) = serde_json::from_str(&text) {
            return value;
        }
    }
    Value::String(text)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tracing::subscriber::with_default;

    use super::*;
    use crate::testing::LogCapture;
    use crate::{ContextStore, CorrelationId, JobScope};

    #[derive(Debug, thiserror::Error)]
    #[error("upstream unavailable")]
    struct Upstream;

    #[test]
    fn request_lines_carry_ambient_ids() {
        let capture = LogCapture::new();
        let request = CorrelationId::generate();
        let server = CorrelationId::generate();

        with_default(capture.subscriber(LogFormat::Request, Some("WEB")), || {
            let _guard = ContextStore::bind(IdentifierContext::for_request(
                Some(request.clone()),
                Some(server.clone()),
            ));
            tracing::info!(user_id = 7, "signed in");
        });

        let lines = capture.lines();
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["message"], "signed in");
        assert_eq!(line["user_id"], 7);
        assert_eq!(line["uuid"], request.as_str());
        assert_eq!(line["uuid_server"], server.as_str());
        assert_eq!(line["service_name"], "WEB");
    }

    #[test]
    fn display_json_fields_are_embedded() {
        let capture = LogCapture::new();
        with_default(capture.subscriber(LogFormat::Request, None), || {
            let payload = json!({"url": "http://testserver/ping", "body": null});
            tracing::warn!(payload = %payload, note = %"{not json", "");
        });

        let line = &capture.lines()[0];
        assert_eq!(line["payload"]["url"], "http://testserver/ping");
        assert_eq!(line["note"], "{not json");
        assert_eq!(line["level"], "WARNING");
        assert!(line.get("message").is_none());
    }

    #[test]
    fn error_values_become_exception() {
        let capture = LogCapture::new();
        with_default(capture.subscriber(LogFormat::Request, None), || {
            let err = Upstream;
            tracing::error!(error = &err as &dyn std::error::Error, "call failed");
        });

        let line = &capture.lines()[0];
        assert_eq!(line["exception"], "upstream unavailable");
        assert!(line.get("error").is_none());
    }

    #[test]
    fn job_lines_use_job_scope() {
        let capture = LogCapture::new();
        with_default(capture.subscriber(LogFormat::Job, Some("WORKER")), || {
            let _scope = JobScope::enter(Some("reindex"), Some("job-1"), Some(1));
            tracing::info!(payload = %json!({"foo": "bar"}), "hello");
        });

        let line = &capture.lines()[0];
        assert_eq!(line["job_id"], "job-1");
        assert_eq!(line["service_name"], "WORKER");
        assert_eq!(
            line["payload"],
            json!({"foo": "bar", "message": "hello", "job_name": "reindex", "job_try": 1})
        );
    }

    #[test]
    fn multiline_messages_stay_on_one_line() {
        let capture = LogCapture::new();
        with_default(capture.subscriber(LogFormat::Request, None), || {
            tracing::info!("first\nsecond");
        });
        assert_eq!(capture.raw().lines().count(), 1);
        assert_eq!(capture.lines()[0]["message"], "first\nsecond");
    }
}
