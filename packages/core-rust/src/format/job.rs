//! Job-oriented JSON formatter.

use serde_json::{Map, Value};

use super::{is_internal_key, LogFormatter};
use crate::context::IdentifierContext;
use crate::event::{level_name, render_timestamp, LogEvent};

const RESERVED_KEYS: &[&str] = &[
    "service_name",
    "job_id",
    "payload",
    "timestamp",
    "PID",
    "level",
    "message",
    "exception",
];

/// Fixed top-level key set: `service_name`, `job_id`, `timestamp`, `PID`,
/// `payload`, `level`. Everything the call site supplies lands in `payload`.
///
/// `service_name` and `job_id` render as `null` when unavailable; the other
/// keys are always populated.
#[derive(Debug, Clone)]
pub struct JobJsonFormatter {
    service_name: Option<String>,
    pid: u32,
}

impl JobJsonFormatter {
    /// Creates a formatter for the current process.
    #[must_use]
    pub fn new(service_name: Option<String>) -> Self {
        Self {
            service_name,
            pid: std::process::id(),
        }
    }

    fn payload(event: &LogEvent, context: &IdentifierContext) -> Map<String, Value> {
        let mut payload = Map::new();
        match event.field("payload") {
            Some(Value::Object(fields)) => {
                payload.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Some(other) => {
                payload.insert("data".into(), other.clone());
            }
            None => {}
        }

        if !event.message.is_empty() {
            payload
                .entry("message")
                .or_insert_with(|| event.message.clone().into());
        }

        for (key, value) in &event.fields {
            if value.is_null() || is_internal_key(key) || RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            payload.insert(key.clone(), value.clone());
        }

        if let Some(job_name) = &context.job_name {
            payload
                .entry("job_name")
                .or_insert_with(|| job_name.clone().into());
        }
        if let Some(attempt) = context.job_attempt {
            payload.entry("job_try").or_insert_with(|| attempt.into());
        }

        if let Some(exception) = &event.exception {
            payload.insert("exception".into(), exception.clone().into());
        }

        payload
    }
}

impl LogFormatter for JobJsonFormatter {
    fn render(&self, event: &LogEvent, context: &IdentifierContext) -> Map<String, Value> {
        let service_name = event
            .string_field("service_name")
            .or(self.service_name.as_deref().filter(|name| !name.is_empty()))
            .map_or(Value::Null, Value::from);
        let job_id = event
            .string_field("job_id")
            .map(str::to_owned)
            .or_else(|| context.job_id.as_ref().map(ToString::to_string))
            .map_or(Value::Null, Value::from);

        let mut data = Map::new();
        data.insert("service_name".into(), service_name);
        data.insert("job_id".into(), job_id);
        data.insert("timestamp".into(), render_timestamp(&event.timestamp).into());
        data.insert("PID".into(), self.pid.into());
        data.insert("payload".into(), Value::Object(Self::payload(event, context)));
        data.insert("level".into(), level_name(event.level).into());
        data
    }
}
