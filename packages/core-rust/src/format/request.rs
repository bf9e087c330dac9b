//! Request-oriented JSON formatter.

use serde_json::{Map, Value};

use super::{is_internal_key, LogFormatter};
use crate::context::IdentifierContext;
use crate::event::{level_name, render_timestamp, LogEvent};

const RESERVED_KEYS: &[&str] = &[
    "timestamp",
    "level",
    "PID",
    "service_name",
    "uuid",
    "uuid_server",
    "message",
    "exception",
];

/// Envelope (`timestamp`, `level`, `PID`), optional `service_name`, `uuid`,
/// `uuid_server` and `message`, then the call-site fields merged at top level.
///
/// An event field named `service_name`, `uuid` or `uuid_server` takes the
/// place of the configured or ambient value; other reserved names are dropped.
#[derive(Debug, Clone)]
pub struct RequestJsonFormatter {
    service_name: Option<String>,
    pid: u32,
}

impl RequestJsonFormatter {
    /// Creates a formatter for the current process.
    #[must_use]
    pub fn new(service_name: Option<String>) -> Self {
        Self {
            service_name,
            pid: std::process::id(),
        }
    }
}

impl LogFormatter for RequestJsonFormatter {
    fn render(&self, event: &LogEvent, context: &IdentifierContext) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("timestamp".into(), render_timestamp(&event.timestamp).into());
        data.insert("level".into(), level_name(event.level).into());
        data.insert("PID".into(), self.pid.into());

        let service_name = event
            .string_field("service_name")
            .or(self.service_name.as_deref().filter(|name| !name.is_empty()));
        if let Some(service_name) = service_name {
            data.insert("service_name".into(), service_name.into());
        }

        let uuid = event
            .string_field("uuid")
            .map(str::to_owned)
            .or_else(|| context.request_id.as_ref().map(ToString::to_string));
        if let Some(uuid) = uuid {
            data.insert("uuid".into(), uuid.into());
        }

        let uuid_server = event
            .string_field("uuid_server")
            .map(str::to_owned)
            .or_else(|| context.server_id.as_ref().map(ToString::to_string));
        if let Some(uuid_server) = uuid_server {
            data.insert("uuid_server".into(), uuid_server.into());
        }

        if !event.message.is_empty() {
            data.insert("message".into(), event.message.clone().into());
        }

        for (key, value) in &event.fields {
            if value.is_null() || is_internal_key(key) || RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            data.insert(key.clone(), value.clone());
        }

        if let Some(exception) = &event.exception {
            data.insert("exception".into(), exception.clone().into());
        }

        data
    }
}
