//! Configuration types for the `tracelink` server.
//!
//! Configuration objects are built once at startup (usually from
//! [`ServerArgs`]) and handed to constructors; nothing reads them ambiently.

use std::time::Duration;

use axum::http::HeaderName;
use clap::{ArgAction, Parser};
use tracelink_core::LogFormat;

use crate::network::NetworkConfig;

/// Default header carrying the request correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-UUID";
/// Default header carrying the server instance id.
pub const SERVER_ID_HEADER: &str = "X-Server-UUID";

/// Errors raised while validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid header name {name:?}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: axum::http::header::InvalidHeaderName,
    },
}

/// Settings for identifier propagation and access logging.
#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    /// Resolve (or generate) a request correlation id per request.
    pub enable_request_id: bool,
    /// Resolve a server id per request.
    pub enable_server_id: bool,
    /// Header read for, and mirrored with, the request id.
    pub request_id_header: String,
    /// Header read for, and mirrored with, the server id.
    pub server_id_header: String,
    /// Fixed instance id used when the request supplies none.
    pub static_server_id: Option<String>,
    /// Generate one instance id per process when no static id is configured.
    pub auto_generate_server_id: bool,
    /// Include the request body in the access log.
    pub log_request_body: bool,
    /// Bytes of the body kept for the access log. Downstream always sees the full body.
    pub log_request_body_max_bytes: usize,
    /// Service name stamped on access-log events.
    pub service_name: String,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            enable_request_id: true,
            enable_server_id: true,
            request_id_header: REQUEST_ID_HEADER.to_string(),
            server_id_header: SERVER_ID_HEADER.to_string(),
            static_server_id: None,
            auto_generate_server_id: true,
            log_request_body: true,
            log_request_body_max_bytes: 10_000,
            service_name: "WEB".to_string(),
        }
    }
}

impl CorrelationConfig {
    /// Header names for the request id and the server id.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHeaderName`] if either name is not a valid
    /// HTTP header name.
    pub fn header_names(&self) -> Result<CorrelationHeaders, ConfigError> {
        Ok(CorrelationHeaders {
            request_id: parse_header_name(&self.request_id_header)?,
            server_id: parse_header_name(&self.server_id_header)?,
        })
    }
}

/// Header names used to carry identifiers, inbound and outbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationHeaders {
    /// Request correlation id header.
    pub request_id: HeaderName,
    /// Server id header.
    pub server_id: HeaderName,
}

impl Default for CorrelationHeaders {
    fn default() -> Self {
        Self {
            request_id: HeaderName::from_static("x-request-uuid"),
            server_id: HeaderName::from_static("x-server-uuid"),
        }
    }
}

fn parse_header_name(name: &str) -> Result<HeaderName, ConfigError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|source| ConfigError::InvalidHeaderName {
        name: name.to_string(),
        source,
    })
}

/// Log sink settings.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive (`info`, `warn`, `tracelink_server=debug`, ...).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Service name stamped on every line.
    pub service_name: Option<String>,
    /// Which formatter renders the lines.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: Some("WEB".to_string()),
            format: LogFormat::Request,
        }
    }
}

/// Background job worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Total attempts per job, including the first.
    pub max_attempts: u32,
    /// Interval at which scheduled jobs are enqueued.
    pub tick_interval: Duration,
    /// Bounded queue capacity.
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            tick_interval: Duration::from_secs(60),
            queue_capacity: 256,
        }
    }
}

/// Command-line and environment configuration for the server binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "tracelink-server", version, about = "HTTP service with request correlation")]
pub struct ServerArgs {
    /// Bind address.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on. 0 means OS-assigned.
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Service name stamped on log lines.
    #[arg(long, env = "SERVICE_NAME", default_value = "WEB")]
    pub service_name: String,

    /// Log filter directive.
    #[arg(long, env = "LOGGING_LEVEL", default_value = "info")]
    pub logging_level: String,

    /// Log line format: `request` or `job`.
    #[arg(long, env = "LOG_FORMAT", default_value = "request")]
    pub log_format: LogFormat,

    #[arg(long, env = "ENABLE_REQUEST_UUID", default_value_t = true, action = ArgAction::Set)]
    pub enable_request_uuid: bool,

    #[arg(long, env = "ENABLE_SERVER_UUID", default_value_t = true, action = ArgAction::Set)]
    pub enable_server_uuid: bool,

    #[arg(long, env = "REQUEST_UUID_HEADER", default_value = REQUEST_ID_HEADER)]
    pub request_uuid_header: String,

    #[arg(long, env = "SERVER_UUID_HEADER", default_value = SERVER_ID_HEADER)]
    pub server_uuid_header: String,

    /// Fixed server instance id.
    #[arg(long, env = "UUID_SERVER")]
    pub uuid_server: Option<String>,

    #[arg(long, env = "GENERATE_UUID_SERVER", default_value_t = true, action = ArgAction::Set)]
    pub generate_uuid_server: bool,

    #[arg(long, env = "LOG_REQUEST_BODY", default_value_t = true, action = ArgAction::Set)]
    pub log_request_body: bool,

    #[arg(long, env = "LOG_REQUEST_BODY_MAX_BYTES", default_value_t = 10_000)]
    pub log_request_body_max_bytes: usize,

    /// Allowed CORS origins, comma separated. `*` allows any.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    /// Maximum request processing time in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
}

impl ServerArgs {
    /// Correlation middleware settings.
    #[must_use]
    pub fn correlation(&self) -> CorrelationConfig {
        CorrelationConfig {
            enable_request_id: self.enable_request_uuid,
            enable_server_id: self.enable_server_uuid,
            request_id_header: self.request_uuid_header.clone(),
            server_id_header: self.server_uuid_header.clone(),
            static_server_id: self.uuid_server.clone().filter(|id| !id.is_empty()),
            auto_generate_server_id: self.generate_uuid_server,
            log_request_body: self.log_request_body,
            log_request_body_max_bytes: self.log_request_body_max_bytes,
            service_name: self.service_name.clone(),
        }
    }

    /// Log sink settings.
    #[must_use]
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.logging_level.clone(),
            service_name: Some(self.service_name.clone()),
            format: self.log_format,
        }
    }

    /// Listener settings.
    #[must_use]
    pub fn network(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}
