//! Process-wide log sink initialization.

use tracelink_core::format::json_subscriber;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Errors raised while installing the log sink.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter {directive:?}: {source}")]
    InvalidFilter {
        directive: String,
        #[source]
        source: ParseError,
    },
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Builds the level filter: `RUST_LOG` when set, else `level`.
///
/// `level` also accepts the names `warning` and `critical`.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] if the directive does not parse.
pub fn build_filter(level: &str) -> Result<EnvFilter, TelemetryError> {
    filter_for(std::env::var(EnvFilter::DEFAULT_ENV).ok(), level)
}

fn filter_for(env_directive: Option<String>, level: &str) -> Result<EnvFilter, TelemetryError> {
    let directive = env_directive
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| normalize_level(level));
    EnvFilter::try_new(&directive).map_err(|source| TelemetryError::InvalidFilter { directive, source })
}

fn normalize_level(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    }
}

/// Installs the JSON-lines subscriber writing to stdout. Call once at startup.
///
/// # Errors
///
/// Returns [`TelemetryError`] if the filter is invalid or a global subscriber
/// is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(&config.level)?;
    let subscriber = json_subscriber(
        config.format,
        config.service_name.clone(),
        filter,
        std::io::stdout,
    );
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
