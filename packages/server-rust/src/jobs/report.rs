//! Error reporter implementations.

use crate::traits::ErrorReporter;

/// Drops reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopErrorReporter;

impl ErrorReporter for NoopErrorReporter {
    fn report(&self, _error: &anyhow::Error) {}
}

/// Emits one `error` event carrying the error chain as `exception`.
///
/// Called inside the job scope, so the event carries the job identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, error: &anyhow::Error) {
        let error: &(dyn std::error::Error + 'static) = error.as_ref();
        tracing::error!(error, "job raised an error");
    }
}
