//! Collaborator seams: jobs, metrics, and error tracking.

use async_trait::async_trait;
use serde_json::Value;

/// Execution context handed to a job by the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobContext {
    /// Engine-assigned id. Not required to be a UUID.
    pub job_id: Option<String>,
    /// 1-based attempt number.
    pub attempt: Option<u32>,
    /// Arguments supplied with the request.
    pub payload: Value,
}

/// A background job.
///
/// Jobs are registered in a [`JobRegistry`](crate::jobs::JobRegistry), which
/// wraps each one with instrumentation exactly once.
#[async_trait]
pub trait Job: Send + Sync {
    /// Declared name, used for dispatch, logs, and metric labels.
    fn name(&self) -> &str;

    /// Runs one attempt.
    async fn run(&self, ctx: &JobContext) -> anyhow::Result<()>;

    /// True when the job already records metrics and opens its own scope.
    fn is_instrumented(&self) -> bool {
        false
    }
}

/// Label set attached to a metric sample.
pub type MetricLabels<'a> = &'a [(&'static str, String)];

/// Metrics backend. Implementations must never fail the caller.
pub trait MetricsSink: Send + Sync {
    /// Adds one to a counter.
    fn increment(&self, name: &'static str, labels: MetricLabels<'_>);

    /// Records a histogram sample.
    fn observe(&self, name: &'static str, labels: MetricLabels<'_>, value: f64);
}

/// Error-tracking backend. Fire-and-forget: must not block or fail.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &anyhow::Error);
}
