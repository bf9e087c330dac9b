//! Background jobs: instrumentation, registry, and the worker that runs them.

pub mod instrument;
pub mod metrics;
pub mod registry;
pub mod report;
pub mod runner;
pub mod worker;

pub use instrument::{instrument, InstrumentedJob};
pub use metrics::{MetricsFacade, NoopMetrics, JOBS_TOTAL, JOB_DURATION_SECONDS};
pub use registry::JobRegistry;
pub use report::{NoopErrorReporter, TracingErrorReporter};
pub use runner::{JobRequest, JobRunner, JobWorker};
pub use worker::{BackgroundRunnable, BackgroundWorker};

/// Errors raised when dispatching jobs.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("no job registered under {0:?}")]
    UnknownJob(String),
    #[error("job worker is not running")]
    WorkerStopped,
    #[error("job {name:?} failed after {attempts} attempt(s)")]
    Failed {
        name: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}
