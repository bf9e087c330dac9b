//! `tracelink` server: request correlation middleware, traced outbound HTTP,
//! and instrumented background jobs on top of `tracelink-core`.

pub mod config;
pub mod jobs;
pub mod network;
pub mod outbound;
pub mod telemetry;
pub mod traits;

pub use config::{CorrelationConfig, CorrelationHeaders, LoggingConfig, ServerArgs, WorkerConfig};
pub use jobs::{JobError, JobRegistry, JobRequest, JobRunner, JobWorker};
pub use network::{CorrelationLayer, NetworkConfig, NetworkModule};
pub use outbound::{OutboundCorrelationLayer, TracedClient, TracedRequestBuilder};
pub use traits::{ErrorReporter, Job, JobContext, MetricsSink};
