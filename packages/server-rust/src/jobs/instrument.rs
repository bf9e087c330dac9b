//! Job instrumentation wrapper.
//!
//! [`instrument`] wraps a [`Job`] so that every run:
//! - happens inside a [`JobScope`] carrying the job name, id, and attempt,
//! - records [`JOB_DURATION_SECONDS`] (even if the run is cancelled),
//! - records [`JOBS_TOTAL`] with `status` `success` or `error`,
//! - reports failures to the [`ErrorReporter`] and returns them unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use tracelink_core::JobScope;

use super::metrics::{DurationGuard, JOBS_TOTAL};
use crate::traits::{ErrorReporter, Job, JobContext, MetricsSink};

/// Wraps `job` with instrumentation. Already-instrumented jobs are returned
/// as they are.
pub fn instrument(
    job: Arc<dyn Job>,
    metrics: Arc<dyn MetricsSink>,
    reporter: Arc<dyn ErrorReporter>,
) -> Arc<dyn Job> {
    if job.is_instrumented() {
        return job;
    }
    Arc::new(InstrumentedJob {
        inner: job,
        metrics,
        reporter,
    })
}

/// A job wrapped by [`instrument`].
pub struct InstrumentedJob {
    inner: Arc<dyn Job>,
    metrics: Arc<dyn MetricsSink>,
    reporter: Arc<dyn ErrorReporter>,
}

#[async_trait]
impl Job for InstrumentedJob {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, ctx: &JobContext) -> anyhow::Result<()> {
        let name = self.inner.name();

        JobScope::scope(Some(name), ctx.job_id.as_deref(), ctx.attempt, async {
            let _timer = DurationGuard::start(self.metrics.as_ref(), name);

            let result = self.inner.run(ctx).await;
            let status = match &result {
                Ok(()) => "success",
                Err(error) => {
                    self.reporter.report(error);
                    "error"
                }
            };
            self.metrics.increment(
                JOBS_TOTAL,
                &[("job_name", name.to_owned()), ("status", status.to_owned())],
            );
            result
        })
        .await
    }

    fn is_instrumented(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;
    use tracelink_core::testing::LogCapture;
    use tracelink_core::{ContextStore, CorrelationId, IdentifierContext, LogFormat};

    use super::super::metrics::testing::{RecordingMetrics, Sample};
    use super::super::metrics::JOB_DURATION_SECONDS;
    use super::super::report::NoopErrorReporter;
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("quota exceeded")]
    struct QuotaExceeded;

    /// Logs one line and records what it saw in the context.
    #[derive(Default)]
    struct RecordingJob {
        fail: bool,
        seen: Mutex<Vec<IdentifierContext>>,
    }

    #[async_trait]
    impl Job for RecordingJob {
        fn name(&self) -> &str {
            "sync_users"
        }

        async fn run(&self, _ctx: &JobContext) -> anyhow::Result<()> {
            tokio::task::yield_now().await;
            self.seen.lock().push(IdentifierContext::current());
            tracing::info!(rows = 3, "synced");
            if self.fail {
                return Err(QuotaExceeded.into());
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingReporter(AtomicU32);

    impl ErrorReporter for CountingReporter {
        fn report(&self, _error: &anyhow::Error) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ctx(job_id: &str, attempt: u32) -> JobContext {
        JobContext {
            job_id: Some(job_id.to_owned()),
            attempt: Some(attempt),
            ..JobContext::default()
        }
    }

    #[tokio::test]
    async fn success_binds_scope_and_records_metrics() {
        let recorder = Arc::new(RecordingJob::default());
        let metrics = Arc::new(RecordingMetrics::default());
        let job = instrument(recorder.clone(), metrics.clone(), Arc::new(NoopErrorReporter));

        job.run(&ctx("job-1", 2)).await.unwrap();

        let seen = recorder.seen.lock().clone();
        assert_eq!(seen[0].job_id, Some(CorrelationId::opaque("job-1")));
        assert_eq!(seen[0].request_id, Some(CorrelationId::opaque("job-1")));
        assert_eq!(seen[0].job_name.as_deref(), Some("sync_users"));
        assert_eq!(seen[0].job_attempt, Some(2));
        assert!(ContextStore::job_id().is_none());

        assert_eq!(
            metrics.samples(),
            vec![
                Sample::Count(
                    JOBS_TOTAL,
                    vec![
                        ("job_name", "sync_users".to_string()),
                        ("status", "success".to_string())
                    ]
                ),
                Sample::Observe(JOB_DURATION_SECONDS, vec![("job_name", "sync_users".to_string())]),
            ]
        );
    }

    #[tokio::test]
    async fn failure_is_reported_counted_and_returned_unchanged() {
        let recorder = Arc::new(RecordingJob {
            fail: true,
            ..RecordingJob::default()
        });
        let metrics = Arc::new(RecordingMetrics::default());
        let reporter = Arc::new(CountingReporter::default());
        let job = instrument(recorder, metrics.clone(), reporter.clone());

        let error = job.run(&ctx("job-2", 1)).await.unwrap_err();

        assert!(error.downcast_ref::<QuotaExceeded>().is_some());
        assert_eq!(reporter.0.load(Ordering::SeqCst), 1);
        assert_eq!(
            metrics.counts(),
            vec![vec![
                ("job_name", "sync_users".to_string()),
                ("status", "error".to_string())
            ]]
        );
        assert!(ContextStore::request_id().is_none());
    }

    #[tokio::test]
    async fn cancelled_run_still_observes_duration() {
        struct Stuck;

        #[async_trait]
        impl Job for Stuck {
            fn name(&self) -> &str {
                "stuck"
            }

            async fn run(&self, _ctx: &JobContext) -> anyhow::Result<()> {
                std::future::pending().await
            }
        }

        let metrics = Arc::new(RecordingMetrics::default());
        let job = instrument(Arc::new(Stuck), metrics.clone(), Arc::new(NoopErrorReporter));
        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            job.run(&JobContext::default()),
        )
        .await;

        assert!(outcome.is_err());
        assert_eq!(
            metrics.samples(),
            vec![Sample::Observe(JOB_DURATION_SECONDS, vec![("job_name", "stuck".to_string())])]
        );
    }

    #[tokio::test]
    async fn instrumenting_twice_is_a_no_op() {
        let metrics: Arc<dyn MetricsSink> = Arc::new(RecordingMetrics::default());
        let reporter: Arc<dyn ErrorReporter> = Arc::new(NoopErrorReporter);
        let once = instrument(Arc::new(RecordingJob::default()), metrics.clone(), reporter.clone());
        let twice = instrument(once.clone(), metrics, reporter);
        assert!(Arc::ptr_eq(&once, &twice));
        assert!(twice.is_instrumented());
    }

    #[tokio::test]
    async fn job_logs_render_with_job_identity() {
        let capture = LogCapture::new();
        let _subscriber =
            tracing::subscriber::set_default(capture.subscriber(LogFormat::Job, Some("WORKER")));
        let job_id = CorrelationId::generate();
        let job = instrument(
            Arc::new(RecordingJob::default()),
            Arc::new(RecordingMetrics::default()),
            Arc::new(NoopErrorReporter),
        );

        job.run(&ctx(&job_id.as_str().to_uppercase(), 1)).await.unwrap();

        let line = &capture.lines_where("job_id", job_id.as_str())[0];
        assert_eq!(line["service_name"], "WORKER");
        assert_eq!(line["payload"]["message"], "synced");
        assert_eq!(line["payload"]["rows"], 3);
        assert_eq!(line["payload"]["job_name"], "sync_users");
        assert_eq!(line["payload"]["job_try"], 1);
    }
}
