//! Job metrics: names, sinks, and the duration guard.

use std::time::Instant;

use metrics::Label;

use crate::traits::{MetricLabels, MetricsSink};

/// Counter of finished jobs, labelled `job_name` and `status` (`success`/`error`).
pub const JOBS_TOTAL: &str = "jobs_total";
/// Histogram of job durations in seconds, labelled `job_name`.
pub const JOB_DURATION_SECONDS: &str = "job_duration_seconds";

/// Forwards to the `metrics` facade.
///
/// Without an installed recorder the macros do nothing, so a missing backend
/// degrades to a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsFacade;

fn to_labels(labels: MetricLabels<'_>) -> Vec<Label> {
    labels
        .iter()
        .map(|(key, value)| Label::new(*key, value.clone()))
        .collect()
}

impl MetricsSink for MetricsFacade {
    fn increment(&self, name: &'static str, labels: MetricLabels<'_>) {
        metrics::counter!(name, to_labels(labels)).increment(1);
    }

    fn observe(&self, name: &'static str, labels: MetricLabels<'_>, value: f64) {
        metrics::histogram!(name, to_labels(labels)).record(value);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment(&self, _name: &'static str, _labels: MetricLabels<'_>) {}

    fn observe(&self, _name: &'static str, _labels: MetricLabels<'_>, _value: f64) {}
}

/// Observes [`JOB_DURATION_SECONDS`] when dropped, so cancelled runs are
/// measured too.
pub(crate) struct DurationGuard<'a> {
    sink: &'a dyn MetricsSink,
    job_name: String,
    started: Instant,
}

impl<'a> DurationGuard<'a> {
    pub(crate) fn start(sink: &'a dyn MetricsSink, job_name: &str) -> Self {
        Self {
            sink,
            job_name: job_name.to_owned(),
            started: Instant::now(),
        }
    }
}

impl Drop for DurationGuard<'_> {
    fn drop(&mut self) {
        self.sink.observe(
            JOB_DURATION_SECONDS,
            &[("job_name", self.job_name.clone())],
            self.started.elapsed().as_secs_f64(),
        );
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{RecordingMetrics, Sample};
    use super::*;

    #[test]
    fn facade_without_recorder_is_a_no_op() {
        let labels = [("job_name", "cleanup".to_string())];
        MetricsFacade.increment(JOBS_TOTAL, &labels);
        MetricsFacade.observe(JOB_DURATION_SECONDS, &labels, 0.5);
    }

    #[test]
    fn duration_guard_observes_on_drop() {
        let metrics = RecordingMetrics::default();
        {
            let _timer = DurationGuard::start(&metrics, "cleanup");
            assert!(metrics.samples().is_empty());
        }
        assert_eq!(
            metrics.samples(),
            vec![Sample::Observe(
                JOB_DURATION_SECONDS,
                vec![("job_name", "cleanup".to_string())]
            )]
        );
    }
}
