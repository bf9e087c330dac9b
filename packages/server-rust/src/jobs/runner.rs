//! Job dispatch with retries, and the worker wiring around it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracelink_core::{CorrelationId, JobScope};

use super::registry::JobRegistry;
use super::worker::{BackgroundRunnable, BackgroundWorker};
use super::JobError;
use crate::config::WorkerConfig;
use crate::traits::JobContext;

/// A queued request to run a registered job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub name: String,
    pub job_id: Option<String>,
    /// Attempt number of the first run; retries count up from here.
    pub attempt: u32,
    #[serde(default)]
    pub payload: Value,
}

impl JobRequest {
    /// First attempt of `name` under a freshly generated job id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            job_id: Some(CorrelationId::generate().to_string()),
            attempt: 1,
            payload: Value::Null,
        }
    }

    #[must_use]
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// JobRunner
// ---------------------------------------------------------------------------

/// Runs job requests against a [`JobRegistry`], retrying failures.
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    max_attempts: u32,
    scheduled: Vec<String>,
}

impl JobRunner {
    #[must_use]
    pub fn new(registry: Arc<JobRegistry>, config: &WorkerConfig) -> Self {
        Self {
            registry,
            max_attempts: config.max_attempts.max(1),
            scheduled: Vec::new(),
        }
    }

    /// Runs `name` on every worker tick.
    #[must_use]
    pub fn schedule(mut self, name: impl Into<String>) -> Self {
        self.scheduled.push(name.into());
        self
    }

    /// Runs `request`, retrying until it succeeds or `max_attempts` is reached.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::UnknownJob`] for unregistered names and
    /// [`JobError::Failed`] with the last error once attempts are exhausted.
    pub async fn dispatch(&self, request: JobRequest) -> Result<(), JobError> {
        let job = self
            .registry
            .get(&request.name)
            .ok_or_else(|| JobError::UnknownJob(request.name.clone()))?;

        let mut attempt = request.attempt.max(1);
        loop {
            let ctx = JobContext {
                job_id: request.job_id.clone(),
                attempt: Some(attempt),
                payload: request.payload.clone(),
            };
            let Err(error) = job.run(&ctx).await else {
                return Ok(());
            };

            let exhausted = attempt >= self.max_attempts;
            let job_id = request.job_id.as_deref();
            JobScope::scope(Some(request.name.as_str()), job_id, Some(attempt), async {
                if exhausted {
                    tracing::error!(attempts = attempt, error = %error, "job failed, giving up");
                } else {
                    tracing::warn!(error = %error, "job attempt failed, retrying");
                }
            })
            .await;
            if exhausted {
                return Err(JobError::Failed {
                    name: request.name,
                    attempts: attempt,
                    source: error,
                });
            }
            attempt += 1;
        }
    }
}

#[async_trait]
impl BackgroundRunnable for JobRunner {
    type Task = JobRequest;

    async fn run(&mut self, task: JobRequest) {
        if let Err(JobError::UnknownJob(name)) = self.dispatch(task).await {
            tracing::warn!(job_name = %name, "dropping request for unknown job");
        }
    }

    async fn on_tick(&mut self) {
        for name in &self.scheduled {
            let request = JobRequest::new(name.clone());
            if let Err(JobError::UnknownJob(name)) = self.dispatch(request).await {
                tracing::warn!(job_name = %name, "scheduled job is not registered");
            }
        }
    }

    async fn shutdown(&mut self) {
        tracing::info!("job worker stopped");
    }
}

// ---------------------------------------------------------------------------
// JobWorker
// ---------------------------------------------------------------------------

/// A [`BackgroundWorker`] driving a [`JobRunner`].
pub struct JobWorker {
    registry: Arc<JobRegistry>,
    worker: BackgroundWorker<JobRunner>,
}

impl JobWorker {
    /// Spawns the worker task.
    #[must_use]
    pub fn start(runner: JobRunner, config: &WorkerConfig) -> Self {
        let registry = Arc::clone(&runner.registry);
        Self {
            registry,
            worker: BackgroundWorker::start(runner, config.tick_interval, config.queue_capacity),
        }
    }

    /// Queues `request`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::UnknownJob`] if no job is registered under the
    /// request's name, or [`JobError::WorkerStopped`] after [`JobWorker::stop`].
    pub async fn enqueue(&self, request: JobRequest) -> Result<(), JobError> {
        if !self.registry.contains(&request.name) {
            return Err(JobError::UnknownJob(request.name));
        }
        self.worker.submit(request).await
    }

    /// Stops the worker, waiting for the task in progress.
    pub async fn stop(&mut self) {
        self.worker.stop().await;
    }
}
