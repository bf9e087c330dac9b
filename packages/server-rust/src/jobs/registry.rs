use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use super::instrument::instrument;
use super::metrics::MetricsFacade;
use super::report::TracingErrorReporter;
use crate::traits::{ErrorReporter, Job, MetricsSink};

// ---------------------------------------------------------------------------
// JobRegistry
// ---------------------------------------------------------------------------

/// Name-indexed set of jobs, each instrumented exactly once at registration.
///
/// Registering a second job under an existing name replaces the first; the
/// registration order of the name is kept.
pub struct JobRegistry {
    by_name: DashMap<String, Arc<dyn Job>>,
    order: RwLock<Vec<String>>,
    metrics: Arc<dyn MetricsSink>,
    reporter: Arc<dyn ErrorReporter>,
}

impl JobRegistry {
    /// Creates an empty registry reporting to the given collaborators.
    #[must_use]
    pub fn new(metrics: Arc<dyn MetricsSink>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            by_name: DashMap::new(),
            order: RwLock::new(Vec::new()),
            metrics,
            reporter,
        }
    }

    /// Instruments `job` and makes it dispatchable by name.
    pub fn register(&self, job: impl Job + 'static) -> Arc<dyn Job> {
        self.register_arc(Arc::new(job))
    }

    /// Like [`JobRegistry::register`] for a shared job.
    pub fn register_arc(&self, job: Arc<dyn Job>) -> Arc<dyn Job> {
        let job = instrument(job, Arc::clone(&self.metrics), Arc::clone(&self.reporter));
        let name = job.name().to_owned();
        if self.by_name.insert(name.clone(), Arc::clone(&job)).is_none() {
            self.order.write().push(name);
        }
        job
    }

    /// Retrieves an instrumented job by its name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Job>> {
        self.by_name.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether a job is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.read().clone()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for JobRegistry {
    /// Registry reporting to the `metrics` facade and to `tracing`.
    fn default() -> Self {
        Self::new(Arc::new(MetricsFacade), Arc::new(TracingErrorReporter))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
