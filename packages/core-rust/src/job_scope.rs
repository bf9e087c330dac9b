//! Job context scope.
//!
//! Binds job metadata into the [`ContextStore`] for the duration of a
//! background task. The job id doubles as the request correlation id, so job
//! logs and outbound calls made by the job carry it.

use std::future::Future;

use crate::context::{ContextGuard, ContextStore, IdentifierContext};
use crate::correlation_id::CorrelationId;

/// Scoped binding of job metadata.
///
/// # Examples
/// ```
/// use tracelink_core::{ContextStore, JobScope};
///
/// {
///     let _scope = JobScope::enter(Some("sync_users"), Some("job-1"), Some(1));
///     assert_eq!(ContextStore::job_id().unwrap().as_str(), "job-1");
///     assert_eq!(ContextStore::request_id().unwrap().as_str(), "job-1");
/// }
/// assert!(ContextStore::job_id().is_none());
/// ```
#[derive(Debug)]
pub struct JobScope;

impl JobScope {
    /// Binds job name, normalized job id, and attempt; the request-id slot is
    /// set to the same normalized job id.
    ///
    /// The server id is left untouched. Dropping the guard restores every slot
    /// to its pre-entry value. Scopes nest.
    ///
    /// The guard lives in whichever slot is active, so outside a
    /// [`ContextStore::scope`] it must not be held across an `.await`. Async
    /// code uses [`JobScope::scope`].
    pub fn enter(
        job_name: Option<&str>,
        job_id: Option<&str>,
        job_attempt: Option<u32>,
    ) -> JobScopeGuard {
        JobScopeGuard {
            _guard: ContextStore::bind(job_context(job_name, job_id, job_attempt)),
        }
    }

    /// Runs `fut` in its own task-local slot holding the job metadata on top
    /// of the caller's context.
    pub fn scope<Fut>(
        job_name: Option<&str>,
        job_id: Option<&str>,
        job_attempt: Option<u32>,
        fut: Fut,
    ) -> impl Future<Output = Fut::Output>
    where
        Fut: Future,
    {
        ContextStore::scope(job_context(job_name, job_id, job_attempt), fut)
    }
}

fn job_context(
    job_name: Option<&str>,
    job_id: Option<&str>,
    job_attempt: Option<u32>,
) -> IdentifierContext {
    let job_id = CorrelationId::normalize_job_id(job_id);
    IdentifierContext {
        request_id: job_id.clone(),
        job_id,
        job_name: job_name.map(str::to_owned),
        job_attempt,
        ..IdentifierContext::current()
    }
}

/// Releases a [`JobScope`] on drop.
#[must_use = "the job scope ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct JobScopeGuard {
    _guard: ContextGuard,
}
