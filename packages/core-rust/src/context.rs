//! Task-local identifier context.
//!
//! Each logical unit of work (one HTTP request, one job execution) owns an
//! [`IdentifierContext`]. [`ContextStore::scope`] gives a future its own
//! task-local slot, so concurrent units multiplexed on a shared worker pool
//! never observe each other's identifiers. Inside a slot, [`ContextStore::set`]
//! and [`ContextStore::reset`] swap values in LIFO order, and
//! [`ContextStore::bind`] ties the reset to a guard's `Drop`.
//!
//! Tokio task-local variables are not inherited across spawned tasks. Use
//! [`ContextStore::propagate`] when spawning new tasks so the active
//! identifiers follow the work.
//!
//! Outside any task-local scope the store falls back to the calling thread's
//! slot, which serves synchronous callers only: async tasks sharing a worker
//! thread also share that slot. Binding into it from inside a tokio runtime
//! logs a warning once per thread.

use std::cell::{Cell, RefCell};
use std::future::Future;

use crate::correlation_id::CorrelationId;

tokio::task_local! {
    static TASK_CONTEXT: RefCell<IdentifierContext>;
}

thread_local! {
    static THREAD_CONTEXT: RefCell<IdentifierContext> = RefCell::new(IdentifierContext::default());
    static RUNTIME_WRITE_WARNED: Cell<bool> = const { Cell::new(false) };
}

/// Identifiers and job metadata bound to the current unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierContext {
    /// Correlation id of the request (or of the job, inside a job scope).
    pub request_id: Option<CorrelationId>,
    /// Identity of the serving process instance.
    pub server_id: Option<CorrelationId>,
    /// Identifier of the executing background job.
    pub job_id: Option<CorrelationId>,
    /// Declared name of the executing background job.
    pub job_name: Option<String>,
    /// Attempt number of the executing background job.
    pub job_attempt: Option<u32>,
}

impl IdentifierContext {
    /// Context carrying only request-level identifiers.
    #[must_use]
    pub fn for_request(request_id: Option<CorrelationId>, server_id: Option<CorrelationId>) -> Self {
        Self {
            request_id,
            server_id,
            ..Self::default()
        }
    }

    /// Returns a copy of the context active for the caller.
    #[must_use]
    pub fn current() -> Self {
        with_slot(|slot| slot.borrow().clone())
    }

    /// The id outbound calls should carry: the request id, else the job id.
    #[must_use]
    pub fn outbound_request_id(&self) -> Option<&CorrelationId> {
        self.request_id.as_ref().or(self.job_id.as_ref())
    }
}

/// Restores the value that was active before the matching [`ContextStore::set`].
#[must_use = "dropping a token without `ContextStore::reset` leaves the context bound"]
#[derive(Debug)]
pub struct ContextToken {
    previous: IdentifierContext,
}

/// Resets the context on drop, including during unwinding and cancellation.
#[must_use = "the context is reset as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ContextGuard {
    token: Option<ContextToken>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            ContextStore::reset(token);
        }
    }
}

/// Entry points for reading and binding the active [`IdentifierContext`].
///
/// # Examples
/// ```
/// use tracelink_core::{ContextStore, CorrelationId, IdentifierContext};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let id = CorrelationId::generate();
/// let seen = ContextStore::scope(
///     IdentifierContext::for_request(Some(id.clone()), None),
///     async { ContextStore::request_id() },
/// )
/// .await;
/// assert_eq!(seen, Some(id));
/// assert!(ContextStore::request_id().is_none());
/// # });
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ContextStore;

impl ContextStore {
    /// Replaces the active context, returning a token that restores the previous one.
    ///
    /// Outside a [`ContextStore::scope`] this writes the thread slot, so it is
    /// for synchronous code only.
    pub fn set(context: IdentifierContext) -> ContextToken {
        if !in_task_scope() {
            warn_thread_slot_in_runtime();
        }
        let previous = with_slot(|slot| slot.replace(context));
        ContextToken { previous }
    }

    /// Restores the context captured by `token`.
    pub fn reset(token: ContextToken) {
        with_slot(|slot| {
            slot.replace(token.previous);
        });
    }

    /// Binds `context` until the returned guard is dropped.
    ///
    /// Synchronous only unless called inside a [`ContextStore::scope`]: a
    /// thread-slot guard held across an `.await` is visible to other tasks on
    /// the same worker thread.
    pub fn bind(context: IdentifierContext) -> ContextGuard {
        ContextGuard {
            token: Some(Self::set(context)),
        }
    }

    /// Runs `fut` with its own task-local slot initialized to `context`.
    ///
    /// The slot is released when `fut` completes or is dropped.
    pub async fn scope<Fut>(context: IdentifierContext, fut: Fut) -> Fut::Output
    where
        Fut: Future,
    {
        TASK_CONTEXT.scope(RefCell::new(context), fut).await
    }

    /// Synchronous counterpart of [`ContextStore::scope`].
    pub fn sync_scope<F, R>(context: IdentifierContext, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        TASK_CONTEXT.sync_scope(RefCell::new(context), f)
    }

    /// Wraps `fut` so it runs with a copy of the caller's current context.
    ///
    /// Use before `tokio::spawn`, since spawned tasks start without any
    /// task-local slot.
    pub fn propagate<Fut>(fut: Fut) -> impl Future<Output = Fut::Output>
    where
        Fut: Future,
    {
        Self::scope(IdentifierContext::current(), fut)
    }

    /// Active request correlation id.
    #[must_use]
    pub fn request_id() -> Option<CorrelationId> {
        with_slot(|slot| slot.borrow().request_id.clone())
    }

    /// Active server id.
    #[must_use]
    pub fn server_id() -> Option<CorrelationId> {
        with_slot(|slot| slot.borrow().server_id.clone())
    }

    /// Active job id.
    #[must_use]
    pub fn job_id() -> Option<CorrelationId> {
        with_slot(|slot| slot.borrow().job_id.clone())
    }

    /// Active job name.
    #[must_use]
    pub fn job_name() -> Option<String> {
        with_slot(|slot| slot.borrow().job_name.clone())
    }

    /// Active job attempt.
    #[must_use]
    pub fn job_attempt() -> Option<u32> {
        with_slot(|slot| slot.borrow().job_attempt)
    }
}

fn in_task_scope() -> bool {
    TASK_CONTEXT.try_with(|_| ()).is_ok()
}

fn warn_thread_slot_in_runtime() {
    if tokio::runtime::Handle::try_current().is_err() {
        return;
    }
    if RUNTIME_WRITE_WARNED.with(|warned| warned.replace(true)) {
        return;
    }
    tracing::warn!(
        "identifier context bound to the thread slot inside a tokio runtime; \
         wrap the task in ContextStore::scope"
    );
}

fn with_slot<R>(f: impl FnOnce(&RefCell<IdentifierContext>) -> R) -> R {
    if in_task_scope() {
        TASK_CONTEXT.with(f)
    } else {
        THREAD_CONTEXT.with(f)
    }
}
