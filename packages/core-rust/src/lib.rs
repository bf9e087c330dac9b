//! `tracelink` core: correlation identifiers, task-local identifier context,
//! job scopes, and structured JSON log rendering.

pub mod context;
pub mod correlation_id;
pub mod event;
pub mod format;
pub mod job_scope;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use context::{ContextGuard, ContextStore, ContextToken, IdentifierContext};
pub use correlation_id::CorrelationId;
pub use event::LogEvent;
pub use format::{JobJsonFormatter, JsonLines, LogFormat, LogFormatter, RequestJsonFormatter};
pub use job_scope::{JobScope, JobScopeGuard};
