//! Error types for sessions, classification, execution, and the queue.
//!
//! Three kinds reach the queue's per-task boundary:
//! - [`ExecutionError::KernelUnavailable`] — no session, or the session was
//!   disposed. Rendered as an error; the queue moves on.
//! - [`ExecutionError::ExecutionFault`] — a malformed error payload broke the
//!   classification contract. Rendered as an error for that task only.
//! - [`ExecutionError::Unclassified`] — anything else. Never rendered, never
//!   swallowed: it propagates to whoever drives the processing loop.

use inline_repl_types::TaskId;
use thiserror::Error;

/// Failures reported by a kernel session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session has been disposed and can no longer execute code.
    #[error("kernel is disposed")]
    Disposed,

    /// A session for another language was offered to the manager.
    #[error("expected a {expected} kernel, got {found}")]
    LanguageMismatch { expected: String, found: String },

    /// The backend reported a failure.
    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Classification contract violations.
///
/// Only raised when `is_error` claimed a chunk but extraction then failed.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("error payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("error payload failed validation: {0}")]
    Schema(String),
}

/// Errors surfaced by the streaming executor.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("no kernel available: {0}")]
    KernelUnavailable(String),

    #[error("execution fault: {0}")]
    ExecutionFault(#[from] ClassifyError),

    #[error(transparent)]
    Unclassified(SessionError),
}

impl ExecutionError {
    /// Whether the queue renders this error and carries on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::KernelUnavailable(_) | Self::ExecutionFault(_))
    }
}

impl From<SessionError> for ExecutionError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Disposed => Self::KernelUnavailable("kernel is disposed".into()),
            other => Self::Unclassified(other),
        }
    }
}

/// Admission errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("task {0} was already submitted")]
    DuplicateTask(TaskId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposed_normalizes_to_unavailable() {
        let err = ExecutionError::from(SessionError::Disposed);
        assert!(matches!(err, ExecutionError::KernelUnavailable(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_backend_error_is_unclassified() {
        let err = ExecutionError::from(SessionError::Backend("socket closed".into()));
        assert!(matches!(err, ExecutionError::Unclassified(_)));
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "backend error: socket closed");
    }

    #[test]
    fn test_fault_is_recoverable() {
        let err = ExecutionError::from(ClassifyError::Schema("missing message".into()));
        assert!(err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "execution fault: error payload failed validation: missing message"
        );
    }
}
