//! Error types for the primitives.

use thiserror::Error;

use crate::task_id::TaskId;

/// Misuse of a lock's release operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockError {
    /// Release was called on a lock nobody holds.
    #[error("release of a lock that is not held")]
    NotLocked,

    /// Release was called by a task that does not hold the lock.
    #[error("task {caller} tried to release a lock held by task {holder}")]
    NotOwner { holder: TaskId, caller: TaskId },
}

/// Misuse of a one-shot signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignalError {
    /// A second fire on a signal configured with `FirePolicy::Reject`.
    #[error("signal has already fired")]
    AlreadyFired,
}

/// Failure of a packaged task to deliver its value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The work panicked; carries the panic message.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task was dropped without being run.
    #[error("task was dropped before it ran")]
    Abandoned,
}

/// Result type for lock release operations.
pub type LockResult<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            LockError::NotLocked.to_string(),
            "release of a lock that is not held"
        );
        assert_eq!(
            TaskError::Panicked("boom".into()).to_string(),
            "task panicked: boom"
        );
        assert_eq!(SignalError::AlreadyFired.to_string(), "signal has already fired");
    }
}
