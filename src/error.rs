//! Error types for taskpipe
//!
//! Centralized error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

/// All error types that can occur while scheduling or awaiting tasks
#[derive(Debug, Error)]
pub enum TaskError {
    /// Executor refused the work because its capacity is exhausted
    #[error("Rejected by {executor}: capacity {capacity} exceeded")]
    Rejected { executor: String, capacity: usize },

    /// Task was cancelled (explicitly, by its owner, or because its body failed)
    #[error("Task cancelled")]
    Cancelled,

    /// Blocking result access gave up before the task settled
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Interruptible wait inside a worker body was cut short by cancellation
    #[error("Interrupted")]
    Interrupted,

    /// IO error (worker pool or owner thread startup)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskError {
    /// Check if this error means the task will never produce a value
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TaskError::Cancelled | TaskError::Interrupted)
    }
}

/// Result type alias for taskpipe operations
pub type Result<T> = std::result::Result<T, TaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_error() {
        let err = TaskError::Rejected {
            executor: "io".to_string(),
            capacity: 512,
        };
        assert_eq!(err.to_string(), "Rejected by io: capacity 512 exceeded");
    }

    #[test]
    fn test_cancelled_error() {
        assert_eq!(TaskError::Cancelled.to_string(), "Task cancelled");
    }

    #[test]
    fn test_timeout_error() {
        let err = TaskError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "Timed out after 250ms");
    }

    #[test]
    fn test_is_cancellation() {
        assert!(TaskError::Cancelled.is_cancellation());
        assert!(TaskError::Interrupted.is_cancellation());
        assert!(!TaskError::Timeout(Duration::from_secs(1)).is_cancellation());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::other("thread spawn failed");
        let err: TaskError = io_err.into();
        assert!(matches!(err, TaskError::Io(_)));
        assert!(err.to_string().contains("thread spawn failed"));
    }

    #[test]
    fn test_converts_into_eyre_report() {
        fn body() -> eyre::Result<()> {
            Err(TaskError::Interrupted)?;
            Ok(())
        }

        let report = body().unwrap_err();
        assert!(report.downcast_ref::<TaskError>().is_some());
    }
}
