//! Custom error types for Salvor.
//!
//! This module provides structured error types that enable better
//! error handling, reporting, and recovery throughout the application.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Salvor operations
#[derive(Error, Debug)]
pub enum SalvorError {
    // =========================================================================
    // Task Record Store Errors
    // =========================================================================
    /// A record, field, branch, or stash entry was not found
    #[error("Not found: {kind} '{name}'")]
    NotFound { kind: String, name: String },

    /// A record with the given id already exists
    #[error("Task record already exists: {id}")]
    AlreadyExists { id: String },

    /// Malformed input to a constructor or field write
    #[error("Invalid argument: {field} - {reason}")]
    InvalidArgument { field: String, reason: String },

    /// A record failed integrity checks before use
    #[error("Record validation failed for '{id}': {reason}")]
    ValidationFailed { id: String, reason: String },

    // =========================================================================
    // Recovery Execution Errors
    // =========================================================================
    /// An executor action's effect did not hold after execution
    #[error("Post-condition failed for '{action}': expected {expected}, observed {observed}")]
    PostconditionFailed {
        action: String,
        expected: String,
        observed: String,
    },

    /// Git operation failed
    #[error("Git operation failed: {operation} - {message}")]
    Git { operation: String, message: String },

    /// Review host (gh CLI) operation failed
    #[error("Review host operation failed: {operation} - {message}")]
    ReviewHost { operation: String, message: String },

    // =========================================================================
    // Reporting Errors
    // =========================================================================
    /// The version-control subsystem is unreachable
    #[error("Repository unavailable: {reason}")]
    RepositoryUnavailable { reason: String },

    /// The session pointer names no active task, or a task with no record
    #[error("No active task: {reason}")]
    NoActiveTask { reason: String },

    /// Missing required file
    #[error("Missing required file: {path}")]
    MissingFile { path: PathBuf },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SalvorError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a not-found error for a task record
    pub fn record_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "task record".to_string(),
            name: id.into(),
        }
    }

    /// Create a not-found error for a record field
    pub fn field_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "field".to_string(),
            name: name.into(),
        }
    }

    /// Create a not-found error for a branch
    pub fn branch_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "branch".to_string(),
            name: name.into(),
        }
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a validation failure
    pub fn validation(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a post-condition failure with full context
    pub fn postcondition(
        action: impl Into<String>,
        expected: impl Into<String>,
        observed: impl Into<String>,
    ) -> Self {
        Self::PostconditionFailed {
            action: action.into(),
            expected: expected.into(),
            observed: observed.into(),
        }
    }

    /// Create a git error
    pub fn git(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Git {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a review host error
    pub fn review_host(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReviewHost {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a repository-unavailable error
    pub fn repository_unavailable(reason: impl Into<String>) -> Self {
        Self::RepositoryUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a no-active-task error
    pub fn no_active_task(reason: impl Into<String>) -> Self {
        Self::NoActiveTask {
            reason: reason.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is recoverable (caller can choose another path)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::AlreadyExists { .. } | Self::Git { .. }
        )
    }

    /// Check if this error is a caller bug that should never be retried
    pub fn is_caller_bug(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Check if this error is fatal to the current recovery attempt
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PostconditionFailed { .. }
                | Self::RepositoryUnavailable { .. }
                | Self::ValidationFailed { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PostconditionFailed { .. } => 2,
            Self::RepositoryUnavailable { .. } => 3,
            Self::NoActiveTask { .. } => 4,
            Self::ValidationFailed { .. } => 5,
            Self::NotFound { .. } | Self::MissingFile { .. } => 6,
            Self::InvalidArgument { .. } | Self::AlreadyExists { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for Salvor results
pub type Result<T> = std::result::Result<T, SalvorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SalvorError::postcondition("reset_to_commit", "abc123", "def456");
        assert!(err.to_string().contains("reset_to_commit"));
        assert!(err.to_string().contains("abc123"));
        assert!(err.to_string().contains("def456"));
    }

    #[test]
    fn test_not_found_display() {
        let err = SalvorError::record_not_found("task-42");
        assert!(err.to_string().contains("task record"));
        assert!(err.to_string().contains("task-42"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(SalvorError::record_not_found("t").is_recoverable());
        assert!(SalvorError::git("status", "boom").is_recoverable());
        assert!(!SalvorError::postcondition("a", "e", "o").is_recoverable());
    }

    #[test]
    fn test_is_fatal() {
        assert!(SalvorError::postcondition("a", "e", "o").is_fatal());
        assert!(SalvorError::repository_unavailable("no git").is_fatal());
        assert!(!SalvorError::branch_not_found("b").is_fatal());
    }

    #[test]
    fn test_is_caller_bug() {
        assert!(SalvorError::invalid_argument("prompt", "empty").is_caller_bug());
        assert!(!SalvorError::record_not_found("t").is_caller_bug());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(SalvorError::postcondition("a", "e", "o").exit_code(), 2);
        assert_eq!(SalvorError::repository_unavailable("x").exit_code(), 3);
        assert_eq!(SalvorError::no_active_task("none").exit_code(), 4);
        assert_eq!(SalvorError::invalid_argument("f", "r").exit_code(), 7);
    }

    #[test]
    fn test_constructor_helpers() {
        let err = SalvorError::invalid_argument("model", "must not be empty");
        if let SalvorError::InvalidArgument { field, reason } = err {
            assert_eq!(field, "model");
            assert_eq!(reason, "must not be empty");
        } else {
            panic!("Wrong error variant");
        }
    }

    #[test]
    fn test_git_error() {
        let err = SalvorError::git("rebase", "merge conflict");
        if let SalvorError::Git { operation, message } = err {
            assert_eq!(operation, "rebase");
            assert_eq!(message, "merge conflict");
        } else {
            panic!("Wrong error variant");
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: SalvorError = io_err.into();
        assert!(matches!(err, SalvorError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }
}
