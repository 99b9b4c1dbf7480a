// Domain errors - Error taxonomy for edit requests and their execution

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable failure kind carried by every failed request.
///
/// Callers branch on this, never on the accompanying message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RangeError,
    ParameterError,
    ConflictError,
    ProcessLaunchFailed,
    NonZeroExit,
    Unsupported,
    IntegrityError,
    TimeoutError,
}

impl ErrorKind {
    /// Whether this failure happened before any execution started
    pub fn is_validation(&self) -> bool {
        matches!(self, ErrorKind::RangeError | ErrorKind::ParameterError)
    }

    /// Whether this failure originated in the media backend
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            ErrorKind::ProcessLaunchFailed | ErrorKind::NonZeroExit | ErrorKind::Unsupported
        )
    }

    /// Stable identifier used in logs and JSON output
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RangeError => "range_error",
            ErrorKind::ParameterError => "parameter_error",
            ErrorKind::ConflictError => "conflict_error",
            ErrorKind::ProcessLaunchFailed => "process_launch_failed",
            ErrorKind::NonZeroExit => "non_zero_exit",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::IntegrityError => "integrity_error",
            ErrorKind::TimeoutError => "timeout_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejection of a request before any plan is built
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Trim boundaries are inverted, negative or past the end of the source
    #[error("Invalid trim range: {0}")]
    Range(String),

    /// Export parameters or paths are unusable
    #[error("Invalid parameter: {0}")]
    Parameter(String),
}

impl ValidationError {
    pub fn range(message: impl Into<String>) -> Self {
        Self::Range(message.into())
    }

    pub fn parameter(message: impl Into<String>) -> Self {
        Self::Parameter(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::Range(_) => ErrorKind::RangeError,
            ValidationError::Parameter(_) => ErrorKind::ParameterError,
        }
    }
}

/// Failures reported by the media backend (ffmpeg/ffprobe or libav)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The backend process could not be started
    #[error("Failed to launch media backend: {0}")]
    ProcessLaunchFailed(String),

    /// The backend ran and exited unsuccessfully
    #[error("Media backend exited with {}: {diagnostics}", exit_code_label(.code))]
    NonZeroExit {
        code: Option<i32>,
        diagnostics: String,
    },

    /// The requested operation cannot be carried out on this media
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::ProcessLaunchFailed(_) => ErrorKind::ProcessLaunchFailed,
            BackendError::NonZeroExit { .. } => ErrorKind::NonZeroExit,
            BackendError::Unsupported(_) => ErrorKind::Unsupported,
        }
    }
}

/// Domain-level error covering every failure mode of an edit request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Another request is already writing to the same output path
    #[error("Output path is already being written by request {active}: {}", .output.display())]
    Conflict { output: PathBuf, active: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The backend reported success but the output cannot be read back
    #[error("Output failed integrity check: {0}")]
    Integrity(String),

    /// The request exceeded its maximum duration
    #[error("Operation timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(e) => e.kind(),
            DomainError::Conflict { .. } => ErrorKind::ConflictError,
            DomainError::Backend(e) => e.kind(),
            DomainError::Integrity(_) => ErrorKind::IntegrityError,
            DomainError::Timeout(_) => ErrorKind::TimeoutError,
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    pub fn launch_failed(message: impl Into<String>) -> Self {
        Self::Backend(BackendError::ProcessLaunchFailed(message.into()))
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Backend(BackendError::Unsupported(message.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_follow_variants() {
        assert_eq!(
            DomainError::from(ValidationError::range("start after end")).kind(),
            ErrorKind::RangeError
        );
        assert_eq!(
            DomainError::from(ValidationError::parameter("width")).kind(),
            ErrorKind::ParameterError
        );
        assert_eq!(
            DomainError::Timeout(Duration::from_secs(3)).kind(),
            ErrorKind::TimeoutError
        );
        assert_eq!(
            DomainError::unsupported("no copy").kind(),
            ErrorKind::Unsupported
        );
        assert!(ErrorKind::RangeError.is_validation());
        assert!(ErrorKind::NonZeroExit.is_backend());
        assert!(!ErrorKind::IntegrityError.is_backend());
    }

    #[test]
    fn test_messages_are_human_readable() {
        let err = BackendError::NonZeroExit {
            code: Some(1),
            diagnostics: "Invalid data found when processing input".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Media backend exited with status 1: Invalid data found when processing input"
        );

        let err = DomainError::Timeout(Duration::from_millis(2500));
        assert_eq!(err.to_string(), "Operation timed out after 2.5s");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::IntegrityError).unwrap();
        assert_eq!(json, "\"integrity_error\"");
        assert_eq!(ErrorKind::ConflictError.to_string(), "conflict_error");
    }
}
