//! Error types and error code constants for tugsplit.
//!
//! This module provides a unified error type (`SplitError`) that bridges
//! domain-specific errors from the different pipeline stages (parsing,
//! configuration, planning, emission) into a common format suitable for
//! JSON output.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments or invalid grouping configuration
//! - `3`: Source errors (input file missing, malformed source)
//! - `4`: Emission errors (plan conflicts, failed writes)
//! - `5`: Validation failed (the split ran but the report has errors)
//! - `10`: Internal errors (bugs, unexpected state)
//!
//! ## Design
//!
//! - **Unified type**: `SplitError` is the single error type for CLI output
//! - **Bridging**: `impl From<X> for SplitError` lives next to each domain error
//! - **Code mapping**: `OutputErrorCode` provides stable integer codes

use std::fmt;
use std::io;
use std::path::Path;

use thiserror::Error;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output and process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller (bad flags, malformed grouping config).
    InvalidArguments = 2,
    /// The input source could not be read or parsed.
    SourceError = 3,
    /// Output could not be planned or written.
    EmitError = 4,
    /// The split completed but validation reported errors.
    ValidationFailed = 5,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
///
/// Every variant aborts the run. Recoverable problems found after emission
/// are not errors of this type; they are collected in the validation report.
#[derive(Debug, Error)]
pub enum SplitError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// Input file not found.
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// The input source is not valid Python.
    #[error("syntax error in {path} at {line}:{col}: {message}")]
    MalformedSource {
        path: String,
        line: u32,
        col: u32,
        message: String,
    },

    /// The grouping configuration is unreadable or malformed.
    #[error("invalid config {path}: {message}")]
    InvalidConfig { path: String, message: String },

    /// Two outputs would collide, or the declarations cannot be laid out.
    #[error("plan conflict: {message}")]
    PlanConflict { message: String },

    /// Writing the output layout failed.
    #[error("emit error: {message}")]
    EmitError {
        message: String,
        file: Option<String>,
    },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&SplitError> for OutputErrorCode {
    fn from(err: &SplitError) -> Self {
        match err {
            SplitError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            SplitError::InvalidConfig { .. } => OutputErrorCode::InvalidArguments,
            SplitError::FileNotFound { .. } => OutputErrorCode::SourceError,
            SplitError::MalformedSource { .. } => OutputErrorCode::SourceError,
            SplitError::PlanConflict { .. } => OutputErrorCode::EmitError,
            SplitError::EmitError { .. } => OutputErrorCode::EmitError,
            SplitError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<SplitError> for OutputErrorCode {
    fn from(err: SplitError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl SplitError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        SplitError::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl AsRef<Path>) -> Self {
        SplitError::FileNotFound {
            path: path.as_ref().display().to_string(),
        }
    }

    /// Create an emit error attributed to a file.
    pub fn emit(message: impl Into<String>, file: impl AsRef<Path>) -> Self {
        SplitError::EmitError {
            message: message.into(),
            file: Some(file.as_ref().display().to_string()),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        SplitError::InternalError {
            message: message.into(),
        }
    }

    /// Stable string code used in the JSON error envelope.
    pub fn error_kind(&self) -> &'static str {
        match self {
            SplitError::InvalidArguments { .. } => "InvalidArguments",
            SplitError::FileNotFound { .. } => "FileNotFound",
            SplitError::MalformedSource { .. } => "MalformedSource",
            SplitError::InvalidConfig { .. } => "InvalidConfig",
            SplitError::PlanConflict { .. } => "PlanConflict",
            SplitError::EmitError { .. } => "EmitError",
            SplitError::InternalError { .. } => "InternalError",
        }
    }
}

impl From<io::Error> for SplitError {
    fn from(err: io::Error) -> Self {
        SplitError::EmitError {
            message: format!("IO error: {}", err),
            file: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod code_mapping {
        use super::*;

        #[test]
        fn config_errors_are_invalid_arguments() {
            let err = SplitError::InvalidConfig {
                path: "groups.json".to_string(),
                message: "missing field `modules`".to_string(),
            };
            assert_eq!(OutputErrorCode::from(&err), OutputErrorCode::InvalidArguments);
            assert_eq!(OutputErrorCode::from(&err).code(), 2);
        }

        #[test]
        fn malformed_source_is_source_error() {
            let err = SplitError::MalformedSource {
                path: "big.py".to_string(),
                line: 3,
                col: 7,
                message: "unexpected token".to_string(),
            };
            assert_eq!(OutputErrorCode::from(err).code(), 3);
        }

        #[test]
        fn plan_conflicts_and_writes_are_emit_errors() {
            let conflict = SplitError::PlanConflict {
                message: "duplicate unit".to_string(),
            };
            let write = SplitError::emit("disk full", "out/a.py");
            assert_eq!(OutputErrorCode::from(&conflict).code(), 4);
            assert_eq!(OutputErrorCode::from(&write).code(), 4);
        }

        #[test]
        fn internal_error_code() {
            assert_eq!(OutputErrorCode::from(SplitError::internal("bug")).code(), 10);
        }
    }

    mod display {
        use super::*;

        #[test]
        fn malformed_source_mentions_position() {
            let err = SplitError::MalformedSource {
                path: "big.py".to_string(),
                line: 3,
                col: 7,
                message: "unexpected token".to_string(),
            };
            assert_eq!(
                err.to_string(),
                "syntax error in big.py at 3:7: unexpected token"
            );
        }

        #[test]
        fn io_errors_become_emit_errors() {
            let err: SplitError = io::Error::new(io::ErrorKind::Other, "boom").into();
            assert_eq!(err.error_kind(), "EmitError");
            assert!(err.to_string().contains("boom"));
        }
    }
}
