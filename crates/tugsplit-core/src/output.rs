//! JSON output envelope for CLI responses.
//!
//! ## Design Principles
//!
//! 1. **Structured JSON:** All CLI output on stdout is a single JSON document
//! 2. **Status first:** Every response has `status` as first field
//! 3. **Deterministic:** Same input -> same output (field order, array ordering)
//! 4. **Versioned:** Schema version in response enables forward compatibility

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::{OutputErrorCode, SplitError};

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

/// Error details for the error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error kind (e.g. `MalformedSource`).
    pub code: String,
    /// Numeric exit code.
    pub exit_code: u8,
    /// Human-readable message.
    pub message: String,
    /// File the error is attributed to, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl ErrorInfo {
    /// Build error details from a `SplitError`.
    pub fn from_error(err: &SplitError) -> Self {
        let file = match err {
            SplitError::FileNotFound { path } => Some(path.clone()),
            SplitError::MalformedSource { path, .. } => Some(path.clone()),
            SplitError::InvalidConfig { path, .. } => Some(path.clone()),
            SplitError::EmitError { file, .. } => file.clone(),
            _ => None,
        };
        ErrorInfo {
            code: err.error_kind().to_string(),
            exit_code: OutputErrorCode::from(err).code(),
            message: err.to_string(),
            file,
        }
    }
}

/// Error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub schema_version: String,
    pub error: ErrorInfo,
}

impl ErrorResponse {
    pub fn new(err: &SplitError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

/// Current UTC time as an ISO 8601 timestamp with second precision.
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Emit a response as pretty-printed JSON to a writer.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================
