//! CLI front door.
//!
//! `main.rs` parses flags and installs logging; everything that touches the
//! filesystem or produces the JSON response lives here so it can be tested
//! without spawning the binary.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::info;
use tugsplit_core::error::{OutputErrorCode, SplitError};
use tugsplit_core::output::SCHEMA_VERSION;
use tugsplit_core::types::EmittedFile;
use tugsplit_python::{prepare_split, ImportCheckMode, SplitOptions, ValidationReport};

/// Suffix appended to the input path for the backup copy.
pub const BACKUP_SUFFIX: &str = ".backup";

/// Inputs of one `tugsplit` invocation, already parsed.
#[derive(Debug, Clone)]
pub struct SplitRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub config: Option<PathBuf>,
    pub doc: bool,
    pub import_check: ImportCheckMode,
    pub python: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub backup: bool,
}

impl SplitRequest {
    /// Defaults matching the CLI flags.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        SplitRequest {
            input: input.into(),
            output: PathBuf::from("output"),
            config: None,
            doc: false,
            import_check: ImportCheckMode::default(),
            python: None,
            timeout: None,
            backup: true,
        }
    }

    fn options(&self) -> SplitOptions {
        let mut options = SplitOptions::new()
            .with_docs(self.doc)
            .with_import_check(self.import_check);
        if let Some(config) = &self.config {
            options = options.with_group_config(config);
        }
        if let Some(python) = &self.python {
            options = options.with_python(python);
        }
        if let Some(timeout) = self.timeout {
            options = options.with_timeout(timeout);
        }
        options
    }
}

/// Success envelope printed to stdout.
///
/// `status` is `ok` when validation passed and `failed` when it recorded
/// errors; the files are on disk either way.
#[derive(Debug, Clone, Serialize)]
pub struct SplitResponse {
    pub status: String,
    pub schema_version: String,
    pub input: String,
    pub output_dir: String,
    pub package_dir: String,
    pub interface_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_file: Option<String>,
    pub files: Vec<EmittedFile>,
    /// Declarations a group config left out of the split.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<String>,
    pub validation: ValidationReport,
}

impl SplitResponse {
    /// Process exit code for this response.
    pub fn exit_code(&self) -> u8 {
        if self.validation.success {
            0
        } else {
            OutputErrorCode::ValidationFailed.code()
        }
    }
}

/// Check and plan the split, back up the input, write, and build the response.
///
/// The backup is only taken once every fatal check has passed.
pub fn run_split(request: &SplitRequest) -> Result<SplitResponse, SplitError> {
    let prepared = prepare_split(&request.input, &request.output, &request.options())?;
    let backup = if request.backup {
        create_backup(&request.input)?
    } else {
        None
    };

    let outcome = prepared.write()?;
    info!("{}", outcome.report.summary);

    Ok(SplitResponse {
        status: if outcome.report.success { "ok" } else { "failed" }.to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        input: request.input.display().to_string(),
        output_dir: request.output.display().to_string(),
        package_dir: outcome.package_dir.display().to_string(),
        interface_file: outcome.interface_file.display().to_string(),
        backup: backup.map(|p| p.display().to_string()),
        docs_file: outcome.docs_file.map(|p| p.display().to_string()),
        files: outcome.files,
        dropped: outcome.plan.dropped,
        validation: outcome.report,
    })
}

/// Copy `input` to `<input>.backup` unless that file already exists.
///
/// Returns the path of a newly created backup, `None` when one was already
/// there.
pub fn create_backup(input: &Path) -> Result<Option<PathBuf>, SplitError> {
    let mut name = input.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    let backup = PathBuf::from(name);
    if backup.exists() {
        return Ok(None);
    }
    fs::copy(input, &backup).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => SplitError::file_not_found(input),
        _ => SplitError::emit(format!("cannot create backup: {}", e), &backup),
    })?;
    info!("Created backup {}", backup.display());
    Ok(Some(backup))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("big.py");
        fs::write(&path, content).unwrap();
        path
    }

    mod backup {
        use super::*;

        #[test]
        fn created_once() {
            let dir = TempDir::new().unwrap();
            let input = source(&dir, "class A:\n    pass\n");
            let first = create_backup(&input).unwrap();
            assert_eq!(first, Some(dir.path().join("big.py.backup")));

            fs::write(&input, "class B:\n    pass\n").unwrap();
            assert_eq!(create_backup(&input).unwrap(), None);
            assert_eq!(
                fs::read_to_string(dir.path().join("big.py.backup")).unwrap(),
                "class A:\n    pass\n"
            );
        }

        #[test]
        fn missing_input() {
            let dir = TempDir::new().unwrap();
            let err = create_backup(&dir.path().join("nope.py")).unwrap_err();
            assert_eq!(err.error_kind(), "FileNotFound");
        }
    }

    mod run {
        use super::*;

        #[test]
        fn successful_split() {
            let dir = TempDir::new().unwrap();
            let input = source(&dir, "class A:\n    pass\n\n\ndef f():\n    return A()\n");
            let mut request = SplitRequest::new(&input);
            request.output = dir.path().join("out");

            let response = run_split(&request).unwrap();
            assert_eq!(response.status, "ok");
            assert_eq!(response.exit_code(), 0);
            assert!(response.backup.is_some());
            assert!(response.files.iter().any(|f| f.path == "big/functions.py"));
        }

        #[test]
        fn failed_validation_exits_five() {
            let dir = TempDir::new().unwrap();
            let input = source(&dir, "class A:\n    pass\n\n\nclass B:\n    pass\n");
            let config = dir.path().join("groups.json");
            fs::write(&config, r#"{"modules": {"core": {"classes": ["A"]}}}"#).unwrap();
            let mut request = SplitRequest::new(&input);
            request.output = dir.path().join("out");
            request.config = Some(config);
            request.backup = false;

            let response = run_split(&request).unwrap();
            assert_eq!(response.status, "failed");
            assert_eq!(response.exit_code(), 5);
            assert_eq!(response.dropped, vec!["B"]);
            assert!(response.backup.is_none());
            assert!(!dir.path().join("big.py.backup").exists());
        }

        #[test]
        fn malformed_input_leaves_no_backup() {
            let dir = TempDir::new().unwrap();
            let input = source(&dir, "class A:\n    pass\n\ndef f():\nreturn 1\n");
            let mut request = SplitRequest::new(&input);
            request.output = dir.path().join("out");

            let err = run_split(&request).unwrap_err();
            assert_eq!(err.error_kind(), "MalformedSource");
            assert!(!dir.path().join("big.py.backup").exists());
            assert!(!dir.path().join("out").exists());
        }

        #[test]
        fn bad_config_leaves_no_backup() {
            let dir = TempDir::new().unwrap();
            let input = source(&dir, "class A:\n    pass\n");
            let config = dir.path().join("groups.json");
            fs::write(&config, "not json").unwrap();
            let mut request = SplitRequest::new(&input);
            request.output = dir.path().join("out");
            request.config = Some(config);

            assert_eq!(run_split(&request).unwrap_err().error_kind(), "InvalidConfig");
            assert!(!dir.path().join("big.py.backup").exists());
        }
    }
}
