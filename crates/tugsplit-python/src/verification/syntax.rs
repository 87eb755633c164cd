//! Syntax stage: every emitted Python file must parse.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use tugsplit_core::types::EmittedFile;

use super::{Findings, StageStatus};
use crate::parse::ParsedModule;

/// Parse result for one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSyntaxCheck {
    pub file: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Syntax stage results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntaxResults {
    pub status: StageStatus,
    pub files: Vec<FileSyntaxCheck>,
}

/// Re-parse each emitted `.py` file from disk.
pub fn check_syntax(output_dir: &Path, files: &[EmittedFile], findings: &mut Findings) -> SyntaxResults {
    let mut checks = Vec::new();
    for file in files.iter().filter(|f| f.path.ends_with(".py")) {
        let error = match fs::read_to_string(output_dir.join(&file.path)) {
            Ok(text) => ParsedModule::parse(text).err().map(|e| e.to_string()),
            Err(e) => Some(format!("cannot read file: {}", e)),
        };
        if let Some(ref message) = error {
            findings
                .errors
                .push(format!("Syntax error in {}: {}", file.path, message));
        }
        debug!("Syntax check {}: {}", file.path, if error.is_none() { "ok" } else { "failed" });
        checks.push(FileSyntaxCheck {
            file: file.path.clone(),
            valid: error.is_none(),
            error,
        });
    }

    let status = if checks.iter().all(|c| c.valid) {
        StageStatus::Passed
    } else {
        StageStatus::Failed
    };
    SyntaxResults {
        status,
        files: checks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tugsplit_core::types::FileRole;

    fn write(dir: &Path, path: &str, content: &str) -> EmittedFile {
        let full = dir.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(&full, content).unwrap();
        EmittedFile::new(path, FileRole::Unit, content)
    }

    #[test]
    fn valid_files_pass() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            write(dir.path(), "pkg/A.py", "class A:\n    pass\n"),
            write(dir.path(), "pkg/__init__.py", "from .A import A\n"),
        ];
        let mut findings = Findings::default();
        let results = check_syntax(dir.path(), &files, &mut findings);
        assert_eq!(results.status, StageStatus::Passed);
        assert_eq!(results.files.len(), 2);
        assert!(findings.errors.is_empty());
    }

    #[test]
    fn broken_file_is_keyed_by_name() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            write(dir.path(), "pkg/A.py", "class A:\n    pass\n"),
            write(dir.path(), "pkg/B.py", "class B(:\n    pass\n"),
        ];
        let mut findings = Findings::default();
        let results = check_syntax(dir.path(), &files, &mut findings);
        assert_eq!(results.status, StageStatus::Failed);
        assert!(!results.files[1].valid);
        assert_eq!(findings.errors.len(), 1);
        assert!(findings.errors[0].starts_with("Syntax error in pkg/B.py"));
    }

    #[test]
    fn body_without_indentation_fails() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            write(dir.path(), "pkg/functions.py", "def f():\n"),
            write(dir.path(), "pkg/main.py", "return 1\n"),
        ];
        let mut findings = Findings::default();
        let results = check_syntax(dir.path(), &files, &mut findings);
        assert_eq!(results.status, StageStatus::Failed);
        assert!(results.files.iter().all(|f| !f.valid));
        assert_eq!(findings.errors.len(), 2);
    }

    #[test]
    fn missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let files = vec![EmittedFile::new("pkg/gone.py", FileRole::Unit, "")];
        let mut findings = Findings::default();
        let results = check_syntax(dir.path(), &files, &mut findings);
        assert_eq!(results.status, StageStatus::Failed);
        assert!(findings.errors[0].contains("cannot read file"));
    }
}
