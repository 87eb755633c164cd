//! Validation of an emitted layout.
//!
//! Three ordered stages:
//!
//! 1. [`syntax`]: every emitted `.py` file must parse. Any failure stops the
//!    pipeline here.
//! 2. [`imports`]: the package is copied into a disposable sandbox and each
//!    module is loaded, statically or with a real interpreter.
//! 3. [`structure`]: the declarations the emitted package exposes are
//!    compared with the original file's.
//!
//! Stages 2 and 3 always both run once stage 1 passes. Problems are collected
//! as errors or warnings; only errors make the report unsuccessful.

pub mod imports;
pub mod structure;
pub mod syntax;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;
use tugsplit_core::output::timestamp_now;
use tugsplit_core::sandbox::SandboxConfig;
use tugsplit_core::types::EmittedFile;

pub use imports::{ImportCheckMode, ImportResults, ModuleImportCheck, ModuleOutcome};
pub use structure::StructuralResults;
pub use syntax::{FileSyntaxCheck, SyntaxResults};

// ============================================================================
// Types
// ============================================================================

/// Outcome of one validation stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// No errors (warnings allowed).
    #[default]
    Passed,
    /// At least one error.
    Failed,
}

impl StageStatus {
    fn from_error_count(before: usize, after: usize) -> Self {
        if after > before {
            StageStatus::Failed
        } else {
            StageStatus::Passed
        }
    }
}

/// Errors and warnings collected across stages.
#[derive(Debug, Clone, Default)]
pub struct Findings {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Knobs for the validation pipeline.
#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    pub import_check: ImportCheckMode,
    /// Interpreter for [`ImportCheckMode::Interpreter`]; discovered when unset.
    pub python: Option<PathBuf>,
    pub sandbox: SandboxConfig,
}

/// Result of validating one split.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// True when no stage recorded an error.
    pub success: bool,
    pub summary: String,
    pub timestamp: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub syntax_results: SyntaxResults,
    /// `None` when the syntax stage failed.
    pub import_results: Option<ImportResults>,
    /// `None` when the syntax stage failed.
    pub structural_results: Option<StructuralResults>,
}

impl ValidationReport {
    /// Put earlier warnings (from planning) ahead of the stage warnings.
    pub fn prepend_warnings(&mut self, warnings: &[String]) {
        if warnings.is_empty() {
            return;
        }
        let mut merged = warnings.to_vec();
        merged.append(&mut self.warnings);
        self.warnings = merged;
        self.summary = self.summarize();
    }

    fn summarize(&self) -> String {
        if self.syntax_results.status == StageStatus::Failed {
            return format!(
                "Validation stopped: {} emitted file(s) failed to parse",
                self.syntax_results.files.iter().filter(|f| !f.valid).count()
            );
        }
        if self.success {
            format!(
                "Split validated: {} file(s) checked, {} warning(s)",
                self.syntax_results.files.len(),
                self.warnings.len()
            )
        } else {
            format!(
                "Validation failed: {} error(s), {} warning(s)",
                self.errors.len(),
                self.warnings.len()
            )
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Run every stage over the layout written under `output_dir`.
///
/// `original_source` is the text of the input file; `files` is the emitted
/// manifest, relative to `output_dir`.
pub fn validate(
    original_source: &str,
    output_dir: &Path,
    base_name: &str,
    files: &[EmittedFile],
    options: &ValidationOptions,
) -> ValidationReport {
    let mut findings = Findings::default();
    let package_dir = output_dir.join(base_name);
    let package_files = package_files(files, base_name);

    info!("Validation: syntax stage");
    let syntax_results = syntax::check_syntax(output_dir, files, &mut findings);

    let (import_results, structural_results) = if syntax_results.status == StageStatus::Failed {
        (None, None)
    } else {
        info!("Validation: import stage");
        let before = findings.errors.len();
        let mut import_results = imports::check_imports(&package_dir, base_name, &package_files, options, &mut findings);
        import_results.status = StageStatus::from_error_count(before, findings.errors.len());

        info!("Validation: structural stage");
        let before = findings.errors.len();
        let mut structural_results = structure::check_structure(
            original_source,
            &package_dir,
            base_name,
            &package_files,
            &mut findings,
        );
        structural_results.status = StageStatus::from_error_count(before, findings.errors.len());

        (Some(import_results), Some(structural_results))
    };

    let mut report = ValidationReport {
        success: findings.errors.is_empty(),
        summary: String::new(),
        timestamp: timestamp_now(),
        errors: findings.errors,
        warnings: findings.warnings,
        syntax_results,
        import_results,
        structural_results,
    };
    report.summary = report.summarize();
    info!("{}", report.summary);
    report
}

/// Manifest paths inside the package directory, relative to it.
fn package_files(files: &[EmittedFile], base_name: &str) -> Vec<String> {
    let prefix = format!("{}/", base_name);
    files
        .iter()
        .filter_map(|f| f.path.strip_prefix(&prefix))
        .map(str::to_string)
        .collect()
}
