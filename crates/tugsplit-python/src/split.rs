//! The split entry point.
//!
//! Extract → analyze → plan → emit → aggregate → validate. Everything that
//! can abort the run (unreadable input, malformed source, bad config, plan
//! conflicts) is checked by [`prepare_split`] before the first file is
//! written; [`PreparedSplit::write`] does the rest.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::info;
use tugsplit_core::error::SplitError;
use tugsplit_core::types::EmittedFile;

use crate::analyzer::DependencyGraph;
use crate::config::GroupConfig;
use crate::docgen::write_docs;
use crate::emit::{prune_stale_modules, render_layout, write_layout, RenderedFile};
use crate::env::resolve_python;
use crate::extract::{extract_module, ExtractedModule};
use crate::parse::ParseError;
use crate::plan::{plan_partition, PartitionPlan};
use crate::verification::{validate, ImportCheckMode, ValidationOptions, ValidationReport};

// ============================================================================
// Options
// ============================================================================

/// Options for one split run.
#[derive(Debug, Clone, Default)]
pub struct SplitOptions {
    /// Grouping config file; default mode when unset.
    pub group_config: Option<PathBuf>,
    /// Also write `DOCS.md` into the package.
    pub write_docs: bool,
    pub validation: ValidationOptions,
}

impl SplitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.group_config = Some(path.into());
        self
    }

    pub fn with_docs(mut self, enabled: bool) -> Self {
        self.write_docs = enabled;
        self
    }

    pub fn with_import_check(mut self, mode: ImportCheckMode) -> Self {
        self.validation.import_check = mode;
        self
    }

    /// Interpreter for interpreter-mode import checks.
    pub fn with_python(mut self, path: impl Into<PathBuf>) -> Self {
        self.validation.python = Some(path.into());
        self
    }

    /// Bound on the interpreter subprocess.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.validation.sandbox = self.validation.sandbox.with_timeout(timeout);
        self
    }

    /// Create validation sandboxes under `dir`.
    pub fn with_sandbox_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.validation.sandbox = self.validation.sandbox.in_dir(dir);
        self
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SplitOutcome {
    pub base_name: String,
    pub package_dir: PathBuf,
    pub interface_file: PathBuf,
    pub files: Vec<EmittedFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_file: Option<PathBuf>,
    pub plan: PartitionPlan,
    pub report: ValidationReport,
}

// ============================================================================
// Entry Points
// ============================================================================

/// Split `source_path` into a package under `output_dir` and validate it.
pub fn split(
    source_path: &Path,
    output_dir: &Path,
    group_config: Option<&Path>,
) -> Result<ValidationReport, SplitError> {
    let mut options = SplitOptions::new();
    if let Some(path) = group_config {
        options = options.with_group_config(path);
    }
    split_with_options(source_path, output_dir, &options).map(|outcome| outcome.report)
}

/// [`split`] with every option exposed.
pub fn split_with_options(
    source_path: &Path,
    output_dir: &Path,
    options: &SplitOptions,
) -> Result<SplitOutcome, SplitError> {
    prepare_split(source_path, output_dir, options)?.write()
}

/// A split that passed every fatal check and is ready to be written.
///
/// Nothing has touched the filesystem yet; dropping it abandons the run.
#[derive(Debug)]
pub struct PreparedSplit {
    source: String,
    base_name: String,
    output_dir: PathBuf,
    options: SplitOptions,
    module: ExtractedModule,
    plan: PartitionPlan,
    rendered: Vec<RenderedFile>,
}

/// Read, parse, configure, plan and render without writing anything.
pub fn prepare_split(
    source_path: &Path,
    output_dir: &Path,
    options: &SplitOptions,
) -> Result<PreparedSplit, SplitError> {
    let source = read_source(source_path)?;
    let base_name = source_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            SplitError::invalid_args(format!("cannot derive a module name from {}", source_path.display()))
        })?
        .to_string();

    let config = options
        .group_config
        .as_deref()
        .map(GroupConfig::load)
        .transpose()?;

    if options.validation.import_check == ImportCheckMode::Interpreter {
        if let Some(python) = options.validation.python.as_deref() {
            resolve_python(Some(python))?;
        }
    }

    info!("Splitting {}", source_path.display());
    let module = extract_module(&source).map_err(|e| source_error(source_path, e))?;
    let graph = DependencyGraph::analyze(&module);
    let plan = plan_partition(&module, &graph, &base_name, config.as_ref())?;
    let rendered = render_layout(&module, &plan)?;

    Ok(PreparedSplit {
        source,
        base_name,
        output_dir: output_dir.to_path_buf(),
        options: options.clone(),
        module,
        plan,
        rendered,
    })
}

impl PreparedSplit {
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    /// Write the layout, optional docs, then validate what landed on disk.
    pub fn write(self) -> Result<SplitOutcome, SplitError> {
        let PreparedSplit {
            source,
            base_name,
            output_dir,
            options,
            module,
            plan,
            rendered,
        } = self;

        prune_stale_modules(&output_dir, &base_name, &rendered)?;
        let files = write_layout(&output_dir, &rendered)?;
        let package_dir = output_dir.join(&base_name);
        let docs_file = if options.write_docs {
            Some(write_docs(&module, &package_dir, &base_name)?)
        } else {
            None
        };

        let mut report = validate(&source, &output_dir, &base_name, &files, &options.validation);
        report.prepend_warnings(&plan.warnings);

        Ok(SplitOutcome {
            interface_file: output_dir.join(format!("{}.py", base_name)),
            base_name,
            package_dir,
            files,
            docs_file,
            plan,
            report,
        })
    }
}

fn read_source(path: &Path) -> Result<String, SplitError> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => SplitError::file_not_found(path),
        _ => SplitError::invalid_args(format!("cannot read {}: {}", path.display(), e)),
    })
}

fn source_error(path: &Path, err: ParseError) -> SplitError {
    match err {
        ParseError::Syntax { line, col, message } => SplitError::MalformedSource {
            path: path.display().to_string(),
            line,
            col,
            message,
        },
        ParseError::ParserUnavailable(message) => SplitError::internal(message),
    }
}

// ============================================================================
// Tests
// ============================================================================
