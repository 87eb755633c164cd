//! Import stage: load the emitted package in isolation.
//!
//! The package is copied into a [`SandboxHandle`]. Imports that climb above
//! the package (`from ..x import y`) cannot resolve there, so each one is
//! replaced by `pass` with the original text kept as a comment, and a warning
//! is recorded. The copy is then loaded module by module, `__init__` first:
//!
//! - **Static** (default): a [`ModuleRegistry`] owned by this stage simulates
//!   the loader. Each module's import-time code is scanned; relative imports
//!   are followed recursively with cycle detection, imported names must be
//!   bound in their target, and names read at import time must be bound or
//!   builtin.
//! - **Interpreter**: a helper script imports each module with a real Python
//!   interpreter in a subprocess and reports one JSON line per module.
//!
//! Failures mentioning a relative import are warnings; every other failure
//! is an error. The sandbox, and the registry with it, is gone when
//! [`check_imports`] returns.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tugsplit_core::sandbox::SandboxHandle;
use tugsplit_core::text::indentation;

use super::{Findings, StageStatus, ValidationOptions};
use crate::env::resolve_python;
use crate::names::{is_python_builtin, parse_import, scan_import_time, ImportSite, ImportSpec, NameRead};
use crate::parse::{end_line, start_line, ParsedModule};

// ============================================================================
// Types
// ============================================================================

/// How modules are loaded during the import stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportCheckMode {
    /// Simulated loader over the parsed sandbox copy.
    #[default]
    Static,
    /// A real Python interpreter in a subprocess.
    Interpreter,
}

impl fmt::Display for ImportCheckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportCheckMode::Static => write!(f, "static"),
            ImportCheckMode::Interpreter => write!(f, "interpreter"),
        }
    }
}

impl FromStr for ImportCheckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(ImportCheckMode::Static),
            "interpreter" => Ok(ImportCheckMode::Interpreter),
            other => Err(format!(
                "unknown import check mode '{}' (expected 'static' or 'interpreter')",
                other
            )),
        }
    }
}

/// How loading one module went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleOutcome {
    Imported,
    /// Failed for an expected reason (a relative import).
    Warned,
    Failed,
}

/// Load result for one module of the package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleImportCheck {
    /// File name inside the package, e.g. `Widget.py`.
    pub file: String,
    pub outcome: ModuleOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// An import statement disabled in the sandbox copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisabledImport {
    pub file: String,
    pub line: usize,
    pub text: String,
}

/// Import stage results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResults {
    pub status: StageStatus,
    /// Mode actually used (interpreter mode may fall back to static).
    pub mode: ImportCheckMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    pub modules: Vec<ModuleImportCheck>,
    pub disabled_imports: Vec<DisabledImport>,
    /// Where the sandbox lived; it no longer exists once the stage returns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_path: Option<String>,
    pub sandbox_removed: bool,
    pub duration_ms: u64,
}

// ============================================================================
// Stage Entry Point
// ============================================================================

/// Load every module of the package at `package_dir` in a sandbox.
///
/// `package_files` names the emitted files relative to `package_dir`; other
/// files on disk are copied into the sandbox but never loaded directly.
pub fn check_imports(
    package_dir: &Path,
    package: &str,
    package_files: &[String],
    options: &ValidationOptions,
    findings: &mut Findings,
) -> ImportResults {
    let start = Instant::now();
    let mut results = ImportResults {
        status: StageStatus::Passed,
        mode: options.import_check,
        interpreter: None,
        modules: Vec::new(),
        disabled_imports: Vec::new(),
        sandbox_path: None,
        sandbox_removed: false,
        duration_ms: 0,
    };

    let sandbox = match SandboxHandle::create(package_dir, package, options.sandbox.clone()) {
        Ok(sandbox) => sandbox,
        Err(e) => {
            findings
                .errors
                .push(format!("Error setting up import test environment: {}", e));
            results.status = StageStatus::Failed;
            return results;
        }
    };
    results.sandbox_path = Some(sandbox.root().display().to_string());
    debug!("Import sandbox at {}", sandbox.root().display());

    let modules: Vec<String> = module_order(package_files);
    for file in modules.iter().map(|m| format!("{}.py", m)) {
        match disable_escaping_imports_in(&sandbox.package_dir().join(&file)) {
            Ok(disabled) => {
                for (line, text) in disabled {
                    findings.warnings.push(format!(
                        "Disabled parent-relative import in {} line {}: {}",
                        file, line, text
                    ));
                    results.disabled_imports.push(DisabledImport {
                        file: file.clone(),
                        line,
                        text,
                    });
                }
            }
            Err(e) => findings
                .warnings
                .push(format!("Could not prepare {} for isolated import: {}", file, e)),
        }
    }

    let checks = match options.import_check {
        ImportCheckMode::Static => check_static(&sandbox, package, &modules, findings),
        ImportCheckMode::Interpreter => match resolve_python(options.python.as_deref()) {
            Ok(env) => {
                results.interpreter = Some(env.interpreter.display().to_string());
                check_with_interpreter(&sandbox, package, &modules, &env.interpreter)
            }
            Err(e) => {
                warn!("No interpreter for import check, falling back to static: {}", e);
                findings.warnings.push(format!(
                    "No usable Python interpreter ({}); import check ran in static mode",
                    first_line(&e.to_string())
                ));
                results.mode = ImportCheckMode::Static;
                check_static(&sandbox, package, &modules, findings)
            }
        },
    };

    for check in &checks {
        match (check.outcome, &check.message) {
            (ModuleOutcome::Warned, Some(message)) => findings.warnings.push(format!(
                "Expected relative import issue in {}: {}",
                check.file, message
            )),
            (ModuleOutcome::Failed, Some(message)) => findings
                .errors
                .push(format!("Failed to import {}: {}", check.file, message)),
            _ => {}
        }
    }
    results.modules = checks;

    match sandbox.dispose() {
        Ok(path) => results.sandbox_removed = !path.exists(),
        Err(e) => findings
            .warnings
            .push(format!("Could not remove import sandbox: {}", e)),
    }
    results.duration_ms = start.elapsed().as_millis() as u64;
    results
}

/// Top-level module names, `__init__` first, then by name.
fn module_order(files: &[String]) -> Vec<String> {
    let mut names: Vec<String> = files
        .iter()
        .filter(|f| !f.contains('/') && !f.contains('\\'))
        .filter_map(|f| f.strip_suffix(".py"))
        .filter(|m| *m != "__init__")
        .map(str::to_string)
        .collect();
    names.sort();
    if files.iter().any(|f| f == "__init__.py") {
        names.insert(0, "__init__".to_string());
    }
    names
}

fn classify(file: String, failure: Option<String>) -> ModuleImportCheck {
    let outcome = match &failure {
        None => ModuleOutcome::Imported,
        Some(message) if message.to_lowercase().contains("relative import") => ModuleOutcome::Warned,
        Some(_) => ModuleOutcome::Failed,
    };
    ModuleImportCheck {
        file,
        outcome,
        message: failure,
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text)
}

// ============================================================================
// Disabling Parent-Relative Imports
// ============================================================================

fn disable_escaping_imports_in(path: &Path) -> std::io::Result<Vec<(usize, String)>> {
    let source = fs::read_to_string(path)?;
    let (rewritten, disabled) = disable_escaping_imports(&source);
    if !disabled.is_empty() {
        fs::write(path, rewritten)?;
    }
    Ok(disabled)
}

/// Replace every import reaching above the package with `pass`.
///
/// The first line of the statement becomes `pass` at the same indentation
/// with the original text as a trailing comment; continuation lines become
/// comments. Returns the new text and the (line, first-line text) of each
/// disabled import. Unparseable source is returned unchanged.
pub fn disable_escaping_imports(source: &str) -> (String, Vec<(usize, String)>) {
    let Ok(parsed) = ParsedModule::parse(source) else {
        return (source.to_string(), Vec::new());
    };

    let mut spans = Vec::new();
    let mut stack = vec![parsed.root()];
    while let Some(node) = stack.pop() {
        if node.kind() == "import_from_statement" {
            if parse_import(node, parsed.source()).is_some_and(|spec| spec.escapes_package()) {
                spans.push((start_line(node), end_line(node)));
            }
            continue;
        }
        let mut cursor = node.walk();
        stack.extend(node.named_children(&mut cursor));
    }
    if spans.is_empty() {
        return (source.to_string(), Vec::new());
    }
    spans.sort();

    let mut lines: Vec<String> = source.split('\n').map(str::to_string).collect();
    let mut disabled = Vec::new();
    for (start, end) in spans {
        let Some(first) = lines.get(start - 1).cloned() else {
            continue;
        };
        let text = first.trim().to_string();
        lines[start - 1] = format!(
            "{}pass  # disabled for isolated validation: {}",
            indentation(&first),
            text
        );
        for line in lines.iter_mut().take(end).skip(start) {
            *line = format!("{}# {}", indentation(line), line.trim_start());
        }
        disabled.push((start, text));
    }
    (lines.join("\n"), disabled)
}

// ============================================================================
// Static Loader
// ============================================================================

/// A module namespace after its body ran.
#[derive(Debug, Clone)]
struct Namespace {
    bindings: BTreeSet<String>,
    /// A star import made the namespace open-ended.
    open: bool,
}

impl Namespace {
    fn binds(&self, name: &str) -> bool {
        self.open || self.bindings.contains(name)
    }
}

#[derive(Debug, Clone)]
enum ModuleState {
    Loading,
    Loaded(Namespace),
    Failed(String),
}

/// What an importer sees when it asks for a module.
enum ModuleView {
    /// Still executing further up the import chain.
    Partial,
    Ready(Namespace),
}

const PACKAGE_INIT: &str = "__init__";

/// Module table for one static import check.
///
/// Created and dropped inside [`check_static`]; nothing outlives the stage.
struct ModuleRegistry {
    package: String,
    sources: BTreeMap<String, String>,
    states: BTreeMap<String, ModuleState>,
    /// (module, line, message) for failures inside `try` blocks.
    guarded_failures: Vec<(String, usize, String)>,
}

impl ModuleRegistry {
    fn new(package: &str, sources: BTreeMap<String, String>) -> Self {
        ModuleRegistry {
            package: package.to_string(),
            sources,
            states: BTreeMap::new(),
            guarded_failures: Vec::new(),
        }
    }

    fn qualified(&self, module: &str) -> String {
        if module == PACKAGE_INIT {
            self.package.clone()
        } else {
            format!("{}.{}", self.package, module)
        }
    }

    fn is_submodule(&self, name: &str) -> bool {
        name != PACKAGE_INIT && self.sources.contains_key(name)
    }

    /// Load `module` at top level, as the stage driver does.
    fn load(&mut self, module: &str) -> Result<(), String> {
        self.view(module).map(|_| ())
    }

    fn view(&mut self, module: &str) -> Result<ModuleView, String> {
        match self.states.get(module) {
            Some(ModuleState::Loading) => return Ok(ModuleView::Partial),
            Some(ModuleState::Loaded(ns)) => return Ok(ModuleView::Ready(ns.clone())),
            Some(ModuleState::Failed(message)) => return Err(message.clone()),
            None => {}
        }
        let Some(source) = self.sources.get(module).cloned() else {
            return Err(format!("No module named '{}'", self.qualified(module)));
        };

        debug!("Static load of {}", self.qualified(module));
        self.states.insert(module.to_string(), ModuleState::Loading);
        let result = self.execute(module, &source);
        let state = match &result {
            Ok(ns) => ModuleState::Loaded(ns.clone()),
            Err(message) => ModuleState::Failed(message.clone()),
        };
        self.states.insert(module.to_string(), state);
        result.map(ModuleView::Ready)
    }

    /// Replay the module's import-time events in source order.
    ///
    /// A read succeeds only if an earlier statement bound the name, an
    /// earlier star import opened the namespace, or it is a builtin.
    fn execute(&mut self, module: &str, source: &str) -> Result<Namespace, String> {
        let parsed = ParsedModule::parse(source).map_err(|e| format!("invalid syntax ({})", e))?;
        let scan = scan_import_time(parsed.root(), parsed.source());
        if scan.lazy_annotations {
            debug!("{}: annotations are postponed", self.qualified(module));
        }

        enum Event<'a> {
            Import(&'a ImportSite),
            Read(&'a NameRead),
            Bind(&'a str),
        }
        let mut events: Vec<(usize, u8, Event<'_>)> = Vec::new();
        events.extend(
            scan.binding_sites
                .iter()
                .map(|site| (site.offset, 0, Event::Bind(site.name.as_str()))),
        );
        events.extend(
            scan.imports
                .iter()
                .map(|site| (site.offset, 1, Event::Import(site))),
        );
        events.extend(
            scan.reads
                .iter()
                .map(|read| (read.offset, 2, Event::Read(read))),
        );
        events.sort_by_key(|(offset, order, _)| (*offset, *order));

        let mut bound: BTreeSet<&str> = BTreeSet::new();
        let mut open = false;
        for (_, _, event) in events {
            let (failure, line, guarded) = match event {
                Event::Bind(name) => {
                    bound.insert(name);
                    continue;
                }
                Event::Import(site) => {
                    let result = self.resolve_import(&site.spec);
                    if result.is_ok() && site.spec.star {
                        open = true;
                    }
                    (result.err(), site.line, site.guarded)
                }
                Event::Read(read) => {
                    let name = read.name.as_str();
                    let visible = open || bound.contains(name) || is_python_builtin(name);
                    let failure = (!visible).then(|| format!("name '{}' is not defined", name));
                    (failure, read.line, read.guarded)
                }
            };
            match failure {
                Some(message) if guarded => {
                    self.guarded_failures.push((module.to_string(), line, message));
                }
                Some(message) => return Err(message),
                None => {}
            }
        }
        Ok(Namespace {
            bindings: scan.bindings,
            open: scan.has_star_import,
        })
    }

    fn resolve_import(&mut self, spec: &ImportSpec) -> Result<(), String> {
        if !spec.is_from {
            for imported in &spec.names {
                let mut parts = imported.name.splitn(2, '.');
                if parts.next() == Some(self.package.as_str()) {
                    match parts.next() {
                        Some(rest) => self.import_submodule(rest)?,
                        None => self.load(PACKAGE_INIT)?,
                    }
                }
            }
            return Ok(());
        }

        let target = match spec.level {
            0 => match spec.module.as_deref() {
                Some(m) if m == self.package => PACKAGE_INIT.to_string(),
                Some(m) => match m.strip_prefix(&format!("{}.", self.package)) {
                    Some(rest) => rest.to_string(),
                    // Another package; assumed resolvable.
                    None => return Ok(()),
                },
                None => return Ok(()),
            },
            1 => spec
                .module
                .clone()
                .unwrap_or_else(|| PACKAGE_INIT.to_string()),
            _ => return Err("attempted relative import beyond top-level package".to_string()),
        };
        if target.contains('.') {
            return Err(format!("No module named '{}'", self.qualified(&target)));
        }

        let view = self.view(&target)?;
        if spec.star {
            return Ok(());
        }
        for imported in &spec.names {
            let name = imported.name.as_str();
            let from_package = target == PACKAGE_INIT;
            match &view {
                ModuleView::Ready(ns) if ns.binds(name) => {}
                _ if from_package && self.is_submodule(name) => self.import_submodule(name)?,
                ModuleView::Ready(_) => {
                    return Err(format!(
                        "cannot import name '{}' from '{}'",
                        name,
                        self.qualified(&target)
                    ))
                }
                ModuleView::Partial => {
                    return Err(format!(
                        "cannot import name '{}' from partially initialized module '{}' \
                         (most likely due to a circular import)",
                        name,
                        self.qualified(&target)
                    ))
                }
            }
        }
        Ok(())
    }

    /// `import pkg.X` / `from . import X`: a partially loaded X is fine.
    fn import_submodule(&mut self, name: &str) -> Result<(), String> {
        if name.contains('.') || !self.is_submodule(name) {
            return Err(format!("No module named '{}'", self.qualified(name)));
        }
        self.view(name).map(|_| ())
    }
}

fn check_static(
    sandbox: &SandboxHandle,
    package: &str,
    modules: &[String],
    findings: &mut Findings,
) -> Vec<ModuleImportCheck> {
    let mut sources = BTreeMap::new();
    let mut unreadable = BTreeMap::new();
    for module in modules {
        let path = sandbox.package_dir().join(format!("{}.py", module));
        match fs::read_to_string(&path) {
            Ok(text) => {
                sources.insert(module.clone(), text);
            }
            Err(e) => {
                unreadable.insert(module.clone(), format!("cannot read module: {}", e));
            }
        }
    }

    let mut registry = ModuleRegistry::new(package, sources);
    let checks = modules
        .iter()
        .map(|module| {
            let failure = match unreadable.get(module) {
                Some(message) => Some(message.clone()),
                None => registry.load(module).err(),
            };
            classify(format!("{}.py", module), failure)
        })
        .collect();

    for (module, line, message) in registry.guarded_failures.drain(..) {
        findings.warnings.push(format!(
            "Guarded import-time failure in {}.py line {} ignored: {}",
            module, line, message
        ));
    }
    checks
}

// ============================================================================
// Interpreter Check
// ============================================================================

const IMPORT_CHECK_SCRIPT: &str = r#"import importlib
import json
import sys

root, package = sys.argv[1], sys.argv[2]
sys.path.insert(0, root)
for name in sys.argv[3:]:
    target = package if name == "__init__" else package + "." + name
    try:
        importlib.import_module(target)
        record = {"module": name, "ok": True}
    except BaseException as exc:
        record = {"module": name, "ok": False, "error": "%s: %s" % (type(exc).__name__, exc)}
    print(json.dumps(record), flush=True)
"#;

#[derive(Debug, Deserialize)]
struct ImportRecord {
    module: String,
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

fn check_with_interpreter(
    sandbox: &SandboxHandle,
    package: &str,
    modules: &[String],
    interpreter: &Path,
) -> Vec<ModuleImportCheck> {
    let outcome = sandbox
        .write_meta("import_check.py", IMPORT_CHECK_SCRIPT)
        .and_then(|script| {
            let mut command = vec![
                interpreter.display().to_string(),
                "-I".to_string(),
                "-B".to_string(),
                script.display().to_string(),
                sandbox.root().display().to_string(),
                package.to_string(),
            ];
            command.extend(modules.iter().cloned());
            sandbox.run_verifier(&command)
        });

    let (records, fallback) = match outcome {
        Ok(outcome) => {
            let records: BTreeMap<String, ImportRecord> = outcome
                .stdout
                .lines()
                .filter_map(|line| serde_json::from_str::<ImportRecord>(line).ok())
                .map(|r| (r.module.clone(), r))
                .collect();
            let tail = outcome.stderr.lines().last().unwrap_or("no output").to_string();
            (records, format!("no result from interpreter: {}", tail))
        }
        Err(e) => (BTreeMap::new(), format!("could not run interpreter: {}", e)),
    };

    modules
        .iter()
        .map(|module| {
            let failure = match records.get(module) {
                Some(record) if record.ok => None,
                Some(record) => Some(
                    record
                        .error
                        .clone()
                        .unwrap_or_else(|| "import failed".to_string()),
                ),
                None => Some(fallback.clone()),
            };
            classify(format!("{}.py", module), failure)
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
