//! File emission and interface aggregation.
//!
//! Rendering is pure text assembly from the plan and the original lines; no
//! file is re-parsed between planning and writing. [`render_layout`] builds
//! every file in memory and [`write_layout`] puts them on disk, so a
//! rendering failure never leaves a half-written package behind. Modules an
//! earlier run left in the package directory are removed first by
//! [`prune_stale_modules`].
//!
//! ## Layout
//!
//! ```text
//! <output_dir>/
//! ├── <base>.py          interface: re-exports every symbol, declares __all__
//! └── <base>/
//!     ├── __init__.py    package initializer re-exporting every unit
//!     ├── <unit>.py      one per class or group
//!     ├── functions.py   shared functions (default mode)
//!     ├── <base>.py      residual module
//!     └── main.py        leftover top-level statements, when any
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use tugsplit_core::error::SplitError;
use tugsplit_core::text::finish_file;
use tugsplit_core::types::{EmittedFile, FileRole};

use crate::extract::ExtractedModule;
use crate::plan::{
    CrossImport, Export, PartitionPlan, PartitionUnit, ResidualHeader, MAIN_UNIT,
};

// ============================================================================
// Error Types
// ============================================================================

/// Errors from rendering or writing the output layout.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("declaration '{name}' has no extractable source span")]
    MissingSpan { name: String },
}

/// Result type for emission.
pub type EmitResult<T> = Result<T, EmitError>;

impl From<EmitError> for SplitError {
    fn from(err: EmitError) -> Self {
        let file = match &err {
            EmitError::Io { path, .. } => Some(path.display().to_string()),
            EmitError::MissingSpan { .. } => None,
        };
        SplitError::EmitError {
            message: err.to_string(),
            file,
        }
    }
}

// ============================================================================
// Rendered Files
// ============================================================================

/// A file rendered in memory, not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    /// Path relative to the output directory, `/`-separated.
    pub path: String,
    pub role: FileRole,
    pub content: String,
}

const SYNTHESIZED_HEADER: &str = "\"\"\"
Main module - declarations have been split into separate files.
Import from the individual modules or use the package __init__ for convenience.
\"\"\"";

/// Render every file of the layout.
pub fn render_layout(module: &ExtractedModule, plan: &PartitionPlan) -> EmitResult<Vec<RenderedFile>> {
    let base = &plan.base_name;
    let mut files = Vec::new();

    for unit in &plan.units {
        files.push(RenderedFile {
            path: format!("{}/{}.py", base, unit.unit_name),
            role: unit.role,
            content: render_unit(module, unit)?,
        });
    }
    files.push(RenderedFile {
        path: format!("{}/{}.py", base, base),
        role: FileRole::Residual,
        content: render_residual(module, plan)?,
    });
    if plan.main.is_some() {
        files.push(RenderedFile {
            path: format!("{}/{}.py", base, MAIN_UNIT),
            role: FileRole::Main,
            content: render_main(module, plan),
        });
    }
    files.push(RenderedFile {
        path: format!("{}/__init__.py", base),
        role: FileRole::PackageInit,
        content: render_package_init(plan),
    });
    files.push(RenderedFile {
        path: format!("{}.py", base),
        role: FileRole::Interface,
        content: render_interface(plan),
    });

    Ok(files)
}

/// Write rendered files under `output_dir`, creating directories as needed.
pub fn write_layout(output_dir: &Path, files: &[RenderedFile]) -> EmitResult<Vec<EmittedFile>> {
    let mut emitted = Vec::with_capacity(files.len());
    for file in files {
        let path = output_dir.join(&file.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| EmitError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, &file.content).map_err(|source| EmitError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("Wrote {} ({} bytes)", file.path, file.content.len());
        emitted.push(EmittedFile::new(file.path.clone(), file.role, &file.content));
    }
    info!("Wrote {} files to {}", emitted.len(), output_dir.display());
    Ok(emitted)
}

/// Remove `.py` files a previous run left in `<output_dir>/<base>/`.
///
/// Any top-level module of the package directory that `files` does not
/// render again is deleted. Returns the removed paths.
pub fn prune_stale_modules(
    output_dir: &Path,
    base: &str,
    files: &[RenderedFile],
) -> EmitResult<Vec<PathBuf>> {
    let package_dir = output_dir.join(base);
    let entries = match fs::read_dir(&package_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(EmitError::Io {
                path: package_dir,
                source,
            })
        }
    };
    let prefix = format!("{}/", base);
    let keep: BTreeSet<&str> = files
        .iter()
        .filter_map(|f| f.path.strip_prefix(&prefix))
        .collect();

    let mut removed = Vec::new();
    for entry in entries.flatten() {
        if !entry.file_type().is_ok_and(|t| t.is_file()) {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.ends_with(".py") || keep.contains(name) {
            continue;
        }
        let path = entry.path();
        fs::remove_file(&path).map_err(|source| EmitError::Io {
            path: path.clone(),
            source,
        })?;
        info!("Removed stale module {}", path.display());
        removed.push(path);
    }
    removed.sort();
    Ok(removed)
}

// ============================================================================
// Unit Files
// ============================================================================

/// Import block, cross-reference imports, then each member's source.
pub fn render_unit(module: &ExtractedModule, unit: &PartitionUnit) -> EmitResult<String> {
    let mut parts = header_imports(module, &unit.required_imports);
    for member in &unit.members {
        push_definitions(&mut parts, module, member)?;
    }
    Ok(finish_file(&parts.join("\n")))
}

/// The residual module.
///
/// It always opens with the docstring (or a generated one). Without
/// retained declarations it then re-exports every split symbol; otherwise it
/// keeps the retained declarations followed by the leftover top-level lines.
pub fn render_residual(module: &ExtractedModule, plan: &PartitionPlan) -> EmitResult<String> {
    let residual = &plan.residual;
    let header = match &residual.header {
        ResidualHeader::Docstring(text) => text.clone(),
        ResidualHeader::Synthesized => SYNTHESIZED_HEADER.to_string(),
    };

    if residual.members.is_empty() {
        let mut parts = vec![header, String::new()];
        if !module.imports.is_empty() {
            parts.extend(module.import_block());
            parts.push(String::new());
        }
        parts.extend(plan.exports.iter().map(render_star_or_names));
        return Ok(finish_file(&parts.join("\n")));
    }

    let mut parts = vec![header, String::new()];
    parts.extend(header_imports(module, &residual.required_imports));
    for member in &residual.members {
        push_definitions(&mut parts, module, member)?;
    }
    let mut text = parts.join("\n");
    let leftover = normalized_leftover(module);
    if !leftover.is_empty() {
        text.push('\n');
        text.push_str(&leftover.join("\n"));
    }
    Ok(finish_file(&text))
}

/// Leftover top-level statements with the imports they need.
pub fn render_main(module: &ExtractedModule, plan: &PartitionPlan) -> String {
    let imports = plan
        .main
        .as_ref()
        .map(|m| m.required_imports.as_slice())
        .unwrap_or_default();
    let mut parts = header_imports(module, imports);
    parts.extend(normalized_leftover(module));
    finish_file(&parts.join("\n"))
}

/// Original import block, cross-reference imports, blank separator.
fn header_imports(module: &ExtractedModule, imports: &[CrossImport]) -> Vec<String> {
    let mut parts = module.import_block();
    parts.extend(imports.iter().map(CrossImport::render));
    if !parts.is_empty() {
        parts.push(String::new());
    }
    parts
}

/// Every splittable definition of `name`, each followed by a blank line.
fn push_definitions(parts: &mut Vec<String>, module: &ExtractedModule, name: &str) -> EmitResult<()> {
    let mut found = false;
    for decl in module.declarations_named(name).filter(|d| d.is_splittable()) {
        let text = module
            .declaration_text(decl)
            .ok_or_else(|| EmitError::MissingSpan {
                name: name.to_string(),
            })?;
        parts.push(text);
        parts.push(String::new());
        found = true;
    }
    if !found {
        return Err(EmitError::MissingSpan {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Leftover lines with blank runs collapsed, except inside string literals.
fn normalized_leftover(module: &ExtractedModule) -> Vec<String> {
    let protected: BTreeSet<usize> = module.string_continuation_lines();
    let mut out: Vec<String> = Vec::new();
    let mut previous_blank = false;
    for (number, line) in module.leftover_numbered() {
        let blank = line.trim().is_empty();
        if blank && previous_blank && !protected.contains(&number) {
            continue;
        }
        out.push(line.to_string());
        previous_blank = blank;
    }
    out
}

fn render_star_or_names(export: &Export) -> String {
    if export.star {
        format!("from .{} import *", export.unit)
    } else {
        format!("from .{} import {}", export.unit, export.symbols.join(", "))
    }
}

// ============================================================================
// Interface Aggregation
// ============================================================================

/// The package `__init__.py`.
pub fn render_package_init(plan: &PartitionPlan) -> String {
    let lines: Vec<String> = plan.exports.iter().map(render_star_or_names).collect();
    finish_file(&lines.join("\n"))
}

/// The re-export module written at the original file's location.
pub fn render_interface(plan: &PartitionPlan) -> String {
    let base = &plan.base_name;
    let mut parts = vec![
        "\"\"\"".to_string(),
        format!("Interface module for {}.", base),
        String::new(),
        "This file re-exports every class and function that was split into".to_string(),
        format!("the {} package. Import from it to keep existing code working.", base),
        "\"\"\"".to_string(),
        String::new(),
    ];
    for export in plan.exports.iter().filter(|e| !e.symbols.is_empty()) {
        parts.push(format!(
            "from .{}.{} import {}",
            base,
            export.unit,
            export.symbols.join(", ")
        ));
    }

    let exported = plan.exported_symbols();
    if !exported.is_empty() {
        parts.push(String::new());
        parts.push("__all__ = [".to_string());
        parts.extend(exported.iter().map(|name| format!("    \"{}\",", name)));
        parts.push("]".to_string());
    }
    finish_file(&parts.join("\n"))
}

// ============================================================================
// Tests
// ============================================================================
