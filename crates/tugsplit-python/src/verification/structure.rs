//! Structural stage: the split must expose every original declaration.
//!
//! Emitted names come from two places:
//!
//! - the package `__init__.py`: each `from .<unit> import …` line, with the
//!   kind of each name taken from the unit's own definitions (a star import
//!   contributes all of them);
//! - every emitted unit file other than `__init__`, the residual and
//!   `main`, scanned for top-level definitions.
//!
//! Only files in the emitted manifest count; anything else left in the
//! package directory is ignored.
//!
//! Original declarations missing from that set are errors. Names the split
//! exposes that the original never declared are warnings.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use tugsplit_core::types::DeclarationKind;

use super::{Findings, StageStatus};
use crate::extract::extract_module;
use crate::names::parse_import;
use crate::plan::{FUNCTIONS_UNIT, MAIN_UNIT};

/// Structural stage results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuralResults {
    pub status: StageStatus,
    pub original_classes: Vec<String>,
    pub original_functions: Vec<String>,
    pub emitted_classes: Vec<String>,
    pub emitted_functions: Vec<String>,
    pub missing_classes: Vec<String>,
    pub missing_functions: Vec<String>,
    pub extra_classes: Vec<String>,
    pub extra_functions: Vec<String>,
}

/// Names found in the emitted package, per kind.
#[derive(Debug, Default)]
struct EmittedNames {
    classes: BTreeSet<String>,
    functions: BTreeSet<String>,
}

impl EmittedNames {
    fn add(&mut self, kind: DeclarationKind, name: String) {
        match kind {
            DeclarationKind::Class => self.classes.insert(name),
            DeclarationKind::Function => self.functions.insert(name),
        };
    }

    fn get(&self, kind: DeclarationKind) -> &BTreeSet<String> {
        match kind {
            DeclarationKind::Class => &self.classes,
            DeclarationKind::Function => &self.functions,
        }
    }
}

/// Compare the original declarations with what the package exposes.
///
/// `package_files` names the emitted files relative to `package_dir`.
pub fn check_structure(
    original_source: &str,
    package_dir: &Path,
    base_name: &str,
    package_files: &[String],
    findings: &mut Findings,
) -> StructuralResults {
    let mut results = StructuralResults::default();
    let original = match extract_module(original_source) {
        Ok(module) => module,
        Err(e) => {
            findings
                .errors
                .push(format!("Could not re-read original declarations: {}", e));
            results.status = StageStatus::Failed;
            return results;
        }
    };
    results.original_classes = original.names_of(DeclarationKind::Class);
    results.original_functions = original.names_of(DeclarationKind::Function);

    let units = unit_names(package_files);
    let mut cache: BTreeMap<String, Option<Vec<(DeclarationKind, String)>>> = BTreeMap::new();
    let mut definitions_of = |unit: &str, findings: &mut Findings| {
        if !units.iter().any(|u| u == unit) {
            return None;
        }
        cache
            .entry(unit.to_string())
            .or_insert_with(|| read_definitions(package_dir, unit, findings))
            .clone()
    };

    let mut emitted = EmittedNames::default();
    collect_from_init(package_dir, &mut emitted, &mut definitions_of, findings);

    let skip = ["__init__", base_name, MAIN_UNIT];
    for unit in units.iter().filter(|u| !skip.contains(&u.as_str())) {
        for (kind, name) in definitions_of(unit.as_str(), findings).unwrap_or_default() {
            emitted.add(kind, name);
        }
    }

    for kind in [DeclarationKind::Class, DeclarationKind::Function] {
        let original_names = match kind {
            DeclarationKind::Class => &results.original_classes,
            DeclarationKind::Function => &results.original_functions,
        };
        let found = emitted.get(kind);
        let missing: Vec<String> = original_names
            .iter()
            .filter(|n| !found.contains(*n))
            .cloned()
            .collect();
        let original_set: BTreeSet<&String> = original_names.iter().collect();
        let extra: Vec<String> = found
            .iter()
            .filter(|n| !original_set.contains(n))
            .cloned()
            .collect();

        if !missing.is_empty() {
            findings.errors.push(format!(
                "Missing {} in split files: {}",
                kind.plural(),
                missing.join(", ")
            ));
        }
        if !extra.is_empty() {
            findings.warnings.push(format!(
                "Extra {} found in split files: {}",
                kind.plural(),
                extra.join(", ")
            ));
        }

        let emitted_list: Vec<String> = found.iter().cloned().collect();
        match kind {
            DeclarationKind::Class => {
                results.emitted_classes = emitted_list;
                results.missing_classes = missing;
                results.extra_classes = extra;
            }
            DeclarationKind::Function => {
                results.emitted_functions = emitted_list;
                results.missing_functions = missing;
                results.extra_functions = extra;
            }
        }
    }

    debug!(
        "Structural diff: {} missing, {} extra",
        results.missing_classes.len() + results.missing_functions.len(),
        results.extra_classes.len() + results.extra_functions.len()
    );
    results
}

/// Names re-exported by `__init__.py` through single-dot `from` imports.
fn collect_from_init(
    package_dir: &Path,
    emitted: &mut EmittedNames,
    definitions_of: &mut impl FnMut(&str, &mut Findings) -> Option<Vec<(DeclarationKind, String)>>,
    findings: &mut Findings,
) {
    let Ok(text) = fs::read_to_string(package_dir.join("__init__.py")) else {
        findings
            .warnings
            .push("Could not read __init__.py for structural check".to_string());
        return;
    };
    let Ok(init) = extract_module(&text) else {
        findings
            .warnings
            .push("Could not parse __init__.py for structural check".to_string());
        return;
    };

    for node in init.parsed.statements() {
        let Some(spec) = parse_import(node, init.source()) else {
            continue;
        };
        let Some(unit) = spec.module.as_deref().filter(|_| spec.is_from && spec.level == 1) else {
            continue;
        };
        let definitions = definitions_of(unit, findings).unwrap_or_default();
        if spec.star {
            for (kind, name) in definitions {
                emitted.add(kind, name);
            }
            continue;
        }
        for imported in &spec.names {
            let kind = definitions
                .iter()
                .find(|(_, defined)| *defined == imported.name)
                .map(|(kind, _)| *kind)
                .unwrap_or(if unit == FUNCTIONS_UNIT {
                    DeclarationKind::Function
                } else {
                    DeclarationKind::Class
                });
            emitted.add(kind, imported.name.clone());
        }
    }
}

/// Top-level definitions of `<unit>.py`, or `None` if it cannot be read.
fn read_definitions(
    package_dir: &Path,
    unit: &str,
    findings: &mut Findings,
) -> Option<Vec<(DeclarationKind, String)>> {
    let path = package_dir.join(format!("{}.py", unit));
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            findings
                .warnings
                .push(format!("Could not analyze {}.py: {}", unit, e));
            return None;
        }
    };
    match extract_module(&text) {
        Ok(module) => Some(
            module
                .declarations
                .into_iter()
                .map(|d| (d.kind, d.name))
                .collect(),
        ),
        Err(e) => {
            findings
                .warnings
                .push(format!("Could not analyze {}.py: {}", unit, e));
            None
        }
    }
}

/// Module names of the emitted top-level `.py` files, sorted.
fn unit_names(package_files: &[String]) -> Vec<String> {
    let mut units: Vec<String> = package_files
        .iter()
        .filter(|f| !f.contains('/') && !f.contains('\\'))
        .filter_map(|f| f.strip_suffix(".py"))
        .map(str::to_string)
        .collect();
    units.sort();
    units
}

// ============================================================================
// Tests
// ============================================================================
