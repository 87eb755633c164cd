//! Partition planning.
//!
//! Decides which declarations land in which output module and which relative
//! imports each module needs.
//!
//! ## Modes
//!
//! - **Default**: one unit per class, named after the class, plus one shared
//!   `functions` unit holding every function.
//! - **Grouped**: one unit per configured group, members taken from the
//!   config in the order listed. Names the source does not declare are
//!   skipped. Declarations no group mentions follow the config's
//!   [`UnassignedPolicy`].
//!
//! In both modes a residual unit named after the input file keeps whatever
//! was not moved out, and a `main` unit receives the leftover top-level
//! statements when there are any.
//!
//! A plan never places a declaration in two units. A name declared more than
//! once (`@overload` stubs, conditional redefinitions) is one member; the
//! emitter writes every definition of it in source order. Layouts in which
//! two modules would share a file name, or a name is both a class and a
//! function, are rejected with a [`PlanError`].

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use tugsplit_core::error::SplitError;
use tugsplit_core::types::{DeclarationKind, FileRole};

use crate::analyzer::DependencyGraph;
use crate::config::{GroupConfig, UnassignedPolicy};
use crate::extract::ExtractedModule;
use crate::validation::{validate_python_identifier, RESERVED_MODULE_NAMES};

/// Name of the shared functions unit in default mode.
pub const FUNCTIONS_UNIT: &str = "functions";

/// Name of the unit holding leftover top-level statements.
pub const MAIN_UNIT: &str = "main";

// ============================================================================
// Error Types
// ============================================================================

/// A layout that cannot be written.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("'{name}' is declared both as a class and as a function at top level")]
    ConflictingKinds { name: String },

    #[error("module '{name}' would collide with {reason}")]
    NameCollision { name: String, reason: String },

    #[error("'{name}' cannot name the output package: {reason}")]
    InvalidBaseName { name: String, reason: String },
}

/// Result type for planning.
pub type PlanResult<T> = Result<T, PlanError>;

impl From<PlanError> for SplitError {
    fn from(err: PlanError) -> Self {
        SplitError::PlanConflict {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Plan Types
// ============================================================================

/// How the plan was formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    Default,
    Grouped,
}

/// One `from .<unit> import a, b` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossImport {
    pub unit: String,
    pub symbols: Vec<String>,
}

impl CrossImport {
    /// Render as a relative import line.
    pub fn render(&self) -> String {
        format!("from .{} import {}", self.unit, self.symbols.join(", "))
    }
}

/// One output module holding split declarations.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionUnit {
    pub unit_name: String,
    pub role: FileRole,
    /// Member declarations in emission order.
    pub members: Vec<String>,
    pub required_imports: Vec<CrossImport>,
}

/// How the residual module opens when it keeps no declarations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "text")]
pub enum ResidualHeader {
    /// The input's module docstring, verbatim.
    Docstring(String),
    /// No docstring existed; a generic one is written.
    Synthesized,
}

/// The shrunk original module inside the package.
#[derive(Debug, Clone, Serialize)]
pub struct ResidualUnit {
    /// Declarations kept here, in source order.
    pub members: Vec<String>,
    pub required_imports: Vec<CrossImport>,
    pub header: ResidualHeader,
}

/// The module holding leftover top-level statements.
#[derive(Debug, Clone, Serialize)]
pub struct MainUnit {
    pub required_imports: Vec<CrossImport>,
}

/// Symbols a module re-exports from one sibling module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Export {
    pub unit: String,
    pub symbols: Vec<String>,
    /// Re-export with `import *` in the package initializer.
    pub star: bool,
}

/// The full output layout.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionPlan {
    pub base_name: String,
    pub mode: PlanMode,
    pub units: Vec<PartitionUnit>,
    pub residual: ResidualUnit,
    pub main: Option<MainUnit>,
    /// Declaration name to the module that defines it.
    pub homes: BTreeMap<String, String>,
    /// Declarations left out of every module.
    pub dropped: Vec<String>,
    /// Configured names the source does not declare.
    pub skipped: Vec<String>,
    pub exports: Vec<Export>,
    pub warnings: Vec<String>,
}

impl PartitionPlan {
    /// Every symbol re-exported by the package, in export order.
    pub fn exported_symbols(&self) -> Vec<&str> {
        self.exports
            .iter()
            .flat_map(|e| e.symbols.iter().map(String::as_str))
            .collect()
    }
}

// ============================================================================
// Planning
// ============================================================================

/// Plan the layout for `module`.
pub fn plan_partition(
    module: &ExtractedModule,
    graph: &DependencyGraph,
    base_name: &str,
    config: Option<&GroupConfig>,
) -> PlanResult<PartitionPlan> {
    validate_python_identifier(base_name).map_err(|e| PlanError::InvalidBaseName {
        name: base_name.to_string(),
        reason: e.to_string(),
    })?;
    if RESERVED_MODULE_NAMES.contains(&base_name) {
        return Err(PlanError::InvalidBaseName {
            name: base_name.to_string(),
            reason: "name is reserved for a generated module".to_string(),
        });
    }

    let mut kinds: BTreeMap<&str, DeclarationKind> = BTreeMap::new();
    for decl in &module.declarations {
        if *kinds.entry(decl.name.as_str()).or_insert(decl.kind) != decl.kind {
            return Err(PlanError::ConflictingKinds {
                name: decl.name.clone(),
            });
        }
    }

    let mut warnings = Vec::new();
    for decl in module.declarations.iter().filter(|d| !d.is_splittable()) {
        let message = format!(
            "{} '{}' has no reliable end line and was left out of the split",
            decl.kind, decl.name
        );
        warn!("{}", message);
        warnings.push(message);
    }

    // Distinct names in first-declaration order.
    let splittable_names: Vec<(&str, DeclarationKind)> = {
        let mut seen = BTreeSet::new();
        module
            .declarations
            .iter()
            .filter(|d| d.is_splittable() && seen.insert(d.name.as_str()))
            .map(|d| (d.name.as_str(), d.kind))
            .collect()
    };
    let splittable = |kind: DeclarationKind| -> Vec<&str> {
        splittable_names
            .iter()
            .filter(|(_, k)| *k == kind)
            .map(|(name, _)| *name)
            .collect()
    };
    let classes = splittable(DeclarationKind::Class);
    let functions = splittable(DeclarationKind::Function);

    let mut skipped = Vec::new();
    let mut dropped = Vec::new();
    let mut residual_members: Vec<String> = Vec::new();

    let (mode, mut units) = match config {
        None => {
            let mut units: Vec<PartitionUnit> = classes
                .iter()
                .map(|name| new_unit(name, FileRole::Unit, vec![name.to_string()]))
                .collect();
            if !functions.is_empty() {
                units.push(new_unit(
                    FUNCTIONS_UNIT,
                    FileRole::Functions,
                    functions.iter().map(|f| f.to_string()).collect(),
                ));
            }
            (PlanMode::Default, units)
        }
        Some(config) => {
            let mut units = Vec::new();
            for group in &config.groups {
                let mut members = Vec::new();
                for (listed, kind_names) in [(&group.classes, &classes), (&group.functions, &functions)] {
                    for name in listed {
                        if kind_names.contains(&name.as_str()) {
                            members.push(name.clone());
                        } else {
                            warn!("Group '{}' lists '{}', which the source does not declare; skipped", group.name, name);
                            skipped.push(name.clone());
                        }
                    }
                }
                units.push(new_unit(&group.name, FileRole::Unit, members));
            }

            let assigned: BTreeSet<&str> = units
                .iter()
                .flat_map(|u| u.members.iter().map(String::as_str))
                .collect();
            for (name, kind) in splittable_names.iter().filter(|(n, _)| !assigned.contains(n)) {
                match config.unassigned {
                    UnassignedPolicy::Drop => {
                        let message = format!(
                            "{} '{}' is not assigned to any group and was left out of the split",
                            kind, name
                        );
                        warn!("{}", message);
                        warnings.push(message);
                        dropped.push(name.to_string());
                    }
                    UnassignedPolicy::Residual => residual_members.push(name.to_string()),
                }
            }
            (PlanMode::Grouped, units)
        }
    };

    check_collisions(&units, base_name, mode)?;

    let mut homes = BTreeMap::new();
    for unit in &units {
        for member in &unit.members {
            homes.insert(member.clone(), unit.unit_name.clone());
        }
    }
    for member in &residual_members {
        homes.insert(member.clone(), base_name.to_string());
    }

    let module_order: Vec<String> = units
        .iter()
        .map(|u| u.unit_name.clone())
        .chain(std::iter::once(base_name.to_string()))
        .collect();
    let resolver = ImportResolver::new(module, graph, &homes, &module_order);
    for unit in &mut units {
        unit.required_imports = resolver.imports_for(&unit.unit_name, &unit.members, &[]);
    }

    let header = match &module.docstring {
        Some(doc) => ResidualHeader::Docstring(doc.text.clone()),
        None => ResidualHeader::Synthesized,
    };
    let residual_imports = if residual_members.is_empty() {
        Vec::new()
    } else {
        resolver.imports_for(base_name, &residual_members, graph.leftover_refs())
    };
    let residual = ResidualUnit {
        members: residual_members,
        required_imports: residual_imports,
        header,
    };

    let main = (!module.leftover_statements().is_empty()).then(|| MainUnit {
        required_imports: resolver.imports_for(MAIN_UNIT, &[], graph.leftover_refs()),
    });

    let exports = build_exports(&units, &residual, base_name, mode);

    debug!(
        "Planned {} units ({:?} mode), {} kept in residual, {} dropped",
        units.len(),
        mode,
        residual.members.len(),
        dropped.len()
    );

    Ok(PartitionPlan {
        base_name: base_name.to_string(),
        mode,
        units,
        residual,
        main,
        homes,
        dropped,
        skipped,
        exports,
        warnings,
    })
}

fn new_unit(name: &str, role: FileRole, members: Vec<String>) -> PartitionUnit {
    PartitionUnit {
        unit_name: name.to_string(),
        role,
        members,
        required_imports: Vec::new(),
    }
}

fn check_collisions(units: &[PartitionUnit], base_name: &str, mode: PlanMode) -> PlanResult<()> {
    let has_functions_unit = units.iter().any(|u| u.role == FileRole::Functions);
    for unit in units {
        let name = unit.unit_name.as_str();
        let reason = if name == base_name {
            Some(format!("the residual module '{}.py'", base_name))
        } else if RESERVED_MODULE_NAMES.contains(&name) {
            Some(format!("the generated '{}.py'", name))
        } else if mode == PlanMode::Default
            && has_functions_unit
            && name == FUNCTIONS_UNIT
            && unit.role == FileRole::Unit
        {
            Some("the shared functions module".to_string())
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(PlanError::NameCollision {
                name: name.to_string(),
                reason,
            });
        }
    }
    Ok(())
}

fn build_exports(
    units: &[PartitionUnit],
    residual: &ResidualUnit,
    base_name: &str,
    mode: PlanMode,
) -> Vec<Export> {
    let mut exports: Vec<Export> = units
        .iter()
        .filter(|u| mode == PlanMode::Grouped || !u.members.is_empty())
        .map(|u| Export {
            unit: u.unit_name.clone(),
            symbols: u.members.clone(),
            star: mode == PlanMode::Grouped,
        })
        .collect();
    if !residual.members.is_empty() {
        exports.push(Export {
            unit: base_name.to_string(),
            symbols: residual.members.clone(),
            star: false,
        });
    }
    exports
}

// ============================================================================
// Cross-Reference Imports
// ============================================================================

/// Turns dependency edges into per-module import lines.
struct ImportResolver<'a> {
    graph: &'a DependencyGraph,
    homes: &'a BTreeMap<String, String>,
    /// Module order: units as planned, then the residual.
    module_rank: BTreeMap<String, usize>,
    /// Declaration source order.
    decl_rank: BTreeMap<&'a str, usize>,
}

impl<'a> ImportResolver<'a> {
    fn new(
        module: &'a ExtractedModule,
        graph: &'a DependencyGraph,
        homes: &'a BTreeMap<String, String>,
        module_order: &[String],
    ) -> Self {
        let module_rank = module_order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let mut decl_rank = BTreeMap::new();
        for (i, decl) in module.declarations.iter().enumerate() {
            decl_rank.entry(decl.name.as_str()).or_insert(i);
        }
        ImportResolver {
            graph,
            homes,
            module_rank,
            decl_rank,
        }
    }

    /// Imports `unit` needs for what `members` and `extra_refs` read.
    ///
    /// References whose home is `unit` itself, or that have no home, need
    /// no import.
    fn imports_for(&self, unit: &str, members: &[String], extra_refs: &[String]) -> Vec<CrossImport> {
        let mut wanted: BTreeSet<&str> = BTreeSet::new();
        for member in members {
            wanted.extend(self.graph.edges_from(member).map(|e| e.to.as_str()));
        }
        wanted.extend(extra_refs.iter().map(String::as_str));

        let mut by_home: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for symbol in wanted {
            if let Some(home) = self.homes.get(symbol) {
                if home != unit {
                    by_home.entry(home.as_str()).or_default().push(symbol);
                }
            }
        }

        let mut imports: Vec<(usize, CrossImport)> = by_home
            .into_iter()
            .map(|(home, mut symbols)| {
                symbols.sort_by_key(|s| self.decl_rank.get(s).copied().unwrap_or(usize::MAX));
                let rank = self.module_rank.get(home).copied().unwrap_or(usize::MAX);
                (
                    rank,
                    CrossImport {
                        unit: home.to_string(),
                        symbols: symbols.into_iter().map(str::to_string).collect(),
                    },
                )
            })
            .collect();
        imports.sort_by_key(|(rank, _)| *rank);
        imports.into_iter().map(|(_, import)| import).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
