//! Dependency analysis between top-level declarations.
//!
//! For every declaration the analyzer collects the identifiers it reads
//! (see [`collect_read_identifiers`]) and keeps those that name another
//! top-level declaration. The leftover top-level statements are scanned the
//! same way so the planner can give the residual and `main` units their
//! imports.
//!
//! Resolution is syntactic. A local variable that shadows a top-level name
//! still produces an edge, which can only add an unneeded import, never miss
//! a needed one.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use tugsplit_core::types::DeclarationKind;

use crate::extract::ExtractedModule;
use crate::names::collect_read_identifiers;

// ============================================================================
// Types
// ============================================================================

/// `from` reads the name of `to`, a declaration of kind `kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub kind: DeclarationKind,
}

/// All dependency edges of a module.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: Vec<DependencyEdge>,
    leftover_refs: Vec<String>,
}

// ============================================================================
// Analysis
// ============================================================================

impl DependencyGraph {
    /// Compute the dependency graph of an extracted module.
    pub fn analyze(module: &ExtractedModule) -> Self {
        // Source order of declaration names drives edge order, so emitted
        // import lines are stable from run to run. A repeated name counts
        // once, at its first definition.
        let mut known: BTreeMap<&str, DeclarationKind> = BTreeMap::new();
        let order: Vec<(&str, DeclarationKind)> = module
            .declarations
            .iter()
            .filter(|d| known.insert(d.name.as_str(), d.kind).is_none())
            .map(|d| (d.name.as_str(), d.kind))
            .collect();

        let mut edges: Vec<DependencyEdge> = Vec::new();
        let mut seen: BTreeSet<(&str, &str)> = BTreeSet::new();
        for (node, decl) in module.declaration_nodes() {
            let used = collect_read_identifiers(node, module.source());
            for (name, kind) in &order {
                if *name != decl.name && used.contains(*name) && seen.insert((decl.name.as_str(), *name)) {
                    edges.push(DependencyEdge {
                        from: decl.name.clone(),
                        to: name.to_string(),
                        kind: *kind,
                    });
                }
            }
        }

        let mut top_used = BTreeSet::new();
        for node in module.leftover_statements() {
            top_used.extend(collect_read_identifiers(node, module.source()));
        }
        let leftover_refs = order
            .iter()
            .filter(|(name, _)| top_used.contains(*name))
            .map(|(name, _)| name.to_string())
            .collect();

        debug!(
            "Dependency graph: {} edges across {} declarations",
            edges.len(),
            known.len()
        );

        DependencyGraph {
            edges,
            leftover_refs,
        }
    }

    /// Edges leaving `name`.
    pub fn edges_from<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a DependencyEdge> {
        self.edges.iter().filter(move |e| e.from == name)
    }

    /// Declarations read by top-level statements outside every declaration.
    pub fn leftover_refs(&self) -> &[String] {
        &self.leftover_refs
    }
}

// ============================================================================
// Tests
// ============================================================================
