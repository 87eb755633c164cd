//! Markdown documentation report built from docstrings.
//!
//! Lists every top-level class, its methods, and every top-level function of
//! the original module, each with its cleaned docstring or "No docstring.".

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;
use tree_sitter::Node;

use crate::emit::{EmitError, EmitResult};
use crate::extract::{declaration_of, is_docstring, ExtractedModule};
use crate::parse::node_text;

/// Name of the report written inside the package directory.
pub const DOCS_FILE: &str = "DOCS.md";

const NO_DOCSTRING: &str = "No docstring.";

/// One documented item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocEntry {
    /// `Class`, `Method` or `Function`.
    pub kind: &'static str,
    /// Methods are qualified with their class (`Widget.draw`).
    pub name: String,
    pub doc: String,
}

/// Collect entries in source order.
pub fn collect_docs(module: &ExtractedModule) -> Vec<DocEntry> {
    let source = module.source();
    let mut entries = Vec::new();
    for (node, decl) in module.declaration_nodes() {
        let definition = unwrap_decorated(node);
        match definition.kind() {
            "class_definition" => {
                entries.push(DocEntry {
                    kind: "Class",
                    name: decl.name.clone(),
                    doc: docstring_of(definition, source),
                });
                let Some(body) = definition.child_by_field_name("body") else {
                    continue;
                };
                let mut cursor = body.walk();
                for member in body.named_children(&mut cursor) {
                    let member_def = unwrap_decorated(member);
                    if member_def.kind() != "function_definition" {
                        continue;
                    }
                    if let Some((_, method)) = declaration_of(member, source) {
                        entries.push(DocEntry {
                            kind: "Method",
                            name: format!("{}.{}", decl.name, method),
                            doc: docstring_of(member_def, source),
                        });
                    }
                }
            }
            _ => entries.push(DocEntry {
                kind: "Function",
                name: decl.name.clone(),
                doc: docstring_of(definition, source),
            }),
        }
    }
    entries
}

/// Render the Markdown report.
pub fn render_docs(module: &ExtractedModule, base_name: &str) -> String {
    let mut out = format!("# Documentation for `{}`\n\n", base_name);
    for entry in collect_docs(module) {
        out.push_str(&format!("## {}: `{}`\n\n{}\n\n", entry.kind, entry.name, entry.doc));
    }
    out
}

/// Write `DOCS.md` into `package_dir`.
pub fn write_docs(module: &ExtractedModule, package_dir: &Path, base_name: &str) -> EmitResult<PathBuf> {
    let path = package_dir.join(DOCS_FILE);
    fs::write(&path, render_docs(module, base_name)).map_err(|source| EmitError::Io {
        path: path.clone(),
        source,
    })?;
    info!("{} written to {}", DOCS_FILE, package_dir.display());
    Ok(path)
}

fn unwrap_decorated(node: Node<'_>) -> Node<'_> {
    if node.kind() == "decorated_definition" {
        node.child_by_field_name("definition").unwrap_or(node)
    } else {
        node
    }
}

fn docstring_of(definition: Node<'_>, source: &str) -> String {
    let Some(body) = definition.child_by_field_name("body") else {
        return NO_DOCSTRING.to_string();
    };
    let mut cursor = body.walk();
    let first = body
        .named_children(&mut cursor)
        .find(|child| child.kind() != "comment");
    match first.filter(|stmt| is_docstring(*stmt)) {
        Some(stmt) => {
            let cleaned = clean_docstring(node_text(stmt, source));
            if cleaned.is_empty() {
                NO_DOCSTRING.to_string()
            } else {
                cleaned
            }
        }
        None => NO_DOCSTRING.to_string(),
    }
}

/// Strip the quotes and the common indentation of a docstring literal.
fn clean_docstring(literal: &str) -> String {
    let body = literal.trim_start_matches(|c: char| matches!(c, 'r' | 'R' | 'u' | 'U'));
    let body = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|q| body.strip_prefix(q).and_then(|b| b.strip_suffix(q)))
        .unwrap_or(body);

    let expanded = body.replace('\t', "        ");
    let lines: Vec<&str> = expanded.lines().collect();
    let margin = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                line.trim_start().to_string()
            } else {
                line.get(margin..).unwrap_or("").trim_end().to_string()
            }
        })
        .collect();
    while cleaned.first().is_some_and(|l| l.trim().is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.trim().is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n").trim_end().to_string()
}
