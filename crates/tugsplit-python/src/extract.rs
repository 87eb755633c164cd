//! Declaration extraction.
//!
//! Finds every top-level class and function in a module together with its
//! inclusive line span, the module's top-level import statements (verbatim),
//! and the module docstring. A decorated declaration's span starts at its
//! first decorator, so slicing the span yields a self-contained unit.

use std::collections::BTreeSet;

use tracing::debug;
use tree_sitter::Node;
use tugsplit_core::text::split_lines;
use tugsplit_core::types::{Declaration, DeclarationKind};

use crate::parse::{end_line, node_text, start_line, ParseResult, ParsedModule};

// ============================================================================
// Types
// ============================================================================

/// A top-level import statement, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStatement {
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// The module docstring, kept verbatim including its quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Docstring {
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// Everything the splitter needs to know about the input module.
#[derive(Debug)]
pub struct ExtractedModule {
    pub parsed: ParsedModule,
    pub lines: Vec<String>,
    pub declarations: Vec<Declaration>,
    pub imports: Vec<ImportStatement>,
    pub docstring: Option<Docstring>,
}

// ============================================================================
// Extraction
// ============================================================================

/// Parse `source` and extract its top-level structure.
///
/// Fails only when the source is not valid Python.
pub fn extract_module(source: &str) -> ParseResult<ExtractedModule> {
    let parsed = ParsedModule::parse(source)?;
    let lines = split_lines(source);

    let mut declarations = Vec::new();
    let mut imports = Vec::new();
    let mut docstring = None;

    for (index, node) in parsed.statements().into_iter().enumerate() {
        if index == 0 && is_docstring(node) {
            docstring = Some(Docstring {
                text: parsed.text(node).to_string(),
                start_line: start_line(node),
                end_line: end_line(node),
            });
            continue;
        }
        if let Some((kind, name)) = declaration_of(node, parsed.source()) {
            declarations.push(Declaration {
                kind,
                name,
                start_line: start_line(node),
                end_line: (!node.is_missing()).then(|| end_line(node)),
            });
        } else if is_import(node) {
            imports.push(ImportStatement {
                text: parsed.text(node).to_string(),
                start_line: start_line(node),
                end_line: end_line(node),
            });
        }
    }

    debug!(
        "Extracted {} declarations, {} imports, docstring: {}",
        declarations.len(),
        imports.len(),
        docstring.is_some()
    );

    Ok(ExtractedModule {
        parsed,
        lines,
        declarations,
        imports,
        docstring,
    })
}

/// Kind and name of a top-level declaration node, looking through decorators.
pub fn declaration_of(node: Node<'_>, source: &str) -> Option<(DeclarationKind, String)> {
    let definition = match node.kind() {
        "decorated_definition" => node.child_by_field_name("definition")?,
        _ => node,
    };
    let kind = match definition.kind() {
        "class_definition" => DeclarationKind::Class,
        "function_definition" => DeclarationKind::Function,
        _ => return None,
    };
    let name = definition.child_by_field_name("name")?;
    Some((kind, node_text(name, source).to_string()))
}

/// True for `import`, `from … import`, and `from __future__ import`.
pub fn is_import(node: Node<'_>) -> bool {
    matches!(
        node.kind(),
        "import_statement" | "import_from_statement" | "future_import_statement"
    )
}

/// True for an expression statement consisting of a single string literal.
pub fn is_docstring(node: Node<'_>) -> bool {
    if node.kind() != "expression_statement" || node.named_child_count() != 1 {
        return false;
    }
    node.named_child(0)
        .is_some_and(|child| matches!(child.kind(), "string" | "concatenated_string"))
}

// ============================================================================
// Queries
// ============================================================================

impl ExtractedModule {
    pub fn source(&self) -> &str {
        self.parsed.source()
    }

    /// Distinct names of top-level declarations of `kind`, in source order.
    pub fn names_of(&self, kind: DeclarationKind) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.declarations
            .iter()
            .filter(|d| d.kind == kind && seen.insert(d.name.as_str()))
            .map(|d| d.name.clone())
            .collect()
    }

    /// Every declaration of `name`, in source order.
    pub fn declarations_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Declaration> {
        self.declarations.iter().filter(move |d| d.name == name)
    }

    /// Verbatim text of a declaration's span.
    pub fn declaration_text(&self, decl: &Declaration) -> Option<String> {
        let (start, end) = decl.span()?;
        Some(tugsplit_core::text::extract_lines(&self.lines, start, end))
    }

    /// Lines covered by declarations, imports, and the docstring.
    pub fn occupied_lines(&self) -> BTreeSet<usize> {
        let mut occupied = BTreeSet::new();
        for (start, end) in self.declarations.iter().filter_map(Declaration::span) {
            occupied.extend(start..=end);
        }
        for import in &self.imports {
            occupied.extend(import.start_line..=import.end_line);
        }
        if let Some(doc) = &self.docstring {
            occupied.extend(doc.start_line..=doc.end_line);
        }
        occupied
    }

    /// Source lines outside every declaration, import, and the docstring,
    /// with leading blank lines dropped. Each line keeps its 1-indexed number.
    pub fn leftover_numbered(&self) -> Vec<(usize, &str)> {
        let occupied = self.occupied_lines();
        self.lines
            .iter()
            .enumerate()
            .map(|(i, line)| (i + 1, line.as_str()))
            .filter(|(number, _)| !occupied.contains(number))
            .skip_while(|(_, line)| line.trim().is_empty())
            .collect()
    }

    /// Lines that continue a multi-line string literal.
    ///
    /// Their content belongs to the string, so blank-line normalization
    /// must leave them alone.
    pub fn string_continuation_lines(&self) -> BTreeSet<usize> {
        let mut lines = BTreeSet::new();
        let mut stack = vec![self.parsed.root()];
        while let Some(node) = stack.pop() {
            if matches!(node.kind(), "string" | "concatenated_string") {
                let (start, end) = (start_line(node), end_line(node));
                if end > start {
                    lines.extend(start + 1..=end);
                }
                continue;
            }
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }
        lines
    }

    /// Top-level statements that are neither declarations, imports, nor the docstring.
    pub fn leftover_statements(&self) -> Vec<Node<'_>> {
        self.parsed
            .statements()
            .into_iter()
            .enumerate()
            .filter(|(index, node)| {
                !(*index == 0 && is_docstring(*node))
                    && declaration_of(*node, self.source()).is_none()
                    && !is_import(*node)
            })
            .map(|(_, node)| node)
            .collect()
    }

    /// Declaration nodes in source order, paired with their declarations.
    pub fn declaration_nodes(&self) -> Vec<(Node<'_>, &Declaration)> {
        let mut decls = self.declarations.iter();
        self.parsed
            .statements()
            .into_iter()
            .filter(|node| declaration_of(*node, self.source()).is_some())
            .filter_map(|node| decls.next().map(|d| (node, d)))
            .collect()
    }

    /// The import block as emitted at the top of every generated file.
    pub fn import_block(&self) -> Vec<String> {
        self.imports.iter().map(|i| i.text.clone()).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
