//! Python parsing via tree-sitter.
//!
//! Wraps a tree-sitter tree together with the source it was parsed from, so
//! nodes can be resolved to text and 1-indexed lines without threading the
//! source through every call.
//!
//! Acceptance is decided by `rustpython-parser`, which reports the errors
//! CPython reports (indentation, missing block bodies, Python 2 statements).
//! tree-sitter then supplies the concrete tree with byte-exact spans. A
//! tree-sitter parse with any `ERROR` or `MISSING` node is rejected as well,
//! since the grammar recovers from errors silently.

use rustpython_parser::{ast, Parse};
use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

// ============================================================================
// Error Types
// ============================================================================

/// Error from parsing Python source.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Source is not valid Python.
    #[error("syntax error at {line}:{col}: {message}")]
    Syntax { line: u32, col: u32, message: String },

    /// The grammar could not be loaded or the parser gave up.
    #[error("parser unavailable: {0}")]
    ParserUnavailable(String),
}

/// Result type for parse operations.
pub type ParseResult<T> = Result<T, ParseError>;

// ============================================================================
// Parsed Module
// ============================================================================

/// A parsed Python module.
pub struct ParsedModule {
    source: String,
    tree: Tree,
}

impl std::fmt::Debug for ParsedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedModule")
            .field("bytes", &self.source.len())
            .finish()
    }
}

impl ParsedModule {
    /// Parse `source`, rejecting any syntax error.
    pub fn parse(source: impl Into<String>) -> ParseResult<Self> {
        let source = source.into();
        check_syntax_strict(&source)?;

        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::language())
            .map_err(|e| ParseError::ParserUnavailable(e.to_string()))?;
        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| ParseError::ParserUnavailable("parse returned no tree".to_string()))?;

        if let Some(err) = first_syntax_error(tree.root_node(), &source) {
            return Err(err);
        }
        Ok(ParsedModule { source, tree })
    }

    /// The module source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The `module` root node.
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Top-level statements, comments excluded.
    pub fn statements(&self) -> Vec<Node<'_>> {
        let root = self.root();
        let mut cursor = root.walk();
        root.named_children(&mut cursor)
            .filter(|n| n.kind() != "comment")
            .collect()
    }

    /// Source text of a node.
    pub fn text(&self, node: Node<'_>) -> &str {
        node_text(node, &self.source)
    }
}

// ============================================================================
// Node Helpers
// ============================================================================

/// Source text of a node, or `""` if the byte range is not a valid slice.
pub fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// 1-indexed first line of a node.
pub fn start_line(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

/// 1-indexed last line of a node.
///
/// A node ending at column 0 ends on the previous line (its final newline
/// belongs to it, the next line does not).
pub fn end_line(node: Node<'_>) -> usize {
    let start = node.start_position();
    let end = node.end_position();
    if end.column == 0 && end.row > start.row {
        end.row
    } else {
        end.row + 1
    }
}

/// Children of a node paired with the field name they occupy.
pub fn children_with_fields<'t>(node: Node<'t>) -> Vec<(Option<&'static str>, Node<'t>)> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    if cursor.goto_first_child() {
        loop {
            out.push((cursor.field_name(), cursor.node()));
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }
    out
}

/// Reject anything CPython's parser would reject.
pub fn check_syntax_strict(source: &str) -> ParseResult<()> {
    match ast::Suite::parse(source, "<module>") {
        Ok(_) => Ok(()),
        Err(err) => {
            let (line, col) = line_col_at(source, err.offset.into());
            Err(ParseError::Syntax {
                line,
                col,
                message: err.error.to_string(),
            })
        }
    }
}

/// 1-based line and column of a byte offset, clamped to the source.
fn line_col_at(source: &str, offset: usize) -> (u32, u32) {
    let mut line = 1;
    let mut col = 1;
    for (index, ch) in source.char_indices() {
        if index >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Locate the first `ERROR` or `MISSING` node in document order.
pub fn first_syntax_error(root: Node<'_>, source: &str) -> Option<ParseError> {
    if !root.has_error() {
        return None;
    }
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            let message = if node.is_missing() {
                format!("missing `{}`", node.kind())
            } else {
                let snippet: String = node_text(node, source)
                    .lines()
                    .next()
                    .unwrap_or("")
                    .chars()
                    .take(40)
                    .collect();
                format!("invalid syntax near `{}`", snippet.trim())
            };
            return Some(ParseError::Syntax {
                line: pos.row as u32 + 1,
                col: pos.column as u32 + 1,
                message,
            });
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        for child in children.into_iter().rev() {
            if child.has_error() || child.is_missing() {
                stack.push(child);
            }
        }
    }
    // has_error() was set but no node was flagged; report the root.
    Some(ParseError::Syntax {
        line: 1,
        col: 1,
        message: "invalid syntax".to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================
