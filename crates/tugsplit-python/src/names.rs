//! Identifier collection over tree-sitter trees.
//!
//! Two walks share one visitor:
//!
//! - [`collect_read_identifiers`] is the purely syntactic walk used by the
//!   dependency analyzer. Every identifier in a load position counts, in any
//!   scope. Binding positions (assignment targets, parameters, import
//!   aliases, `global` lists, attribute names, keyword-argument names) do not.
//! - [`scan_import_time`] follows only the code that runs when a module is
//!   imported: module body, class bodies, decorators, default values, base
//!   classes and annotations. It skips function and lambda bodies, and
//!   annotations too once `from __future__ import annotations` was seen. It
//!   records where the module binds each name, what it reads and which
//!   imports it executes, keyed by byte offset so a loader can replay them
//!   in execution order.

use std::collections::BTreeSet;

use tree_sitter::Node;

use crate::parse::{children_with_fields, node_text, start_line};

// ============================================================================
// Builtins
// ============================================================================

/// Names always bound through `builtins`.
pub const PYTHON_BUILTINS: &[&str] = &[
    // Functions
    "abs", "aiter", "all", "anext", "any", "ascii", "bin", "bool", "breakpoint", "bytearray",
    "bytes", "callable", "chr", "classmethod", "compile", "complex", "copyright", "credits",
    "delattr", "dict", "dir", "divmod", "enumerate", "eval", "exec", "exit", "filter", "float",
    "format", "frozenset", "getattr", "globals", "hasattr", "hash", "help", "hex", "id", "input",
    "int", "isinstance", "issubclass", "iter", "len", "license", "list", "locals", "map", "max",
    "memoryview", "min", "next", "object", "oct", "open", "ord", "pow", "print", "property",
    "quit", "range", "repr", "reversed", "round", "set", "setattr", "slice", "sorted",
    "staticmethod", "str", "sum", "super", "tuple", "type", "vars", "zip", "__import__",
    "__build_class__",
    // Constants
    "True", "False", "None", "Ellipsis", "NotImplemented", "__debug__",
    // Exceptions and warnings
    "BaseException", "BaseExceptionGroup", "Exception", "ExceptionGroup", "ArithmeticError",
    "AssertionError", "AttributeError", "BlockingIOError", "BrokenPipeError", "BufferError",
    "ChildProcessError", "ConnectionAbortedError", "ConnectionError", "ConnectionRefusedError",
    "ConnectionResetError", "EOFError", "EnvironmentError", "FileExistsError",
    "FileNotFoundError", "FloatingPointError", "GeneratorExit", "IOError", "ImportError",
    "IndentationError", "IndexError", "InterruptedError", "IsADirectoryError", "KeyError",
    "KeyboardInterrupt", "LookupError", "MemoryError", "ModuleNotFoundError", "NameError",
    "NotADirectoryError", "NotImplementedError", "OSError", "OverflowError",
    "PermissionError", "ProcessLookupError", "RecursionError", "ReferenceError",
    "RuntimeError", "StopAsyncIteration", "StopIteration", "SyntaxError", "SystemError",
    "SystemExit", "TabError", "TimeoutError", "TypeError", "UnboundLocalError",
    "UnicodeDecodeError", "UnicodeEncodeError", "UnicodeError", "UnicodeTranslateError",
    "ValueError", "ZeroDivisionError", "Warning", "BytesWarning", "DeprecationWarning",
    "EncodingWarning", "FutureWarning", "ImportWarning", "PendingDeprecationWarning",
    "ResourceWarning", "RuntimeWarning", "SyntaxWarning", "UnicodeWarning", "UserWarning",
];

/// Names every module namespace starts with.
const MODULE_DUNDERS: &[&str] = &[
    "__name__", "__file__", "__doc__", "__package__", "__spec__", "__loader__", "__path__",
    "__builtins__", "__annotations__", "__cached__", "__dict__",
];

/// Names every class body namespace starts with.
const CLASS_DUNDERS: &[&str] = &["__module__", "__qualname__"];

/// Check if a name is a Python builtin.
pub fn is_python_builtin(name: &str) -> bool {
    PYTHON_BUILTINS.contains(&name)
}

// ============================================================================
// Import Statements
// ============================================================================

/// One name in an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedName {
    /// Dotted name as written (`os.path`, `Widget`).
    pub name: String,
    pub alias: Option<String>,
}

/// Structured view of an `import` / `from … import` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// True for `from … import …`.
    pub is_from: bool,
    /// Number of leading dots (0 for absolute imports).
    pub level: usize,
    /// Dotted module after the dots, if any.
    pub module: Option<String>,
    pub names: Vec<ImportedName>,
    /// `from m import *`.
    pub star: bool,
}

impl ImportSpec {
    /// Names this statement binds in the importing namespace.
    pub fn bound_names(&self) -> Vec<String> {
        self.names
            .iter()
            .map(|n| match (&n.alias, self.is_from) {
                (Some(alias), _) => alias.clone(),
                (None, true) => n.name.clone(),
                (None, false) => n.name.split('.').next().unwrap_or(&n.name).to_string(),
            })
            .collect()
    }

    /// True when the import reaches above the current package (`from ..x`).
    pub fn escapes_package(&self) -> bool {
        self.level >= 2
    }
}

/// Parse an import statement node.
///
/// Returns `None` for any other node kind.
pub fn parse_import(node: Node<'_>, source: &str) -> Option<ImportSpec> {
    let is_from = match node.kind() {
        "import_statement" => false,
        "import_from_statement" | "future_import_statement" => true,
        _ => return None,
    };

    let mut spec = ImportSpec {
        is_from,
        level: 0,
        module: None,
        names: Vec::new(),
        star: false,
    };

    if node.kind() == "future_import_statement" {
        spec.module = Some("__future__".to_string());
    }

    for (field, child) in children_with_fields(node) {
        match (field, child.kind()) {
            (Some("module_name"), "relative_import") => {
                for part in children_with_fields(child) {
                    match part.1.kind() {
                        "import_prefix" => spec.level = node_text(part.1, source).matches('.').count(),
                        "dotted_name" => spec.module = Some(node_text(part.1, source).to_string()),
                        _ => {}
                    }
                }
            }
            (Some("module_name"), _) => spec.module = Some(node_text(child, source).to_string()),
            (Some("name"), "aliased_import") => {
                let name = child.child_by_field_name("name");
                let alias = child.child_by_field_name("alias");
                if let Some(name) = name {
                    spec.names.push(ImportedName {
                        name: node_text(name, source).to_string(),
                        alias: alias.map(|a| node_text(a, source).to_string()),
                    });
                }
            }
            (Some("name"), _) => spec.names.push(ImportedName {
                name: node_text(child, source).to_string(),
                alias: None,
            }),
            (_, "wildcard_import") => spec.star = true,
            _ => {}
        }
    }

    Some(spec)
}

// ============================================================================
// Walk Results
// ============================================================================

/// An identifier read at a specific line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRead {
    pub name: String,
    pub line: usize,
    /// Byte offset of the identifier.
    pub offset: usize,
    /// Inside the body of a `try` statement.
    pub guarded: bool,
}

/// A module-level name becoming bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSite {
    pub name: String,
    /// Byte offset from which the name counts as bound.
    ///
    /// The end of the binding statement, or the start of the outermost
    /// enclosing loop for bindings inside a loop body.
    pub offset: usize,
}

/// An import statement executed at import time.
#[derive(Debug, Clone)]
pub struct ImportSite {
    pub spec: ImportSpec,
    pub line: usize,
    /// Byte offset of the statement.
    pub offset: usize,
    pub guarded: bool,
}

/// What running a module body would touch.
#[derive(Debug, Clone, Default)]
pub struct ImportTimeScan {
    /// Names bound in the module namespace once the body finished.
    pub bindings: BTreeSet<String>,
    /// Where each module-level binding happens, module dunders at offset 0.
    pub binding_sites: Vec<BindingSite>,
    /// Reads not satisfied by a class body or comprehension scope.
    pub reads: Vec<NameRead>,
    /// Imports in execution order.
    pub imports: Vec<ImportSite>,
    /// The module performs a star import, so its namespace is open-ended.
    pub has_star_import: bool,
    /// `from __future__ import annotations` turned annotation evaluation off.
    pub lazy_annotations: bool,
}

// ============================================================================
// Entry Points
// ============================================================================

/// Collect every identifier read anywhere inside `node`.
///
/// Purely syntactic: a local that shadows a top-level name still counts.
pub fn collect_read_identifiers(node: Node<'_>, source: &str) -> BTreeSet<String> {
    let mut walker = NameWalker::new(source, false);
    walker.visit(node);
    walker.reads.into_iter().map(|r| r.name).collect()
}

/// Scan the code a module runs when imported.
pub fn scan_import_time(root: Node<'_>, source: &str) -> ImportTimeScan {
    let mut walker = NameWalker::new(source, true);
    walker.visit(root);

    let mut binding_sites: Vec<BindingSite> = MODULE_DUNDERS
        .iter()
        .map(|name| BindingSite {
            name: name.to_string(),
            offset: 0,
        })
        .collect();
    binding_sites.append(&mut walker.module_bindings);
    ImportTimeScan {
        bindings: binding_sites.iter().map(|b| b.name.clone()).collect(),
        binding_sites,
        reads: walker.reads,
        has_star_import: walker.imports.iter().any(|i| i.spec.star),
        imports: walker.imports,
        lazy_annotations: walker.lazy_annotations,
    }
}

// ============================================================================
// Walker
// ============================================================================

struct NameWalker<'s> {
    source: &'s str,
    import_time: bool,
    reads: Vec<NameRead>,
    module_bindings: Vec<BindingSite>,
    imports: Vec<ImportSite>,
    /// Class-body and comprehension namespaces, innermost last.
    scopes: Vec<BTreeSet<String>>,
    guarded_depth: usize,
    /// Start of the outermost loop being walked.
    loop_start: Option<usize>,
    lazy_annotations: bool,
}

impl<'s> NameWalker<'s> {
    fn new(source: &'s str, import_time: bool) -> Self {
        NameWalker {
            source,
            import_time,
            reads: Vec::new(),
            module_bindings: Vec::new(),
            imports: Vec::new(),
            scopes: Vec::new(),
            guarded_depth: 0,
            loop_start: None,
            lazy_annotations: false,
        }
    }

    /// Annotations run at import time unless postponed.
    fn evaluates_annotations(&self) -> bool {
        !self.import_time || !self.lazy_annotations
    }

    fn text(&self, node: Node<'_>) -> String {
        node_text(node, self.source).to_string()
    }

    fn read(&mut self, node: Node<'_>) {
        let name = self.text(node);
        if self.import_time && self.scopes.iter().any(|scope| scope.contains(&name)) {
            return;
        }
        self.reads.push(NameRead {
            name,
            line: start_line(node),
            offset: node.start_byte(),
            guarded: self.guarded_depth > 0,
        });
    }

    /// Bind `name` in the innermost scope, effective from byte `at`.
    fn bind(&mut self, name: String, at: usize) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name);
            }
            None => {
                let offset = self.loop_start.map_or(at, |start| start.min(at));
                self.module_bindings.push(BindingSite { name, offset });
            }
        }
    }

    /// Walk `node` as part of a loop body.
    fn visit_in_loop(&mut self, node: Node<'_>, loop_start: usize) {
        let outer = self.loop_start;
        self.loop_start = Some(outer.unwrap_or(loop_start));
        self.visit(node);
        self.loop_start = outer;
    }

    fn visit_children(&mut self, node: Node<'_>) {
        for (_, child) in children_with_fields(node) {
            self.visit(child);
        }
    }

    fn visit_field(&mut self, node: Node<'_>, field: &str) {
        if let Some(child) = node.child_by_field_name(field) {
            self.visit(child);
        }
    }

    fn visit(&mut self, node: Node<'_>) {
        match node.kind() {
            "comment" => {}
            "identifier" => self.read(node),
            "attribute" => self.visit_field(node, "object"),
            "keyword_argument" => self.visit_field(node, "value"),
            "global_statement" | "nonlocal_statement" => {}
            "import_statement" | "import_from_statement" | "future_import_statement" => {
                self.visit_import(node)
            }
            "decorated_definition" => self.visit_children(node),
            "function_definition" => self.visit_function(node),
            "class_definition" => self.visit_class(node),
            "lambda" => {
                if let Some(params) = node.child_by_field_name("parameters") {
                    self.visit_parameters(params);
                }
                if !self.import_time {
                    self.visit_field(node, "body");
                }
            }
            "assignment" => {
                self.visit_field(node, "right");
                if self.evaluates_annotations() {
                    self.visit_field(node, "type");
                }
                // A bare annotation binds nothing.
                if let Some(left) = node.child_by_field_name("left") {
                    if node.child_by_field_name("right").is_some() {
                        self.visit_target(left, node.end_byte());
                    } else if left.kind() != "identifier" {
                        self.visit(left);
                    }
                }
            }
            "augmented_assignment" => {
                if let Some(left) = node.child_by_field_name("left") {
                    // `x += 1` needs `x` bound when it runs.
                    if self.import_time && left.kind() == "identifier" {
                        self.read(left);
                    }
                }
                self.visit_field(node, "right");
                if let Some(left) = node.child_by_field_name("left") {
                    self.visit_target(left, node.end_byte());
                }
            }
            "for_statement" | "for_in_clause" => {
                self.visit_field(node, "right");
                if let Some(left) = node.child_by_field_name("left") {
                    let at = node
                        .child_by_field_name("right")
                        .map_or(left.end_byte(), |right| right.end_byte());
                    self.visit_target(left, at);
                }
                for (field, child) in children_with_fields(node) {
                    if matches!(field, Some("left") | Some("right")) {
                        continue;
                    }
                    if node.kind() == "for_statement" {
                        self.visit_in_loop(child, node.start_byte());
                    } else {
                        self.visit(child);
                    }
                }
            }
            "while_statement" => {
                self.visit_field(node, "condition");
                for (field, child) in children_with_fields(node) {
                    if field != Some("condition") {
                        self.visit_in_loop(child, node.start_byte());
                    }
                }
            }
            "list_comprehension" | "set_comprehension" | "dictionary_comprehension"
            | "generator_expression" => self.visit_comprehension(node),
            "named_expression" => {
                self.visit_field(node, "value");
                if let Some(name) = node.child_by_field_name("name") {
                    let name = self.text(name);
                    self.bind(name, node.end_byte());
                }
            }
            "with_item" if node.child_by_field_name("alias").is_some() => {
                self.visit_field(node, "value");
                if let Some(alias) = node.child_by_field_name("alias") {
                    self.visit_target(alias, node.end_byte());
                }
            }
            "as_pattern" => {
                for (field, child) in children_with_fields(node) {
                    if field == Some("alias") || child.kind() == "as_pattern_target" {
                        self.visit_target(child, node.end_byte());
                    } else {
                        self.visit(child);
                    }
                }
            }
            "except_clause" => {
                let mut after_as = false;
                for (_, child) in children_with_fields(node) {
                    if child.kind() == "as" {
                        after_as = true;
                    } else if after_as && child.is_named() {
                        self.visit_target(child, child.end_byte());
                        after_as = false;
                    } else {
                        self.visit(child);
                    }
                }
            }
            "delete_statement" => {
                for (_, child) in children_with_fields(node) {
                    if child.is_named() {
                        self.visit_target(child, node.end_byte());
                    }
                }
            }
            "try_statement" => {
                for (field, child) in children_with_fields(node) {
                    if field == Some("body") {
                        self.guarded_depth += 1;
                        self.visit(child);
                        self.guarded_depth -= 1;
                    } else {
                        self.visit(child);
                    }
                }
            }
            _ => self.visit_children(node),
        }
    }

    /// Visit an assignment-like target: bare names bind from byte `at`,
    /// everything else reads.
    fn visit_target(&mut self, node: Node<'_>, at: usize) {
        match node.kind() {
            "identifier" => {
                let name = self.text(node);
                self.bind(name, at);
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
            | "parenthesized_expression" | "list_splat_pattern" | "list_splat"
            | "as_pattern_target" | "expression_list" => {
                for (_, child) in children_with_fields(node) {
                    if child.is_named() {
                        self.visit_target(child, at);
                    }
                }
            }
            _ => self.visit(node),
        }
    }

    fn visit_import(&mut self, node: Node<'_>) {
        let Some(spec) = parse_import(node, self.source) else {
            return;
        };
        if spec.module.as_deref() == Some("__future__")
            && spec.names.iter().any(|n| n.name == "annotations")
        {
            self.lazy_annotations = true;
        }
        for name in spec.bound_names() {
            self.bind(name, node.end_byte());
        }
        if self.import_time {
            self.imports.push(ImportSite {
                line: start_line(node),
                offset: node.start_byte(),
                guarded: self.guarded_depth > 0,
                spec,
            });
        }
    }

    fn visit_function(&mut self, node: Node<'_>) {
        if let Some(params) = node.child_by_field_name("parameters") {
            self.visit_parameters(params);
        }
        if self.evaluates_annotations() {
            self.visit_field(node, "return_type");
        }
        if !self.import_time {
            self.visit_field(node, "body");
        }
        if let Some(name) = node.child_by_field_name("name") {
            let name = self.text(name);
            self.bind(name, node.end_byte());
        }
    }

    fn visit_class(&mut self, node: Node<'_>) {
        self.visit_field(node, "superclasses");
        if self.import_time {
            self.scopes
                .push(CLASS_DUNDERS.iter().map(|s| s.to_string()).collect());
            self.visit_field(node, "body");
            self.scopes.pop();
        } else {
            self.visit_field(node, "body");
        }
        if let Some(name) = node.child_by_field_name("name") {
            let name = self.text(name);
            self.bind(name, node.end_byte());
        }
    }

    /// Parameter names bind in the function scope; defaults and annotations
    /// are evaluated in the enclosing scope.
    fn visit_parameters(&mut self, params: Node<'_>) {
        for (_, param) in children_with_fields(params) {
            match param.kind() {
                "default_parameter" => self.visit_field(param, "value"),
                "typed_parameter" => {
                    if self.evaluates_annotations() {
                        self.visit_field(param, "type");
                    }
                }
                "typed_default_parameter" => {
                    if self.evaluates_annotations() {
                        self.visit_field(param, "type");
                    }
                    self.visit_field(param, "value");
                }
                _ => {}
            }
        }
    }

    fn visit_comprehension(&mut self, node: Node<'_>) {
        if !self.import_time {
            self.visit_children(node);
            return;
        }
        let mut targets = BTreeSet::new();
        for (_, child) in children_with_fields(node) {
            if child.kind() == "for_in_clause" {
                if let Some(left) = child.child_by_field_name("left") {
                    collect_target_names(left, self.source, &mut targets);
                }
            }
        }
        self.scopes.push(targets);
        self.visit_children(node);
        self.scopes.pop();
    }
}

fn collect_target_names(node: Node<'_>, source: &str, out: &mut BTreeSet<String>) {
    if node.kind() == "identifier" {
        out.insert(node_text(node, source).to_string());
        return;
    }
    if matches!(
        node.kind(),
        "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
            | "parenthesized_expression" | "list_splat_pattern"
    ) {
        for (_, child) in children_with_fields(node) {
            collect_target_names(child, source, out);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
