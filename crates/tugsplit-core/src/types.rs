//! Common types shared between the pipeline stages and the output module.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Declarations
// ============================================================================

/// Kind of a top-level declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationKind {
    Class,
    Function,
}

impl DeclarationKind {
    /// Plural noun used in report messages ("classes", "functions").
    pub fn plural(&self) -> &'static str {
        match self {
            DeclarationKind::Class => "classes",
            DeclarationKind::Function => "functions",
        }
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationKind::Class => write!(f, "class"),
            DeclarationKind::Function => write!(f, "function"),
        }
    }
}

/// A top-level class or function declaration and its source span.
///
/// `start_line` includes any decorator lines. Lines are 1-indexed and the
/// span is inclusive. A declaration without an `end_line` is never split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub name: String,
    pub start_line: usize,
    pub end_line: Option<usize>,
}

impl Declaration {
    pub fn new(kind: DeclarationKind, name: impl Into<String>, start_line: usize, end_line: usize) -> Self {
        Declaration {
            kind,
            name: name.into(),
            start_line,
            end_line: Some(end_line),
        }
    }

    /// True when the span can be extracted.
    pub fn is_splittable(&self) -> bool {
        self.end_line.is_some_and(|end| end >= self.start_line)
    }

    /// Inclusive line range, if known.
    pub fn span(&self) -> Option<(usize, usize)> {
        self.end_line.map(|end| (self.start_line, end))
    }
}

// ============================================================================
// Content Hash
// ============================================================================

/// SHA-256 content hash, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute SHA-256 hash of the given bytes, returning hex-encoded string.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Emitted Files
// ============================================================================

/// What an emitted file is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    /// One class (default mode) or one configured group.
    Unit,
    /// The shared functions module (default mode).
    Functions,
    /// The shrunk original module inside the package.
    Residual,
    /// Leftover top-level statements.
    Main,
    /// The package `__init__.py`.
    PackageInit,
    /// The re-export module at the original file's location.
    Interface,
}

/// A file written by the emitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmittedFile {
    /// Path relative to the output directory.
    pub path: String,
    pub role: FileRole,
    pub bytes: u64,
    pub sha256: ContentHash,
}

impl EmittedFile {
    pub fn new(path: impl Into<String>, role: FileRole, content: &str) -> Self {
        EmittedFile {
            path: path.into(),
            role,
            bytes: content.len() as u64,
            sha256: ContentHash::compute(content.as_bytes()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_sha256_hex() {
        let hash = ContentHash::compute(b"");
        assert_eq!(
            hash.0,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn declaration_without_end_is_not_splittable() {
        let mut decl = Declaration::new(DeclarationKind::Class, "A", 3, 9);
        assert!(decl.is_splittable());
        assert_eq!(decl.span(), Some((3, 9)));
        decl.end_line = None;
        assert!(!decl.is_splittable());
        assert_eq!(decl.span(), None);
    }

    #[test]
    fn emitted_file_records_size_and_hash() {
        let file = EmittedFile::new("pkg/A.py", FileRole::Unit, "class A:\n    pass\n");
        assert_eq!(file.bytes, 18);
        assert_eq!(file.sha256, ContentHash::compute(b"class A:\n    pass\n"));
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&DeclarationKind::Function).unwrap();
        assert_eq!(json, "\"function\"");
        assert_eq!(DeclarationKind::Class.plural(), "classes");
    }
}
