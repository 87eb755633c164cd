//! Python name validation.
//!
//! Group names from a grouping config become module file names, so they must
//! be importable identifiers and must not collide with the files the emitter
//! always writes.

use thiserror::Error;

/// Error for validation failures.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Invalid Python identifier name.
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Python keywords that cannot be used as identifiers.
pub const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
    "with", "yield",
];

/// Module names the emitter writes in every layout.
pub const RESERVED_MODULE_NAMES: &[&str] = &["__init__", "main"];

/// Check if a name is a Python keyword.
pub fn is_python_keyword(name: &str) -> bool {
    PYTHON_KEYWORDS.contains(&name)
}

/// Validate that a string is a valid Python identifier.
///
/// ```
/// use tugsplit_python::validation::validate_python_identifier;
///
/// assert!(validate_python_identifier("models").is_ok());
/// assert!(validate_python_identifier("_private").is_ok());
/// assert!(validate_python_identifier("").is_err());
/// assert!(validate_python_identifier("2fast").is_err());
/// assert!(validate_python_identifier("class").is_err());
/// ```
pub fn validate_python_identifier(name: &str) -> ValidationResult<()> {
    let invalid = |reason: String| ValidationError::InvalidName {
        name: name.to_string(),
        reason,
    };

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(invalid("name cannot be empty".to_string()));
    };
    if !first.is_alphabetic() && first != '_' {
        return Err(invalid("must start with letter or underscore".to_string()));
    }
    if let Some(ch) = chars.find(|ch| !ch.is_alphanumeric() && *ch != '_') {
        return Err(invalid(format!("invalid character: '{}'", ch)));
    }
    if is_python_keyword(name) {
        return Err(invalid("cannot use Python keyword as identifier".to_string()));
    }
    Ok(())
}

/// Validate a name that will become a module inside the generated package.
pub fn validate_module_name(name: &str) -> ValidationResult<()> {
    validate_python_identifier(name)?;
    if RESERVED_MODULE_NAMES.contains(&name) {
        return Err(ValidationError::InvalidName {
            name: name.to_string(),
            reason: "name is reserved for a generated module".to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod identifiers {
        use super::*;

        #[test]
        fn accepts_plain_and_underscored_names() {
            for name in ["core", "_util", "Models2", "über"] {
                assert!(validate_python_identifier(name).is_ok(), "{name}");
            }
        }

        #[test]
        fn rejects_bad_leading_character() {
            let err = validate_python_identifier("9lives").unwrap_err();
            assert!(err.to_string().contains("must start with"));
        }

        #[test]
        fn rejects_punctuation() {
            let err = validate_python_identifier("my-group").unwrap_err();
            assert!(err.to_string().contains("'-'"));
        }

        #[test]
        fn rejects_keywords() {
            assert!(validate_python_identifier("import").is_err());
            assert!(is_python_keyword("lambda"));
            assert!(!is_python_keyword("match"));
        }
    }

    mod module_names {
        use super::*;

        #[test]
        fn reserved_names_are_rejected() {
            assert!(validate_module_name("main").is_err());
            assert!(validate_module_name("__init__").is_err());
        }

        #[test]
        fn ordinary_names_pass() {
            assert!(validate_module_name("services").is_ok());
        }
    }
}
