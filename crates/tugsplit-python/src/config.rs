//! Grouping configuration.
//!
//! A grouping config names the output modules and the declarations each one
//! receives:
//!
//! ```json
//! {
//!   "modules": {
//!     "core": {"classes": ["Engine", "Part"], "functions": ["build"]},
//!     "io":   {"functions": ["load", "save"]}
//!   },
//!   "unassigned": "residual"
//! }
//! ```
//!
//! Groups keep their file order. `unassigned` decides what happens to a
//! declaration no group mentions: `"drop"` (the default) leaves it out of
//! the split layout, `"residual"` keeps it in the residual module.
//!
//! Every problem here is fatal and is reported before any file is written.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use tugsplit_core::error::SplitError;

use crate::validation::validate_module_name;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from loading a grouping config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a valid grouping config: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: group '{group}' is malformed: {source}")]
    InvalidGroup {
        path: String,
        group: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: bad group name: {reason}")]
    InvalidGroupName { path: String, reason: String },

    #[error("{path}: '{name}' is assigned to both '{first}' and '{second}'")]
    DuplicateAssignment {
        path: String,
        name: String,
        first: String,
        second: String,
    },
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    fn path(&self) -> &str {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::InvalidGroup { path, .. }
            | ConfigError::InvalidGroupName { path, .. }
            | ConfigError::DuplicateAssignment { path, .. } => path,
        }
    }
}

impl From<ConfigError> for SplitError {
    fn from(err: ConfigError) -> Self {
        SplitError::InvalidConfig {
            path: err.path().to_string(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Config Types
// ============================================================================

/// What to do with declarations no group mentions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnassignedPolicy {
    /// Leave them out of the layout; validation reports them missing.
    #[default]
    Drop,
    /// Keep them in the residual module.
    Residual,
}

/// One named output module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub name: String,
    pub classes: Vec<String>,
    pub functions: Vec<String>,
}

impl Group {
    /// Classes then functions, as listed.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.classes
            .iter()
            .chain(self.functions.iter())
            .map(String::as_str)
    }
}

/// A validated grouping config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupConfig {
    pub groups: Vec<Group>,
    pub unassigned: UnassignedPolicy,
}

#[derive(Deserialize)]
struct RawConfig {
    modules: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    unassigned: UnassignedPolicy,
}

#[derive(Deserialize)]
struct RawGroup {
    #[serde(default)]
    classes: Vec<String>,
    #[serde(default)]
    functions: Vec<String>,
}

// ============================================================================
// Loading
// ============================================================================

impl GroupConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let origin = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: origin.clone(),
            source,
        })?;
        Self::from_json(&text, &origin)
    }

    /// Parse and validate config text. `origin` names the source in errors.
    pub fn from_json(text: &str, origin: &str) -> ConfigResult<Self> {
        let raw: RawConfig = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;

        let mut groups = Vec::with_capacity(raw.modules.len());
        for (name, value) in raw.modules {
            validate_module_name(&name).map_err(|e| ConfigError::InvalidGroupName {
                path: origin.to_string(),
                reason: e.to_string(),
            })?;
            let group: RawGroup =
                serde_json::from_value(value).map_err(|source| ConfigError::InvalidGroup {
                    path: origin.to_string(),
                    group: name.clone(),
                    source,
                })?;
            groups.push(Group {
                name,
                classes: group.classes,
                functions: group.functions,
            });
        }

        let config = GroupConfig {
            groups,
            unassigned: raw.unassigned,
        };
        config.check_unique(origin)?;
        debug!(
            "Loaded grouping config {} with {} groups",
            origin,
            config.groups.len()
        );
        Ok(config)
    }

    /// Every name may appear at most once across all groups.
    fn check_unique(&self, origin: &str) -> ConfigResult<()> {
        let mut owner: BTreeMap<&str, &str> = BTreeMap::new();
        for group in &self.groups {
            for name in group.members() {
                if let Some(first) = owner.insert(name, group.name.as_str()) {
                    return Err(ConfigError::DuplicateAssignment {
                        path: origin.to_string(),
                        name: name.to_string(),
                        first: first.to_string(),
                        second: group.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod parsing {
        use super::*;

        #[test]
        fn groups_keep_file_order() {
            let config = GroupConfig::from_json(
                r#"{"modules": {"zeta": {"classes": ["Z"]}, "alpha": {"functions": ["a"]}}}"#,
                "groups.json",
            )
            .unwrap();
            let names: Vec<&str> = config.groups.iter().map(|g| g.name.as_str()).collect();
            assert_eq!(names, vec!["zeta", "alpha"]);
            assert_eq!(config.unassigned, UnassignedPolicy::Drop);
            assert!(config.groups[1].classes.is_empty());
        }

        #[test]
        fn unassigned_policy_is_read() {
            let config = GroupConfig::from_json(
                r#"{"modules": {}, "unassigned": "residual"}"#,
                "groups.json",
            )
            .unwrap();
            assert_eq!(config.unassigned, UnassignedPolicy::Residual);
        }
    }

    mod rejection {
        use super::*;

        #[test]
        fn missing_modules_key() {
            let err = GroupConfig::from_json(r#"{"groups": {}}"#, "groups.json").unwrap_err();
            assert!(matches!(err, ConfigError::Parse { .. }));
            assert!(err.to_string().contains("modules"));
        }

        #[test]
        fn invalid_json() {
            let err = GroupConfig::from_json("{not json", "groups.json").unwrap_err();
            assert!(matches!(err, ConfigError::Parse { .. }));
        }

        #[test]
        fn malformed_group_body() {
            let err = GroupConfig::from_json(r#"{"modules": {"core": {"classes": "A"}}}"#, "g.json")
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidGroup { ref group, .. } if group == "core"));
        }

        #[test]
        fn group_names_must_be_identifiers() {
            let err = GroupConfig::from_json(r#"{"modules": {"my-group": {}}}"#, "g.json")
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidGroupName { .. }));
        }

        #[test]
        fn reserved_group_names() {
            let err =
                GroupConfig::from_json(r#"{"modules": {"main": {}}}"#, "g.json").unwrap_err();
            assert!(err.to_string().contains("reserved"));
        }

        #[test]
        fn duplicate_assignment_across_groups() {
            let err = GroupConfig::from_json(
                r#"{"modules": {"a": {"classes": ["X"]}, "b": {"classes": ["X"]}}}"#,
                "g.json",
            )
            .unwrap_err();
            assert_eq!(err.to_string(), "g.json: 'X' is assigned to both 'a' and 'b'");
        }

        #[test]
        fn unreadable_file() {
            let err = GroupConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
            assert!(matches!(err, ConfigError::Read { .. }));
        }

        #[test]
        fn bridges_to_invalid_config() {
            let err = GroupConfig::from_json("[]", "g.json").unwrap_err();
            let split: SplitError = err.into();
            assert_eq!(split.error_kind(), "InvalidConfig");
        }
    }
}
