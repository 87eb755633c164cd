//! Python interpreter discovery for interpreter-mode import checks.
//!
//! ## Resolution Order
//!
//! 1. Explicit path (`--python`)
//! 2. `$TUGSPLIT_PYTHON`
//! 3. `$VIRTUAL_ENV/bin/python`
//! 4. `$CONDA_PREFIX/bin/python`
//! 5. `python3` / `python` from `$PATH`
//!
//! The first candidate reporting version 3.8 or newer wins. An explicit path
//! that fails validation is an error; every other candidate just falls
//! through to the next step, and the steps tried are kept in a
//! [`ResolutionTrace`] for the error message.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use tugsplit_core::error::SplitError;

// ============================================================================
// Error Types
// ============================================================================

/// A single step in the resolution process.
#[derive(Debug, Clone)]
pub struct ResolutionStep {
    /// Source being checked (e.g., "$TUGSPLIT_PYTHON", "$PATH").
    pub source: String,
    pub found: Option<PathBuf>,
    pub version: Option<String>,
    pub failure_reason: Option<String>,
}

impl ResolutionStep {
    /// The source was not configured (env var not set, etc).
    pub fn not_set(source: impl Into<String>) -> Self {
        ResolutionStep {
            source: source.into(),
            found: None,
            version: None,
            failure_reason: Some("not set".to_string()),
        }
    }

    /// The source was configured but no interpreter was there.
    pub fn not_found(source: impl Into<String>) -> Self {
        ResolutionStep {
            source: source.into(),
            found: None,
            version: None,
            failure_reason: Some("not found".to_string()),
        }
    }

    fn rejected(source: &str, path: &Path, version: Option<String>, reason: impl Into<String>) -> Self {
        ResolutionStep {
            source: source.to_string(),
            found: Some(path.to_path_buf()),
            version,
            failure_reason: Some(reason.into()),
        }
    }
}

impl std::fmt::Display for ResolutionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: ", self.source)?;
        if let Some(ref path) = self.found {
            write!(f, "found {}", path.display())?;
            if let Some(ref version) = self.version {
                write!(f, " ({})", version)?;
            }
            if let Some(ref reason) = self.failure_reason {
                write!(f, " - {}", reason)?;
            }
        } else if let Some(ref reason) = self.failure_reason {
            write!(f, "{}", reason)?;
        }
        Ok(())
    }
}

/// Trace of all resolution steps attempted.
#[derive(Debug, Clone, Default)]
pub struct ResolutionTrace {
    pub steps: Vec<ResolutionStep>,
}

impl ResolutionTrace {
    pub fn add(&mut self, step: ResolutionStep) {
        self.steps.push(step);
    }

    /// Numbered, one step per line.
    pub fn format_trace(&self) -> String {
        let mut output = String::new();
        for (i, step) in self.steps.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, step));
        }
        output
    }
}

/// Errors that can occur during interpreter resolution.
#[derive(Debug, Error)]
pub enum PythonEnvError {
    #[error("no usable Python interpreter found; searched:\n{}", .trace.format_trace())]
    PythonNotFound { trace: ResolutionTrace },

    #[error("Python version {found} is too old (minimum: {minimum})")]
    VersionTooOld { found: String, minimum: String },

    #[error("failed to execute Python at {path}: {reason}")]
    ExecutionFailed { path: PathBuf, reason: String },

    #[error("invalid Python version string: {version}")]
    InvalidVersion { version: String },
}

/// Result type for interpreter resolution.
pub type PythonEnvResult<T> = Result<T, PythonEnvError>;

impl From<PythonEnvError> for SplitError {
    fn from(err: PythonEnvError) -> Self {
        SplitError::InvalidArguments {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Python Version
// ============================================================================

/// Parsed Python version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PythonVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        PythonVersion {
            major,
            minor,
            patch,
        }
    }

    /// Oldest interpreter the import check supports (3.8.0).
    pub fn minimum() -> Self {
        PythonVersion::new(3, 8, 0)
    }

    /// Parse a version string like "3.11.4" or "Python 3.11.4".
    pub fn parse(version_str: &str) -> PythonEnvResult<Self> {
        let version_str = version_str
            .strip_prefix("Python ")
            .unwrap_or(version_str)
            .trim();
        let invalid = || PythonEnvError::InvalidVersion {
            version: version_str.to_string(),
        };

        let mut parts = version_str.split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        let minor = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        // Patch may carry a suffix like "4+" or "0rc1"
        let patch = parts
            .next()
            .map(|p| {
                p.chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
            })
            .and_then(|digits| digits.parse::<u32>().ok())
            .unwrap_or(0);

        Ok(PythonVersion::new(major, minor, patch))
    }

    pub fn meets_minimum(&self) -> bool {
        *self >= Self::minimum()
    }
}

impl std::fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Where the interpreter was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Explicit,
    EnvTugsplitPython,
    VirtualEnv,
    CondaPrefix,
    Path,
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionSource::Explicit => write!(f, "--python flag"),
            ResolutionSource::EnvTugsplitPython => write!(f, "$TUGSPLIT_PYTHON"),
            ResolutionSource::VirtualEnv => write!(f, "$VIRTUAL_ENV"),
            ResolutionSource::CondaPrefix => write!(f, "$CONDA_PREFIX"),
            ResolutionSource::Path => write!(f, "$PATH"),
        }
    }
}

/// A validated interpreter.
#[derive(Debug, Clone, Serialize)]
pub struct PythonEnv {
    pub interpreter: PathBuf,
    pub version: PythonVersion,
    pub source: ResolutionSource,
}

#[cfg(windows)]
const PYTHON_NAMES: &[&str] = &["python.exe", "python3.exe"];
#[cfg(not(windows))]
const PYTHON_NAMES: &[&str] = &["python3", "python"];

#[cfg(windows)]
const VENV_BIN_DIR: &str = "Scripts";
#[cfg(not(windows))]
const VENV_BIN_DIR: &str = "bin";

/// Resolve an interpreter, honouring an explicit path first.
pub fn resolve_python(explicit: Option<&Path>) -> PythonEnvResult<PythonEnv> {
    if let Some(path) = explicit {
        let canonical = path
            .canonicalize()
            .map_err(|_| PythonEnvError::ExecutionFailed {
                path: path.to_path_buf(),
                reason: "path does not exist".to_string(),
            })?;
        let version = get_python_version(&canonical)?;
        if !version.meets_minimum() {
            return Err(PythonEnvError::VersionTooOld {
                found: version.to_string(),
                minimum: PythonVersion::minimum().to_string(),
            });
        }
        return Ok(PythonEnv {
            interpreter: canonical,
            version,
            source: ResolutionSource::Explicit,
        });
    }

    let mut trace = ResolutionTrace::default();

    match std::env::var("TUGSPLIT_PYTHON") {
        Ok(value) => {
            let path = PathBuf::from(value);
            if let Some(env) = try_candidate(&path, ResolutionSource::EnvTugsplitPython, &mut trace) {
                return Ok(env);
            }
        }
        Err(_) => trace.add(ResolutionStep::not_set("$TUGSPLIT_PYTHON")),
    }

    for (var, source) in [
        ("VIRTUAL_ENV", ResolutionSource::VirtualEnv),
        ("CONDA_PREFIX", ResolutionSource::CondaPrefix),
    ] {
        let Ok(prefix) = std::env::var(var) else {
            trace.add(ResolutionStep::not_set(format!("${}", var)));
            continue;
        };
        let bin = PathBuf::from(prefix).join(VENV_BIN_DIR);
        let candidates: Vec<PathBuf> = PYTHON_NAMES
            .iter()
            .map(|name| bin.join(name))
            .filter(|p| p.exists())
            .collect();
        if candidates.is_empty() {
            trace.add(ResolutionStep::not_found(format!("${}", var)));
        }
        for candidate in candidates {
            if let Some(env) = try_candidate(&candidate, source, &mut trace) {
                return Ok(env);
            }
        }
    }

    let on_path: Vec<PathBuf> = PYTHON_NAMES
        .iter()
        .filter_map(|name| which::which(name).ok())
        .collect();
    if on_path.is_empty() {
        trace.add(ResolutionStep::not_found("$PATH (python3/python)"));
    }
    for candidate in on_path {
        if let Some(env) = try_candidate(&candidate, ResolutionSource::Path, &mut trace) {
            return Ok(env);
        }
    }

    Err(PythonEnvError::PythonNotFound { trace })
}

/// Validate one candidate, recording why it was rejected.
fn try_candidate(path: &Path, source: ResolutionSource, trace: &mut ResolutionTrace) -> Option<PythonEnv> {
    let label = source.to_string();
    let Ok(canonical) = path.canonicalize() else {
        trace.add(ResolutionStep::rejected(&label, path, None, "path does not exist"));
        return None;
    };
    if !is_executable(&canonical) {
        trace.add(ResolutionStep::rejected(&label, &canonical, None, "not executable"));
        return None;
    }
    let version = match get_python_version(&canonical) {
        Ok(v) => v,
        Err(e) => {
            trace.add(ResolutionStep::rejected(&label, &canonical, None, e.to_string()));
            return None;
        }
    };
    if !version.meets_minimum() {
        trace.add(ResolutionStep::rejected(
            &label,
            &canonical,
            Some(version.to_string()),
            format!("version too old (need {}+)", PythonVersion::minimum()),
        ));
        return None;
    }
    debug!("Resolved Python {} at {} via {}", version, canonical.display(), label);
    Some(PythonEnv {
        interpreter: canonical,
        version,
        source,
    })
}

/// Get the version by running `python --version`.
pub fn get_python_version(python_path: &Path) -> PythonEnvResult<PythonVersion> {
    let output = Command::new(python_path)
        .arg("--version")
        .output()
        .map_err(|e| PythonEnvError::ExecutionFailed {
            path: python_path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(PythonEnvError::ExecutionFailed {
            path: python_path.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    // Older interpreters print the version on stderr
    let version_output = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr)
    } else {
        String::from_utf8_lossy(&output.stdout)
    };
    PythonVersion::parse(version_output.trim())
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod version {
        use super::*;

        #[test]
        fn parses_plain_and_prefixed() {
            assert_eq!(PythonVersion::parse("3.11.4").unwrap(), PythonVersion::new(3, 11, 4));
            assert_eq!(
                PythonVersion::parse("Python 3.12.0").unwrap(),
                PythonVersion::new(3, 12, 0)
            );
        }

        #[test]
        fn patch_suffix_and_missing_patch() {
            assert_eq!(PythonVersion::parse("3.13.0rc1").unwrap().patch, 0);
            assert_eq!(PythonVersion::parse("3.10.2+").unwrap().patch, 2);
            assert_eq!(PythonVersion::parse("3.9").unwrap(), PythonVersion::new(3, 9, 0));
        }

        #[test]
        fn rejects_garbage() {
            assert!(matches!(
                PythonVersion::parse("Python"),
                Err(PythonEnvError::InvalidVersion { .. })
            ));
            assert!(PythonVersion::parse("three.eleven").is_err());
        }

        #[test]
        fn minimum_is_three_eight() {
            assert!(PythonVersion::new(3, 8, 0).meets_minimum());
            assert!(!PythonVersion::new(3, 7, 17).meets_minimum());
            assert!(!PythonVersion::new(2, 7, 18).meets_minimum());
        }
    }

    mod resolution {
        use super::*;

        #[test]
        fn explicit_missing_path_is_an_error() {
            let err = resolve_python(Some(Path::new("/no/such/python3"))).unwrap_err();
            assert!(matches!(err, PythonEnvError::ExecutionFailed { .. }));
        }

        #[test]
        fn trace_formats_numbered_steps() {
            let mut trace = ResolutionTrace::default();
            trace.add(ResolutionStep::not_set("$TUGSPLIT_PYTHON"));
            trace.add(ResolutionStep::not_found("$PATH (python3/python)"));
            assert_eq!(
                trace.format_trace(),
                "  1. $TUGSPLIT_PYTHON: not set\n  2. $PATH (python3/python): not found\n"
            );
        }

        #[test]
        fn rejected_step_display() {
            let step = ResolutionStep::rejected(
                "$PATH",
                Path::new("/usr/bin/python3"),
                Some("3.6.9".to_string()),
                "version too old (need 3.8.0+)",
            );
            assert_eq!(
                step.to_string(),
                "$PATH: found /usr/bin/python3 (3.6.9) - version too old (need 3.8.0+)"
            );
        }
    }
}
