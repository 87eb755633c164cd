//! Disposable sandbox directories for isolated validation.
//!
//! A sandbox is a temp directory holding a copy of one emitted package:
//!
//! ```text
//! <tmp>/tugsplit_sandbox_XXXX/
//! ├── <package>/          copy of the emitted package
//! └── .tugsplit_meta/     helper scripts and manifest
//! ```
//!
//! The directory is removed when the handle is dropped or disposed. Commands
//! run inside the sandbox are bounded by the configured timeout.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, warn};
use wait_timeout::ChildExt;
use walkdir::WalkDir;

// ============================================================================
// Sandbox Configuration
// ============================================================================

/// Configuration for sandbox creation and command execution.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Custom parent directory for the sandbox (default: system temp).
    pub sandbox_dir: Option<PathBuf>,
    /// Timeout for commands run in the sandbox.
    pub verification_timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            sandbox_dir: None,
            verification_timeout: Duration::from_secs(120),
        }
    }
}

impl SandboxConfig {
    /// Set command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.verification_timeout = timeout;
        self
    }

    /// Place the sandbox under `dir` instead of the system temp directory.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sandbox_dir = Some(dir.into());
        self
    }
}

/// Directory names never copied into a sandbox.
const EXCLUDE_DIRS: &[&str] = &["__pycache__", ".pytest_cache", ".mypy_cache", ".ruff_cache"];

/// File suffixes never copied into a sandbox.
const EXCLUDE_SUFFIXES: &[&str] = &[".pyc", ".pyo"];

fn should_exclude(path: &Path) -> bool {
    path.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        EXCLUDE_DIRS.contains(&name.as_ref())
            || EXCLUDE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
    })
}

// ============================================================================
// Sandbox Handle
// ============================================================================

/// Handle for a sandbox directory, managing its lifecycle.
pub struct SandboxHandle {
    temp_dir: TempDir,
    root: PathBuf,
    package_dir: PathBuf,
    meta_dir: PathBuf,
    config: SandboxConfig,
    copied_files: Vec<String>,
}

impl SandboxHandle {
    /// Create a sandbox holding a copy of `source_dir` named `package_name`.
    pub fn create(source_dir: &Path, package_name: &str, config: SandboxConfig) -> io::Result<Self> {
        let temp_dir = match config.sandbox_dir {
            Some(ref base) => TempDir::with_prefix_in("tugsplit_sandbox_", base)?,
            None => TempDir::with_prefix("tugsplit_sandbox_")?,
        };

        let root = temp_dir.path().to_path_buf();
        let package_dir = root.join(package_name);
        let meta_dir = root.join(".tugsplit_meta");
        fs::create_dir_all(&package_dir)?;
        fs::create_dir_all(&meta_dir)?;

        let mut handle = SandboxHandle {
            temp_dir,
            root,
            package_dir,
            meta_dir,
            config,
            copied_files: Vec::new(),
        };
        handle.copy_from(source_dir)?;
        fs::write(handle.meta_dir.join("file_manifest"), handle.copied_files.join("\n"))?;
        Ok(handle)
    }

    fn copy_from(&mut self, source_dir: &Path) -> io::Result<()> {
        for entry in WalkDir::new(source_dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !should_exclude(e.path()))
        {
            let entry = entry.map_err(io::Error::other)?;
            let source_path = entry.path();
            if source_path == source_dir {
                continue;
            }

            let relative_path = source_path
                .strip_prefix(source_dir)
                .map_err(io::Error::other)?;
            let dest_path = self.package_dir.join(relative_path);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest_path)?;
                continue;
            }
            if !entry.file_type().is_file() {
                warn!("Skipping non-regular file in sandbox copy: {}", source_path.display());
                continue;
            }

            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(source_path, &dest_path)?;
            self.copied_files
                .push(relative_path.to_string_lossy().to_string());
            debug!("Copied: {}", relative_path.display());
        }
        Ok(())
    }

    /// Sandbox root (the directory placed on the import path).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The copied package directory.
    pub fn package_dir(&self) -> &Path {
        &self.package_dir
    }

    /// Write an auxiliary file into the metadata directory.
    pub fn write_meta(&self, name: &str, content: &str) -> io::Result<PathBuf> {
        let path = self.meta_dir.join(name);
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Run a command with the sandbox root as cwd.
    ///
    /// Both output pipes are drained on their own threads while the command
    /// runs, so a chatty child cannot block on a full pipe. If the command
    /// exceeds the configured timeout it is killed and a failed result is
    /// returned.
    pub fn run_verifier(&self, command: &[String]) -> io::Result<CommandOutcome> {
        let Some((program, args)) = command.split_first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "Empty command"));
        };

        let start = Instant::now();
        let timeout = self.config.verification_timeout;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.env("TUGSPLIT_SANDBOX", "1");
        cmd.env("PYTHONDONTWRITEBYTECODE", "1");

        let mut child = cmd.spawn()?;
        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let waited = child.wait_timeout(timeout);
        if !matches!(waited, Ok(Some(_))) {
            let _ = child.kill();
            let _ = child.wait();
        }
        let stdout = join_drain(stdout_reader);
        let stderr = join_drain(stderr_reader);

        match waited? {
            Some(status) => {
                Ok(CommandOutcome {
                    success: status.success(),
                    exit_code: status.code(),
                    stdout,
                    stderr,
                    duration_ms: start.elapsed().as_millis() as u64,
                    command: command.to_vec(),
                })
            }
            None => {
                let duration = start.elapsed();
                warn!("Sandbox command timed out after {:?}: {:?}", duration, command);
                Ok(CommandOutcome {
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("Command timed out after {:?} (limit: {:?})", duration, timeout),
                    duration_ms: duration.as_millis() as u64,
                    command: command.to_vec(),
                })
            }
        }
    }

    /// Remove the sandbox now, returning the path that was removed.
    pub fn dispose(self) -> io::Result<PathBuf> {
        let root = self.root.clone();
        self.temp_dir.close()?;
        Ok(root)
    }
}

/// Read a child pipe to the end on a background thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_drain(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    let buf = reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    String::from_utf8_lossy(&buf).to_string()
}

// ============================================================================
// Command Outcome
// ============================================================================

/// Result of running a command in a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// Whether the command exited with status 0.
    pub success: bool,
    /// Exit code if available.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub command: Vec<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_package() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("__init__.py"), "from .A import A\n").unwrap();
        fs::write(dir.path().join("A.py"), "class A:\n    pass\n").unwrap();
        let cache = dir.path().join("__pycache__");
        fs::create_dir_all(&cache).unwrap();
        fs::write(cache.join("A.cpython-311.pyc"), b"compiled").unwrap();
        dir
    }

    mod copying {
        use super::*;

        #[test]
        fn copies_package_under_its_name() {
            let pkg = create_package();
            let sandbox = SandboxHandle::create(pkg.path(), "big", SandboxConfig::default()).unwrap();
            assert_eq!(sandbox.package_dir(), sandbox.root().join("big"));
            assert!(sandbox.package_dir().join("__init__.py").exists());
            assert!(sandbox.package_dir().join("A.py").exists());
        }

        #[test]
        fn excludes_bytecode_caches() {
            let pkg = create_package();
            let sandbox = SandboxHandle::create(pkg.path(), "big", SandboxConfig::default()).unwrap();
            assert!(!sandbox.package_dir().join("__pycache__").exists());
            let manifest =
                fs::read_to_string(sandbox.root().join(".tugsplit_meta").join("file_manifest")).unwrap();
            assert!(!manifest.contains("__pycache__"));
            assert_eq!(manifest.lines().count(), 2);
        }

        #[test]
        fn honors_custom_parent_dir() {
            let pkg = create_package();
            let parent = TempDir::new().unwrap();
            let config = SandboxConfig::default().in_dir(parent.path());
            let sandbox = SandboxHandle::create(pkg.path(), "big", config).unwrap();
            assert!(sandbox.root().starts_with(parent.path()));
        }
    }

    mod lifecycle {
        use super::*;

        #[test]
        fn dispose_removes_directory() {
            let pkg = create_package();
            let sandbox = SandboxHandle::create(pkg.path(), "big", SandboxConfig::default()).unwrap();
            let root = sandbox.root().to_path_buf();
            assert!(root.exists());
            let removed = sandbox.dispose().unwrap();
            assert_eq!(removed, root);
            assert!(!root.exists());
        }

        #[test]
        fn drop_removes_directory() {
            let pkg = create_package();
            let root = {
                let sandbox =
                    SandboxHandle::create(pkg.path(), "big", SandboxConfig::default()).unwrap();
                sandbox.root().to_path_buf()
            };
            assert!(!root.exists());
        }

        #[test]
        fn meta_files_live_outside_package() {
            let pkg = create_package();
            let sandbox = SandboxHandle::create(pkg.path(), "big", SandboxConfig::default()).unwrap();
            let path = sandbox.write_meta("hello.py", "print('hi')\n").unwrap();
            assert!(path.exists());
            assert!(!path.starts_with(sandbox.package_dir()));
        }
    }

    #[cfg(unix)]
    mod commands {
        use super::*;

        #[test]
        fn runs_in_sandbox_root() {
            let pkg = create_package();
            let sandbox = SandboxHandle::create(pkg.path(), "big", SandboxConfig::default()).unwrap();
            let outcome = sandbox
                .run_verifier(&["ls".to_string(), "big".to_string()])
                .unwrap();
            assert!(outcome.success);
            assert!(outcome.stdout.contains("A.py"));
        }

        #[test]
        fn timeout_kills_long_command() {
            let pkg = create_package();
            let config = SandboxConfig::default().with_timeout(Duration::from_millis(200));
            let sandbox = SandboxHandle::create(pkg.path(), "big", config).unwrap();
            let outcome = sandbox
                .run_verifier(&["sleep".to_string(), "5".to_string()])
                .unwrap();
            assert!(!outcome.success);
            assert!(outcome.exit_code.is_none());
            assert!(outcome.stderr.contains("timed out"));
        }

        #[test]
        fn large_output_does_not_stall() {
            let pkg = create_package();
            let config = SandboxConfig::default().with_timeout(Duration::from_secs(10));
            let sandbox = SandboxHandle::create(pkg.path(), "big", config).unwrap();
            let outcome = sandbox
                .run_verifier(&[
                    "sh".to_string(),
                    "-c".to_string(),
                    "head -c 300000 /dev/zero | tr '\\0' x; head -c 300000 /dev/zero | tr '\\0' y >&2"
                        .to_string(),
                ])
                .unwrap();
            assert!(outcome.success, "{}", outcome.stderr);
            assert_eq!(outcome.stdout.len(), 300_000);
            assert_eq!(outcome.stderr.len(), 300_000);
        }

        #[test]
        fn empty_command_is_rejected() {
            let pkg = create_package();
            let sandbox = SandboxHandle::create(pkg.path(), "big", SandboxConfig::default()).unwrap();
            assert!(sandbox.run_verifier(&[]).is_err());
        }
    }
}
