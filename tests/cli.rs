//! End-to-end runs of the tugsplit binary.
//!
//! Each test builds its input in a temp dir, runs the binary there, and
//! checks the JSON response on stdout plus the files on disk.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

const MODULE: &str = r#""""Inventory."""

import json


class Item:
    def dump(self):
        return json.dumps({})


class Shelf:
    def __init__(self):
        self.items = [Item()]


def count(shelf):
    """Number of items."""
    return len(shelf.items)


if __name__ == "__main__":
    print(count(Shelf()))
"#;

fn tugsplit(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tugsplit"))
        .current_dir(dir)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run tugsplit")
}

fn response(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {stdout}"))
}

fn setup(content: &str) -> TempDir {
    let temp = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(temp.path().join("inventory.py"), content).unwrap();
    temp
}

#[test]
fn default_split() {
    let temp = setup(MODULE);
    let output = tugsplit(temp.path(), &["-i", "inventory.py"]);
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));

    let json = response(&output);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["schema_version"], "1");
    assert_eq!(json["validation"]["success"], true);
    assert_eq!(json["backup"], "inventory.py.backup");

    let package = temp.path().join("output/inventory");
    for file in ["Item.py", "Shelf.py", "functions.py", "main.py", "inventory.py", "__init__.py"] {
        assert!(package.join(file).exists(), "missing {file}");
    }
    assert!(temp.path().join("output/inventory.py").exists());
    assert!(temp.path().join("inventory.py.backup").exists());
    assert!(!package.join("DOCS.md").exists());
}

#[test]
fn doc_flag_and_output_dir() {
    let temp = setup(MODULE);
    let output = tugsplit(temp.path(), &["-i", "inventory.py", "-o", "split", "--doc", "--no-backup"]);
    assert_eq!(output.status.code(), Some(0));

    let json = response(&output);
    assert!(json.get("backup").is_none());
    let docs = fs::read_to_string(temp.path().join("split/inventory/DOCS.md")).unwrap();
    assert!(docs.contains("## Function: `count`\n\nNumber of items."));
    assert!(!temp.path().join("inventory.py.backup").exists());
}

#[test]
fn validation_failure_exits_five() {
    let temp = setup(MODULE);
    fs::write(
        temp.path().join("groups.json"),
        r#"{"modules": {"store": {"classes": ["Item", "Shelf"]}}}"#,
    )
    .unwrap();
    let output = tugsplit(temp.path(), &["-i", "inventory.py", "--config", "groups.json", "--no-backup"]);
    assert_eq!(output.status.code(), Some(5));

    let json = response(&output);
    assert_eq!(json["status"], "failed");
    assert_eq!(json["dropped"][0], "count");
    let errors = json["validation"]["errors"].as_array().unwrap();
    assert!(errors.iter().any(|e| e == "Missing functions in split files: count"));
}

#[test]
fn malformed_source_exits_three() {
    let temp = setup("class Broken(\n    pass\n");
    let output = tugsplit(temp.path(), &["-i", "inventory.py", "--no-backup"]);
    assert_eq!(output.status.code(), Some(3));

    let json = response(&output);
    assert_eq!(json["status"], "error");
    assert_eq!(json["error"]["code"], "MalformedSource");
    assert!(!temp.path().join("output").exists());
}

#[test]
fn malformed_source_leaves_no_backup() {
    let temp = setup("class A:\n    pass\n\ndef f():\nreturn 1\n");
    let output = tugsplit(temp.path(), &["-i", "inventory.py"]);
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(response(&output)["error"]["code"], "MalformedSource");
    assert!(!temp.path().join("inventory.py.backup").exists());
    assert!(!temp.path().join("output").exists());
}

#[test]
fn missing_input_exits_three() {
    let temp = tempfile::tempdir().unwrap();
    let output = tugsplit(temp.path(), &["-i", "absent.py"]);
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(response(&output)["error"]["code"], "FileNotFound");
}

#[test]
fn bad_config_exits_two() {
    let temp = setup(MODULE);
    fs::write(temp.path().join("groups.json"), "{ not json").unwrap();
    let output = tugsplit(temp.path(), &["-i", "inventory.py", "--config", "groups.json", "--no-backup"]);
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(response(&output)["error"]["code"], "InvalidConfig");
}

#[test]
fn logs_stay_off_stdout() {
    let temp = setup(MODULE);
    let output = tugsplit(temp.path(), &["-i", "inventory.py", "--log-level", "debug", "--no-backup"]);
    assert_eq!(output.status.code(), Some(0));
    response(&output);
    assert!(!output.stderr.is_empty());
}
