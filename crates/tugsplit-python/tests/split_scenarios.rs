//! End-to-end splits of small modules, checked on disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tugsplit_core::types::FileRole;
use tugsplit_python::verification::ModuleOutcome;
use tugsplit_python::{split, split_with_options, SplitOptions};

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn read(path: PathBuf) -> String {
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

fn py_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.ends_with(".py"))
        .collect();
    names.sort();
    names
}

mod default_mode {
    use super::*;

    const INDEPENDENT: &str = r#""""Three shapes."""


class Square:
    side = 1


class Circle:
    radius = 1


class Triangle:
    sides = 3
"#;

    #[test]
    fn independent_classes() {
        let tmp = TempDir::new().unwrap();
        let source = write(tmp.path(), "shapes.py", INDEPENDENT);
        let out = tmp.path().join("out");

        let report = split(&source, &out, None).unwrap();
        assert!(report.success, "{:?}", report.errors);

        let package = out.join("shapes");
        assert_eq!(
            py_files(&package),
            vec!["Circle.py", "Square.py", "Triangle.py", "__init__.py", "shapes.py"]
        );
        assert!(read(package.join("shapes.py")).starts_with("\"\"\"Three shapes.\"\"\"\n"));

        let structure = report.structural_results.unwrap();
        assert!(structure.missing_classes.is_empty());
        assert!(structure.extra_classes.is_empty());
        assert!(structure.extra_functions.is_empty());
    }

    const CROSS: &str = r#""""Models."""

import os


class B:
    pass


def f():
    return os.getcwd()


class A:
    def run(self):
        return B(), f()
"#;

    #[test]
    fn cross_references_become_imports() {
        let tmp = TempDir::new().unwrap();
        let source = write(tmp.path(), "models.py", CROSS);
        let out = tmp.path().join("out");

        let report = split(&source, &out, None).unwrap();
        assert!(report.success, "{:?}", report.errors);

        let a = read(out.join("models/A.py"));
        assert!(a.starts_with("import os\nfrom .B import B\nfrom .functions import f\n\nclass A:"));
        assert_eq!(
            read(out.join("models/__init__.py")),
            "from .B import B\nfrom .A import A\nfrom .functions import f\n"
        );

        let interface = read(out.join("models.py"));
        assert!(interface.contains("from .models.A import A\n"));
        assert!(interface.contains("__all__ = [\n    \"B\",\n    \"A\",\n    \"f\",\n]\n"));
    }

    #[test]
    fn leftover_statements_go_to_main() {
        let tmp = TempDir::new().unwrap();
        let source = write(
            tmp.path(),
            "app.py",
            "class App:\n    def run(self):\n        return 0\n\n\nif __name__ == \"__main__\":\n    print(App().run())\n",
        );
        let out = tmp.path().join("out");

        let report = split(&source, &out, None).unwrap();
        assert!(report.success, "{:?}", report.errors);
        assert_eq!(
            read(out.join("app/main.py")),
            "from .App import App\n\nif __name__ == \"__main__\":\n    print(App().run())\n"
        );
    }

    const OVERLOADED: &str = r#"from typing import overload


class Reader:
    def read(self, x):
        return parse(x)


@overload
def parse(x: int) -> int: ...


@overload
def parse(x: str) -> str: ...


def parse(x):
    return x
"#;

    #[test]
    fn overloads_stay_together() {
        let tmp = TempDir::new().unwrap();
        let source = write(tmp.path(), "reader.py", OVERLOADED);
        let out = tmp.path().join("out");

        let report = split(&source, &out, None).unwrap();
        assert!(report.success, "{:?}", report.errors);
        let functions = read(out.join("reader/functions.py"));
        assert_eq!(functions.matches("def parse(").count(), 3);
        assert!(functions.ends_with("def parse(x):\n    return x\n"));
        assert_eq!(
            read(out.join("reader/__init__.py")),
            "from .Reader import Reader\nfrom .functions import parse\n"
        );
        assert_eq!(report.structural_results.unwrap().emitted_functions, vec!["parse"]);
    }

    #[test]
    fn annotation_only_references_are_imported() {
        let tmp = TempDir::new().unwrap();
        let source = write(
            tmp.path(),
            "cfg.py",
            "class Config:\n    pass\n\n\ndef load(path: str) -> Config:\n    return None\n",
        );
        let out = tmp.path().join("out");

        let report = split(&source, &out, None).unwrap();
        assert!(report.success, "{:?}", report.errors);
        assert!(read(out.join("cfg/functions.py")).starts_with("from .Config import Config\n"));
    }

    #[test]
    fn mutually_referencing_classes_fail_as_a_circular_import() {
        let tmp = TempDir::new().unwrap();
        let source = write(
            tmp.path(),
            "pair.py",
            "class A:\n    def other(self):\n        return B()\n\n\nclass B:\n    def other(self):\n        return A()\n",
        );
        let out = tmp.path().join("out");

        let report = split(&source, &out, None).unwrap();
        assert!(read(out.join("pair/A.py")).starts_with("from .B import B\n"));
        assert!(read(out.join("pair/B.py")).starts_with("from .A import A\n"));
        assert!(!report.success);
        assert!(
            report.errors.iter().any(|e| e.contains("circular import")),
            "{:?}",
            report.errors
        );
    }

    #[test]
    fn every_declaration_lands_in_exactly_one_unit() {
        let tmp = TempDir::new().unwrap();
        let source = write(tmp.path(), "models.py", CROSS);
        let out = tmp.path().join("out");
        let outcome = split_with_options(&source, &out, &SplitOptions::new()).unwrap();

        let mut owners: BTreeMap<&str, usize> = BTreeMap::new();
        for unit in &outcome.plan.units {
            for member in &unit.members {
                *owners.entry(member.as_str()).or_default() += 1;
            }
        }
        assert_eq!(owners.len(), 3);
        assert!(owners.values().all(|count| *count == 1));

        let roles: Vec<FileRole> = outcome.files.iter().map(|f| f.role).collect();
        assert!(roles.contains(&FileRole::Functions));
        assert_eq!(roles.last(), Some(&FileRole::Interface));
        assert!(outcome.files.iter().all(|f| f.sha256.0.len() == 64));
    }
}

mod grouped_mode {
    use super::*;

    const SOURCE: &str = r#"class A:
    pass


class B:
    def pair(self):
        return A()


class C:
    pass
"#;

    #[test]
    fn unassigned_declaration_is_reported_missing() {
        let tmp = TempDir::new().unwrap();
        let source = write(tmp.path(), "big.py", SOURCE);
        let config = write(tmp.path(), "groups.json", r#"{"modules": {"core": {"classes": ["A", "B"]}}}"#);
        let out = tmp.path().join("out");

        let report = split(&source, &out, Some(&config)).unwrap();
        assert!(!report.success);
        assert!(report.errors.contains(&"Missing classes in split files: C".to_string()));
        assert!(report.warnings[0].contains("'C'"));
        assert_eq!(report.structural_results.unwrap().missing_classes, vec!["C"]);

        assert_eq!(read(out.join("big/__init__.py")), "from .core import *\n");
        let core = read(out.join("big/core.py"));
        assert!(core.contains("class A:") && core.contains("class B:") && !core.contains("class C:"));
    }

    #[test]
    fn residual_policy_keeps_unassigned_declarations() {
        let tmp = TempDir::new().unwrap();
        let source = write(tmp.path(), "big.py", SOURCE);
        let config = write(
            tmp.path(),
            "groups.json",
            r#"{"modules": {"core": {"classes": ["A", "B"]}}, "unassigned": "residual"}"#,
        );
        let out = tmp.path().join("out");

        let report = split(&source, &out, Some(&config)).unwrap();
        assert!(report.success, "{:?}", report.errors);
        assert_eq!(
            read(out.join("big/big.py")),
            "\"\"\"\nMain module - declarations have been split into separate files.\n\
             Import from the individual modules or use the package __init__ for convenience.\n\
             \"\"\"\n\nclass C:\n    pass\n"
        );
        assert_eq!(
            read(out.join("big/__init__.py")),
            "from .core import *\nfrom .big import C\n"
        );
    }

    #[test]
    fn configured_names_missing_from_source_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let source = write(tmp.path(), "big.py", SOURCE);
        let config = write(
            tmp.path(),
            "groups.json",
            r#"{"modules": {"core": {"classes": ["A", "B", "Ghost"]}, "rest": {"classes": ["C"]}}}"#,
        );
        let out = tmp.path().join("out");

        let outcome = split_with_options(&source, &out, &SplitOptions::new().with_group_config(&config)).unwrap();
        assert!(outcome.report.success, "{:?}", outcome.report.errors);
        assert_eq!(outcome.plan.skipped, vec!["Ghost"]);
    }

    #[test]
    fn rerun_into_the_same_directory_reports_the_dropped_class() {
        let tmp = TempDir::new().unwrap();
        let source = write(tmp.path(), "big.py", SOURCE);
        let out = tmp.path().join("out");

        let first = split(&source, &out, None).unwrap();
        assert!(first.success, "{:?}", first.errors);
        assert!(out.join("big/C.py").exists());

        let config = write(tmp.path(), "groups.json", r#"{"modules": {"core": {"classes": ["A", "B"]}}}"#);
        let second = split(&source, &out, Some(&config)).unwrap();
        assert!(!second.success);
        assert_eq!(second.structural_results.unwrap().missing_classes, vec!["C"]);
        assert_eq!(
            py_files(&out.join("big")),
            vec!["__init__.py", "big.py", "core.py"]
        );
    }

    #[test]
    fn resplitting_a_group_keeps_its_symbols() {
        let tmp = TempDir::new().unwrap();
        let source = write(tmp.path(), "big.py", SOURCE);
        let config = write(
            tmp.path(),
            "groups.json",
            r#"{"modules": {"core": {"classes": ["A", "B"]}, "rest": {"classes": ["C"]}}}"#,
        );
        let out = tmp.path().join("out");
        split(&source, &out, Some(&config)).unwrap();

        let again = tmp.path().join("again");
        let report = split(&out.join("big/core.py"), &again, None).unwrap();
        assert!(report.success, "{:?}", report.errors);
        let structure = report.structural_results.unwrap();
        assert_eq!(structure.emitted_classes, vec!["A", "B"]);
    }
}

mod failures {
    use super::*;

    #[test]
    fn syntax_error_aborts_without_output() {
        let tmp = TempDir::new().unwrap();
        let source = write(tmp.path(), "broken.py", "class A:\n    def f(self:\n        pass\n");
        let out = tmp.path().join("out");

        let err = split(&source, &out, None).unwrap_err();
        assert_eq!(err.error_kind(), "MalformedSource");
        assert!(!out.exists());
    }

    #[test]
    fn indentation_errors_abort_without_output() {
        for (name, text) in [
            ("unexpected.py", "x = 1\n  y = 2\n"),
            ("bodiless.py", "class A:\n    pass\n\ndef f():\nreturn 1\n"),
            ("dedent.py", "class A:\n    pass\n  x = 1\n"),
            ("legacy.py", "print 'hi'\n"),
        ] {
            let tmp = TempDir::new().unwrap();
            let source = write(tmp.path(), name, text);
            let out = tmp.path().join("out");

            let err = split(&source, &out, None).unwrap_err();
            assert_eq!(err.error_kind(), "MalformedSource", "{name}");
            assert!(!out.exists(), "{name}");
        }
    }

    #[test]
    fn plan_conflict_aborts_without_output() {
        let tmp = TempDir::new().unwrap();
        let source = write(tmp.path(), "big.py", "class main:\n    pass\n");
        let out = tmp.path().join("out");

        let err = split(&source, &out, None).unwrap_err();
        assert_eq!(err.error_kind(), "PlanConflict");
        assert!(!out.exists());
    }
}

mod isolation {
    use super::*;

    #[test]
    fn external_absolute_import_is_untouched() {
        let tmp = TempDir::new().unwrap();
        let source = write(
            tmp.path(),
            "store.py",
            "import json\n\n\nclass Store:\n    def dump(self):\n        return json.dumps({})\n",
        );
        let out = tmp.path().join("out");

        let report = split(&source, &out, None).unwrap();
        assert!(report.success, "{:?}", report.errors);
        let imports = report.import_results.unwrap();
        assert!(imports.disabled_imports.is_empty());
        assert!(imports.modules.iter().all(|m| m.outcome == ModuleOutcome::Imported));
        assert!(read(out.join("store/Store.py")).starts_with("import json\n"));
    }

    #[test]
    fn parent_relative_imports_are_disabled_only_in_the_sandbox() {
        let tmp = TempDir::new().unwrap();
        let source = write(
            tmp.path(),
            "views.py",
            "from ..shared import render\n\n\nclass Page:\n    def show(self):\n        return render(self)\n",
        );
        let out = tmp.path().join("out");

        let report = split(&source, &out, None).unwrap();
        assert!(report.success, "{:?}", report.errors);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.starts_with("Disabled parent-relative import in Page.py")));
        assert!(read(out.join("views/Page.py")).starts_with("from ..shared import render\n"));
    }

    #[test]
    fn sandbox_is_gone_after_validation() {
        let tmp = TempDir::new().unwrap();
        let sandboxes = tmp.path().join("sandboxes");
        fs::create_dir_all(&sandboxes).unwrap();
        let source = write(tmp.path(), "one.py", "class One:\n    pass\n");
        let out = tmp.path().join("out");

        let options = SplitOptions::new().with_sandbox_dir(&sandboxes);
        let outcome = split_with_options(&source, &out, &options).unwrap();
        let imports = outcome.report.import_results.unwrap();
        assert!(imports.sandbox_removed);
        assert!(!Path::new(&imports.sandbox_path.unwrap()).exists());
        assert_eq!(fs::read_dir(&sandboxes).unwrap().count(), 0);
    }
}
