//! CLI integration tests for clay
//!
//! These tests exercise the binary end to end for everything that does not
//! need a live site: configuration, input parsing, key checks and offline
//! bootstrap linting.

use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get a command instance for the clay binary, isolated from the user's config
fn clay_cmd(dir: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("clay"));
    cmd.env("CLAYCLI_CONFIG", dir.join("claycli.toml"))
        .env_remove("CLAYCLI_DEFAULT_KEY")
        .env_remove("CLAYCLI_DEFAULT_URL")
        .env_remove("RUST_LOG");
    cmd
}

fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

// =============================================================================
// Help Tests
// =============================================================================

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();

    clay_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("lint"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_size_requires_query() {
    let dir = TempDir::new().unwrap();

    clay_cmd(dir.path())
        .args(["export", "d.com/_pages/index", "--size", "5"])
        .assert()
        .failure();
}

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_config_site_alias_is_saved() {
    let dir = TempDir::new().unwrap();

    clay_cmd(dir.path())
        .args(["config", "--site", "prod", "https://d.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration saved"));

    assert!(dir.path().join("claycli.toml").is_file());

    clay_cmd(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("prod = https://d.com"));
}

#[test]
fn test_config_json_hides_key_values() {
    let dir = TempDir::new().unwrap();

    clay_cmd(dir.path())
        .args(["config", "--key", "prod", "s3cret"])
        .assert()
        .success();

    clay_cmd(dir.path())
        .args(["--format", "json", "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"prod\""))
        .stdout(predicate::str::contains("s3cret").not());
}

#[test]
fn test_invalid_config_file_errors() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "claycli.toml", "concurrency = \"lots\"\n");

    clay_cmd(dir.path())
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

// =============================================================================
// Import Tests
// =============================================================================

#[test]
fn test_import_without_key_fails() {
    let dir = TempDir::new().unwrap();
    let file = write_file(
        dir.path(),
        "content.ndjson",
        "{\"/_components/foo/instances/bar\":{\"a\":1}}\n",
    );

    clay_cmd(dir.path())
        .args(["import", "t.com", "--file"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("key"));
}

#[test]
fn test_import_without_site_fails() {
    let dir = TempDir::new().unwrap();

    clay_cmd(dir.path())
        .args(["import", "--key", "abc"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No target site"));
}

#[test]
fn test_import_malformed_dispatch_names_line() {
    let dir = TempDir::new().unwrap();
    let file = write_file(
        dir.path(),
        "content.ndjson",
        "{\"/_components/foo/instances/bar\":{\"a\":1}}\n{not json\n",
    );

    clay_cmd(dir.path())
        .args(["import", "t.com", "--key", "abc", "--file"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn test_import_rejects_unknown_dispatch_key() {
    let dir = TempDir::new().unwrap();

    clay_cmd(dir.path())
        .args(["import", "t.com", "--key", "abc"])
        .write_stdin("{\"/_components/foo/instances/bar\":{}}\n{\"/_nope/x\":{}}\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 2"));
}

// =============================================================================
// Lint Tests
// =============================================================================

const BOOTSTRAP: &str = r#"
_components:
  article:
    instances:
      a:
        title: Hello
        content:
          - _ref: /_components/paragraph/instances/p1
          - _ref: /_components/paragraph/instances/gone
  paragraph:
    instances:
      p1:
        text: one
_pages:
  index:
    main:
      - /_components/article/instances/a
"#;

#[test]
fn test_lint_bootstrap_reports_missing_reference() {
    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "bootstrap.yaml", BOOTSTRAP);

    clay_cmd(dir.path())
        .args(["lint", "--file"])
        .arg(&file)
        .assert()
        .failure()
        .stdout(predicate::str::contains("/_components/paragraph/instances/gone"))
        .stdout(predicate::str::contains("/_components/paragraph/instances/p1").not())
        .stderr(predicate::str::contains("1 of"));
}

#[test]
fn test_lint_complete_bootstrap_from_stdin() {
    let dir = TempDir::new().unwrap();
    let complete = BOOTSTRAP.replace("          - _ref: /_components/paragraph/instances/gone\n", "");

    clay_cmd(dir.path())
        .arg("lint")
        .write_stdin(complete)
        .assert()
        .success()
        .stdout(predicate::str::contains("All 2 references resolved"));
}

#[test]
fn test_lint_json_output() {
    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "bootstrap.yaml", BOOTSTRAP);

    let output = clay_cmd(dir.path())
        .args(["--format", "json", "lint", "--file"])
        .arg(&file)
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let line: serde_json::Value = serde_json::from_str(stdout.lines().next().unwrap()).unwrap();
    assert_eq!(line["url"], "/_components/paragraph/instances/gone");
    assert_eq!(line["status"], "error");
}
