//! CLI integration tests for the `sqon` binary.
//!
//! Uses `assert_cmd` to spawn the binary and check exit codes, stdout and
//! stderr. Commands run from the workspace root so fixture paths resolve.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Locate the workspace root by walking up from CARGO_MANIFEST_DIR.
fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    // crates/cli -> workspace root is two levels up
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

/// Helper: create a Command for the `sqon` binary, rooted at workspace.
fn sqon() -> Command {
    let mut cmd = cargo_bin_cmd!("sqon");
    cmd.current_dir(workspace_root());
    cmd
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    sqon()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "SQON schema, validation and records toolkit",
        ));
}

#[test]
fn version_exits_0() {
    sqon()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sqon"));
}

#[test]
fn unknown_subcommand_fails() {
    sqon().arg("frobnicate").assert().failure();
}

// ──────────────────────────────────────────────
// 2. parse
// ──────────────────────────────────────────────

#[test]
fn parse_valid_file_prints_summary() {
    sqon()
        .args(["parse", "fixtures/people.sqon"])
        .assert()
        .success()
        .stdout(predicate::str::contains("schema: 7 field(s)"))
        .stdout(predicate::str::contains("records: 2"));
}

#[test]
fn parse_json_output_has_normalized_records() {
    let output = sqon()
        .args(["--output", "json", "parse", "fixtures/people.sqon"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["file_rules"]["strict"], false);
    assert!(json["file_rules"].get("Strict").is_none());
    assert_eq!(json["schema"]["tags"]["type"], "StringArray");
    assert_eq!(json["records"][0]["value"]["name"], "Ada");
    assert_eq!(json["records"][0]["value"]["email"], "ada@example.com");
    assert_eq!(json["errors"].as_array().unwrap().len(), 0);
    assert!(json["metadata"]["input_bytes"].as_u64().unwrap() > 0);
}

#[test]
fn parse_invalid_file_exits_1_with_line_numbers() {
    sqon()
        .args(["parse", "fixtures/invalid.sqon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "line 7: validation 'isEmail' is not applicable to field 'age' of type Number",
        ))
        .stderr(predicate::str::contains(
            "line 11: record #0: age: must be at least 18",
        ));
}

#[test]
fn parse_no_validate_skips_record_checks() {
    sqon()
        .args(["parse", "--no-validate", "fixtures/invalid.sqon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("record #0").not());
}

#[test]
fn parse_focus_records_ignores_ordering() {
    sqon()
        .args(["parse", "--focus", "records", "fixtures/unordered.sqon"])
        .assert()
        .success()
        .stdout(predicate::str::contains("records: 3"));

    sqon()
        .args(["parse", "fixtures/unordered.sqon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires a preceding @schema"));
}

#[test]
fn parse_max_records_truncates() {
    sqon()
        .args(["parse", "--max-records", "1", "fixtures/people.sqon"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("records: 1"))
        .stderr(predicate::str::contains("record limit of 1 reached"));
}

#[test]
fn parse_missing_file_exits_1() {
    sqon()
        .args(["parse", "fixtures/nope.sqon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("I/O error"));
}

#[test]
fn parse_missing_file_json_error() {
    sqon()
        .args(["--output", "json", "parse", "fixtures/nope.sqon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"error\""));
}

#[test]
fn quiet_suppresses_summary() {
    sqon()
        .args(["--quiet", "parse", "fixtures/people.sqon"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

// ──────────────────────────────────────────────
// 3. validate
// ──────────────────────────────────────────────

#[test]
fn validate_reports_per_document_diagnostics() {
    sqon()
        .args([
            "validate",
            "fixtures/people.sqon",
            "--data",
            "fixtures/people.json",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[1] age: must be at least 18 (min)"))
        .stdout(predicate::str::contains("1 of 2 document(s) invalid"));
}

#[test]
fn validate_single_object_json() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("one.json");
    fs::write(
        &data,
        r#"{ "name": "Linus", "email": "l@example.org", "age": 54, "tags": ["x"] }"#,
    )
    .unwrap();

    let output = sqon()
        .args(["--output", "json", "validate", "fixtures/people.sqon", "--data"])
        .arg(&data)
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["valid"], true);
    assert_eq!(json["data"]["name"], "Linus");
}

#[test]
fn validate_strict_flag_rejects_unknown_fields() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("extra.json");
    fs::write(&data, r#"{ "name": "Ann", "age": 30, "nickname": "A" }"#).unwrap();

    sqon()
        .args(["validate", "fixtures/people.sqon", "--data"])
        .arg(&data)
        .assert()
        .success();

    sqon()
        .args(["validate", "fixtures/people.sqon", "--strict", "--data"])
        .arg(&data)
        .assert()
        .failure()
        .stdout(predicate::str::contains("nickname"));
}

#[test]
fn validate_warns_only_about_schema_side_problems() {
    let dir = TempDir::new().unwrap();
    let sqon_path = dir.path().join("rules.sqon");
    fs::write(
        &sqon_path,
        "stray line\n@schema\nage: Number\n@end\n@validations\nage: min(18)\n@end\n@records\nnot a record\n@end\n",
    )
    .unwrap();
    let data = dir.path().join("ok.json");
    fs::write(&data, r#"{ "age": 30 }"#).unwrap();

    sqon()
        .args(["validate", "--data"])
        .arg(&data)
        .arg(&sqon_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("warning: line 1: unknown command 'stray line'"))
        .stderr(predicate::str::contains("record marker").not())
        .stderr(predicate::str::contains("@records").not());
}

#[test]
fn validate_bad_json_exits_1() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("bad.json");
    fs::write(&data, "{ not json").unwrap();

    sqon()
        .args(["validate", "fixtures/people.sqon", "--data"])
        .arg(&data)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error parsing JSON"));
}

// ──────────────────────────────────────────────
// 4. renumber
// ──────────────────────────────────────────────

#[test]
fn renumber_prints_resequenced_text() {
    sqon()
        .args(["renumber", "fixtures/unordered.sqon"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "#0 { name: 'a' }\n#1 { name: 'b' }\n#2 { name: 'c' }\n",
        ));
}

#[test]
fn renumber_in_place_rewrites_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.sqon");
    let original = fs::read_to_string(workspace_root().join("fixtures/unordered.sqon")).unwrap();
    fs::write(&path, &original).unwrap();

    sqon()
        .args(["renumber", "--in-place"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("renumbered 3 record(s)"));

    let rewritten = fs::read_to_string(&path).unwrap();
    assert_eq!(rewritten.len(), original.len());
    assert!(rewritten.contains("#2 { name: 'c' }"));
    assert!(!rewritten.contains("#9"));
}
