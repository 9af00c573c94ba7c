//! End-to-end CLI smoke tests driving the `repolens` binary (§4.8-§4.13).

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn write(dir: &std::path::Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn bin() -> Command {
    Command::cargo_bin("repolens").unwrap()
}

#[test]
fn build_query_eval_range_verify_round_trip() {
    let src = tempdir().unwrap();
    write(src.path(), "src/lib.rs", "pub fn widget_factory() -> i32 {\n    42\n}\n");
    write(src.path(), "README.md", "# widget demo\n\nSome docs about the widget factory.\n");

    let out = tempdir().unwrap();

    bin()
        .args([
            "index",
            "build",
            "--repo",
            &format!("demo={}", src.path().display()),
            "--output-dir",
            &out.path().display().to_string(),
            "--base-name",
            "demo",
            "--emit",
            "json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("run_id"));

    let db_path = out.path().join("demo.index.sqlite");
    assert!(db_path.exists());
    let manifest_path = out.path().join("demo.bundle.manifest.json");
    assert!(manifest_path.exists());

    bin()
        .args(["index", "verify", &db_path.display().to_string(), "--emit", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"fresh\":true"));

    bin()
        .args(["query", &db_path.display().to_string(), "widget_factory", "--emit", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("widget_factory").or(predicate::str::contains("\"count\"")));

    bin().args(["verify", &manifest_path.display().to_string(), "--level", "full"]).assert().success();

    bin()
        .args([
            "range",
            "get",
            &manifest_path.display().to_string(),
            "--role",
            "canonical_md",
            "--repo-id",
            "demo",
            "--start-byte",
            "0",
            "--end-byte",
            "1",
            "--start-line",
            "1",
            "--end-line",
            "1",
            "--emit",
            "json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"text\""));

    let gold = out.path().join("gold.md");
    fs::write(
        &gold,
        "## widget_factory\n\n```query\nwidget_factory\n```\n\nRelevant: src/lib.rs\n",
    )
    .unwrap();

    bin()
        .args(["eval", &db_path.display().to_string(), &gold.display().to_string(), "--emit", "json"])
        .assert()
        .success();
}

#[test]
fn delta_between_two_roots_writes_a_review_bundle() {
    let old_root = tempdir().unwrap();
    write(old_root.path(), "a.rs", "fn a() {}\n");

    let new_root = tempdir().unwrap();
    write(new_root.path(), "a.rs", "fn a() { /* updated */ }\n");
    write(new_root.path(), "b.rs", "fn b() {}\n");

    let hub = tempdir().unwrap();

    bin()
        .args([
            "delta",
            "--hub",
            &hub.path().display().to_string(),
            "--repo",
            "demo",
            &old_root.path().display().to_string(),
            &new_root.path().display().to_string(),
            "--emit",
            "json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"added\""));

    let pr_schau_dir = hub.path().join(".repolens").join("pr-schau").join("demo");
    assert!(pr_schau_dir.exists());
}

#[test]
fn index_build_rejects_a_malformed_repo_spec() {
    let out = tempdir().unwrap();
    bin()
        .args(["index", "build", "--repo", "missing-equals-sign", "--output-dir", &out.path().display().to_string()])
        .assert()
        .failure();
}
