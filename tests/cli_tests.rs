//! Integration tests for the sparkify CLI
//!
//! These tests run the actual binary against the bundled pipeline and
//! temporary pipeline files.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const BUNDLED: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/pipelines/sparkify.yaml");

fn sparkify_cmd() -> Command {
    Command::cargo_bin("sparkify").unwrap()
}

/// Empty runtime config so a local sparkify.toml never leaks into a test
fn empty_config(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("sparkify.toml");
    fs::write(&path, "").unwrap();
    path
}

#[test]
fn test_help_flag() {
    sparkify_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("stage, transform and check"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("graph"));
}

#[test]
fn test_run_requires_date() {
    sparkify_cmd()
        .args(["run", BUNDLED, "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--date"));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_validate_bundled_pipeline() {
    sparkify_cmd()
        .args(["validate", BUNDLED])
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"))
        .stdout(predicate::str::contains("Tasks: 8"))
        .stdout(predicate::str::contains("Roots: stage_events, stage_songs"))
        .stdout(predicate::str::contains("Sinks: data_quality_checks"));
}

#[test]
fn test_validate_rejects_unknown_placeholder() {
    let temp_dir = TempDir::new().unwrap();
    let pipeline = temp_dir.path().join("bad.yaml");
    fs::write(
        &pipeline,
        r#"
schema: sparkify/pipeline@0.1
name: bad
tasks:
  - id: stage_events
    stage:
      table: public.staging_events
      bucket: udacity-dend
      key: log-data/{week}/
"#,
    )
    .unwrap();

    sparkify_cmd()
        .arg("validate")
        .arg(&pipeline)
        .assert()
        .failure()
        .stderr(predicate::str::contains("[ETL-"))
        .stderr(predicate::str::contains("week"));
}

#[test]
fn test_validate_rejects_forward_dependency() {
    let temp_dir = TempDir::new().unwrap();
    let pipeline = temp_dir.path().join("forward.yaml");
    fs::write(
        &pipeline,
        r#"
schema: sparkify/pipeline@0.1
name: forward
tasks:
  - id: load_users
    depends_on: stage_events
    dimension:
      table: public.users
      query: SELECT distinct userid FROM staging_events
  - id: stage_events
    stage:
      table: public.staging_events
      bucket: udacity-dend
      key: log-data/
"#,
    )
    .unwrap();

    sparkify_cmd()
        .arg("validate")
        .arg(&pipeline)
        .assert()
        .failure()
        .stderr(predicate::str::contains("stage_events"));
}

#[test]
fn test_validate_missing_file() {
    sparkify_cmd()
        .args(["validate", "does/not/exist.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read pipeline"));
}

// ============================================================================
// Graph
// ============================================================================

#[test]
fn test_graph_prints_layers() {
    sparkify_cmd()
        .args(["graph", BUNDLED])
        .assert()
        .success()
        .stdout(predicate::str::contains("Layer 0:"))
        .stdout(predicate::str::contains("stage_events, stage_songs"))
        .stdout(predicate::str::contains("Layer 3:"))
        .stdout(predicate::str::contains("data_quality_checks"));
}

// ============================================================================
// Dry runs
// ============================================================================

#[test]
fn test_dry_run_succeeds_and_writes_events() {
    let temp_dir = TempDir::new().unwrap();
    let config = empty_config(&temp_dir);
    let events = temp_dir.path().join("events.json");

    sparkify_cmd()
        .args(["run", BUNDLED, "--dry-run", "--date", "2018-11-01", "--run-id", "cli-test"])
        .arg("--config")
        .arg(&config)
        .arg("--events")
        .arg(&events)
        .env_remove("AWS_KEY")
        .env_remove("AWS_SECRET")
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run"))
        .stdout(predicate::str::contains("Summary:"))
        .stdout(predicate::str::contains("Run cli-test succeeded"));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&events).unwrap()).unwrap();
    let events = json.as_array().unwrap();
    assert_eq!(events.first().unwrap()["kind"]["type"], "run_started");
    assert_eq!(events.last().unwrap()["kind"]["type"], "run_completed");
    assert!(!json.to_string().contains("DRYRUNACCESSKEY"));
}

#[test]
fn test_run_rejects_bad_date() {
    let temp_dir = TempDir::new().unwrap();
    let config = empty_config(&temp_dir);

    sparkify_cmd()
        .args(["run", BUNDLED, "--dry-run", "--date", "yesterday"])
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("[ETL-"));
}

#[test]
fn test_run_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("sparkify.toml");
    fs::write(&config, "[retry]\nmax_attempts = 0\n").unwrap();

    sparkify_cmd()
        .args(["run", BUNDLED, "--dry-run", "--date", "2018-11-01"])
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_attempts"));
}

#[test]
fn test_dry_run_writes_report_with_interval() {
    let temp_dir = TempDir::new().unwrap();
    let config = empty_config(&temp_dir);
    let report = temp_dir.path().join("report.json");

    sparkify_cmd()
        .args(["run", BUNDLED, "--dry-run", "--date", "2018-11-01", "--run-id", "cli-report"])
        .args(["--interval-end", "2018-11-02"])
        .arg("--config")
        .arg(&config)
        .arg("--report")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("Report written to"));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["run_id"], "cli-report");
    assert_eq!(json["success"], true);
    assert_eq!(json["tasks"].as_array().unwrap().len(), 8);
    assert_eq!(json["tasks"][0]["state"], "succeeded");
}

#[test]
fn test_run_rejects_interval_ending_before_date() {
    let temp_dir = TempDir::new().unwrap();
    let config = empty_config(&temp_dir);

    sparkify_cmd()
        .args(["run", BUNDLED, "--dry-run", "--date", "2018-11-02", "--interval-end", "2018-11-01"])
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("data interval end"));
}
