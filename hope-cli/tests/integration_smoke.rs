//! Smoke tests to verify command wiring

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn hopectl() -> Command {
    let mut cmd = Command::cargo_bin("hopectl").unwrap();
    cmd.env_remove("DATABASE_URL").env_remove("HOPECTL_BIND");
    cmd
}

// === Help ===

#[test]
fn test_serve_help() {
    hopectl()
        .arg("serve")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Address to bind to"));
}

#[test]
fn test_admin_create_help() {
    hopectl()
        .args(["admin", "create", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Four-digit MPIN"));
}

// === Migrate ===

#[test]
fn test_migrate_dry_run_prints_schema() {
    hopectl()
        .args(["migrate", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CREATE TABLE IF NOT EXISTS users"))
        .stdout(predicate::str::contains("report_card_history"));
}

// === Config ===

#[test]
fn test_config_path_honours_flag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hope.toml");

    hopectl()
        .arg("--config")
        .arg(&path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hope.toml"));
}

#[test]
fn test_config_init_then_show() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hope.toml");

    hopectl()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .success();

    hopectl()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    hopectl()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .env("DATABASE_URL", "postgres://hope:s3cret@db/hope")
        .assert()
        .success()
        .stdout(predicate::str::contains("127.0.0.1:3030"))
        .stdout(predicate::str::contains("****"))
        .stdout(predicate::str::contains("s3cret").not());
}

#[test]
fn test_serve_without_database_url_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.toml");
    std::fs::write(&path, "").unwrap();

    hopectl()
        .arg("--config")
        .arg(&path)
        .arg("serve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DATABASE_URL not set"));
}

// === Completions ===

#[test]
fn test_completions_bash() {
    hopectl()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hopectl"));
}
