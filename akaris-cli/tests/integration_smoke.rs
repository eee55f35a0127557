//! Smoke tests for command wiring that need no database

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `akaris` isolated from the caller's config files and environment.
fn akaris(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("akaris").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env_remove("DATABASE_URL")
        .env_remove("AKARIS_CONFIG")
        .env_remove("AKARIS_MAX_CONNECTIONS");
    cmd
}

// === Help ===

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    akaris(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_migrate_help() {
    let home = TempDir::new().unwrap();
    akaris(&home)
        .args(["migrate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("without applying"));
}

// === Schema ===

#[test]
fn test_schema_prints_ddl_in_dependency_order() {
    let home = TempDir::new().unwrap();
    let output = akaris(&home).arg("schema").assert().success().get_output().stdout.clone();
    let ddl = String::from_utf8(output).unwrap();

    let users = ddl.find("CREATE TABLE users").unwrap();
    let farms = ddl.find("CREATE TABLE farms").unwrap();
    let crops = ddl.find("CREATE TABLE crops").unwrap();
    let daily = ddl.find("CREATE TABLE crop_daily").unwrap();
    assert!(users < farms && farms < crops && crops < daily);
    assert!(ddl.contains("ON DELETE CASCADE"));
    assert!(ddl.contains("CREATE INDEX IF NOT EXISTS"));
    assert!(ddl.contains("uix_crop_daily_crop_id_recorded_on ON crop_daily (crop_id, recorded_on) WHERE status = 'active'"));
}

// === Config ===

#[test]
fn test_config_show_without_url_fails() {
    let home = TempDir::new().unwrap();
    akaris(&home)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("database URL is not set"));
}

#[test]
fn test_config_show_redacts_password() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("store.toml");
    std::fs::write(
        &path,
        "database_url = \"postgres://farmer:s3cr3t@db:5432/akaris\"\nmax_connections = 8\n",
    )
    .unwrap();

    akaris(&home)
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("postgres://farmer:***@db:5432/akaris"))
        .stdout(predicate::str::contains("max_connections = 8"))
        .stdout(predicate::str::contains("s3cr3t").not());
}

#[test]
fn test_environment_overrides_file() {
    let home = TempDir::new().unwrap();
    std::fs::write(
        home.path().join("akaris.toml"),
        "database_url = \"postgres://localhost/akaris\"\n",
    )
    .unwrap();

    akaris(&home)
        .env("AKARIS_MAX_CONNECTIONS", "3")
        .args(["config", "show", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"max_connections\": 3"));
}

#[test]
fn test_config_path_prefers_local_file() {
    let home = TempDir::new().unwrap();
    akaris(&home)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("none"));

    std::fs::write(home.path().join("akaris.toml"), "").unwrap();
    akaris(&home)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("akaris.toml"));
}

#[test]
fn test_check_without_url_fails() {
    let home = TempDir::new().unwrap();
    akaris(&home).arg("check").assert().failure();
}
