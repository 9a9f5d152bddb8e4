//! CLI smoke tests.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("doifetch").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("acquire"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("show-config"));
}

#[test]
fn test_show_config_prints_settings() {
    let temp = tempfile::TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("doifetch").unwrap();
    cmd.env("DOIFETCH_DATA_DIR", temp.path())
        .env("DOIFETCH_DATA_DIR_N_GROUPS", "5000")
        .arg("show-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("data_dir_n_groups: 5000"))
        .stdout(predicate::str::contains("encryption_passphrase: none"));
}

#[test]
fn test_show_config_masks_passphrase() {
    let temp = tempfile::TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("doifetch").unwrap();
    cmd.env("DOIFETCH_DATA_DIR", temp.path())
        .env("DOIFETCH_ENCRYPTION_PASSPHRASE", "very-secret")
        .arg("show-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("encryption_passphrase: <set>"))
        .stdout(predicate::str::contains("very-secret").not());
}

#[test]
fn test_status_on_empty_data_dir() {
    let temp = tempfile::TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("doifetch").unwrap();
    cmd.env("DOIFETCH_DATA_DIR", temp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("works: 0"));
}

#[test]
fn test_acquire_requires_dois() {
    let mut cmd = Command::cargo_bin("doifetch").unwrap();
    cmd.arg("acquire").assert().failure();
}
