#![allow(deprecated)]

//! Command-line surface tests
//!
//! These run the binary but never reach a guide server: they stop at argument
//! parsing or at config validation.
use assert_cmd::Command;
use predicates::prelude::*;
mod common;

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("travai").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("threads"))
        .stdout(predicate::str::contains("--base-url"));
}

#[test]
fn test_version_with_valid_config() {
    let (_temp_dir, config_path) = common::temp_config_file(
        "server:\n  base_url: http://localhost:2024\nstream:\n  tick_interval_ms: 20\n  chars_per_tick: 3\n",
    );

    let mut cmd = Command::cargo_bin("travai").unwrap();
    cmd.arg("--config").arg(config_path).arg("--version");

    cmd.assert().success();
}

#[test]
fn test_zero_tick_interval_is_rejected() {
    let (_temp_dir, config_path) =
        common::temp_config_file("stream:\n  tick_interval_ms: 0\n");

    let mut cmd = Command::cargo_bin("travai").unwrap();
    cmd.env_remove("TRAVAI_TICK_INTERVAL_MS")
        .arg("--config")
        .arg(config_path)
        .arg("threads");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("tick_interval_ms must be between 1 and 1000"));
}

#[test]
fn test_non_http_base_url_is_rejected() {
    let (_temp_dir, config_path) =
        common::temp_config_file("server:\n  base_url: ftp://guide.example.com\n");

    let mut cmd = Command::cargo_bin("travai").unwrap();
    cmd.env_remove("TRAVAI_BASE_URL")
        .arg("--config")
        .arg(config_path)
        .arg("threads");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("must use http or https"));
}

#[test]
fn test_base_url_flag_overrides_config() {
    let (_temp_dir, config_path) =
        common::temp_config_file("server:\n  base_url: http://localhost:2024\n");

    let mut cmd = Command::cargo_bin("travai").unwrap();
    cmd.env_remove("TRAVAI_BASE_URL")
        .arg("--config")
        .arg(config_path)
        .arg("--base-url")
        .arg("not a url")
        .arg("threads");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("server.base_url is not a valid URL"));
}

#[test]
fn test_auth_key_and_clear_conflict() {
    let mut cmd = Command::cargo_bin("travai").unwrap();
    cmd.arg("auth").arg("--key").arg("abc").arg("--clear");

    cmd.assert().failure();
}
