//! Smoke tests -- verify the binary runs and the offline subcommands work.

use assert_cmd::Command;
use predicates::prelude::*;

fn watcher() -> Command {
    Command::cargo_bin("gerrit-watcher").unwrap()
}

#[test]
fn test_cli_help() {
    watcher()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Gerrit patch-set watcher"));
}

#[test]
fn test_cli_version() {
    watcher()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("gerrit-watcher"));
}

#[test]
fn test_serve_subcommand_exists() {
    watcher().args(["serve", "--help"]).assert().success();
}

#[test]
fn test_schedule_dry_run_subcommand_exists() {
    watcher()
        .args(["schedule", "dry-run", "--help"])
        .assert()
        .success();
}

#[test]
fn test_eligible_branches() {
    watcher()
        .args(["eligible", "5.11"])
        .assert()
        .success()
        .stdout(predicate::str::contains("version 5.11"))
        .stdout(predicate::str::contains("eligible"));

    watcher()
        .args(["eligible", "5.9"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not eligible"));

    watcher()
        .args(["eligible", "dev"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no version"));
}

#[test]
fn test_runs_on_missing_ledger() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("watcher.toml");
    std::fs::write(
        &config,
        format!(
            "[storage]\nledger_path = {:?}\n",
            dir.path().join("runs.json").display().to_string()
        ),
    )
    .unwrap();

    watcher()
        .args(["runs", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("No runs recorded."));
}

#[test]
fn test_schedule_dry_run_lists_default_checks() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("watcher.toml");
    std::fs::write(&config, "").unwrap();

    watcher()
        .args(["schedule", "dry-run", "--hours", "48", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("-> dev"))
        .stdout(predicate::str::contains("-> 5.12"));
}

#[test]
fn test_broken_env_config_is_reported() {
    let dir = tempfile::TempDir::new().unwrap();
    let broken = dir.path().join("broken.toml");
    std::fs::write(&broken, "[gerrit\nport = ").unwrap();

    watcher()
        .current_dir(dir.path())
        .env("GERRIT_WATCHER_CONFIG", &broken)
        .env_remove("RUST_LOG")
        .arg("runs")
        .assert()
        .success()
        .stdout(predicate::str::contains("No runs recorded."))
        .stderr(predicate::str::contains("could not be loaded"));
}

#[test]
fn test_explicit_config_load_is_logged() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("watcher.toml");
    std::fs::write(&config, "").unwrap();

    watcher()
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .args(["runs", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stderr(predicate::str::contains("loaded watcher configuration"));
}
