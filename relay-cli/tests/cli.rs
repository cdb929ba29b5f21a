//! Drive the `pocket-relay` binary end to end.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn relay() -> Command {
    Command::cargo_bin("pocket-relay").unwrap()
}

#[test]
fn help_lists_commands() {
    relay()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("discover"))
        .stdout(predicate::str::contains("trust"));
}

#[test]
fn trust_add_persists_across_runs() {
    let dir = tempdir().unwrap();

    relay()
        .arg("--data-dir")
        .arg(dir.path())
        .args(["trust", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No trusted companions."));

    relay()
        .arg("--data-dir")
        .arg(dir.path())
        .args(["trust", "add", "ws://192.168.1.20:8080"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Trusted: ws://192.168.1.20:8080"));

    relay()
        .arg("--data-dir")
        .arg(dir.path())
        .args(["trust", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ws://192.168.1.20:8080"));
}

#[test]
fn trust_add_rejects_non_websocket_uri() {
    let dir = tempdir().unwrap();

    relay()
        .arg("--data-dir")
        .arg(dir.path())
        .args(["trust", "add", "http://192.168.1.20:8080"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected ws://host:port"));
}

#[test]
fn missing_explicit_config_fails() {
    let dir = tempdir().unwrap();

    relay()
        .arg("--data-dir")
        .arg(dir.path())
        .arg("--config")
        .arg(dir.path().join("nope.toml"))
        .args(["trust", "list"])
        .assert()
        .failure();
}
