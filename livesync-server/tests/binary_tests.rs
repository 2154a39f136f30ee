//! Integration tests for the server binary's command line.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    let mut cmd = cargo_bin_cmd!("server");
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("LiveSync message server"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("spec"));
}

#[test]
fn invalid_command_fails() {
    let mut cmd = cargo_bin_cmd!("server");
    cmd.arg("invalid-command");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn spec_json_streams_openapi_document() {
    let mut cmd = cargo_bin_cmd!("server");
    cmd.args(["spec", "json"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"title\": \"LiveSync API\""))
        .stdout(predicate::str::contains("/api/stream/conversations/{conversation_id}"));
}

#[test]
fn spec_writes_requested_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("openapi.yaml");

    let mut cmd = cargo_bin_cmd!("server");
    cmd.arg("spec").arg(&path);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("OpenAPI spec written to"));
    assert!(path.exists());
}

#[test]
fn serve_rejects_invalid_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("livesync.yaml");
    std::fs::write(&path, "feed:\n  channel_capacity: 0\n").unwrap();

    let mut cmd = cargo_bin_cmd!("server");
    cmd.arg("serve")
        .arg("--config")
        .arg(&path)
        .timeout(std::time::Duration::from_secs(10));

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("failed to load configuration"));
}
