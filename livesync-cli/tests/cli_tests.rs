//! Integration tests for the CLI binary, run against an in-process server.

use std::{sync::Arc, time::Duration};

use assert_cmd::{assert::OutputAssertExt, cargo::cargo_bin_cmd};
use predicates::prelude::*;
use server::{
    app_state::AppState,
    server::{create_app_router, metrics_handle, serve_on},
};
use shared::config::server::Config;
use tokio::{net::TcpListener, sync::oneshot};
use uuid::Uuid;

struct TestServer {
    base: String,
    stop: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(config: Config) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let state = Arc::new(AppState::in_memory(Arc::new(config)));
        let app = create_app_router(state, metrics_handle());
        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(serve_on(listener, app, async move {
            let _ = stopped.await;
        }));
        Self {
            base,
            stop: Some(stop),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// Runs the CLI off the async runtime so the in-process server keeps serving.
async fn run_cli(args: Vec<String>) -> std::process::Output {
    tokio::task::spawn_blocking(move || {
        let mut cmd = cargo_bin_cmd!("cli");
        cmd.args(&args)
            .env_remove("LIVESYNC_BEARER_TOKEN")
            .env_remove("LIVESYNC_SERVER_URL")
            .env_remove("RUST_LOG")
            .timeout(Duration::from_secs(20));
        cmd.output().unwrap()
    })
    .await
    .unwrap()
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

#[test]
fn help_lists_commands() {
    let mut cmd = cargo_bin_cmd!("cli");
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("follow"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("completion"));
}

#[test]
fn follow_requires_a_valid_conversation_id() {
    let mut cmd = cargo_bin_cmd!("cli");
    cmd.args(["follow", "not-a-uuid"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn config_command_prints_defaults() {
    let mut cmd = cargo_bin_cmd!("cli");
    cmd.args(["config", "--format", "toml"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("[server]"))
        .stdout(predicate::str::contains("page_size = 200"));
}

#[test]
fn config_command_rejects_unknown_format() {
    let mut cmd = cargo_bin_cmd!("cli");
    cmd.args(["config", "--format", "ini"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unsupported format"));
}

#[test]
fn completion_generates_bash_script() {
    let mut cmd = cargo_bin_cmd!("cli");
    cmd.args(["completion", "--shell", "bash"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("livesync"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn send_then_history_lists_the_message() {
    let server = TestServer::start(Config::with_defaults()).await;
    let conversation = Uuid::new_v4().to_string();

    let sent = run_cli(args(&[
        "send",
        &conversation,
        "hello mentor",
        "--name",
        "Sam",
        "--server",
        &server.base,
    ]))
    .await;
    sent.assert()
        .success()
        .stdout(predicate::str::starts_with("sent "));

    let history = run_cli(args(&["history", &conversation, "--server", &server.base])).await;
    history
        .assert()
        .success()
        .stdout(predicate::str::contains("Sam: hello mentor"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn follow_once_prints_the_reconciled_view() {
    let server = TestServer::start(Config::with_defaults()).await;
    let conversation = Uuid::new_v4().to_string();

    for content in ["first", "second"] {
        run_cli(args(&["send", &conversation, content, "--server", &server.base]))
            .await
            .assert()
            .success();
    }

    let follow = run_cli(args(&[
        "follow",
        &conversation,
        "--once",
        "--server",
        &server.base,
    ]))
    .await;
    let output = follow
        .assert()
        .success()
        .stdout(predicate::str::contains("-- ready | live | 2 messages --"))
        .get_output()
        .stdout
        .clone();

    let text = String::from_utf8(output).unwrap();
    let last_view = text.rsplit_once("--").map_or(text.as_str(), |(view, _)| view);
    let first = last_view.rfind("first").unwrap();
    let second = last_view.rfind("second").unwrap();
    assert!(first < second, "messages must render oldest first");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn follow_flags_a_page_limited_view() {
    let server = TestServer::start(Config::with_defaults()).await;
    let conversation = Uuid::new_v4().to_string();
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("livesync.yaml");
    std::fs::write(&config_path, "sync:\n  page_size: 1\n").unwrap();
    let config_path = config_path.to_string_lossy().into_owned();

    for content in ["first", "second"] {
        run_cli(args(&["send", &conversation, content, "--server", &server.base]))
            .await
            .assert()
            .success();
    }

    run_cli(args(&[
        "follow",
        &conversation,
        "--once",
        "--server",
        &server.base,
        "--config",
        &config_path,
    ]))
    .await
    .assert()
    .success()
    .stdout(predicate::str::contains(
        "-- ready | live | 1 messages (older messages not loaded) --",
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_token_is_reported_as_unauthorized() {
    let mut config = Config::with_defaults();
    config.auth.bearer_token = Some("s3cret".into());
    let server = TestServer::start(config).await;
    let conversation = Uuid::new_v4().to_string();

    run_cli(args(&["history", &conversation, "--server", &server.base]))
        .await
        .assert()
        .failure()
        .stderr(predicate::str::contains("unauthorized"));

    run_cli(args(&["follow", &conversation, "--once", "--server", &server.base]))
        .await
        .assert()
        .failure()
        .stderr(predicate::str::contains("unauthorized"));

    run_cli(args(&[
        "history",
        &conversation,
        "--server",
        &server.base,
        "--token",
        "s3cret",
    ]))
    .await
    .assert()
    .success();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn editing_unknown_message_fails_with_server_message() {
    let server = TestServer::start(Config::with_defaults()).await;
    let id = Uuid::new_v4().to_string();

    run_cli(args(&["edit", &id, "new text", "--server", &server.base]))
        .await
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to edit message"))
        .stderr(predicate::str::contains("not found"));
}
