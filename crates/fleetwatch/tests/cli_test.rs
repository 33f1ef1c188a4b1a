//! Integration tests for the `fleetwatch` CLI binary.
//!
//! Argument parsing, help output, config management and REST-only
//! commands, without a live broker.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// `{"id":42,"sub":"alice","role":"ADMIN","exp":4102444800}`, unsigned.
const ALICE_TOKEN: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.\
    eyJpZCI6NDIsInN1YiI6ImFsaWNlIiwicm9sZSI6IkFETUlOIiwiZXhwIjo0MTAyNDQ0ODAwfQ.c2ln";

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `fleetwatch` binary with env isolation.
///
/// Clears all `FLEETWATCH_*` env vars, points config directories at a
/// nonexistent path and makes the keyring unreachable so tests never touch
/// the user's real configuration or secrets.
fn fleetwatch_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("fleetwatch");
    cmd.env("HOME", "/tmp/fleetwatch-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/fleetwatch-cli-test-nonexistent")
        .env("DBUS_SESSION_BUS_ADDRESS", "unix:path=/nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("FLEETWATCH_PROFILE")
        .env_remove("FLEETWATCH_CONFIG")
        .env_remove("FLEETWATCH_ENDPOINT")
        .env_remove("FLEETWATCH_API_BASE")
        .env_remove("FLEETWATCH_TOKEN")
        .env_remove("FLEETWATCH_OUTPUT")
        .env_remove("FLEETWATCH_INSECURE")
        .env_remove("FLEETWATCH_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

fn with_config(path: &Path) -> assert_cmd::Command {
    let mut cmd = fleetwatch_cmd();
    cmd.arg("--config").arg(path);
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = fleetwatch_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    fleetwatch_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("containers")
            .and(predicate::str::contains("agents"))
            .and(predicate::str::contains("status"))
            .and(predicate::str::contains("whoami")),
    );
}

#[test]
fn test_version_flag() {
    fleetwatch_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fleetwatch"));
}

#[test]
fn test_invalid_subcommand() {
    let output = fleetwatch_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_zsh() {
    fleetwatch_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_completions_bash() {
    fleetwatch_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Missing configuration ───────────────────────────────────────────

#[test]
fn test_containers_list_without_config() {
    let dir = tempfile::tempdir().unwrap();
    let output = with_config(&dir.path().join("config.toml"))
        .args(["containers", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("No deployment configured"), "{text}");
}

#[test]
fn test_unknown_profile_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let output = with_config(&dir.path().join("config.toml"))
        .args(["--profile", "staging", "agents", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("staging"));
}

#[test]
fn test_invalid_endpoint_scheme() {
    let output = fleetwatch_cmd()
        .args(["--endpoint", "http://localhost/ws", "containers", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("endpoint"));
}

// ── Config management ───────────────────────────────────────────────

#[test]
fn test_config_add_show_use_remove() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");

    with_config(&config)
        .args(["config", "add", "lab", "--url", "ws://10.0.0.5:8080/ws"])
        .assert()
        .success();
    with_config(&config)
        .args([
            "config",
            "add",
            "prod",
            "--url",
            "wss://monitor.example/ws",
            "--token-env",
            "PROD_TOKEN",
        ])
        .assert()
        .success();

    with_config(&config)
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* lab").and(predicate::str::contains("  prod")));

    with_config(&config)
        .args(["config", "use", "prod"])
        .assert()
        .success();
    with_config(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("default_profile = \"prod\"")
                .and(predicate::str::contains("token_env = \"PROD_TOKEN\"")),
        );

    with_config(&config)
        .args(["config", "remove", "prod"])
        .assert()
        .success();
    with_config(&config)
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* lab"));
}

#[test]
fn test_config_use_unknown_profile() {
    let dir = tempfile::tempdir().unwrap();
    let output = with_config(&dir.path().join("config.toml"))
        .args(["config", "use", "ghost"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_config_path_honors_flag() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("custom.toml");
    with_config(&config)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

// ── Identity ────────────────────────────────────────────────────────

#[test]
fn test_whoami_decodes_token() {
    fleetwatch_cmd()
        .env("FLEETWATCH_TOKEN", ALICE_TOKEN)
        .args(["whoami"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("alice")
                .and(predicate::str::contains("42"))
                .and(predicate::str::contains("(admin)")),
        );
}

#[test]
fn test_whoami_without_token() {
    let dir = tempfile::tempdir().unwrap();
    let output = with_config(&dir.path().join("config.toml"))
        .arg("whoami")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_whoami_rejects_garbage() {
    let output = fleetwatch_cmd()
        .args(["--token", "not-a-jwt", "whoami"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ── REST snapshot commands ──────────────────────────────────────────

async fn backend() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/containers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"containerId": 1, "containerName": "web", "state": "running", "health": "healthy"},
            {"containerId": 2, "containerName": "db", "state": "exited"},
            {"containerName": "no-id"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/agents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"agentId": 3, "agentName": "edge-1", "status": "ON"},
            {"agentId": 4, "agentName": "edge-2", "status": "OFF"}
        ])))
        .mount(&server)
        .await;
    server
}

async fn run(args: Vec<String>) -> std::process::Output {
    tokio::task::spawn_blocking(move || {
        fleetwatch_cmd()
            .env("FLEETWATCH_TOKEN", ALICE_TOKEN)
            .args(args)
            .output()
            .unwrap()
    })
    .await
    .unwrap()
}

fn session_args(server: &MockServer, rest: &[&str]) -> Vec<String> {
    let mut args = vec![
        "--endpoint".to_owned(),
        "ws://127.0.0.1:9/ws".to_owned(),
        "--api-base".to_owned(),
        format!("{}/api/", server.uri()),
    ];
    args.extend(rest.iter().map(|s| (*s).to_owned()));
    args
}

#[tokio::test(flavor = "multi_thread")]
async fn test_containers_list_plain() {
    let server = backend().await;
    let output = run(session_args(&server, &["-o", "plain", "containers", "list"])).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "1\n2");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_containers_list_filters_by_state() {
    let server = backend().await;
    let output = run(session_args(
        &server,
        &["-o", "json-compact", "containers", "list", "--state", "exited"],
    ))
    .await;
    assert!(output.status.success(), "{}", combined_output(&output));
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "db");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_agents_list_online_table() {
    let server = backend().await;
    let output = run(session_args(&server, &["agents", "list", "--status", "online"])).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("edge-1"));
    assert!(stdout.contains("Online"));
    assert!(!stdout.contains("edge-2"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_token_exits_with_auth_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let output = run(session_args(&server, &["containers", "list"])).await;
    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));
}
