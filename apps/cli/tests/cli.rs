//! End-to-end tests for the `rotator` binary

use assert_cmd::Command;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CREDENTIAL: &str = r#"{
  "login": "rotator-test",
  "password": "Initial-Passw0rd!",
  "shared_secret": "MTIzNDU2Nzg5MDEyMzQ1Njc4OTA=",
  "identity_secret": "YWJjZGVmZ2hpamtsbW5vcHFyc3Q=",
  "device_id": "android:0c6e5b3a",
  "account_id": 76561198000000042
}"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Credential file plus a config pointing every path into a temp dir.
    fn new(extra: &str) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("account.json"), CREDENTIAL).unwrap();
        let config = format!(
            "[account]\ncredential_file = '{}'\n\n[history]\npath = '{}'\n\n{extra}",
            dir.path().join("account.json").display(),
            dir.path().join("history.log").display(),
        );
        std::fs::write(dir.path().join("rotator.toml"), config).unwrap();
        Self { dir }
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("rotator.toml")
    }

    fn history(&self) -> PathBuf {
        self.dir.path().join("history.log")
    }

    fn rotator(&self) -> Command {
        rotator_in(self.dir.path(), Some(&self.config()))
    }
}

fn rotator_in(dir: &Path, config: Option<&Path>) -> Command {
    let mut cmd = Command::cargo_bin("rotator").unwrap();
    cmd.current_dir(dir)
        .env_remove("ROTATOR_CONFIG")
        .env_remove("ROTATOR_LOG")
        .env_remove("ROTATOR_LOG_FORMAT")
        .env_remove("RUST_LOG")
        .env_remove("ROTATOR_RESOLVED_PASSWORD")
        .env("ROTATOR_LOGGING__LEVEL", "warn");
    if let Some(config) = config {
        cmd.arg("--config").arg(config);
    }
    cmd
}

fn json(output: &[u8]) -> Value {
    serde_json::from_slice(output).unwrap()
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    rotator_in(dir.path(), None)
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("start")
                .and(predicate::str::contains("status"))
                .and(predicate::str::contains("change"))
                .and(predicate::str::contains("test-password"))
                .and(predicate::str::contains("test-connection"))
                .and(predicate::str::contains("resolve")),
        );
}

#[test]
fn test_password_follows_configured_policy() {
    let ws = Workspace::new("[password]\nlength = 20\nuse_special = false\n");

    let output = ws
        .rotator()
        .args(["test-password", "--json", "-n", "3"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let samples = json(&output);
    let samples = samples.as_array().unwrap();
    assert_eq!(samples.len(), 3);
    for sample in samples {
        let password = sample["password"].as_str().unwrap();
        assert_eq!(password.chars().count(), 20);
        assert!(password.chars().all(char::is_alphanumeric), "{password}");
        assert_eq!(sample["max_points"], 8);
    }
}

#[test]
fn test_status_with_empty_history() {
    // GIVEN: A configured account that was never rotated
    let ws = Workspace::new("");

    // WHEN: Status is queried
    let text = ws.rotator().arg("status").assert().success();

    // THEN: It reports a due rotation without creating the history file
    text.stdout(
        predicate::str::contains("rotator-test")
            .and(predicate::str::contains("never"))
            .and(predicate::str::contains("due now")),
    );
    assert!(!ws.history().exists());

    let output = ws
        .rotator()
        .args(["status", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let status = json(&output);
    assert_eq!(status["login"], "rotator-test");
    assert_eq!(status["total_successes"], 0);
    assert_eq!(status["pending_unconfirmed"], Value::Null);
    assert_eq!(status["due_now"], true);
}

#[test]
fn test_invalid_config_exits_with_config_code() {
    let ws = Workspace::new("[password]\nlength = 4\n");

    ws.rotator()
        .arg("status")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("password"));
}

#[test]
fn test_missing_config_file() {
    let dir = TempDir::new().unwrap();
    rotator_in(dir.path(), Some(&dir.path().join("absent.toml")))
        .arg("status")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_unreachable_remote_records_failure() {
    // GIVEN: A remote nobody listens on and a fast retry policy
    let ws = Workspace::new(
        "[remote]\nbase_url = 'http://127.0.0.1:9'\ntimeout = '2s'\n\n\
         [rotation.retry]\nmax_attempts = 2\ninitial_backoff = '10ms'\njitter = false\n",
    );

    // WHEN: A manual rotation runs
    ws.rotator()
        .arg("change")
        .assert()
        .code(3)
        .stdout(predicate::str::contains("transient_network"));

    // THEN: The failure is in the history and the password file is untouched
    let output = ws
        .rotator()
        .args(["status", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let status = json(&output);
    assert_eq!(status["recent"].as_array().unwrap().len(), 1);
    assert_eq!(status["recent"][0]["reason"], "transient_network");
    assert_eq!(status["recent"][0]["trigger"], "manual");
    let stored = std::fs::read_to_string(ws.dir.path().join("account.json")).unwrap();
    assert!(stored.contains("Initial-Passw0rd!"));
}

#[test]
fn test_log_format_from_environment() {
    // GIVEN: A text-format config and JSON requested through the environment
    let ws = Workspace::new(
        "[remote]\nbase_url = 'http://127.0.0.1:9'\n\n\
         [rotation.retry]\nmax_attempts = 1\n\n\
         [logging]\nformat = 'pretty'\n",
    );

    // WHEN: A run logs
    let output = ws
        .rotator()
        .env("ROTATOR_LOG", "info")
        .env("ROTATOR_LOG_FORMAT", "json")
        .arg("change")
        .assert()
        .code(3)
        .get_output()
        .stderr
        .clone();

    // THEN: Events arrive as JSON lines
    let stderr = String::from_utf8(output).unwrap();
    let started = stderr
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .find(|event| event["message"] == "Starting password rotation");
    let started = started.unwrap_or_else(|| panic!("no JSON start event in:\n{stderr}"));
    assert_eq!(started["level"], "INFO");
    assert_eq!(started["login"], "rotator-test");
}

#[test]
fn test_resolve_without_pending_change_is_refused() {
    let ws = Workspace::new("");

    ws.rotator()
        .args(["resolve", "--not-applied"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("no unconfirmed change"));
}

#[test]
fn test_resolve_needs_a_verdict() {
    let ws = Workspace::new("");

    ws.rotator().arg("resolve").assert().code(2);
}
