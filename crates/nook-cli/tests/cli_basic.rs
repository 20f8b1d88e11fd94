//! Basic CLI E2E tests.
//!
//! Tests invoke the built `nook` binary against an isolated data directory
//! and verify outputs.

use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use nook_core::storage::save_json;
use nook_core::{Clock, Database, Durations, SessionState, SystemClock, TimerEngine};
use serde_json::Value;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_nook"))
        .args(args)
        .env("NOOK_DATA_DIR", data_dir)
        .env_remove("NOOK_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_ok(data_dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(data_dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    stdout
}

/// Parse JSON-lines output.
fn json_lines(stdout: &str) -> Vec<Value> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("invalid JSON line"))
        .collect()
}

fn event_types(stdout: &str) -> Vec<String> {
    json_lines(stdout)
        .iter()
        .map(|v| v["type"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn test_timer_status_starts_idle() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_ok(dir.path(), &["timer", "status"]);
    let lines = json_lines(&out);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["type"], "state_snapshot");
    assert_eq!(lines[0]["status"], "idle");
    assert_eq!(lines[0]["mode"], "focus");
    assert_eq!(lines[0]["remaining_secs"], 1500);
}

#[test]
fn test_timer_start_pause_persists() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_ok(dir.path(), &["timer", "start"]);
    assert_eq!(event_types(&out), vec!["timer_started"]);

    let status = json_lines(&run_ok(dir.path(), &["timer", "status"]));
    assert_eq!(status[0]["status"], "running");

    let out = run_ok(dir.path(), &["timer", "pause"]);
    assert_eq!(event_types(&out), vec!["timer_paused"]);

    let stats: Value = serde_json::from_str(&run_ok(dir.path(), &["stats", "show"])).unwrap();
    assert_eq!(stats["totalPauses"], 1);
    assert_eq!(stats["abandonedSessions"], 1);
}

#[test]
fn test_status_during_countdown_prints_only_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["timer", "start"]);
    sleep(Duration::from_millis(1_100));
    let out = run_ok(dir.path(), &["timer", "status"]);
    assert_eq!(event_types(&out), vec!["state_snapshot"]);
}

#[test]
fn test_watch_yields_to_changes_from_other_commands() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["timer", "start"]);

    let mut watch = Command::new(env!("CARGO_BIN_EXE_nook"))
        .args(["timer", "watch"])
        .env("NOOK_DATA_DIR", dir.path())
        .env_remove("NOOK_LOG")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn watch");
    sleep(Duration::from_millis(600));

    run_ok(dir.path(), &["task", "add", "Added while watching"]);
    sleep(Duration::from_millis(1_500));
    run_ok(dir.path(), &["timer", "pause"]);

    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        if let Some(status) = watch.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            watch.kill().unwrap();
            panic!("watch kept running after the countdown was paused");
        }
        sleep(Duration::from_millis(50));
    };
    assert!(status.success());

    let snapshot = json_lines(&run_ok(dir.path(), &["timer", "status"]));
    assert_eq!(snapshot[0]["status"], "paused");
    let tasks: Value = serde_json::from_str(&run_ok(dir.path(), &["task", "list", "--json"])).unwrap();
    assert_eq!(tasks.as_array().map(Vec::len), Some(1));
    let stats: Value = serde_json::from_str(&run_ok(dir.path(), &["stats", "show"])).unwrap();
    assert_eq!(stats["totalPauses"], 1);
}

#[test]
fn test_invalid_transition_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["timer", "extend"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"), "stderr: {stderr}");

    let (_, _, code) = run_cli(dir.path(), &["timer", "pause"]);
    assert_eq!(code, 1);
}

#[test]
fn test_switch_mode() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_ok(dir.path(), &["timer", "switch", "short"]);
    let lines = json_lines(&out);
    assert_eq!(lines[0]["type"], "mode_switched");
    assert_eq!(lines[0]["duration_secs"], 300);

    let (_, _, code) = run_cli(dir.path(), &["timer", "switch", "lunch"]);
    assert_ne!(code, 0);
}

#[test]
fn test_expired_countdown_completes_on_next_invocation() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Database::open_at(&dir.path().join("nook.db")).unwrap();
        let two_hours_ago = SystemClock.now_ms().unwrap() - 2 * 3_600_000;
        let mut engine = TimerEngine::new(Durations::default());
        engine.start(two_hours_ago).unwrap();
        let state = SessionState {
            engine,
            ..SessionState::default()
        };
        save_json(&db, SessionState::STORE_KEY, &state).unwrap();
    }

    let out = run_ok(dir.path(), &["timer", "status"]);
    assert_eq!(
        event_types(&out),
        vec!["timer_completed", "awaiting_decision", "state_snapshot"]
    );
    let lines = json_lines(&out);
    assert_eq!(lines[0]["minutes"], 25);
    assert_eq!(lines[2]["awaiting_decision"], true);

    let history: Value = serde_json::from_str(&run_ok(dir.path(), &["stats", "history"])).unwrap();
    assert_eq!(history.as_array().map(Vec::len), Some(1));
    assert_eq!(history[0]["mode"], "focus");

    let out = run_ok(dir.path(), &["timer", "break"]);
    assert_eq!(event_types(&out), vec!["break_selected"]);
    let status = json_lines(&run_ok(dir.path(), &["timer", "status"]));
    assert_eq!(status[0]["mode"], "short");
    assert_eq!(status[0]["awaiting_decision"], false);
}

#[test]
fn test_config_get_set() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(run_ok(dir.path(), &["config", "get", "timer.focus_duration"]).trim(), "25");
    run_ok(dir.path(), &["config", "set", "timer.focus_duration", "50"]);
    assert_eq!(run_ok(dir.path(), &["config", "get", "timer.focus_duration"]).trim(), "50");

    let status = json_lines(&run_ok(dir.path(), &["timer", "status"]));
    assert_eq!(status[0]["remaining_secs"], 3000);

    let (_, _, code) = run_cli(dir.path(), &["config", "get", "timer.nope"]);
    assert_eq!(code, 1);
    let (_, _, code) = run_cli(dir.path(), &["config", "set", "goals.daily_goal", "lots"]);
    assert_eq!(code, 1);

    run_ok(dir.path(), &["config", "reset"]);
    assert_eq!(run_ok(dir.path(), &["config", "get", "timer.focus_duration"]).trim(), "25");
}

#[test]
fn test_task_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let added: Value = serde_json::from_str(&run_ok(
        dir.path(),
        &["task", "add", "Write essay", "--category", "Study", "--priority", "4"],
    ))
    .unwrap();
    let id = added["id"].as_str().unwrap().to_string();
    assert_eq!(added["category"], "Study");

    let list: Value = serde_json::from_str(&run_ok(dir.path(), &["task", "list", "--json"])).unwrap();
    assert_eq!(list.as_array().map(Vec::len), Some(1));

    run_ok(dir.path(), &["task", "focus", &id]);
    let out = run_ok(dir.path(), &["task", "list"]);
    assert!(out.contains("*[ ]"), "list output: {out}");

    assert!(run_ok(dir.path(), &["task", "complete", &id]).starts_with("completed"));
    assert!(run_ok(dir.path(), &["task", "complete", &id]).starts_with("already"));

    let stats: Value = serde_json::from_str(&run_ok(dir.path(), &["stats", "show"])).unwrap();
    assert_eq!(stats["tasksCompleted"], 1);

    let (_, _, code) = run_cli(dir.path(), &["task", "focus", "missing-id"]);
    assert_eq!(code, 1);
}

#[test]
fn test_analytics_for_new_user() {
    let dir = tempfile::tempdir().unwrap();
    let report: Value =
        serde_json::from_str(&run_ok(dir.path(), &["stats", "analytics"])).unwrap();
    assert_eq!(report["flowScore"], 0.0);
    assert!(report["goldenHour"].is_null());
    assert_eq!(report["monthlyVelocity"].as_array().map(Vec::len), Some(6));
}

#[test]
fn test_completions() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_ok(dir.path(), &["completions", "bash"]);
    assert!(out.contains("nook"));
}
