//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary HOME so the
//! alarm database and config never touch the real data directory.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_alarmchain-cli"))
        .args(args)
        .env("HOME", home)
        .env_remove("ALARMCHAIN_ENV")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_cli_success(home: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "CLI command failed: {args:?}\n{stderr}");
    stdout
}

#[test]
fn test_alarm_add_and_list() {
    let home = tempfile::tempdir().unwrap();
    let out = run_cli_success(
        home.path(),
        &["alarm", "add", "06:45", "--id", "gym", "--label", "Gym", "--days", "mon,wed,fri"],
    );
    assert!(out.contains("Alarm created: gym"));

    let out = run_cli_success(home.path(), &["alarm", "list", "--json"]);
    let alarms: serde_json::Value = serde_json::from_str(&out).unwrap();
    let alarms = alarms.as_array().unwrap();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0]["id"], "gym");
    assert_eq!(alarms[0]["hour"], 6);
    assert_eq!(alarms[0]["minute"], 45);
    assert_eq!(alarms[0]["repeat_days"], serde_json::json!([1, 3, 5]));
}

#[test]
fn test_alarm_add_rejects_bad_time() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["alarm", "add", "25:00"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_alarm_disable_and_remove() {
    let home = tempfile::tempdir().unwrap();
    run_cli_success(home.path(), &["alarm", "add", "07:00", "--id", "a"]);

    run_cli_success(home.path(), &["alarm", "disable", "a"]);
    let out = run_cli_success(home.path(), &["alarm", "get", "a"]);
    let alarm: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(alarm["enabled"], false);

    run_cli_success(home.path(), &["alarm", "remove", "a"]);
    let (_, _, code) = run_cli(home.path(), &["alarm", "remove", "a"]);
    assert_eq!(code, 1);
}

#[test]
fn test_config_get_set() {
    let home = tempfile::tempdir().unwrap();
    let out = run_cli_success(home.path(), &["config", "get", "queue.max_external_slots"]);
    assert_eq!(out.trim(), "60");

    run_cli_success(home.path(), &["config", "set", "queue.max_external_slots", "30"]);
    let out = run_cli_success(home.path(), &["config", "get", "queue.max_external_slots"]);
    assert_eq!(out.trim(), "30");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "queue.max_external_slots", "0"]);
    assert_eq!(code, 1);
    let (_, _, code) = run_cli(home.path(), &["config", "get", "no.such.key"]);
    assert_eq!(code, 1);
}

#[test]
fn test_queue_plan_respects_slot_budget() {
    let home = tempfile::tempdir().unwrap();
    run_cli_success(home.path(), &["config", "set", "queue.max_external_slots", "20"]);
    for (id, time) in [("a", "06:00"), ("b", "07:00"), ("c", "08:00")] {
        run_cli_success(home.path(), &["alarm", "add", time, "--id", id]);
    }

    let out = run_cli_success(home.path(), &["queue", "plan", "--json"]);
    let events: serde_json::Value = serde_json::from_str(&out).unwrap();
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 20);
    assert!(events.iter().all(|e| e["is_registered"] == true));

    let out = run_cli_success(home.path(), &["queue", "status"]);
    let status: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(status["status"]["registered"], 20);
    assert_eq!(status["status"]["candidates"], 45);
    assert_eq!(status["backend"], "notification");
}

#[test]
fn test_simulate_prints_events() {
    let home = tempfile::tempdir().unwrap();
    // A one-shot alarm always fires within the next 24 hours.
    run_cli_success(home.path(), &["alarm", "add", "12:00", "--id", "noon"]);

    let out = run_cli_success(home.path(), &["simulate", "--hours", "24", "--step-secs", "60"]);
    let events: Vec<serde_json::Value> = out
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events[0]["type"], "AlarmFired");
    assert_eq!(events[0]["alarm_id"], "noon");
    assert_eq!(events[1]["type"], "AlarmDismissed");
}
