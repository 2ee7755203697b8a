//! Integration tests for the physio binary.
//!
//! These tests verify end-to-end behavior including:
//! - Scripted sessions and their scoring
//! - Local and remote persistence
//! - Profiles, tasks and the read-only views

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to create a test data directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Config without the post-session pause; `extra` is appended verbatim
fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("config.toml");
    let contents = format!("[session]\nunwind_delay_millis = 0\n{}", extra);
    fs::write(&path, contents).expect("Failed to write config");
    path
}

/// Helper to get the CLI binary pointed at an isolated data dir
fn cli(data_dir: &Path, config: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("physio"));
    cmd.arg("--data-dir")
        .arg(data_dir)
        .arg("--config")
        .arg(config);
    cmd
}

fn read_jsonl(path: &Path) -> Vec<serde_json::Value> {
    fs::read_to_string(path)
        .expect("Failed to read session log")
        .lines()
        .map(|l| serde_json::from_str(l).expect("Invalid JSON line"))
        .collect()
}

const FULL_CHIN_TUCK: &str = "s,r10,c,s,r10,c,f";

#[test]
fn test_cli_help() {
    Command::new(assert_cmd::cargo::cargo_bin!("physio"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Guided physiotherapy exercise sessions",
        ));
}

#[test]
fn test_exercises_filtered_by_category() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");

    cli(temp_dir.path(), &config)
        .args(["exercises", "--category", "knee"])
        .assert()
        .success()
        .stdout(predicate::str::contains("straight_leg_raise"))
        .stdout(predicate::str::contains("mini_squat"))
        .stdout(predicate::str::contains("chin_tuck").not());
}

#[test]
fn test_unknown_category_fails() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");

    cli(temp_dir.path(), &config)
        .args(["exercises", "--category", "elbow"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("elbow"));
}

#[test]
fn test_scripted_session_is_scored_and_logged() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    let config = write_config(temp_dir.path(), "");

    cli(&data_dir, &config)
        .args(["start", "chin_tuck", "--script", FULL_CHIN_TUCK, "--pain", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Session complete"))
        .stdout(predicate::str::contains("Points: 5"))
        .stdout(predicate::str::contains("Achievement unlocked: first_exercise"));

    // Written once at start and once on completion
    let lines = read_jsonl(&data_dir.join("sessions.jsonl"));
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["id"], lines[1]["id"]);
    assert_eq!(lines[0]["completed"], false);
    assert_eq!(lines[1]["completed"], true);
    assert_eq!(lines[1]["completed_sets"], 2);
    assert_eq!(lines[1]["points_earned"], 5);
    assert_eq!(lines[1]["pain_level"], 3);
    assert_eq!(lines[1]["user_id"], "local");

    let profiles: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(data_dir.join("profiles.json")).unwrap())
            .unwrap();
    let profile = &profiles["players"]["local"]["profile"];
    assert_eq!(profile["total_points"], 30);
    assert_eq!(profile["completed_exercises"], 1);
    assert_eq!(profile["streak_days"], 1);
}

#[test]
fn test_partial_session_scores_fraction() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    let config = write_config(temp_dir.path(), "");

    // 2 of 3 sets of a 10-point exercise
    cli(&data_dir, &config)
        .args(["start", "clamshell", "--script", "s,r12,c,s,r12,c,f"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Points: 6"));
}

#[test]
fn test_unknown_exercise_creates_nothing() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    let config = write_config(temp_dir.path(), "");

    cli(&data_dir, &config)
        .args(["start", "moonwalk", "--script", "f"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("moonwalk"));

    assert!(!data_dir.join("sessions.jsonl").exists());
}

#[test]
fn test_unfinished_script_leaves_incomplete_session() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    let config = write_config(temp_dir.path(), "");

    cli(&data_dir, &config)
        .args(["start", "chin_tuck", "--script", "s,r4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stopped before completion"));

    let lines = read_jsonl(&data_dir.join("sessions.jsonl"));
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["completed"], false);
    assert!(!data_dir.join("profiles.json").exists());
}

#[test]
fn test_invalid_script_step_fails() {
    let temp_dir = setup_test_dir();
    let config = write_config(temp_dir.path(), "");

    cli(temp_dir.path(), &config)
        .args(["start", "chin_tuck", "--script", "s,jump,f"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("jump"));
}

#[test]
fn test_remote_store_receives_session_and_profile() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    let config = write_config(temp_dir.path(), "[remote]\nenabled = true\n");

    cli(&data_dir, &config)
        .args(["--user", "patient-9", "start", "chin_tuck"])
        .args(["--script", FULL_CHIN_TUCK])
        .assert()
        .success();

    let remote = data_dir.join("remote");
    let sessions: Vec<_> = fs::read_dir(remote.join("exercise_sessions"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(sessions.len(), 1);
    let doc: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&sessions[0]).unwrap()).unwrap();
    assert_eq!(doc["completed"], true);
    assert_eq!(doc["user_id"], "patient-9");

    assert!(remote.join("users").join("patient-9.json").exists());

    cli(&data_dir, &config)
        .arg("leaderboard")
        .assert()
        .success()
        .stdout(predicate::str::contains("patient-9"));
}

#[test]
fn test_custom_exercise_from_config() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    let config = write_config(
        temp_dir.path(),
        r#"
[[exercises.custom]]
id = "towel_squeeze"
title = "Towel Squeeze"
category = "knee"
sets = 1
repetitions = 5
assigned = true
"#,
    );

    cli(&data_dir, &config)
        .args(["exercises", "--category", "knee"])
        .assert()
        .success()
        .stdout(predicate::str::contains("towel_squeeze"));

    cli(&data_dir, &config)
        .args(["start", "towel_squeeze", "--script", "s,r5,c,f"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Points: 10"));
}

#[test]
fn test_history_stats_and_tasks_after_session() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    let config = write_config(temp_dir.path(), "");

    cli(&data_dir, &config)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No completed sessions yet"));

    cli(&data_dir, &config)
        .args(["start", "chin_tuck", "--script", FULL_CHIN_TUCK])
        .assert()
        .success();

    cli(&data_dir, &config)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("Chin Tuck"));

    cli(&data_dir, &config)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Sessions completed: 1"))
        .stdout(predicate::str::contains("neck"));

    cli(&data_dir, &config)
        .arg("tasks")
        .assert()
        .success()
        .stdout(predicate::str::contains("Complete 3 exercises"))
        .stdout(predicate::str::contains("1/3"));

    cli(&data_dir, &config)
        .arg("achievements")
        .assert()
        .success()
        .stdout(predicate::str::contains("[x] First Step"));
}

#[test]
fn test_completing_unfinished_task_fails() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    let config = write_config(temp_dir.path(), "");

    cli(&data_dir, &config).arg("tasks").assert().success();

    let profiles: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(data_dir.join("profiles.json")).unwrap())
            .unwrap();
    let task_id = profiles["players"]["local"]["daily_tasks"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    cli(&data_dir, &config)
        .args(["tasks", "--complete", &task_id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TaskIncomplete"));
}

#[test]
fn test_export_and_compact() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    let config = write_config(temp_dir.path(), "");

    for _ in 0..2 {
        cli(&data_dir, &config)
            .args(["start", "chin_tuck", "--script", FULL_CHIN_TUCK])
            .assert()
            .success();
    }

    let out = temp_dir.path().join("export.csv");
    cli(&data_dir, &config)
        .arg("export")
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 2 sessions"));
    let csv = fs::read_to_string(&out).unwrap();
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.starts_with("id,user_id,exercise_id"));

    cli(&data_dir, &config)
        .arg("compact")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 sessions"));
    assert_eq!(read_jsonl(&data_dir.join("sessions.jsonl")).len(), 2);
}

#[test]
fn test_interactive_session_prints_state_after_each_step() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    let config = write_config(temp_dir.path(), "");

    cli(&data_dir, &config)
        .args(["start", "chin_tuck"])
        .write_stdin("s\nr10\nc\nf\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Set 1/2 | reps 0/10"))
        .stdout(predicate::str::contains("Set 1/2 | reps 10/10"))
        .stdout(predicate::str::contains("| resting"))
        .stdout(predicate::str::contains("Session complete"))
        .stdout(predicate::str::contains("Points: 2"));
}

#[test]
fn test_interactive_input_ending_early_cancels() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    let config = write_config(temp_dir.path(), "");

    cli(&data_dir, &config)
        .args(["start", "chin_tuck"])
        .write_stdin("s\nwiggle\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Set 1/2 | reps 0/10"))
        .stdout(predicate::str::contains("Unknown input: wiggle"))
        .stdout(predicate::str::contains("stopped before completion"));
}

#[test]
fn test_profile_records_clinical_details() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    let config = write_config(temp_dir.path(), "");

    cli(&data_dir, &config)
        .arg("profile")
        .assert()
        .success()
        .stdout(predicate::str::contains("Surgery:         no"));

    cli(&data_dir, &config)
        .args(["profile", "--doctor", "Dr. Okafor", "--surgery", "ACL repair"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Doctor:          Dr. Okafor"))
        .stdout(predicate::str::contains("Surgery:         yes (ACL repair)"));

    let profiles: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(data_dir.join("profiles.json")).unwrap())
            .unwrap();
    let profile = &profiles["players"]["local"]["profile"];
    assert_eq!(profile["has_surgery"], true);
    assert_eq!(profile["surgery_details"], "ACL repair");
    assert_eq!(profile["doctor_name"], "Dr. Okafor");

    cli(&data_dir, &config)
        .args(["profile", "--no-surgery"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Surgery:         no"))
        .stdout(predicate::str::contains("Dr. Okafor"));
}

#[test]
fn test_messages_with_physiotherapist() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    let config = write_config(temp_dir.path(), "");

    cli(&data_dir, &config)
        .args(["messages", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No messages yet"));

    // Goes to the assigned physiotherapist by default
    cli(&data_dir, &config)
        .args(["messages", "send", "Knee is sore after squats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Message sent to physiotherapist_local"));

    cli(&data_dir, &config)
        .args(["--user", "physiotherapist_local", "messages", "send"])
        .args(["Skip squats for two days", "--to", "local"])
        .args(["--type", "exercise_report", "--attachment", "https://example.org/plan"])
        .assert()
        .success();

    cli(&data_dir, &config)
        .args(["messages", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Unread: 1"))
        .stdout(predicate::str::contains("physiotherapist_local"))
        .stdout(predicate::str::contains("Skip squats for two days"));

    cli(&data_dir, &config)
        .args(["messages", "list", "--with", "physiotherapist_local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("local: Knee is sore after squats"))
        .stdout(predicate::str::contains("[exercisereport] Skip squats"))
        .stdout(predicate::str::contains("https://example.org/plan"));

    cli(&data_dir, &config)
        .args(["messages", "read"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Marked 1 messages"));

    cli(&data_dir, &config)
        .args(["messages", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Unread: 0"));

    // The physiotherapist has not read the patient's message yet
    cli(&data_dir, &config)
        .args(["--user", "physiotherapist_local", "messages", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Unread: 1"));
}

#[test]
fn test_message_validation_and_delete() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    let config = write_config(temp_dir.path(), "");

    cli(&data_dir, &config)
        .args(["messages", "send", "hello", "--type", "fax"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("fax"));
    assert!(!data_dir.join("messages.jsonl").exists());

    cli(&data_dir, &config)
        .args(["messages", "send", "hello"])
        .assert()
        .success();
    let lines = read_jsonl(&data_dir.join("messages.jsonl"));
    let id = lines[0]["id"].as_str().unwrap().to_string();

    cli(&data_dir, &config)
        .args(["messages", "delete", &id])
        .assert()
        .success();
    assert!(read_jsonl(&data_dir.join("messages.jsonl")).is_empty());

    cli(&data_dir, &config)
        .args(["messages", "delete", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Message not found"));
}

#[test]
fn test_messages_reach_other_device_through_remote() {
    let temp_dir = setup_test_dir();
    let patient_dir = temp_dir.path().join("patient");
    let therapist_dir = temp_dir.path().join("therapist");
    let remote = temp_dir.path().join("shared");
    let config = write_config(
        temp_dir.path(),
        &format!("[remote]\nenabled = true\nroot = {:?}\n", remote),
    );

    cli(&patient_dir, &config)
        .args(["--user", "p1", "messages", "send", "Done all sets", "--to", "d1"])
        .assert()
        .success();
    assert_eq!(fs::read_dir(remote.join("messages")).unwrap().count(), 1);

    cli(&therapist_dir, &config)
        .args(["--user", "d1", "messages", "sync"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Synced 1 messages"));

    cli(&therapist_dir, &config)
        .args(["--user", "d1", "messages", "list", "--with", "p1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("p1: Done all sets"));
}
