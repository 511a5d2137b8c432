// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn working_entry(issue: u64, task_id: &str) -> ShepherdEntry {
    ShepherdEntry {
        status: ShepherdStatus::Working,
        issue: Some(issue),
        task_id: Some(task_id.to_string()),
        started: Some("2026-01-15T12:00:00Z".to_string()),
        ..Default::default()
    }
}

#[test]
fn active_count_and_tracked_issues() {
    let mut state = DaemonState::default();
    state
        .shepherds
        .insert("shepherd-1".into(), working_entry(42, "a1b2c3d"));
    state
        .shepherds
        .insert("shepherd-2".into(), ShepherdEntry::default());

    assert_eq!(state.active_shepherd_count(), 1);
    assert_eq!(state.tracked_issues(), vec![42]);
}

#[test]
fn invalid_task_id_detected_only_when_working() {
    let mut entry = working_entry(1, "NOT-HEX");
    assert!(entry.has_invalid_task_id());

    entry.status = ShepherdStatus::Idle;
    assert!(!entry.has_invalid_task_id());

    let valid = working_entry(1, "a1b2c3d");
    assert!(!valid.has_invalid_task_id());
}

#[test]
fn reset_to_idle_is_idempotent() {
    let mut entry = working_entry(42, "a1b2c3d");
    entry.startup_warning_at = Some("2026-01-15T12:01:00Z".to_string());

    entry.reset_to_idle("orphan_recovery", "2026-01-15T12:05:00Z");
    let after_first = entry.clone();
    entry.reset_to_idle("orphan_recovery", "2026-01-15T12:05:00Z");

    assert_eq!(entry.status, ShepherdStatus::Idle);
    assert_eq!(entry.idle_reason.as_deref(), Some("orphan_recovery"));
    assert!(entry.startup_warning_at.is_none());
    assert!(entry.task_id.is_none());
    // First reset preserves the issue as last_issue; second reset has no
    // issue left to move, so last_issue clears — the rest is identical.
    assert_eq!(after_first.last_issue, Some(42));
    assert_eq!(entry.status, after_first.status);
    assert_eq!(entry.idle_since, after_first.idle_since);
}

#[test]
fn free_slot_prefers_lowest_number() {
    let mut state = DaemonState::default();
    assert_eq!(state.free_shepherd_slot(3).as_deref(), Some("shepherd-1"));

    state
        .shepherds
        .insert("shepherd-1".into(), working_entry(1, "a1b2c3d"));
    assert_eq!(state.free_shepherd_slot(3).as_deref(), Some("shepherd-2"));

    state
        .shepherds
        .insert("shepherd-2".into(), working_entry(2, "b1b2c3d"));
    state
        .shepherds
        .insert("shepherd-3".into(), working_entry(3, "c1b2c3d"));
    assert_eq!(state.free_shepherd_slot(3), None);
}

#[test]
fn malformed_shepherd_entries_are_skipped() {
    let json = r#"{
        "shepherds": {
            "shepherd-1": {"status": "working", "issue": 42, "task_id": "a1b2c3d", "started": "2026-01-15T12:00:00Z"},
            "shepherd-2": ["this", "is", "not", "an", "entry"]
        }
    }"#;
    let state: DaemonState = serde_json::from_str(json).unwrap();
    assert_eq!(state.shepherds.len(), 1);
    assert!(state.shepherds.contains_key("shepherd-1"));
}

#[test]
fn unknown_keys_are_ignored() {
    let json = r#"{"running": true, "some_future_field": {"a": 1}}"#;
    let state: DaemonState = serde_json::from_str(json).unwrap();
    assert!(state.running);
}

#[test]
fn round_trip_preserves_session_id() {
    let mut state = DaemonState {
        daemon_session_id: Some("1760000000-4242".to_string()),
        running: true,
        iteration: 7,
        ..Default::default()
    };
    state
        .shepherds
        .insert("shepherd-1".into(), working_entry(42, "a1b2c3d"));

    let json = serde_json::to_string(&state).unwrap();
    let back: DaemonState = serde_json::from_str(&json).unwrap();
    assert_eq!(back.daemon_session_id.as_deref(), Some("1760000000-4242"));
    assert_eq!(back.iteration, 7);
    assert_eq!(back.shepherds["shepherd-1"].issue, Some(42));
}
