// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

fn event(issue: u64) -> RecoveryEvent {
    RecoveryEvent {
        timestamp: "2026-01-15T12:00:00Z".to_string(),
        issue,
        recovery_type: "commit_and_pr".to_string(),
        reason: "validation_failed".to_string(),
        ..Default::default()
    }
}

#[test]
fn append_and_read_back() {
    let dir = TempDir::new().unwrap();
    let paths = LoomPaths::new(dir.path());

    log_recovery_event(&paths, event(42));
    log_recovery_event(&paths, event(43));

    let events = read_recovery_events(&paths);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].issue, 42);
    assert_eq!(events[1].issue, 43);
}

#[test]
fn bounded_to_last_1000() {
    let dir = TempDir::new().unwrap();
    let paths = LoomPaths::new(dir.path());

    // Seed a file just under the cap, then push past it.
    let mut events: Vec<RecoveryEvent> = (0..MAX_RECOVERY_EVENTS as u64).map(event).collect();
    std::fs::create_dir_all(paths.metrics_dir()).unwrap();
    std::fs::write(
        paths.recovery_events(),
        serde_json::to_string(&events).unwrap(),
    )
    .unwrap();

    log_recovery_event(&paths, event(9999));
    events = read_recovery_events(&paths);
    assert_eq!(events.len(), MAX_RECOVERY_EVENTS);
    assert_eq!(events.last().unwrap().issue, 9999);
    assert_eq!(events[0].issue, 1);
}

#[test]
fn corrupt_log_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let paths = LoomPaths::new(dir.path());
    std::fs::create_dir_all(paths.metrics_dir()).unwrap();
    std::fs::write(paths.recovery_events(), "not json").unwrap();

    log_recovery_event(&paths, event(1));
    let events = read_recovery_events(&paths);
    assert_eq!(events.len(), 1);
}
