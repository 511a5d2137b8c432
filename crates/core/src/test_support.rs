// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders shared across crates (enabled by the `test-support` feature).

use crate::daemon_state::{DaemonState, ShepherdEntry, ShepherdStatus};
use crate::issue::{Issue, PullRequest};
use crate::progress::ShepherdProgress;

/// An issue with the given number and labels.
pub fn issue(number: u64, labels: &[&str]) -> Issue {
    Issue {
        number,
        title: format!("Issue {number}"),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        created_at: format!("2026-01-{:02}T00:00:00Z", (number % 27) + 1),
    }
}

/// An issue with an explicit creation timestamp (for ordering tests).
pub fn issue_created_at(number: u64, labels: &[&str], created_at: &str) -> Issue {
    Issue {
        created_at: created_at.to_string(),
        ..issue(number, labels)
    }
}

/// A PR with the given number and labels.
pub fn pr(number: u64, labels: &[&str]) -> PullRequest {
    PullRequest {
        number,
        title: format!("PR {number}"),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        head_ref: String::new(),
    }
}

/// A working shepherd entry.
pub fn working_shepherd(issue: u64, task_id: &str, started: &str) -> ShepherdEntry {
    ShepherdEntry {
        status: ShepherdStatus::Working,
        issue: Some(issue),
        task_id: Some(task_id.to_string()),
        started: Some(started.to_string()),
        ..Default::default()
    }
}

/// Daemon state with one working shepherd.
pub fn state_with_shepherd(slot: &str, entry: ShepherdEntry) -> DaemonState {
    let mut state = DaemonState::default();
    state.shepherds.insert(slot.to_string(), entry);
    state
}

/// A working progress document with a heartbeat.
pub fn working_progress(task_id: &str, issue: u64, started: &str, heartbeat: &str) -> ShepherdProgress {
    let mut p = ShepherdProgress::new(task_id, issue, started);
    p.last_heartbeat = Some(heartbeat.to_string());
    p
}
