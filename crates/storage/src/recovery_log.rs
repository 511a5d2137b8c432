// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery-event log for post-mortem review.
//!
//! Every mechanical recovery (commit-and-PR, label repair, body enrichment)
//! appends an event; the log is bounded to the last 1000 entries.

use serde::{Deserialize, Serialize};
use std::fs;
use tracing::warn;

use crate::paths::LoomPaths;

/// Maximum recovery events retained.
pub const MAX_RECOVERY_EVENTS: usize = 1000;

/// One recovery event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryEvent {
    pub timestamp: String,
    pub issue: u64,
    /// What was done: `commit_and_pr`, `pr_only`, `add_label`,
    /// `enrich_pr_body`.
    pub recovery_type: String,
    /// Why: `validation_failed`, `rate_limited`, `minimal_pr_body`, ...
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<u64>,
    #[serde(default)]
    pub worktree_had_changes: bool,
    #[serde(default)]
    pub commits_recovered: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder_exit_reason: Option<String>,
}

/// Append an event to `.loom/metrics/recovery-events.json`, bounding the log.
///
/// Best-effort: failures are logged, never propagated — recovery bookkeeping
/// must not fail the recovery itself.
pub fn log_recovery_event(paths: &LoomPaths, event: RecoveryEvent) {
    let file = paths.recovery_events();
    if let Err(e) = fs::create_dir_all(paths.metrics_dir()) {
        warn!(error = %e, "failed to create metrics directory");
        return;
    }

    let mut events: Vec<RecoveryEvent> = fs::read_to_string(&file)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default();

    events.push(event);
    if events.len() > MAX_RECOVERY_EVENTS {
        let excess = events.len() - MAX_RECOVERY_EVENTS;
        events.drain(..excess);
    }

    match serde_json::to_string_pretty(&events) {
        Ok(json) => {
            if let Err(e) = fs::write(&file, json) {
                warn!(error = %e, path = %file.display(), "failed to write recovery events");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize recovery events"),
    }
}

/// Read all recovery events (empty when the file is missing or corrupt).
pub fn read_recovery_events(paths: &LoomPaths) -> Vec<RecoveryEvent> {
    fs::read_to_string(paths.recovery_events())
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "recovery_log_tests.rs"]
mod tests;
