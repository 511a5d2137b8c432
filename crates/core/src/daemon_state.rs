// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon's single-writer state document (`.loom/daemon-state.json`).
//!
//! Session ownership: the document records a `daemon_session_id`; a daemon
//! that finds another id there must yield and exit without further writes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::id::TaskId;

/// Current schema version of the state document.
pub const DAEMON_STATE_VERSION: u32 = 2;

/// Shepherd slot status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShepherdStatus {
    #[default]
    Idle,
    Working,
}

/// One shepherd slot in daemon state.
///
/// Invariant: `status == Working` implies `started` and `task_id` are set,
/// and `task_id` matches the 7-hex format. Violations are surfaced by the
/// snapshot's task-id validation, not silently repaired here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShepherdEntry {
    #[serde(default)]
    pub status: ShepherdStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<String>,
    /// Tier-1 no-progress warning timestamp (cleared on reset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_warning_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_since: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_issue: Option<u64>,
}

impl ShepherdEntry {
    pub fn is_working(&self) -> bool {
        self.status == ShepherdStatus::Working
    }

    /// True when working with a task_id that fails the canonical format.
    pub fn has_invalid_task_id(&self) -> bool {
        match (&self.status, &self.task_id) {
            (ShepherdStatus::Working, Some(tid)) => !TaskId::is_valid(tid),
            _ => false,
        }
    }

    /// Reset the slot to idle, recording why.
    pub fn reset_to_idle(&mut self, reason: &str, now: &str) {
        self.last_issue = self.issue.take();
        self.status = ShepherdStatus::Idle;
        self.task_id = None;
        self.pr_number = None;
        self.output_file = None;
        self.started = None;
        self.worktree = None;
        self.startup_warning_at = None;
        self.idle_since = Some(now.to_string());
        self.idle_reason = Some(reason.to_string());
        self.last_completed = Some(now.to_string());
    }
}

/// The eight background support roles.
pub const SUPPORT_ROLES: [&str; 8] = [
    "guide",
    "champion",
    "doctor",
    "auditor",
    "judge",
    "architect",
    "hermit",
    "curator",
];

/// Roles that can be triggered on demand rather than on interval.
pub const DEMAND_ROLES: [&str; 3] = ["champion", "doctor", "judge"];

/// Support role tracking entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupportRoleEntry {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed: Option<String>,
}

/// Retry bookkeeping for one blocked issue, keyed by error class.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockedIssueRetry {
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_retry_at: Option<String>,
    #[serde(default)]
    pub error_class: String,
    #[serde(default)]
    pub retry_exhausted: bool,
    #[serde(default)]
    pub escalated_to_human: bool,
}

/// Systemic failure tracker: repeated same-class failures suppress spawning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystematicFailure {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<String>,
    #[serde(default)]
    pub probe_count: u32,
}

/// Cleanup bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupState {
    #[serde(default, rename = "lastRun", skip_serializing_if = "Option::is_none")]
    pub last_run: Option<String>,
    #[serde(default, rename = "lastCleaned")]
    pub last_cleaned: Vec<String>,
    #[serde(default, rename = "pendingCleanup")]
    pub pending_cleanup: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Rolling iteration timing summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationTiming {
    #[serde(default)]
    pub last_duration_seconds: u64,
    #[serde(default)]
    pub avg_duration_seconds: u64,
    #[serde(default)]
    pub max_duration_seconds: u64,
}

/// A transient health warning, stamped each iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonWarning {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub time: String,
}

/// The daemon state document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonState {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<String>,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub iteration: u64,
    #[serde(default)]
    pub force_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemon_session_id: Option<String>,
    /// BTreeMap keeps shepherd ordering stable in the serialized document.
    #[serde(default, deserialize_with = "tolerant_shepherds")]
    pub shepherds: BTreeMap<String, ShepherdEntry>,
    #[serde(default)]
    pub support_roles: BTreeMap<String, SupportRoleEntry>,
    /// Keyed by issue number rendered as a string.
    #[serde(default)]
    pub blocked_issue_retries: BTreeMap<String, BlockedIssueRetry>,
    #[serde(default)]
    pub systematic_failure: SystematicFailure,
    #[serde(default)]
    pub cleanup: CleanupState,
    #[serde(default)]
    pub iteration_timing: IterationTiming,
    #[serde(default)]
    pub warnings: Vec<DaemonWarning>,
    #[serde(default)]
    pub completed_issues: Vec<u64>,
    #[serde(default)]
    pub total_prs_merged: u64,
}

impl DaemonState {
    /// Count of shepherds currently working.
    pub fn active_shepherd_count(&self) -> u32 {
        self.shepherds.values().filter(|e| e.is_working()).count() as u32
    }

    /// Issues currently tracked by working shepherds.
    pub fn tracked_issues(&self) -> Vec<u64> {
        self.shepherds
            .values()
            .filter(|e| e.is_working())
            .filter_map(|e| e.issue)
            .collect()
    }

    /// PR numbers currently tracked by working shepherds.
    pub fn tracked_prs(&self) -> Vec<u64> {
        self.shepherds
            .values()
            .filter(|e| e.is_working())
            .filter_map(|e| e.pr_number)
            .collect()
    }

    /// Find (or create) a free shepherd slot id (`shepherd-<N>`).
    pub fn free_shepherd_slot(&self, max_shepherds: u32) -> Option<String> {
        for n in 1..=max_shepherds {
            let id = format!("shepherd-{n}");
            match self.shepherds.get(&id) {
                Some(entry) if entry.is_working() => continue,
                _ => return Some(id),
            }
        }
        None
    }
}

/// Deserialize the shepherd map, skipping entries that fail to parse.
///
/// External tools occasionally leave malformed entries behind; dropping one
/// entry with a warning beats refusing to load the whole document.
fn tolerant_shepherds<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, ShepherdEntry>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: BTreeMap<String, serde_json::Value> = BTreeMap::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    for (key, value) in raw {
        match serde_json::from_value::<ShepherdEntry>(value) {
            Ok(entry) => {
                out.insert(key, entry);
            }
            Err(err) => {
                tracing::warn!(shepherd = %key, error = %err, "skipping malformed shepherd entry");
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "daemon_state_tests.rs"]
mod tests;
