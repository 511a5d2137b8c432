// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-issue failure log driving iteration backoff and auto-blocking.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Failures before an issue is auto-blocked out of the ready queue.
pub const MAX_FAILURES_BEFORE_BLOCK: u32 = 3;

/// Iteration-backoff cap.
const MAX_BACKOFF_ITERATIONS: u32 = 8;

/// Failure record for one issue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureEntry {
    #[serde(default)]
    pub total_failures: u32,
    #[serde(default)]
    pub first_seen: String,
    #[serde(default)]
    pub last_seen: String,
}

impl FailureEntry {
    /// Exponential iteration backoff: 1 failure skips nothing, then each
    /// further failure doubles the skip window, capped.
    ///
    /// The scheduler works the issue only when
    /// `iteration % (backoff_iterations + 1) == 0`.
    pub fn backoff_iterations(&self) -> u32 {
        if self.total_failures <= 1 {
            return 0;
        }
        (1u32 << (self.total_failures - 2).min(31)).min(MAX_BACKOFF_ITERATIONS)
    }

    pub fn should_auto_block(&self) -> bool {
        self.total_failures >= MAX_FAILURES_BEFORE_BLOCK
    }
}

/// The failure log document (`.loom/issue-failures.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueFailureLog {
    /// Keyed by issue number rendered as a string.
    #[serde(default)]
    pub entries: BTreeMap<String, FailureEntry>,
}

impl IssueFailureLog {
    pub fn entry(&self, issue: u64) -> Option<&FailureEntry> {
        self.entries.get(&issue.to_string())
    }

    /// Record one failure for an issue.
    pub fn record_failure(&mut self, issue: u64, now: &str) -> &FailureEntry {
        let entry = self.entries.entry(issue.to_string()).or_default();
        if entry.total_failures == 0 {
            entry.first_seen = now.to_string();
        }
        entry.total_failures += 1;
        entry.last_seen = now.to_string();
        entry
    }

    /// Drop an issue's record (after successful completion).
    pub fn clear(&mut self, issue: u64) {
        self.entries.remove(&issue.to_string());
    }

    /// True when the issue should be skipped this iteration.
    pub fn in_backoff(&self, issue: u64, current_iteration: u64) -> bool {
        match self.entry(issue) {
            Some(entry) => {
                if entry.should_auto_block() {
                    return true;
                }
                let backoff = entry.backoff_iterations() as u64;
                backoff > 0 && current_iteration % (backoff + 1) != 0
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "failure_log_tests.rs"]
mod tests;
