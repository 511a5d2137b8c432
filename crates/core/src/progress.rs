// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-shepherd progress documents (`.loom/progress/shepherd-<task_id>.json`).
//!
//! The owning worker (or its monitor) is the single writer; the daemon only
//! reads. A working shepherd must refresh `last_heartbeat` within the stale
//! threshold, except during the startup grace window.

use serde::{Deserialize, Serialize};

/// Progress lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    #[default]
    Working,
    Completed,
    Errored,
    Blocked,
}

/// A progress milestone event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Milestone {
    pub event: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Milestone {
    pub fn new(event: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            timestamp: timestamp.into(),
            data: serde_json::Map::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

/// One shepherd's progress document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShepherdProgress {
    #[serde(default)]
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<u64>,
    #[serde(default)]
    pub status: ProgressStatus,
    #[serde(default)]
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<String>,
    #[serde(default)]
    pub current_phase: String,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

impl ShepherdProgress {
    pub fn new(task_id: impl Into<String>, issue: u64, now: &str) -> Self {
        Self {
            task_id: task_id.into(),
            issue: Some(issue),
            status: ProgressStatus::Working,
            started_at: now.to_string(),
            last_heartbeat: Some(now.to_string()),
            current_phase: String::new(),
            milestones: Vec::new(),
        }
    }

    pub fn is_working(&self) -> bool {
        self.status == ProgressStatus::Working
    }

    /// True when a milestone with the given event name has been recorded.
    pub fn has_milestone(&self, event: &str) -> bool {
        self.milestones.iter().any(|m| m.event == event)
    }

    /// Record a heartbeat, optionally updating the phase.
    pub fn heartbeat(&mut self, now: &str, phase: Option<&str>) {
        self.last_heartbeat = Some(now.to_string());
        if let Some(phase) = phase {
            self.current_phase = phase.to_string();
        }
    }

    /// Flip to errored and append an error milestone. Idempotent: a second
    /// call with the same reason does not duplicate the milestone.
    pub fn mark_errored(&mut self, reason: &str, now: &str) {
        let already = self.status == ProgressStatus::Errored
            && self
                .milestones
                .last()
                .map(|m| m.event == "error" && m.data.get("error").and_then(|v| v.as_str()) == Some(reason))
                .unwrap_or(false);
        self.status = ProgressStatus::Errored;
        self.last_heartbeat = Some(now.to_string());
        if !already {
            self.milestones.push(
                Milestone::new("error", now)
                    .with_data("error", reason)
                    .with_data("will_retry", false),
            );
        }
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
