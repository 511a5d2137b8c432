// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stuck-detection result types and the persisted detection history.
//!
//! Stuck means running but failing to progress; orphaned means not running
//! at all. Detectors return a [`DetectionResult`]; the runner merges them,
//! taking the maximum severity.

use serde::{Deserialize, Serialize};

/// Maximum history entries kept in `.loom/stuck-history.json`.
pub const MAX_STUCK_HISTORY: usize = 100;

/// Severity, ordered: none < warning < elevated < critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StuckSeverity {
    #[default]
    None,
    Warning,
    Elevated,
    Critical,
}

/// What the detector suggests doing about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestedIntervention {
    #[default]
    None,
    Alert,
    Suggest,
    Pause,
    Clarify,
    Escalate,
}

impl StuckSeverity {
    /// Default intervention for a severity level.
    pub fn default_intervention(self) -> SuggestedIntervention {
        match self {
            Self::None => SuggestedIntervention::None,
            Self::Warning => SuggestedIntervention::Alert,
            Self::Elevated => SuggestedIntervention::Suggest,
            Self::Critical => SuggestedIntervention::Pause,
        }
    }
}

/// Result from a single detection strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(default)]
    pub detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicator: Option<String>,
    #[serde(default)]
    pub severity: StuckSeverity,
    #[serde(default)]
    pub suggested_intervention: SuggestedIntervention,
}

impl DetectionResult {
    pub fn clear() -> Self {
        Self::default()
    }

    pub fn detected(
        indicator: impl Into<String>,
        severity: StuckSeverity,
        intervention: SuggestedIntervention,
    ) -> Self {
        Self {
            detected: true,
            indicator: Some(indicator.into()),
            severity,
            suggested_intervention: intervention,
        }
    }
}

/// Thresholds governing the detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StuckThresholds {
    /// Seconds without output before an agent counts as idle.
    pub idle: u64,
    /// Seconds on one issue without a PR before extended-work fires.
    pub working: u64,
    /// Repetitions of one error line that count as looping.
    pub loop_count: u32,
    /// Error matches in the recent window that count as a spike.
    pub error_spike: u32,
    /// Seconds without a heartbeat before it is stale.
    pub heartbeat_stale: u64,
    /// Seconds without a `worktree_created` milestone before it is missing.
    pub no_worktree: u64,
}

impl Default for StuckThresholds {
    fn default() -> Self {
        Self {
            idle: 600,
            working: 1800,
            loop_count: 3,
            error_spike: 5,
            heartbeat_stale: 120,
            no_worktree: 300,
        }
    }
}

/// Computed metrics included in a detection report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StuckMetrics {
    #[serde(default)]
    pub idle_seconds: i64,
    #[serde(default)]
    pub working_seconds: i64,
    #[serde(default)]
    pub loop_count: u32,
    #[serde(default)]
    pub error_count: u32,
    /// -1 when no heartbeat is available.
    #[serde(default)]
    pub heartbeat_age: i64,
    #[serde(default)]
    pub current_phase: String,
}

/// Combined detection report for one agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StuckDetection {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<u64>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub stuck: bool,
    #[serde(default)]
    pub severity: StuckSeverity,
    #[serde(default)]
    pub suggested_intervention: SuggestedIntervention,
    #[serde(default)]
    pub indicators: Vec<String>,
    #[serde(default)]
    pub metrics: StuckMetrics,
    #[serde(default)]
    pub checked_at: String,
}

/// One history record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StuckHistoryEntry {
    #[serde(default)]
    pub detected_at: String,
    #[serde(default)]
    pub detection: StuckDetection,
}

/// The persisted detection history (`.loom/stuck-history.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StuckHistory {
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub entries: Vec<StuckHistoryEntry>,
}

impl StuckHistory {
    /// Append an entry, evicting the oldest beyond [`MAX_STUCK_HISTORY`].
    pub fn push_bounded(&mut self, entry: StuckHistoryEntry) {
        self.entries.push(entry);
        if self.entries.len() > MAX_STUCK_HISTORY {
            let excess = self.entries.len() - MAX_STUCK_HISTORY;
            self.entries.drain(..excess);
        }
    }
}

#[cfg(test)]
#[path = "stuck_tests.rs"]
mod tests;
