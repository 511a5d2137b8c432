// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health metric time series and alert documents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum alerts retained; oldest evicted first.
pub const MAX_ALERTS: usize = 100;

/// Throughput sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThroughputMetric {
    #[serde(default)]
    pub issues_per_hour: f64,
    #[serde(default)]
    pub prs_per_hour: f64,
}

/// Latency sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetric {
    #[serde(default)]
    pub avg_iteration_seconds: u64,
}

/// Queue depth sample across the label state machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueDepths {
    #[serde(default)]
    pub ready: i64,
    #[serde(default)]
    pub building: i64,
    #[serde(default)]
    pub review_requested: i64,
    #[serde(default)]
    pub changes_requested: i64,
    #[serde(default)]
    pub ready_to_merge: i64,
}

/// Error rate sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorRates {
    #[serde(default)]
    pub consecutive_failures: u32,
    /// Percentage of successful iterations (0-100).
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub stuck_agents: u32,
}

/// Resource usage sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    #[serde(default)]
    pub active_shepherds: u32,
    /// Session budget consumption (0-100).
    #[serde(default)]
    pub session_percent: f64,
}

/// Pipeline health flags attached to a metric sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineHealthMetric {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub blocked_count: u32,
    #[serde(default)]
    pub retryable_count: u32,
    #[serde(default)]
    pub permanent_blocked_count: u32,
    #[serde(default)]
    pub systematic_failure_active: bool,
}

/// One sample in the health time series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub timestamp: String,
    #[serde(default)]
    pub throughput: ThroughputMetric,
    #[serde(default)]
    pub latency: LatencyMetric,
    #[serde(default)]
    pub queue_depths: QueueDepths,
    #[serde(default)]
    pub error_rates: ErrorRates,
    #[serde(default)]
    pub resource_usage: ResourceUsage,
    #[serde(default)]
    pub pipeline_health: PipelineHealthMetric,
}

/// Health status label derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Excellent,
    #[default]
    Good,
    Fair,
    Warning,
    Critical,
}

impl HealthStatus {
    /// Map a 0-100 score to its status label.
    pub fn from_score(score: u32) -> Self {
        match score {
            90..=100 => Self::Excellent,
            70..=89 => Self::Good,
            50..=69 => Self::Fair,
            30..=49 => Self::Warning,
            _ => Self::Critical,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Warning => "warning",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// The health metrics document (`.loom/health-metrics.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthMetrics {
    #[serde(default)]
    pub initialized_at: String,
    #[serde(default)]
    pub retention_hours: u64,
    #[serde(default)]
    pub metrics: Vec<MetricEntry>,
    #[serde(default)]
    pub health_score: u32,
    #[serde(default)]
    pub health_status: HealthStatus,
    #[serde(default)]
    pub last_updated: String,
}

/// Alert categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    StuckAgents,
    HighErrorRate,
    ResourceExhaustion,
    PipelineStall,
    SystematicFailure,
    QueueGrowth,
}

impl AlertType {
    /// Short kind slug used in alert ids (`alert-<kind>-<epoch>`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StuckAgents => "stuck",
            Self::HighErrorRate => "failures",
            Self::ResourceExhaustion => "resource",
            Self::PipelineStall => "pipeline-stall",
            Self::SystematicFailure => "systematic-failure",
            Self::QueueGrowth => "queue",
        }
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// One operator-facing alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: String,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        severity: AlertSeverity,
        message: impl Into<String>,
        timestamp: impl Into<String>,
        epoch: i64,
    ) -> Self {
        Self {
            id: format!("alert-{}-{epoch}", alert_type.kind()),
            alert_type,
            severity,
            message: message.into(),
            timestamp: timestamp.into(),
            acknowledged: false,
            acknowledged_at: None,
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

/// The alerts document (`.loom/alerts.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertsFile {
    #[serde(default)]
    pub initialized_at: String,
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

impl AlertsFile {
    /// Append alerts, evicting the oldest beyond [`MAX_ALERTS`].
    pub fn push_bounded(&mut self, new_alerts: impl IntoIterator<Item = Alert>) {
        self.alerts.extend(new_alerts);
        if self.alerts.len() > MAX_ALERTS {
            let excess = self.alerts.len() - MAX_ALERTS;
            self.alerts.drain(..excess);
        }
    }

    pub fn unacknowledged_count(&self) -> usize {
        self.alerts.iter().filter(|a| !a.acknowledged).count()
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
