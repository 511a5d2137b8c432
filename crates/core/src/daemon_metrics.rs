// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Iteration-level daemon metrics (`.loom/daemon-metrics.json`).
//!
//! The scheduler is the single writer; the health monitor reads iteration
//! statistics from here when composing its samples.

use serde::{Deserialize, Serialize};

/// Rolling window of iteration durations.
pub const MAX_DURATION_SAMPLES: usize = 100;

/// Result classification for one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterationStatus {
    Success,
    Failure,
    Timeout,
}

/// Summary of the most recent iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastIteration {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub duration_seconds: u64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub summary: String,
}

/// Daemon loop health summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonHealth {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<String>,
}

/// Metrics tracked across daemon iterations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonMetrics {
    #[serde(default)]
    pub session_start: String,
    #[serde(default)]
    pub total_iterations: u64,
    #[serde(default)]
    pub successful_iterations: u64,
    #[serde(default)]
    pub failed_iterations: u64,
    #[serde(default)]
    pub timeout_iterations: u64,
    #[serde(default)]
    pub iteration_durations: Vec<u64>,
    #[serde(default)]
    pub average_iteration_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_iteration: Option<LastIteration>,
    #[serde(default)]
    pub health: DaemonHealth,
}

impl DaemonMetrics {
    pub fn new(session_start: impl Into<String>) -> Self {
        Self {
            session_start: session_start.into(),
            health: DaemonHealth {
                status: "healthy".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Record one iteration result and refresh the rolling average.
    pub fn record_iteration(
        &mut self,
        status: IterationStatus,
        duration_seconds: u64,
        summary: &str,
        timestamp: &str,
    ) {
        self.total_iterations += 1;
        self.last_iteration = Some(LastIteration {
            timestamp: timestamp.to_string(),
            duration_seconds,
            status: match status {
                IterationStatus::Success => "success".to_string(),
                IterationStatus::Failure => "failure".to_string(),
                IterationStatus::Timeout => "timeout".to_string(),
            },
            summary: summary.to_string(),
        });

        match status {
            IterationStatus::Success => {
                self.successful_iterations += 1;
                self.health.consecutive_failures = 0;
                self.health.last_success = Some(timestamp.to_string());
                self.health.status = "healthy".to_string();
            }
            IterationStatus::Timeout => {
                self.timeout_iterations += 1;
                self.health.consecutive_failures += 1;
            }
            IterationStatus::Failure => {
                self.failed_iterations += 1;
                self.health.consecutive_failures += 1;
            }
        }

        if self.health.consecutive_failures >= 3 {
            self.health.status = "unhealthy".to_string();
        }

        self.iteration_durations.push(duration_seconds);
        if self.iteration_durations.len() > MAX_DURATION_SAMPLES {
            let excess = self.iteration_durations.len() - MAX_DURATION_SAMPLES;
            self.iteration_durations.drain(..excess);
        }
        if !self.iteration_durations.is_empty() {
            self.average_iteration_seconds = self.iteration_durations.iter().sum::<u64>()
                / self.iteration_durations.len() as u64;
        }
    }

    /// Success percentage over all iterations (100 when none have run).
    pub fn success_rate(&self) -> f64 {
        if self.total_iterations == 0 {
            return 100.0;
        }
        (self.successful_iterations as f64 * 100.0) / self.total_iterations as f64
    }

    pub fn max_duration(&self) -> u64 {
        self.iteration_durations.iter().copied().max().unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "daemon_metrics_tests.rs"]
mod tests;
