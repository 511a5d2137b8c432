// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration loaded from `LOOM_*` environment variables.
//!
//! Every knob has a documented default and can be overridden from the
//! environment; invalid values fall back to the default rather than
//! aborting startup.

use serde::{Deserialize, Serialize};

/// Issue ordering strategy within an urgency class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStrategy {
    Fifo,
    Lifo,
    Priority,
}

impl IssueStrategy {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "fifo" => Some(Self::Fifo),
            "lifo" => Some(Self::Lifo),
            "priority" => Some(Self::Priority),
            _ => None,
        }
    }
}

/// Full daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoomConfig {
    // Scheduler
    pub poll_interval: u64,
    pub iteration_timeout: u64,
    pub max_backoff: u64,
    pub backoff_multiplier: u64,
    pub backoff_threshold: u32,
    pub slow_iteration_multiplier: u64,

    // Pool
    pub max_shepherds: u32,
    pub max_proposals: u32,
    pub issue_threshold: u32,

    // Support role intervals / cooldowns (seconds of idle before next trigger)
    pub guide_interval: u64,
    pub champion_interval: u64,
    pub doctor_interval: u64,
    pub auditor_interval: u64,
    pub judge_interval: u64,
    pub curator_interval: u64,
    pub architect_cooldown: u64,
    pub hermit_cooldown: u64,

    // Strategy
    pub issue_strategy: IssueStrategy,

    // Staleness
    pub heartbeat_stale_threshold: u64,
    pub heartbeat_grace_period: u64,
    pub heartbeat_active_grace_period: u64,
    pub startup_grace_period: u64,
    pub no_progress_grace_period: u64,
    /// Orphan recovery uses its own, higher threshold: it is post-crash
    /// cleanup, not real-time monitoring.
    pub orphan_heartbeat_threshold: u64,

    // Retry (unknown error classes)
    pub max_retry_count: u32,
    pub retry_cooldown: u64,
    pub retry_backoff_multiplier: u64,
    pub retry_max_cooldown: u64,

    // Systemic failure
    pub systematic_failure_threshold: u32,
    pub systematic_failure_cooldown: u64,
    pub systematic_failure_max_probes: u32,

    // Spinning PR escalation
    pub spinning_review_threshold: u32,

    // Stuck detection
    pub stuck_idle_threshold: u64,
    pub stuck_working_threshold: u64,
    pub stuck_loop_threshold: u32,
    pub stuck_error_spike_threshold: u32,
    pub stuck_no_worktree_threshold: u64,
    pub stuck_max_retries: u32,

    // Health monitoring
    pub health_retention_hours: u64,
    pub queue_growth_threshold: i64,
    pub throughput_decline_threshold: u64,

    // Claims
    pub claim_ttl: u64,

    // Session host
    pub tmux_socket: String,
}

impl Default for LoomConfig {
    fn default() -> Self {
        Self {
            poll_interval: 120,
            iteration_timeout: 300,
            max_backoff: 1800,
            backoff_multiplier: 2,
            backoff_threshold: 3,
            slow_iteration_multiplier: 2,
            max_shepherds: 10,
            max_proposals: 5,
            issue_threshold: 3,
            guide_interval: 900,
            champion_interval: 600,
            doctor_interval: 300,
            auditor_interval: 600,
            judge_interval: 300,
            curator_interval: 300,
            architect_cooldown: 1800,
            hermit_cooldown: 1800,
            issue_strategy: IssueStrategy::Fifo,
            heartbeat_stale_threshold: 120,
            heartbeat_grace_period: 300,
            heartbeat_active_grace_period: 180,
            startup_grace_period: 120,
            no_progress_grace_period: 300,
            orphan_heartbeat_threshold: 300,
            max_retry_count: 3,
            retry_cooldown: 1800,
            retry_backoff_multiplier: 2,
            retry_max_cooldown: 14400,
            systematic_failure_threshold: 3,
            systematic_failure_cooldown: 1800,
            systematic_failure_max_probes: 3,
            spinning_review_threshold: 3,
            stuck_idle_threshold: 600,
            stuck_working_threshold: 1800,
            stuck_loop_threshold: 3,
            stuck_error_spike_threshold: 5,
            stuck_no_worktree_threshold: 300,
            stuck_max_retries: 2,
            health_retention_hours: 24,
            queue_growth_threshold: 5,
            throughput_decline_threshold: 50,
            claim_ttl: 3600,
            tmux_socket: "loom".to_string(),
        }
    }
}

impl LoomConfig {
    /// Build configuration from `LOOM_*` environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            poll_interval: env_u64("LOOM_POLL_INTERVAL", d.poll_interval),
            iteration_timeout: env_u64("LOOM_ITERATION_TIMEOUT", d.iteration_timeout),
            max_backoff: env_u64("LOOM_MAX_BACKOFF", d.max_backoff),
            backoff_multiplier: env_u64("LOOM_BACKOFF_MULTIPLIER", d.backoff_multiplier),
            backoff_threshold: env_u32("LOOM_BACKOFF_THRESHOLD", d.backoff_threshold),
            slow_iteration_multiplier: env_u64(
                "LOOM_SLOW_ITERATION_THRESHOLD_MULTIPLIER",
                d.slow_iteration_multiplier,
            ),
            max_shepherds: env_u32("LOOM_MAX_SHEPHERDS", d.max_shepherds),
            max_proposals: env_u32("LOOM_MAX_PROPOSALS", d.max_proposals),
            issue_threshold: env_u32("LOOM_ISSUE_THRESHOLD", d.issue_threshold),
            guide_interval: env_u64("LOOM_GUIDE_INTERVAL", d.guide_interval),
            champion_interval: env_u64("LOOM_CHAMPION_INTERVAL", d.champion_interval),
            doctor_interval: env_u64("LOOM_DOCTOR_INTERVAL", d.doctor_interval),
            auditor_interval: env_u64("LOOM_AUDITOR_INTERVAL", d.auditor_interval),
            judge_interval: env_u64("LOOM_JUDGE_INTERVAL", d.judge_interval),
            curator_interval: env_u64("LOOM_CURATOR_INTERVAL", d.curator_interval),
            architect_cooldown: env_u64("LOOM_ARCHITECT_COOLDOWN", d.architect_cooldown),
            hermit_cooldown: env_u64("LOOM_HERMIT_COOLDOWN", d.hermit_cooldown),
            issue_strategy: std::env::var("LOOM_ISSUE_STRATEGY")
                .ok()
                .and_then(|v| {
                    let parsed = IssueStrategy::parse(&v);
                    if parsed.is_none() && !v.is_empty() {
                        tracing::warn!(strategy = %v, "unknown issue strategy, falling back to fifo");
                    }
                    parsed
                })
                .unwrap_or(d.issue_strategy),
            heartbeat_stale_threshold: env_u64(
                "LOOM_HEARTBEAT_STALE_THRESHOLD",
                d.heartbeat_stale_threshold,
            ),
            heartbeat_grace_period: env_u64(
                "LOOM_HEARTBEAT_GRACE_PERIOD",
                d.heartbeat_grace_period,
            ),
            heartbeat_active_grace_period: env_u64(
                "LOOM_HEARTBEAT_ACTIVE_GRACE_PERIOD",
                d.heartbeat_active_grace_period,
            ),
            startup_grace_period: env_u64("LOOM_STARTUP_GRACE_PERIOD", d.startup_grace_period),
            no_progress_grace_period: env_u64(
                "LOOM_NO_PROGRESS_GRACE_PERIOD",
                d.no_progress_grace_period,
            ),
            orphan_heartbeat_threshold: env_u64(
                "LOOM_ORPHAN_HEARTBEAT_THRESHOLD",
                d.orphan_heartbeat_threshold,
            ),
            max_retry_count: env_u32("LOOM_MAX_RETRY_COUNT", d.max_retry_count),
            retry_cooldown: env_u64("LOOM_RETRY_COOLDOWN", d.retry_cooldown),
            retry_backoff_multiplier: env_u64(
                "LOOM_RETRY_BACKOFF_MULTIPLIER",
                d.retry_backoff_multiplier,
            ),
            retry_max_cooldown: env_u64("LOOM_RETRY_MAX_COOLDOWN", d.retry_max_cooldown),
            systematic_failure_threshold: env_u32(
                "LOOM_SYSTEMATIC_FAILURE_THRESHOLD",
                d.systematic_failure_threshold,
            ),
            systematic_failure_cooldown: env_u64(
                "LOOM_SYSTEMATIC_FAILURE_COOLDOWN",
                d.systematic_failure_cooldown,
            ),
            systematic_failure_max_probes: env_u32(
                "LOOM_SYSTEMATIC_FAILURE_MAX_PROBES",
                d.systematic_failure_max_probes,
            ),
            spinning_review_threshold: env_u32(
                "LOOM_SPINNING_REVIEW_THRESHOLD",
                d.spinning_review_threshold,
            ),
            stuck_idle_threshold: env_u64("LOOM_STUCK_IDLE_THRESHOLD", d.stuck_idle_threshold),
            stuck_working_threshold: env_u64(
                "LOOM_STUCK_WORKING_THRESHOLD",
                d.stuck_working_threshold,
            ),
            stuck_loop_threshold: env_u32("LOOM_STUCK_LOOP_THRESHOLD", d.stuck_loop_threshold),
            stuck_error_spike_threshold: env_u32(
                "LOOM_STUCK_ERROR_SPIKE_THRESHOLD",
                d.stuck_error_spike_threshold,
            ),
            stuck_no_worktree_threshold: env_u64(
                "LOOM_STUCK_NO_WORKTREE_THRESHOLD",
                d.stuck_no_worktree_threshold,
            ),
            stuck_max_retries: env_u32("LOOM_STUCK_MAX_RETRIES", d.stuck_max_retries),
            health_retention_hours: env_u64(
                "LOOM_HEALTH_RETENTION_HOURS",
                d.health_retention_hours,
            ),
            queue_growth_threshold: env_i64(
                "LOOM_QUEUE_GROWTH_THRESHOLD",
                d.queue_growth_threshold,
            ),
            throughput_decline_threshold: env_u64(
                "LOOM_THROUGHPUT_DECLINE_THRESHOLD",
                d.throughput_decline_threshold,
            ),
            claim_ttl: env_u64("LOOM_CLAIM_TTL", d.claim_ttl),
            tmux_socket: std::env::var("LOOM_TMUX_SOCKET").unwrap_or(d.tmux_socket),
        }
    }

    /// Interval (seconds of idle) before the named support role re-triggers.
    pub fn role_interval(&self, role: &str) -> u64 {
        match role {
            "guide" => self.guide_interval,
            "champion" => self.champion_interval,
            "doctor" => self.doctor_interval,
            "auditor" => self.auditor_interval,
            "judge" => self.judge_interval,
            "curator" => self.curator_interval,
            "architect" => self.architect_cooldown,
            "hermit" => self.hermit_cooldown,
            _ => 0,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_parse(key, default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_parse(key, default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env_parse(key, default)
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(val) if !val.is_empty() => val.parse().unwrap_or(default),
        _ => default,
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
