// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tiered retry policies by error class.
//!
//! Transient infrastructure errors get short cooldowns and many retries with
//! no human escalation; structural builder/judge/doctor failures get
//! hour-scale cooldowns, few retries, and escalation on exhaustion.

use crate::config::LoomConfig;

/// Error classes recorded when an issue enters the blocked state.
pub mod error_class {
    pub const MCP_INFRASTRUCTURE_FAILURE: &str = "mcp_infrastructure_failure";
    pub const SHEPHERD_FAILURE: &str = "shepherd_failure";
    pub const BUILDER_UNKNOWN_FAILURE: &str = "builder_unknown_failure";
    pub const BUILDER_NO_PR: &str = "builder_no_pr";
    pub const BUILDER_TEST_FAILURE: &str = "builder_test_failure";
    pub const JUDGE_EXHAUSTED: &str = "judge_exhausted";
    pub const DOCTOR_EXHAUSTED: &str = "doctor_exhausted";
    pub const DOCTOR_NO_PROGRESS: &str = "doctor_no_progress";
}

/// Per-error-class retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Cooldown in seconds between retry attempts.
    pub cooldown: u64,
    /// Maximum retry attempts before the budget is exhausted.
    pub max_retries: u32,
    /// Whether exhaustion adds the issue to needs_human_input.
    pub escalate: bool,
}

/// Whether the class has a fixed policy (vs. config-driven exponential backoff).
pub fn is_known_class(error_class: &str) -> bool {
    fixed_policy(error_class).is_some()
}

fn fixed_policy(error_class: &str) -> Option<RetryPolicy> {
    use error_class::*;
    let policy = match error_class {
        // Transient: short cooldown, auto-retry, no human escalation
        MCP_INFRASTRUCTURE_FAILURE | SHEPHERD_FAILURE => RetryPolicy {
            cooldown: 1800,
            max_retries: 5,
            escalate: false,
        },
        // Medium: 2h cooldown, max 3 retries, then escalate
        BUILDER_UNKNOWN_FAILURE | BUILDER_NO_PR => RetryPolicy {
            cooldown: 7200,
            max_retries: 3,
            escalate: true,
        },
        // Structural: 6h cooldown, max 2 retries, then escalate
        BUILDER_TEST_FAILURE | JUDGE_EXHAUSTED => RetryPolicy {
            cooldown: 21600,
            max_retries: 2,
            escalate: true,
        },
        // Doctor failures: immediate human escalation, no auto-retry
        DOCTOR_EXHAUSTED | DOCTOR_NO_PROGRESS => RetryPolicy {
            cooldown: 0,
            max_retries: 0,
            escalate: true,
        },
        _ => return None,
    };
    Some(policy)
}

/// Return the retry policy for an error class.
///
/// Unknown classes fall back to the global config defaults; their effective
/// cooldown grows exponentially with retry count (see [`effective_cooldown`]).
pub fn retry_policy(error_class: &str, cfg: &LoomConfig) -> RetryPolicy {
    fixed_policy(error_class).unwrap_or(RetryPolicy {
        cooldown: cfg.retry_cooldown,
        max_retries: cfg.max_retry_count,
        escalate: true,
    })
}

/// Effective cooldown for the next retry.
///
/// Known classes use their fixed cooldown; unknown classes use exponential
/// backoff (`cooldown * multiplier^retry_count`) capped at the configured
/// maximum.
pub fn effective_cooldown(error_class: &str, retry_count: u32, cfg: &LoomConfig) -> u64 {
    let policy = retry_policy(error_class, cfg);
    if is_known_class(error_class) {
        return policy.cooldown;
    }
    let factor = cfg
        .retry_backoff_multiplier
        .saturating_pow(retry_count.min(30));
    policy
        .cooldown
        .saturating_mul(factor)
        .min(cfg.retry_max_cooldown)
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
