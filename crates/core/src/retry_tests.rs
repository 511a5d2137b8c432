// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    mcp = { error_class::MCP_INFRASTRUCTURE_FAILURE, 1800, 5, false },
    shepherd = { error_class::SHEPHERD_FAILURE, 1800, 5, false },
    builder_unknown = { error_class::BUILDER_UNKNOWN_FAILURE, 7200, 3, true },
    builder_no_pr = { error_class::BUILDER_NO_PR, 7200, 3, true },
    test_failure = { error_class::BUILDER_TEST_FAILURE, 21600, 2, true },
    judge = { error_class::JUDGE_EXHAUSTED, 21600, 2, true },
    doctor = { error_class::DOCTOR_EXHAUSTED, 0, 0, true },
    doctor_no_progress = { error_class::DOCTOR_NO_PROGRESS, 0, 0, true },
)]
fn fixed_policies(class: &str, cooldown: u64, max_retries: u32, escalate: bool) {
    let cfg = LoomConfig::default();
    let policy = retry_policy(class, &cfg);
    assert_eq!(policy.cooldown, cooldown);
    assert_eq!(policy.max_retries, max_retries);
    assert_eq!(policy.escalate, escalate);
    assert!(is_known_class(class));
}

#[test]
fn unknown_class_uses_config_defaults() {
    let cfg = LoomConfig::default();
    let policy = retry_policy("mystery_error", &cfg);
    assert_eq!(policy.cooldown, cfg.retry_cooldown);
    assert_eq!(policy.max_retries, cfg.max_retry_count);
    assert!(policy.escalate);
    assert!(!is_known_class("mystery_error"));
}

#[test]
fn known_class_cooldown_is_fixed() {
    let cfg = LoomConfig::default();
    assert_eq!(
        effective_cooldown(error_class::BUILDER_TEST_FAILURE, 0, &cfg),
        21600
    );
    assert_eq!(
        effective_cooldown(error_class::BUILDER_TEST_FAILURE, 2, &cfg),
        21600
    );
}

#[test]
fn unknown_class_backs_off_exponentially_with_cap() {
    let cfg = LoomConfig::default();
    assert_eq!(effective_cooldown("mystery", 0, &cfg), 1800);
    assert_eq!(effective_cooldown("mystery", 1, &cfg), 3600);
    assert_eq!(effective_cooldown("mystery", 2, &cfg), 7200);
    assert_eq!(effective_cooldown("mystery", 3, &cfg), 14400);
    // Capped at retry_max_cooldown
    assert_eq!(effective_cooldown("mystery", 4, &cfg), 14400);
    assert_eq!(effective_cooldown("mystery", 20, &cfg), 14400);
}
