// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use loom_core::test_support::issue;
use loom_core::{error_class, labels, BlockedIssueRetry, SystematicFailure};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).single().unwrap()
}

fn counts(ready: u32, building: u32, blocked: u32) -> SnapshotCounts {
    SnapshotCounts {
        ready,
        building,
        blocked,
        ..Default::default()
    }
}

// ── Status classification ────────────────────────────────────────────────────

#[test]
fn all_blocked_is_stalled() {
    let health = compute_pipeline_health(
        &counts(0, 0, 2),
        &[issue(1, &[labels::BLOCKED]), issue(2, &[labels::BLOCKED])],
        &DaemonState::default(),
        &LoomConfig::default(),
        now(),
    );
    assert_eq!(health.status, PipelineStatus::Stalled);
    assert_eq!(health.stall_reason, Some("all_issues_blocked"));
}

#[test]
fn empty_pipeline_is_stalled_no_ready() {
    let health = compute_pipeline_health(
        &counts(0, 0, 0),
        &[],
        &DaemonState::default(),
        &LoomConfig::default(),
        now(),
    );
    assert_eq!(health.status, PipelineStatus::Stalled);
    assert_eq!(health.stall_reason, Some("no_ready_issues"));
}

#[test]
fn more_blocked_than_ready_is_degraded() {
    let health = compute_pipeline_health(
        &counts(1, 0, 3),
        &[],
        &DaemonState::default(),
        &LoomConfig::default(),
        now(),
    );
    assert_eq!(health.status, PipelineStatus::Degraded);
}

#[test]
fn in_flight_work_keeps_pipeline_healthy() {
    let mut c = counts(0, 1, 0);
    c.total_in_flight = 1;
    let health = compute_pipeline_health(
        &c,
        &[],
        &DaemonState::default(),
        &LoomConfig::default(),
        now(),
    );
    assert_eq!(health.status, PipelineStatus::Healthy);
}

// ── Retry classification ─────────────────────────────────────────────────────

#[test]
fn blocked_without_retry_info_is_retryable() {
    let health = compute_pipeline_health(
        &counts(0, 0, 1),
        &[issue(42, &[labels::BLOCKED])],
        &DaemonState::default(),
        &LoomConfig::default(),
        now(),
    );
    assert_eq!(health.retryable_count, 1);
    assert_eq!(health.retryable_issues[0].number, 42);
}

#[test]
fn exhausted_budget_escalates_once() {
    let mut state = DaemonState::default();
    state.blocked_issue_retries.insert(
        "42".to_string(),
        BlockedIssueRetry {
            retry_count: 3,
            error_class: error_class::BUILDER_UNKNOWN_FAILURE.to_string(),
            ..Default::default()
        },
    );
    state.blocked_issue_retries.insert(
        "43".to_string(),
        BlockedIssueRetry {
            retry_count: 3,
            error_class: error_class::BUILDER_UNKNOWN_FAILURE.to_string(),
            escalated_to_human: true,
            ..Default::default()
        },
    );

    let blocked = vec![issue(42, &[labels::BLOCKED]), issue(43, &[labels::BLOCKED])];
    let health = compute_pipeline_health(
        &counts(0, 0, 2),
        &blocked,
        &state,
        &LoomConfig::default(),
        now(),
    );
    assert_eq!(health.permanent_blocked_count, 2);
    assert_eq!(health.escalation_needed.len(), 1);
    assert_eq!(health.escalation_needed[0].number, 42);
}

#[test]
fn doctor_class_escalates_immediately() {
    let mut state = DaemonState::default();
    state.blocked_issue_retries.insert(
        "42".to_string(),
        BlockedIssueRetry {
            retry_count: 0,
            error_class: error_class::DOCTOR_EXHAUSTED.to_string(),
            ..Default::default()
        },
    );
    let health = compute_pipeline_health(
        &counts(0, 0, 1),
        &[issue(42, &[labels::BLOCKED])],
        &state,
        &LoomConfig::default(),
        now(),
    );
    assert_eq!(health.retryable_count, 0);
    assert_eq!(health.escalation_needed.len(), 1);
    assert!(health.escalation_needed[0]
        .reason
        .contains("immediate human review"));
}

#[test]
fn cooldown_not_elapsed_counts_permanent() {
    let mut state = DaemonState::default();
    state.blocked_issue_retries.insert(
        "42".to_string(),
        BlockedIssueRetry {
            retry_count: 1,
            error_class: error_class::SHEPHERD_FAILURE.to_string(),
            last_retry_at: Some("2026-01-15T11:50:00Z".to_string()),
            ..Default::default()
        },
    );
    // 600s since last retry, cooldown is 1800s
    let health = compute_pipeline_health(
        &counts(0, 0, 1),
        &[issue(42, &[labels::BLOCKED])],
        &state,
        &LoomConfig::default(),
        now(),
    );
    assert_eq!(health.retryable_count, 0);
    assert_eq!(health.permanent_blocked_count, 1);
    assert!(health.escalation_needed.is_empty());
}

// ── Systemic failure ─────────────────────────────────────────────────────────

#[test]
fn inactive_systemic_failure_is_default() {
    let state = DaemonState::default();
    let sf = compute_systematic_failure_state(&state, &LoomConfig::default(), now());
    assert!(!sf.active);
    assert!(!sf.cooldown_elapsed);
}

#[test]
fn cooldown_until_in_future_blocks_probe() {
    let mut state = DaemonState::default();
    state.systematic_failure = SystematicFailure {
        active: true,
        pattern: error_class::BUILDER_UNKNOWN_FAILURE.to_string(),
        count: 3,
        detected_at: Some("2026-01-15T11:30:00Z".to_string()),
        cooldown_until: Some("2026-01-15T12:30:00Z".to_string()),
        probe_count: 0,
    };
    let sf = compute_systematic_failure_state(&state, &LoomConfig::default(), now());
    assert!(sf.active);
    assert!(!sf.cooldown_elapsed);
    assert_eq!(sf.cooldown_remaining_seconds, 1800);
}

#[test]
fn cooldown_until_passed_allows_probe() {
    let mut state = DaemonState::default();
    state.systematic_failure = SystematicFailure {
        active: true,
        pattern: "x".to_string(),
        count: 3,
        detected_at: None,
        cooldown_until: Some("2026-01-15T11:59:00Z".to_string()),
        probe_count: 1,
    };
    let sf = compute_systematic_failure_state(&state, &LoomConfig::default(), now());
    assert!(sf.cooldown_elapsed);
    assert!(!sf.probes_exhausted);
}

#[test]
fn detected_at_fallback_doubles_with_probe_count() {
    let mut state = DaemonState::default();
    state.systematic_failure = SystematicFailure {
        active: true,
        pattern: "x".to_string(),
        count: 3,
        // 2000s ago; probe_count=1 makes the effective cooldown 3600s
        detected_at: Some("2026-01-15T11:26:40Z".to_string()),
        cooldown_until: None,
        probe_count: 1,
    };
    let sf = compute_systematic_failure_state(&state, &LoomConfig::default(), now());
    assert!(!sf.cooldown_elapsed);
    assert_eq!(sf.cooldown_remaining_seconds, 1600);
}

#[test]
fn probes_exhausted_at_max() {
    let mut state = DaemonState::default();
    state.systematic_failure = SystematicFailure {
        active: true,
        pattern: "x".to_string(),
        count: 3,
        detected_at: Some("2026-01-15T00:00:00Z".to_string()),
        cooldown_until: None,
        probe_count: 3,
    };
    let sf = compute_systematic_failure_state(&state, &LoomConfig::default(), now());
    assert!(sf.probes_exhausted);
}

// ── Health warnings ──────────────────────────────────────────────────────────

#[test]
fn healthy_when_no_warnings() {
    let mut c = counts(2, 1, 0);
    c.total_in_flight = 1;
    let (status, warnings) = compute_health(&c, &[], &[], 0, 0.0, &[]);
    assert_eq!(status, HealthIndicator::Healthy);
    assert!(warnings.is_empty());
}

#[test]
fn info_only_warnings_are_degraded() {
    // Empty pipeline: no_work_available (info)
    let (status, warnings) = compute_health(&counts(0, 0, 0), &[], &[], 0, 0.0, &[]);
    assert_eq!(status, HealthIndicator::Degraded);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].code, "no_work_available");
}

#[test]
fn warning_level_means_stalled() {
    let (status, warnings) = compute_health(&counts(0, 0, 3), &[], &[], 0, 0.0, &[]);
    assert_eq!(status, HealthIndicator::Stalled);
    assert!(warnings.iter().any(|w| w.code == "pipeline_stalled"));
}

#[test]
fn spinning_prs_warn() {
    let spinning = vec![SpinningPr {
        pr_number: 200,
        review_cycles: 3,
        linked_issue: Some(42),
    }];
    let mut c = counts(1, 1, 0);
    c.total_in_flight = 1;
    let (status, warnings) = compute_health(&c, &[], &spinning, 0, 0.0, &[]);
    assert_eq!(status, HealthIndicator::Stalled);
    assert!(warnings.iter().any(|w| w.code == "spinning_prs" && w.message.contains("#200")));
}
