// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::context::EngineContext;
use loom_adapters::{FakeSessionHost, FakeTracker, FakeVcs};
use loom_core::{FakeClock, LoomConfig, ValidationStatus};
use loom_storage::LoomPaths;
use tempfile::TempDir;

struct Fixture {
    ctx: EngineContext<FakeTracker, FakeSessionHost, FakeVcs, FakeClock>,
    _dir: TempDir,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let paths = LoomPaths::new(dir.path());
    let ctx = EngineContext::new(
        FakeTracker::new(),
        FakeSessionHost::new(),
        FakeVcs::new(),
        FakeClock::new(),
        paths,
        LoomConfig::default(),
    );
    Fixture { ctx, _dir: dir }
}

// ── Curator ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn curator_satisfied_with_label() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::CURATED], "2026-01-01T00:00:00Z");

    let result = validate_curator(&f.ctx, 42, &ValidateOptions::default()).await;
    assert_eq!(result.status, ValidationStatus::Satisfied);
}

#[tokio::test]
async fn curator_recovery_swaps_curating_to_curated() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::CURATING], "2026-01-01T00:00:00Z");

    let result = validate_curator(&f.ctx, 42, &ValidateOptions::default()).await;
    assert_eq!(result.status, ValidationStatus::Recovered);
    assert_eq!(result.recovery_action, "apply_label");
    assert_eq!(f.ctx.tracker.labels_of_issue(42), vec![labels::CURATED]);
}

#[tokio::test]
async fn curator_check_only_fails_without_mutation() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[], "2026-01-01T00:00:00Z");

    let opts = ValidateOptions {
        check_only: true,
        ..Default::default()
    };
    let result = validate_curator(&f.ctx, 42, &opts).await;
    assert_eq!(result.status, ValidationStatus::Failed);
    assert!(f.ctx.tracker.calls().is_empty());
}

// ── Judge ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn judge_satisfied_by_approval_or_changes() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    f.ctx
        .tracker
        .add_pr(200, "feature/issue-42", "t", "b", &[labels::PR_APPROVED]);
    f.ctx
        .tracker
        .add_pr(201, "feature/issue-43", "t", "b", &[labels::CHANGES_REQUESTED]);

    let opts = |pr| ValidateOptions {
        pr_number: Some(pr),
        ..Default::default()
    };
    assert_eq!(
        validate_judge(&f.ctx, 42, &opts(200)).await.status,
        ValidationStatus::Satisfied
    );
    assert_eq!(
        validate_judge(&f.ctx, 42, &opts(201)).await.status,
        ValidationStatus::Satisfied
    );
}

#[tokio::test]
async fn judge_reports_doctor_intermediate_state_distinctly() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    f.ctx
        .tracker
        .add_pr(200, "feature/issue-42", "t", "b", &[labels::REVIEW_REQUESTED]);

    let opts = ValidateOptions {
        pr_number: Some(200),
        check_only: true,
        ..Default::default()
    };
    let result = validate_judge(&f.ctx, 42, &opts).await;
    assert_eq!(result.status, ValidationStatus::Failed);
    assert!(result.message.contains("Doctor applied fixes"));
}

#[tokio::test]
async fn judge_without_pr_number_fails() {
    let f = fixture();
    let result = validate_judge(&f.ctx, 42, &ValidateOptions::default()).await;
    assert_eq!(result.status, ValidationStatus::Failed);
    assert!(result.message.contains("PR number required"));
}

#[tokio::test]
async fn judge_failure_marks_issue_blocked() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    f.ctx.tracker.add_pr(200, "feature/issue-42", "t", "b", &[]);

    let opts = ValidateOptions {
        pr_number: Some(200),
        ..Default::default()
    };
    let result = validate_judge(&f.ctx, 42, &opts).await;
    assert_eq!(result.status, ValidationStatus::Failed);
    assert!(f
        .ctx
        .tracker
        .labels_of_issue(42)
        .contains(&labels::BLOCKED.to_string()));
    assert_eq!(f.ctx.tracker.issue_comments(42).len(), 1);
}

// ── Doctor ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn doctor_satisfied_when_review_requested_again() {
    let f = fixture();
    f.ctx
        .tracker
        .add_pr(200, "feature/issue-42", "t", "b", &[labels::REVIEW_REQUESTED]);

    let opts = ValidateOptions {
        pr_number: Some(200),
        ..Default::default()
    };
    let result = validate_doctor(&f.ctx, 42, &opts).await;
    assert_eq!(result.status, ValidationStatus::Satisfied);
}

#[tokio::test]
async fn doctor_fails_when_changes_still_requested() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    f.ctx
        .tracker
        .add_pr(200, "feature/issue-42", "t", "b", &[labels::CHANGES_REQUESTED]);

    let opts = ValidateOptions {
        pr_number: Some(200),
        quiet: true,
        ..Default::default()
    };
    let result = validate_doctor(&f.ctx, 42, &opts).await;
    assert_eq!(result.status, ValidationStatus::Failed);
    // quiet: no label change, no comment
    assert_eq!(f.ctx.tracker.labels_of_issue(42), vec![labels::BUILDING]);
    assert!(f.ctx.tracker.issue_comments(42).is_empty());
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn dispatch_routes_by_phase() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::CURATED], "2026-01-01T00:00:00Z");

    let result = validate_phase(&f.ctx, Phase::Curator, 42, &ValidateOptions::default()).await;
    assert_eq!(result.phase, Phase::Curator);
    assert_eq!(result.status, ValidationStatus::Satisfied);
}

// ── ANSI stripping ───────────────────────────────────────────────────────────

#[test]
fn strip_ansi_removes_color_codes() {
    let input = "\u{1b}[0;31merror\u{1b}[0m: something \u{1b}[1mbold\u{1b}[22m";
    assert_eq!(strip_ansi(input), "error: something bold");
}

#[test]
fn strip_ansi_passes_plain_text() {
    assert_eq!(strip_ansi("plain text"), "plain text");
    assert_eq!(strip_ansi(""), "");
}
