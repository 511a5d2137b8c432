// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::context::EngineContext;
use loom_adapters::{FakeSessionHost, FakeTracker, FakeVcs, TrackerCall, VcsCall};
use loom_core::{FakeClock, LoomConfig, ValidationStatus};
use loom_storage::{read_recovery_events, write_checkpoint, Checkpoint, LoomPaths};
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
    // The repo root itself is a clean checkout in most scenarios.
    ctx.vcs.add_repo(ctx.paths.repo_root(), "main");
    Fixture { ctx, _dir: dir }
}

fn opts_with_worktree(f: &Fixture, issue: u64) -> ValidateOptions {
    ValidateOptions {
        worktree: Some(f.ctx.paths.worktree(issue).display().to_string()),
        ..Default::default()
    }
}

fn make_worktree(f: &Fixture, issue: u64) -> std::path::PathBuf {
    let worktree = f.ctx.paths.worktree(issue);
    std::fs::create_dir_all(&worktree).unwrap();
    f.ctx.vcs.add_repo(&worktree, &feature_branch(issue));
    worktree
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn satisfied_when_pr_exists_with_label() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "Add widget", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    f.ctx.tracker.add_pr(
        200,
        "feature/issue-42",
        "feat: add widget",
        "Closes #42\n\n## Summary\nAdds the widget with tests and docs covering every path.",
        &[labels::REVIEW_REQUESTED],
    );

    let result = validate_builder(&f.ctx, 42, &ValidateOptions::default()).await;
    assert_eq!(result.status, ValidationStatus::Satisfied);
    assert!(result.message.contains("PR #200"));
}

#[tokio::test]
async fn cached_pr_number_is_verified_open_first() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    f.ctx.tracker.add_pr(
        250,
        "some/other-branch",
        "feat: t",
        "Closes #42\n\n## Summary\nLong enough body to not count as minimal at all, truly.",
        &[labels::REVIEW_REQUESTED],
    );

    let opts = ValidateOptions {
        pr_number: Some(250),
        ..Default::default()
    };
    let result = validate_builder(&f.ctx, 42, &opts).await;
    assert_eq!(result.status, ValidationStatus::Satisfied);
}

#[tokio::test]
async fn missing_label_is_recovered_with_one_label_add() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    f.ctx.tracker.add_pr(
        200,
        "feature/issue-42",
        "feat: t",
        "Closes #42\n\n## Summary\nA sufficiently descriptive body for this change set here.",
        &[],
    );

    let result = validate_builder(&f.ctx, 42, &ValidateOptions::default()).await;
    assert_eq!(result.status, ValidationStatus::Recovered);
    assert_eq!(result.recovery_action, "add_label");
    assert!(f
        .ctx
        .tracker
        .labels_of_pr(200)
        .contains(&labels::REVIEW_REQUESTED.to_string()));

    let events = read_recovery_events(&f.ctx.paths);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].recovery_type, "add_label");
}

// ── Wrong-issue closing keyword (seed test 3) ────────────────────────────────

#[tokio::test]
async fn wrong_issue_keyword_is_struck_and_corrected_in_one_edit() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    f.ctx.tracker.add_pr(
        200,
        "feature/issue-42",
        "feat: t",
        "## Summary\nThis change refactors the widget pipeline end to end.\n\nCloses #999",
        &[labels::REVIEW_REQUESTED],
    );

    let result = validate_builder(&f.ctx, 42, &ValidateOptions::default()).await;
    assert_eq!(result.status, ValidationStatus::Satisfied);

    let body = f.ctx.tracker.body_of_pr(200);
    assert!(body.contains("~~Closes #999~~ (removed: wrong issue)"));
    assert!(body.contains("Closes #42"));

    // Exactly one body edit
    let body_edits = f
        .ctx
        .tracker
        .calls()
        .iter()
        .filter(|c| matches!(c, TrackerCall::EditPrBody { pr: 200 }))
        .count();
    assert_eq!(body_edits, 1);
}

// ── Generic title (boundary: warning, not failure) ───────────────────────────

#[tokio::test]
async fn generic_pr_title_warns_but_does_not_fail() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    f.ctx.tracker.add_pr(
        200,
        "feature/issue-42",
        "Implement changes for issue #42",
        "Closes #42\n\n## Summary\nBody that is long enough to avoid enrichment, easily.",
        &[labels::REVIEW_REQUESTED],
    );

    let result = validate_builder(&f.ctx, 42, &ValidateOptions::default()).await;
    assert_eq!(result.status, ValidationStatus::Satisfied);
    // Title untouched
    assert_eq!(
        f.ctx.tracker.pr_title(200).await.unwrap(),
        "Implement changes for issue #42"
    );
}

// ── Minimal body enrichment ──────────────────────────────────────────────────

#[tokio::test]
async fn minimal_body_is_enriched_with_file_list() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    f.ctx
        .tracker
        .add_pr(200, "feature/issue-42", "feat: t", "Closes #42", &[labels::REVIEW_REQUESTED]);
    f.ctx.tracker.set_pr_files(
        200,
        vec![loom_adapters::PrFile {
            path: "src/widget.rs".to_string(),
            additions: 120,
            deletions: 4,
        }],
    );

    let result = validate_builder(&f.ctx, 42, &ValidateOptions::default()).await;
    assert_eq!(result.status, ValidationStatus::Satisfied);

    let body = f.ctx.tracker.body_of_pr(200);
    assert!(body.contains("## Summary"));
    assert!(body.contains("src/widget.rs (+120/-4)"));
    // Original body preserved at the end
    assert!(body.ends_with("Closes #42"));
}

#[tokio::test]
async fn substantial_body_is_not_enriched() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    let body = "Closes #42\n\nThis PR restructures the entire widget pipeline, \
                moving parsing into its own module and adding regression tests.";
    f.ctx
        .tracker
        .add_pr(200, "feature/issue-42", "feat: t", body, &[labels::REVIEW_REQUESTED]);

    validate_builder(&f.ctx, 42, &ValidateOptions::default()).await;
    assert_eq!(f.ctx.tracker.body_of_pr(200), body);
}

// ── Closed-issue handling ────────────────────────────────────────────────────

#[tokio::test]
async fn closed_issue_with_pr_is_satisfied() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[], "2026-01-01T00:00:00Z");
    f.ctx.tracker.close_issue(42);
    f.ctx
        .tracker
        .add_pr(200, "feature/issue-42", "feat: t", "Closes #42", &[]);

    let result = validate_builder(&f.ctx, 42, &ValidateOptions::default()).await;
    assert_eq!(result.status, ValidationStatus::Satisfied);
}

#[tokio::test]
async fn closed_issue_without_pr_is_reopened_and_failed() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    f.ctx.tracker.close_issue(42);

    let result = validate_builder(&f.ctx, 42, &ValidateOptions::default()).await;
    assert_eq!(result.status, ValidationStatus::Failed);
    assert!(result.message.contains("reopened"));
    assert!(f
        .ctx
        .tracker
        .calls()
        .contains(&TrackerCall::ReopenIssue { issue: 42 }));
    // building -> blocked swap happened
    assert!(f
        .ctx
        .tracker
        .labels_of_issue(42)
        .contains(&labels::BLOCKED.to_string()));
}

// ── Failure paths ────────────────────────────────────────────────────────────

#[tokio::test]
async fn no_pr_and_no_worktree_fails_with_diagnostics() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");

    let result = validate_builder(&f.ctx, 42, &ValidateOptions::default()).await;
    assert_eq!(result.status, ValidationStatus::Failed);
    assert!(f
        .ctx
        .tracker
        .labels_of_issue(42)
        .contains(&labels::BLOCKED.to_string()));
    assert_eq!(f.ctx.tracker.issue_comments(42).len(), 1);
}

#[tokio::test]
async fn clean_worktree_with_nothing_unpushed_fails() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    make_worktree(&f, 42);

    let result = validate_builder(&f.ctx, 42, &opts_with_worktree(&f, 42)).await;
    assert_eq!(result.status, ValidationStatus::Failed);
    assert!(result.message.contains("no changes"));
}

#[tokio::test]
async fn no_changes_marker_only_commit_fails_without_recovery_pr() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    let worktree = make_worktree(&f, 42);
    f.ctx
        .vcs
        .set_unpushed_log(&worktree, &["abc1234 chore: no changes needed"]);
    f.ctx
        .vcs
        .set_committed_files(&worktree, &[".no-changes-needed"]);

    let result = validate_builder(&f.ctx, 42, &opts_with_worktree(&f, 42)).await;
    assert_eq!(result.status, ValidationStatus::Failed);
    assert!(result.message.contains("no-changes-needed"));
    // No PR was created
    assert!(!f
        .ctx
        .tracker
        .calls()
        .iter()
        .any(|c| matches!(c, TrackerCall::CreatePr { .. })));
}

#[tokio::test]
async fn marker_files_only_in_status_fails() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    let worktree = make_worktree(&f, 42);
    f.ctx
        .vcs
        .set_status(&worktree, &["?? .loom-in-use", " M .loom/checkpoint.json"]);

    let result = validate_builder(&f.ctx, 42, &opts_with_worktree(&f, 42)).await;
    assert_eq!(result.status, ValidationStatus::Failed);
    assert!(result.message.contains("marker files"));
}

// ── Mechanical recovery (seed test 2) ────────────────────────────────────────

#[tokio::test]
async fn uncommitted_changes_are_staged_committed_pushed_and_pred() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "Add widget support", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    let worktree = make_worktree(&f, 42);
    f.ctx.vcs.set_status(&worktree, &[" M src/file.py"]);
    f.ctx.vcs.set_diff_stat(&worktree, " src/file.py | 12 ++++++------");

    let result = validate_builder(&f.ctx, 42, &opts_with_worktree(&f, 42)).await;
    assert_eq!(result.status, ValidationStatus::Recovered);
    assert_eq!(result.recovery_action, "commit_and_pr");

    let vcs_calls = f.ctx.vcs.calls();
    assert!(vcs_calls.iter().any(
        |c| matches!(c, VcsCall::Stage { paths, .. } if paths == &["src/file.py".to_string()])
    ));
    assert!(vcs_calls.iter().any(
        |c| matches!(c, VcsCall::Commit { message, .. } if message.contains("issue #42"))
    ));
    assert!(vcs_calls
        .iter()
        .any(|c| matches!(c, VcsCall::Push { branch, .. } if branch == "feature/issue-42")));

    // PR created with closing keyword, recovery note, diff stat, and label
    let pr = f
        .ctx
        .tracker
        .find_pr_by_head("feature/issue-42", EntityState::Open)
        .await
        .unwrap()
        .unwrap();
    let body = f.ctx.tracker.body_of_pr(pr);
    assert!(body.contains("Closes #42"));
    assert!(body.contains("recovery path"));
    assert!(body.contains("src/file.py | 12"));
    assert!(f
        .ctx
        .tracker
        .labels_of_pr(pr)
        .contains(&labels::REVIEW_REQUESTED.to_string()));

    let events = read_recovery_events(&f.ctx.paths);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].recovery_type, "commit_and_pr");
    assert_eq!(events[0].reason, "validation_failed");
    assert!(events[0].worktree_had_changes);
}

#[tokio::test]
async fn unpushed_commits_without_dirty_tree_are_pushed_and_pred() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    let worktree = make_worktree(&f, 42);
    f.ctx
        .vcs
        .set_unpushed_log(&worktree, &["abc1234 feat: real work"]);
    f.ctx
        .vcs
        .set_committed_files(&worktree, &["src/lib.rs", "tests/lib.rs"]);

    let result = validate_builder(&f.ctx, 42, &opts_with_worktree(&f, 42)).await;
    assert_eq!(result.status, ValidationStatus::Recovered);
    // No staging needed; straight to push
    assert!(!f
        .ctx
        .vcs
        .calls()
        .iter()
        .any(|c| matches!(c, VcsCall::Stage { .. })));
    assert!(f
        .ctx
        .vcs
        .calls()
        .iter()
        .any(|c| matches!(c, VcsCall::Push { .. })));
}

#[tokio::test]
async fn prewritten_pr_body_is_used_and_close_ref_ensured() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    let worktree = make_worktree(&f, 42);
    f.ctx.vcs.set_status(&worktree, &[" M src/lib.rs"]);

    std::fs::create_dir_all(worktree.join(".loom")).unwrap();
    std::fs::write(
        worktree.join(".loom/pr-body.md"),
        "## Summary\nCarefully hand-written by the builder.",
    )
    .unwrap();

    let result = validate_builder(&f.ctx, 42, &opts_with_worktree(&f, 42)).await;
    assert_eq!(result.status, ValidationStatus::Recovered);

    let pr = f
        .ctx
        .tracker
        .find_pr_by_head("feature/issue-42", EntityState::Open)
        .await
        .unwrap()
        .unwrap();
    let body = f.ctx.tracker.body_of_pr(pr);
    assert!(body.contains("Carefully hand-written"));
    assert!(body.contains("Closes #42"));
}

#[tokio::test]
async fn push_failure_marks_blocked_with_diagnostics() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    let worktree = make_worktree(&f, 42);
    f.ctx.vcs.set_status(&worktree, &[" M src/lib.rs"]);
    f.ctx.vcs.fail_next_push();

    let result = validate_builder(&f.ctx, 42, &opts_with_worktree(&f, 42)).await;
    assert_eq!(result.status, ValidationStatus::Failed);
    assert!(result.message.contains("git push"));
    assert!(f
        .ctx
        .tracker
        .labels_of_issue(42)
        .contains(&labels::BLOCKED.to_string()));
}

// ── Checkpoint-aware retry ───────────────────────────────────────────────────

#[tokio::test]
async fn checkpoint_pr_created_triggers_one_retry() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    let worktree = make_worktree(&f, 42);
    write_checkpoint(
        &worktree,
        &Checkpoint::new(loom_storage::CheckpointStage::PrCreated, "2026-01-15T12:00:00Z"),
    )
    .unwrap();

    // The PR "propagates" only after the checkpoint is read; with the fake
    // tracker it is simply present on the retry.
    f.ctx.tracker.add_pr(
        200,
        "feature/issue-42",
        "feat: t",
        "Closes #42\n\n## Summary\nLong enough to not be considered minimal by anyone.",
        &[labels::REVIEW_REQUESTED],
    );

    let result = validate_builder(&f.ctx, 42, &opts_with_worktree(&f, 42)).await;
    assert_eq!(result.status, ValidationStatus::Satisfied);
}

// ── check_only / quiet ───────────────────────────────────────────────────────

#[tokio::test]
async fn check_only_never_mutates_anything() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    let worktree = make_worktree(&f, 42);
    f.ctx.vcs.set_status(&worktree, &[" M src/file.py"]);

    let opts = ValidateOptions {
        worktree: Some(worktree.display().to_string()),
        check_only: true,
        ..Default::default()
    };
    let result = validate_builder(&f.ctx, 42, &opts).await;
    assert_eq!(result.status, ValidationStatus::Failed);
    assert!(result.message.contains("check-only"));

    assert!(f.ctx.tracker.calls().is_empty());
    assert!(f.ctx.vcs.calls().is_empty());
    assert!(read_recovery_events(&f.ctx.paths).is_empty());
}

#[tokio::test]
async fn check_only_on_satisfied_state_has_no_side_effects() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    f.ctx.tracker.add_pr(
        200,
        "feature/issue-42",
        "feat: t",
        "Closes #999", // wrong ref would normally be corrected
        &[labels::REVIEW_REQUESTED],
    );

    let opts = ValidateOptions {
        check_only: true,
        ..Default::default()
    };
    let result = validate_builder(&f.ctx, 42, &opts).await;
    assert_eq!(result.status, ValidationStatus::Satisfied);
    assert!(f.ctx.tracker.calls().is_empty());
    assert_eq!(f.ctx.tracker.body_of_pr(200), "Closes #999");
}

#[tokio::test]
async fn quiet_mode_attempts_recovery_but_never_marks_blocked() {
    let f = fixture();
    f.ctx
        .tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    // No worktree, no PR: a loud failure would swap labels and comment.
    let opts = ValidateOptions {
        quiet: true,
        ..Default::default()
    };
    let result = validate_builder(&f.ctx, 42, &opts).await;
    assert_eq!(result.status, ValidationStatus::Failed);
    assert_eq!(f.ctx.tracker.labels_of_issue(42), vec![labels::BUILDING]);
    assert!(f.ctx.tracker.issue_comments(42).is_empty());
}

// ── Commit message derivation ────────────────────────────────────────────────

#[test]
fn commit_message_shapes() {
    assert_eq!(
        derive_commit_message(42, &[]),
        "feat: changes for issue #42"
    );
    assert_eq!(
        derive_commit_message(42, &["src/file.py".to_string()]),
        "feat: update src/file.py for issue #42"
    );
    assert_eq!(
        derive_commit_message(
            42,
            &["src/a.rs".to_string(), "src/b.rs".to_string()]
        ),
        "feat: update src (2 files) for issue #42"
    );
    assert_eq!(
        derive_commit_message(
            7,
            &["src/a.rs".to_string(), "docs/b.md".to_string()]
        ),
        "feat: changes for issue #7 (2 files)"
    );
}
