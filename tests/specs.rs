// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level end-to-end scenarios exercising the crates together
//! through fake adapters.

use loom_adapters::{EntityState, FakeSessionHost, FakeTracker, FakeVcs, Tracker};
use loom_core::{labels, Clock, DaemonState, FakeClock, LoomConfig, ShepherdProgress, TaskId};
use loom_engine::{
    build_snapshot, collect_pipeline_data, run_orphan_recovery, validate_phase, Action,
    EngineContext, PipelineData, ValidateOptions,
};
use loom_storage::{read_recovery_events, IssueFailureLog, LoomPaths};
use tempfile::TempDir;

fn context(dir: &TempDir) -> EngineContext<FakeTracker, FakeSessionHost, FakeVcs, FakeClock> {
    let ctx = EngineContext::new(
        FakeTracker::new(),
        FakeSessionHost::new(),
        FakeVcs::new(),
        FakeClock::new(),
        LoomPaths::new(dir.path()),
        LoomConfig::default(),
    );
    ctx.vcs.add_repo(ctx.paths.repo_root(), "main");
    ctx
}

/// Builder mechanical recovery end to end: an abandoned worktree with
/// uncommitted changes becomes a pushed branch and a labelled PR, and the
/// recovery event is on disk for post-mortem review.
#[tokio::test]
async fn builder_mechanical_recovery_end_to_end() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    ctx.tracker
        .add_issue(42, "Fix the widget", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    let worktree = ctx.paths.worktree(42);
    std::fs::create_dir_all(&worktree).unwrap();
    ctx.vcs.add_repo(&worktree, "feature/issue-42");
    ctx.vcs.set_status(&worktree, &[" M src/file.py"]);
    ctx.vcs.set_diff_stat(&worktree, " src/file.py | 8 ++++----");

    let opts = ValidateOptions {
        worktree: Some(worktree.display().to_string()),
        ..Default::default()
    };
    let result = validate_phase(&ctx, loom_core::Phase::Builder, 42, &opts).await;
    assert!(result.is_satisfied());

    let pr = ctx
        .tracker
        .find_pr_by_head("feature/issue-42", EntityState::Open)
        .await
        .unwrap()
        .expect("recovery PR created");
    assert!(ctx.tracker.body_of_pr(pr).contains("Closes #42"));
    assert!(ctx
        .tracker
        .labels_of_pr(pr)
        .contains(&labels::REVIEW_REQUESTED.to_string()));

    let events = read_recovery_events(&ctx.paths);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].recovery_type, "commit_and_pr");

    // Running the validator again is now a clean Satisfied: no second PR,
    // no second recovery event.
    let again = validate_phase(&ctx, loom_core::Phase::Builder, 42, &opts).await;
    assert!(again.is_satisfied());
    assert_eq!(read_recovery_events(&ctx.paths).len(), 1);
}

/// Snapshot pipeline over live collection: label queries, ordering, slot
/// arithmetic, and the wait fallback all cohere.
#[tokio::test]
async fn snapshot_collection_to_actions() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    ctx.tracker
        .add_issue(1, "old", &[labels::ISSUE], "2026-01-01T00:00:00Z");
    ctx.tracker.add_issue(
        2,
        "urgent",
        &[labels::ISSUE, labels::URGENT],
        "2026-01-05T00:00:00Z",
    );
    ctx.tracker
        .add_issue(3, "building", &[labels::BUILDING], "2026-01-02T00:00:00Z");

    let data = collect_pipeline_data(&ctx.tracker).await;
    let snapshot = build_snapshot(
        data,
        Vec::new(),
        &DaemonState::default(),
        &IssueFailureLog::default(),
        Vec::new(),
        &ctx.config,
        ctx.clock.now_utc(),
        0,
        0.0,
    );

    let ready: Vec<u64> = snapshot.data.ready_issues.iter().map(|i| i.number).collect();
    assert_eq!(ready, vec![2, 1], "urgent first, then fifo");
    assert_eq!(snapshot.counts.building, 1);
    assert!(snapshot.recommended_actions.contains(&Action::SpawnShepherds));
    assert!(snapshot.recommended_actions.contains(&Action::CheckStuck));
    assert!(!snapshot.recommended_actions.contains(&Action::Wait));
}

/// An issue labelled building ends in exactly one of: claimed, `issue`, or
/// `blocked` after a recovery pass.
#[tokio::test]
async fn building_issue_invariant_after_recovery() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    // Claimed: untouched. Unclaimed: recovered to the ready queue.
    ctx.tracker
        .add_issue(10, "claimed", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    ctx.tracker
        .add_issue(11, "orphan", &[labels::BUILDING], "2026-01-02T00:00:00Z");
    assert!(ctx
        .claims
        .acquire(10, "cli-worker", ctx.clock.now_utc())
        .unwrap());

    run_orphan_recovery(&ctx, true).await;

    assert_eq!(ctx.tracker.labels_of_issue(10), vec![labels::BUILDING]);
    assert!(ctx.claims.is_held_valid(10, ctx.clock.now_utc()));
    assert_eq!(ctx.tracker.labels_of_issue(11), vec![labels::ISSUE]);
}

/// A working progress file with a heartbeat older than the stale threshold
/// plus the active grace is reported on the next snapshot.
#[tokio::test]
async fn stale_heartbeat_always_surfaces_in_snapshot() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let now = ctx.clock.now_utc();

    let started = loom_core::format_utc(now - chrono::Duration::seconds(1000));
    let heartbeat = loom_core::format_utc(now - chrono::Duration::seconds(500));
    let mut progress = ShepherdProgress::new("a1b2c3d", 42, &started);
    progress.last_heartbeat = Some(heartbeat);

    let snapshot = build_snapshot(
        PipelineData::default(),
        Vec::new(),
        &DaemonState::default(),
        &IssueFailureLog::default(),
        vec![progress],
        &ctx.config,
        now,
        0,
        0.0,
    );

    assert_eq!(snapshot.counts.stale_heartbeats, 1);
    assert!(!snapshot.orphaned_shepherds.is_empty());
    assert!(snapshot
        .health_warnings
        .iter()
        .any(|w| w.code == "stale_heartbeats"));
}

/// check_only validation leaves every persisted file and tracker entity
/// byte-identical.
#[tokio::test]
async fn check_only_is_pure() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    ctx.tracker
        .add_issue(42, "t", &[labels::BUILDING], "2026-01-01T00:00:00Z");
    let worktree = ctx.paths.worktree(42);
    std::fs::create_dir_all(&worktree).unwrap();
    ctx.vcs.add_repo(&worktree, "feature/issue-42");
    ctx.vcs.set_status(&worktree, &[" M src/lib.rs"]);

    let files_before: Vec<_> = walk(dir.path());

    for phase in [
        loom_core::Phase::Curator,
        loom_core::Phase::Builder,
        loom_core::Phase::Judge,
        loom_core::Phase::Doctor,
    ] {
        let opts = ValidateOptions {
            worktree: Some(worktree.display().to_string()),
            pr_number: Some(999),
            check_only: true,
            ..Default::default()
        };
        let _ = validate_phase(&ctx, phase, 42, &opts).await;
    }

    assert!(ctx.tracker.calls().is_empty());
    assert!(ctx.vcs.calls().is_empty());
    assert_eq!(walk(dir.path()), files_before);
}

/// Task id uniqueness and format hold across generated ids.
#[test]
fn task_id_contract() {
    let gen = loom_core::RandomTaskIdGen;
    let mut seen = std::collections::HashSet::new();
    for _ in 0..200 {
        let id = loom_core::TaskIdGen::next(&gen);
        assert!(TaskId::is_valid(id.as_str()));
        seen.insert(id);
    }
    assert_eq!(seen.len(), 200);
}

fn walk(root: &std::path::Path) -> Vec<(std::path::PathBuf, Vec<u8>)> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(content) = std::fs::read(&path) {
                files.push((path, content));
            }
        }
    }
    files.sort();
    files
}
