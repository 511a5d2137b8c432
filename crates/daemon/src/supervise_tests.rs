// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use loom_adapters::{FakeSessionHost, FakeTracker, FakeVcs};
use loom_core::{FakeClock, LoomConfig, ShepherdEntry, ShepherdStatus};
use loom_storage::LoomPaths;
use tempfile::TempDir;

struct Fixture {
    ctx: EngineContext<FakeTracker, FakeSessionHost, FakeVcs, FakeClock>,
    _dir: TempDir,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let ctx = EngineContext::new(
        FakeTracker::new(),
        FakeSessionHost::new(),
        FakeVcs::new(),
        FakeClock::new(),
        LoomPaths::new(dir.path()),
        LoomConfig::default(),
    );
    Fixture { ctx, _dir: dir }
}

fn ts_secs_ago(f: &Fixture, secs: i64) -> String {
    loom_core::format_utc(f.ctx.clock.now_utc() - chrono::Duration::seconds(secs))
}

fn seed_working_shepherd(f: &Fixture, issue: u64, task_id: &str, started_secs_ago: i64) {
    let started = ts_secs_ago(f, started_secs_ago);
    f.ctx
        .store
        .update::<DaemonState, _>(&f.ctx.paths.daemon_state(), |state| {
            state.shepherds.insert(
                "shepherd-1".to_string(),
                ShepherdEntry {
                    status: ShepherdStatus::Working,
                    issue: Some(issue),
                    task_id: Some(task_id.to_string()),
                    started: Some(started.clone()),
                    ..Default::default()
                },
            );
        })
        .unwrap();
}

fn write_progress(f: &Fixture, task_id: &str, issue: u64) {
    let p = loom_core::ShepherdProgress::new(task_id, issue, &ts_secs_ago(f, 10));
    f.ctx
        .store
        .store(&f.ctx.paths.progress_file(task_id), &p)
        .unwrap();
}

#[tokio::test]
async fn within_startup_grace_nothing_happens() {
    let f = fixture();
    seed_working_shepherd(&f, 42, "a1b2c3d", 60); // < 120s grace

    let actions = supervise_no_progress(&f.ctx).await;
    assert!(actions.is_empty());

    let state: DaemonState = f.ctx.store.load(&f.ctx.paths.daemon_state()).unwrap();
    assert!(state.shepherds["shepherd-1"].is_working());
}

#[tokio::test]
async fn tier_one_records_warning_without_killing() {
    let f = fixture();
    seed_working_shepherd(&f, 42, "a1b2c3d", 200); // between 120s and 300s
    f.ctx
        .sessions
        .add_session("loom-builder-issue-42", "some output");

    let actions = supervise_no_progress(&f.ctx).await;
    assert_eq!(
        actions,
        vec![SupervisionAction::StartupWarning {
            shepherd_id: "shepherd-1".to_string()
        }]
    );

    let state: DaemonState = f.ctx.store.load(&f.ctx.paths.daemon_state()).unwrap();
    let entry = &state.shepherds["shepherd-1"];
    assert!(entry.is_working());
    assert!(entry.startup_warning_at.is_some());
    // Session untouched
    assert!(f
        .ctx
        .sessions
        .is_alive("loom-builder-issue-42")
        .await
        .unwrap());
    // Diagnostic captured
    let diags = std::fs::read_dir(f.ctx.paths.logs_dir())
        .map(|d| d.count())
        .unwrap_or(0);
    assert!(diags > 0);
}

#[tokio::test]
async fn tier_one_warning_is_recorded_once() {
    let f = fixture();
    seed_working_shepherd(&f, 42, "a1b2c3d", 200);
    f.ctx
        .sessions
        .add_session("loom-builder-issue-42", "some output");

    let first = supervise_no_progress(&f.ctx).await;
    assert_eq!(first.len(), 1);
    let second = supervise_no_progress(&f.ctx).await;
    assert!(second.is_empty());
}

#[tokio::test]
async fn missing_session_past_grace_is_flagged() {
    let f = fixture();
    seed_working_shepherd(&f, 42, "a1b2c3d", 200);
    // No session, no progress: both the missing-session check and the
    // tier-1 warning fire.
    let actions = supervise_no_progress(&f.ctx).await;
    assert!(actions.contains(&SupervisionAction::MissingSession {
        shepherd_id: "shepherd-1".to_string(),
        issue: 42,
    }));
    assert!(actions
        .iter()
        .any(|a| matches!(a, SupervisionAction::StartupWarning { .. })));
}

#[tokio::test]
async fn tier_two_reclaims_kills_and_invalidates_claim() {
    let f = fixture();
    seed_working_shepherd(&f, 42, "a1b2c3d", 400); // past 300s
    f.ctx
        .sessions
        .add_session("loom-builder-issue-42", "hung output");
    f.ctx
        .claims
        .acquire(42, "shepherd-1", f.ctx.clock.now_utc())
        .unwrap();

    let actions = supervise_no_progress(&f.ctx).await;
    assert!(actions.contains(&SupervisionAction::HardReclaim {
        shepherd_id: "shepherd-1".to_string(),
        issue: Some(42),
    }));

    // Session interrupted then killed
    let session = f.ctx.sessions.session("loom-builder-issue-42").unwrap();
    assert!(!session.alive);
    assert_eq!(session.interrupts, 1);

    // Claim invalidated, slot reset
    assert!(!f.ctx.claims.is_held_valid(42, f.ctx.clock.now_utc()));
    let state: DaemonState = f.ctx.store.load(&f.ctx.paths.daemon_state()).unwrap();
    let entry = &state.shepherds["shepherd-1"];
    assert!(!entry.is_working());
    assert_eq!(entry.idle_reason.as_deref(), Some("no_progress_reclaim"));
}

#[tokio::test]
async fn progress_file_prevents_reclaim() {
    let f = fixture();
    seed_working_shepherd(&f, 42, "a1b2c3d", 400);
    write_progress(&f, "a1b2c3d", 42);
    f.ctx
        .sessions
        .add_session("loom-builder-issue-42", "fine");

    let actions = supervise_no_progress(&f.ctx).await;
    assert!(actions.is_empty());
}

#[tokio::test]
async fn missing_session_with_progress_is_not_flagged() {
    let f = fixture();
    seed_working_shepherd(&f, 42, "a1b2c3d", 400);
    write_progress(&f, "a1b2c3d", 42);
    // No session registered at all: async creation may still be pending,
    // and a fresh progress file proves the worker is alive anyway.
    let actions = supervise_no_progress(&f.ctx).await;
    assert!(actions.is_empty());
}

#[tokio::test]
async fn idle_shepherds_are_ignored() {
    let f = fixture();
    f.ctx
        .store
        .update::<DaemonState, _>(&f.ctx.paths.daemon_state(), |state| {
            state
                .shepherds
                .insert("shepherd-1".to_string(), ShepherdEntry::default());
        })
        .unwrap();

    let actions = supervise_no_progress(&f.ctx).await;
    assert!(actions.is_empty());
}
