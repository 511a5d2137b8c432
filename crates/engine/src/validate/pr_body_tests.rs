// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::context::EngineContext;
use loom_adapters::{FakeSessionHost, FakeTracker, FakeVcs};
use loom_core::{FakeClock, LoomConfig};
use loom_storage::LoomPaths;
use tempfile::TempDir;

fn fixture() -> (
    EngineContext<FakeTracker, FakeSessionHost, FakeVcs, FakeClock>,
    TempDir,
) {
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
    (ctx, dir)
}

#[tokio::test]
async fn synthesized_body_has_closing_ref_stat_and_shortlog() {
    let (ctx, dir) = fixture();
    let worktree = dir.path().join("wt");
    std::fs::create_dir_all(&worktree).unwrap();
    ctx.vcs.add_repo(&worktree, "feature/issue-42");
    ctx.vcs.set_diff_stat(&worktree, " src/a.rs | 5 +++--");
    ctx.vcs
        .set_unpushed_log(&worktree, &["abc1234 feat: do the thing"]);

    let body =
        build_recovery_pr_body(&ctx, 42, &worktree.display().to_string(), false).await;
    assert!(body.starts_with("Closes #42"));
    assert!(body.contains("recovery path"));
    assert!(body.contains("src/a.rs | 5"));
    assert!(body.contains("- `abc1234 feat: do the thing`"));
    assert!(body.contains("## Test plan"));
    assert!(body.contains("Review diff carefully"));
}

#[tokio::test]
async fn rate_limited_body_is_softer() {
    let (ctx, dir) = fixture();
    let worktree = dir.path().join("wt");
    std::fs::create_dir_all(&worktree).unwrap();
    ctx.vcs.add_repo(&worktree, "feature/issue-42");

    let body = build_recovery_pr_body(&ctx, 42, &worktree.display().to_string(), true).await;
    assert!(body.contains("rate-limited after completing work"));
    assert!(!body.contains("examine the diff carefully"));
}

#[tokio::test]
async fn prewritten_body_with_existing_close_ref_is_untouched() {
    let (ctx, dir) = fixture();
    let worktree = dir.path().join("wt");
    std::fs::create_dir_all(worktree.join(".loom")).unwrap();
    std::fs::write(
        worktree.join(".loom/pr-body.md"),
        "My summary.\n\nFixes #42",
    )
    .unwrap();

    let body = build_recovery_pr_body(&ctx, 42, &worktree.display().to_string(), false).await;
    assert_eq!(body, "My summary.\n\nFixes #42");
}

#[tokio::test]
async fn rate_limit_marker_is_found_in_newest_builder_log() {
    let (ctx, _dir) = fixture();
    let logs = ctx.paths.logs_dir();
    std::fs::create_dir_all(&logs).unwrap();
    std::fs::write(logs.join("loom-builder-issue-42.log"), "normal output").unwrap();
    assert!(!is_rate_limited_builder_exit(&ctx, 42));

    // Ensure the retry log is strictly newer than the first attempt's
    std::thread::sleep(std::time::Duration::from_millis(20));
    std::fs::write(
        logs.join("loom-builder-issue-42-a1.log"),
        "output\n/rate-limit-options\n",
    )
    .unwrap();
    assert!(is_rate_limited_builder_exit(&ctx, 42));
    // A different issue is unaffected
    assert!(!is_rate_limited_builder_exit(&ctx, 43));
}
