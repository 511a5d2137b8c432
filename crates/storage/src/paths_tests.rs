// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn layout_matches_documented_paths() {
    let paths = LoomPaths::new("/repo");
    assert_eq!(
        paths.daemon_state(),
        PathBuf::from("/repo/.loom/daemon-state.json")
    );
    assert_eq!(
        paths.progress_file("a1b2c3d"),
        PathBuf::from("/repo/.loom/progress/shepherd-a1b2c3d.json")
    );
    assert_eq!(
        paths.claim_file(42),
        PathBuf::from("/repo/.loom/claims/42.json")
    );
    assert_eq!(
        paths.worktree(42),
        PathBuf::from("/repo/.loom/worktrees/issue-42")
    );
    assert_eq!(
        paths.worktree_checkpoint(42),
        PathBuf::from("/repo/.loom/worktrees/issue-42/.loom-checkpoint")
    );
    assert_eq!(
        paths.recovery_events(),
        PathBuf::from("/repo/.loom/metrics/recovery-events.json")
    );
    assert_eq!(
        paths.stop_signal("shepherd-1"),
        PathBuf::from("/repo/.loom/signals/stop-shepherd-1")
    );
    assert_eq!(
        paths.session_log("loom-builder-issue-42"),
        PathBuf::from("/repo/.loom/logs/loom-builder-issue-42.log")
    );
}
