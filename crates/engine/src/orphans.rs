// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orphaned shepherd detection and recovery.
//!
//! An orphan is a tracked entity whose owner is no longer alive: a task id
//! that points nowhere, a building issue nobody works, a progress file whose
//! heartbeat died. Recovery actions are idempotent and guarded by claims so
//! a freshly spawned CLI worker is never disrupted.

use crate::context::EngineContext;
use chrono::{DateTime, Utc};
use loom_adapters::{SessionHost, Tracker, Vcs};
use loom_core::{
    elapsed_seconds, labels, Clock, DaemonState, ShepherdProgress, TaskId,
};
use loom_storage::read_progress_files;
use std::path::Path;
use tracing::{info, warn};

/// A detected orphan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Orphan {
    /// Shepherd entry's task_id fails the 7-hex format.
    InvalidTaskId {
        shepherd_id: String,
        task_id: String,
        issue: Option<u64>,
    },
    /// Task id is well-formed but its output and progress are gone.
    StaleTaskId {
        shepherd_id: String,
        task_id: String,
        issue: Option<u64>,
    },
    /// `loom:building` issue with no daemon entry, fresh progress, or claim.
    UntrackedBuilding { issue: u64, title: String },
    /// Working progress file whose heartbeat exceeded the orphan threshold.
    StaleHeartbeat {
        task_id: String,
        issue: Option<u64>,
        age_seconds: i64,
    },
}

/// A recovery action taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryAction {
    /// `reset_shepherd`, `reset_issue_label`, `cleanup_stale_worktree`,
    /// or `mark_progress_errored`.
    pub action: &'static str,
    pub shepherd_id: Option<String>,
    pub issue: Option<u64>,
    pub task_id: Option<String>,
    pub reason: String,
}

/// Result of one orphan detection/recovery pass.
#[derive(Debug, Clone, Default)]
pub struct OrphanRecoveryResult {
    pub orphaned: Vec<Orphan>,
    pub recovered: Vec<RecoveryAction>,
    pub recover_mode: bool,
}

/// Uncommitted paths that do not count against stale-worktree cleanup.
const BUILD_ARTIFACT_PATTERNS: [&str; 8] = [
    "node_modules",
    "pnpm-lock.yaml",
    ".venv",
    "target/",
    "Cargo.lock",
    "coverage/",
    ".loom-checkpoint",
    ".loom-in-use",
];

fn task_output_exists(entry_output: Option<&str>, progress_exists: bool) -> bool {
    if let Some(output_file) = entry_output {
        if Path::new(output_file).is_file() {
            return true;
        }
    }
    progress_exists
}

/// Phase 1: validate task ids recorded in daemon state.
fn check_daemon_state_tasks(
    daemon_state: &DaemonState,
    progress_files: &[ShepherdProgress],
    result: &mut OrphanRecoveryResult,
) {
    for (shepherd_id, entry) in &daemon_state.shepherds {
        if !entry.is_working() {
            continue;
        }
        let Some(task_id) = entry.task_id.as_deref() else {
            continue;
        };

        if !TaskId::is_valid(task_id) {
            result.orphaned.push(Orphan::InvalidTaskId {
                shepherd_id: shepherd_id.clone(),
                task_id: task_id.to_string(),
                issue: entry.issue,
            });
            continue;
        }

        let progress_exists = progress_files.iter().any(|p| p.task_id == task_id);
        if !task_output_exists(entry.output_file.as_deref(), progress_exists) {
            result.orphaned.push(Orphan::StaleTaskId {
                shepherd_id: shepherd_id.clone(),
                task_id: task_id.to_string(),
                issue: entry.issue,
            });
        }
    }
}

/// Phase 2: find building issues without an active shepherd.
async fn check_untracked_building<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    daemon_state: &DaemonState,
    progress_files: &[ShepherdProgress],
    result: &mut OrphanRecoveryResult,
    now: DateTime<Utc>,
) where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let building = match ctx.tracker.list_issues(Some(labels::BUILDING)).await {
        Ok(issues) => issues,
        Err(e) => {
            warn!(error = %e, "failed to list building issues");
            return;
        }
    };

    let tracked = daemon_state.tracked_issues();
    let threshold = ctx.config.orphan_heartbeat_threshold as i64;

    for issue in building {
        if tracked.contains(&issue.number) {
            continue;
        }

        let has_fresh_progress = progress_files.iter().any(|p| {
            p.issue == Some(issue.number)
                && p.is_working()
                && p.last_heartbeat
                    .as_deref()
                    .and_then(|hb| elapsed_seconds(hb, now))
                    .map(|age| age <= threshold)
                    .unwrap_or(false)
        });
        if has_fresh_progress {
            continue;
        }

        // A CLI shepherd may hold a valid claim without a daemon entry or
        // fresh progress heartbeat (e.g. during a long builder subprocess).
        if ctx.claims.is_held_valid(issue.number, now) {
            info!(issue = issue.number, "skipping orphan check: valid claim");
            continue;
        }

        result.orphaned.push(Orphan::UntrackedBuilding {
            issue: issue.number,
            title: issue.title.clone(),
        });
    }
}

/// Phase 3: flag working progress files with stale heartbeats.
fn check_stale_progress(
    progress_files: &[ShepherdProgress],
    threshold: i64,
    result: &mut OrphanRecoveryResult,
    now: DateTime<Utc>,
) {
    for progress in progress_files {
        if !progress.is_working() {
            continue;
        }
        let Some(heartbeat) = progress.last_heartbeat.as_deref() else {
            continue;
        };
        let Some(age) = elapsed_seconds(heartbeat, now) else {
            continue;
        };
        if age > threshold {
            result.orphaned.push(Orphan::StaleHeartbeat {
                task_id: progress.task_id.clone(),
                issue: progress.issue,
                age_seconds: age,
            });
        }
    }
}

/// Whether a worktree is stale: zero commits ahead and only build-artifact
/// uncommitted changes. Returns false when state cannot be determined.
async fn worktree_is_stale<V: Vcs>(vcs: &V, worktree: &Path) -> bool {
    let ahead = match vcs.commits_ahead(worktree, "main").await {
        Ok(Some(0)) => true,
        Ok(_) => false,
        Err(_) => false,
    };
    if !ahead {
        return false;
    }

    let status = match vcs.status_porcelain(worktree).await {
        Ok(status) => status,
        Err(_) => return false,
    };
    status.iter().all(|line| {
        let path = line.get(3..).unwrap_or("").trim().trim_matches('"');
        BUILD_ARTIFACT_PATTERNS.iter().any(|pat| path.contains(pat))
    })
}

/// Remove a stale worktree and delete its local and remote branches.
async fn cleanup_stale_worktree<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    issue: u64,
) -> bool
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let worktree = ctx.paths.worktree(issue);
    if !worktree.is_dir() {
        return false;
    }
    if !worktree_is_stale(&ctx.vcs, &worktree).await {
        info!(issue, "worktree has meaningful state, skipping cleanup");
        return false;
    }

    let branch = ctx
        .vcs
        .current_branch(&worktree)
        .await
        .unwrap_or_default();

    if let Err(e) = ctx.vcs.remove_worktree(ctx.paths.repo_root(), &worktree).await {
        warn!(issue, error = %e, "failed to remove stale worktree");
        return false;
    }

    if !branch.is_empty() && branch != "main" {
        let _ = ctx.vcs.delete_local_branch(ctx.paths.repo_root(), &branch).await;
        let _ = ctx.vcs.delete_remote_branch(ctx.paths.repo_root(), &branch).await;
    }

    info!(issue, branch = %branch, "cleaned up stale worktree");
    true
}

/// Recovery: swap `loom:building` back to `loom:issue` with an explanation.
///
/// Skipped entirely when a valid claim exists on the issue.
async fn recover_issue<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    issue: u64,
    reason: &str,
    result: &mut OrphanRecoveryResult,
    now: DateTime<Utc>,
) where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    if ctx.claims.is_held_valid(issue, now) {
        warn!(issue, "skipping recovery: valid file-based claim exists");
        return;
    }

    let worktree_cleaned = cleanup_stale_worktree(ctx, issue).await;
    if worktree_cleaned {
        result.recovered.push(RecoveryAction {
            action: "cleanup_stale_worktree",
            shepherd_id: None,
            issue: Some(issue),
            task_id: None,
            reason: reason.to_string(),
        });
    }

    if let Err(e) = ctx
        .tracker
        .edit_issue_labels(issue, &[labels::BUILDING], &[labels::ISSUE])
        .await
    {
        warn!(issue, error = %e, "failed to reset issue labels");
        return;
    }

    let ts = loom_core::format_utc(now);
    let mut actions = vec![
        "- Removed `loom:building` label".to_string(),
        "- Added `loom:issue` label to return to ready queue".to_string(),
    ];
    if worktree_cleaned {
        actions.push("- Cleaned up stale worktree and branches".to_string());
    }
    let comment = format!(
        "## Orphan Recovery\n\n\
         This issue was automatically recovered from an orphaned state.\n\n\
         **Reason**: {reason}\n\
         **What happened**:\n\
         - The daemon or shepherd that was working on this issue crashed or was terminated\n\
         - The issue was left in `loom:building` state with no active worker\n\n\
         **Action taken**:\n{}\n\n\
         This issue is now available for a new shepherd to pick up.\n\n\
         ---\n\
         *Recovered by loom orphan recovery at {ts}*",
        actions.join("\n")
    );
    if let Err(e) = ctx.tracker.comment_issue(issue, &comment).await {
        warn!(issue, error = %e, "failed to add recovery comment");
    }

    result.recovered.push(RecoveryAction {
        action: "reset_issue_label",
        shepherd_id: None,
        issue: Some(issue),
        task_id: None,
        reason: reason.to_string(),
    });
    info!(issue, "recovered orphaned issue");
}

/// Recovery: reset a daemon-state shepherd slot to idle.
async fn recover_shepherd<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    shepherd_id: &str,
    issue: Option<u64>,
    task_id: Option<&str>,
    reason: &str,
    result: &mut OrphanRecoveryResult,
    now: DateTime<Utc>,
) where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let ts = loom_core::format_utc(now);
    let update = ctx
        .store
        .update::<DaemonState, _>(&ctx.paths.daemon_state(), |state| {
            if let Some(entry) = state.shepherds.get_mut(shepherd_id) {
                entry.reset_to_idle(reason, &ts);
            }
        });
    if let Err(e) = update {
        warn!(shepherd_id, error = %e, "failed to reset shepherd entry");
        return;
    }
    info!(shepherd_id, "reset shepherd to idle in daemon state");

    if let Some(issue) = issue.filter(|i| *i != 0) {
        recover_issue(ctx, issue, reason, result, now).await;
    }

    result.recovered.push(RecoveryAction {
        action: "reset_shepherd",
        shepherd_id: Some(shepherd_id.to_string()),
        issue,
        task_id: task_id.map(String::from),
        reason: reason.to_string(),
    });
}

/// Recovery: flip a progress file to errored and recover its issue.
async fn recover_progress_file<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    task_id: &str,
    result: &mut OrphanRecoveryResult,
    now: DateTime<Utc>,
) where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let path = ctx.paths.progress_file(task_id);
    if !path.is_file() {
        return;
    }
    let ts = loom_core::format_utc(now);
    let mut recovered_issue = None;
    let update = ctx
        .store
        .update::<ShepherdProgress, _>(&path, |progress| {
            progress.mark_errored("orphan_recovery", &ts);
            recovered_issue = progress.issue;
        });
    if let Err(e) = update {
        warn!(task_id, error = %e, "failed to mark progress errored");
        return;
    }
    info!(task_id, "marked progress file errored");

    if let Some(issue) = recovered_issue.filter(|i| *i != 0) {
        recover_issue(ctx, issue, "stale_heartbeat", result, now).await;
    }

    result.recovered.push(RecoveryAction {
        action: "mark_progress_errored",
        shepherd_id: None,
        issue: recovered_issue,
        task_id: Some(task_id.to_string()),
        reason: "stale_heartbeat".to_string(),
    });
}

/// Run all orphan detection phases; perform recovery when `recover` is set.
pub async fn run_orphan_recovery<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    recover: bool,
) -> OrphanRecoveryResult
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let now = ctx.clock.now_utc();
    let mut result = OrphanRecoveryResult {
        recover_mode: recover,
        ..Default::default()
    };

    let daemon_state: DaemonState = ctx
        .store
        .load(&ctx.paths.daemon_state())
        .unwrap_or_default();
    let progress_files = read_progress_files(&ctx.paths);

    check_daemon_state_tasks(&daemon_state, &progress_files, &mut result);
    check_untracked_building(ctx, &daemon_state, &progress_files, &mut result, now).await;
    check_stale_progress(
        &progress_files,
        ctx.config.orphan_heartbeat_threshold as i64,
        &mut result,
        now,
    );

    if !recover {
        return result;
    }

    for orphan in result.orphaned.clone() {
        match orphan {
            Orphan::InvalidTaskId {
                shepherd_id,
                task_id,
                issue,
            } => {
                recover_shepherd(
                    ctx,
                    &shepherd_id,
                    issue,
                    Some(&task_id),
                    "invalid_task_id_format",
                    &mut result,
                    now,
                )
                .await;
            }
            Orphan::StaleTaskId {
                shepherd_id,
                task_id,
                issue,
            } => {
                recover_shepherd(
                    ctx,
                    &shepherd_id,
                    issue,
                    Some(&task_id),
                    "task_not_found",
                    &mut result,
                    now,
                )
                .await;
            }
            Orphan::UntrackedBuilding { issue, .. } => {
                recover_issue(ctx, issue, "no_daemon_entry", &mut result, now).await;
            }
            Orphan::StaleHeartbeat { task_id, .. } => {
                recover_progress_file(ctx, &task_id, &mut result, now).await;
            }
        }
    }

    result
}

#[cfg(test)]
#[path = "orphans_tests.rs"]
mod tests;
