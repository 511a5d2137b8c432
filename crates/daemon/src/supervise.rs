// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervision plane: two-tier no-progress detection and hard reclaim.
//!
//! A shepherd the daemon believes is working must produce a progress file.
//! When none exists: within startup grace nothing happens (the worker may
//! still be booting); between startup grace and the hard-reclaim grace a
//! warning is recorded and diagnostics captured without killing anything;
//! past the hard-reclaim grace the session is killed (diagnostics first),
//! the claim invalidated, and the slot reset.
//!
//! Missing *sessions* get their own grace: sessions only become visible
//! after an async creation step, so absence right after spawn is not a
//! stall.

use loom_adapters::{SessionHost, Tracker, Vcs};
use loom_core::{elapsed_seconds, Clock, DaemonState};
use loom_engine::EngineContext;
use loom_storage::read_progress_files;
use tracing::{info, warn};

/// One supervision action taken this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisionAction {
    /// Tier 1: warning recorded, diagnostics captured, nothing killed.
    StartupWarning { shepherd_id: String },
    /// Tier 2: session killed, claim invalidated, slot reset.
    HardReclaim { shepherd_id: String, issue: Option<u64> },
    /// Session for a working shepherd is missing past the startup grace.
    MissingSession { shepherd_id: String, issue: u64 },
}

/// Scrollback lines captured into supervision diagnostics.
const DIAGNOSTIC_LINES: u32 = 500;

/// Run the two-tier no-progress supervision pass.
pub async fn supervise_no_progress<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
) -> Vec<SupervisionAction>
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let now = ctx.clock.now_utc();
    let state: DaemonState = match ctx.store.load(&ctx.paths.daemon_state()) {
        Ok(state) => state,
        Err(e) => {
            warn!(error = %e, "supervision skipped: cannot read daemon state");
            return Vec::new();
        }
    };
    let progress_files = read_progress_files(&ctx.paths);
    let live_sessions = ctx.sessions.list_sessions().await.unwrap_or_default();

    let mut actions = Vec::new();

    for (shepherd_id, entry) in &state.shepherds {
        if !entry.is_working() {
            continue;
        }
        let (Some(started), Some(task_id)) = (entry.started.as_deref(), entry.task_id.as_deref())
        else {
            continue;
        };
        let Some(age) = elapsed_seconds(started, now) else {
            continue;
        };

        let has_progress = progress_files.iter().any(|p| p.task_id == task_id);

        // Separate check: session visibility. Absence within startup grace
        // is expected (async creation); past it, it is worth a warning even
        // when progress exists.
        if let Some(issue) = entry.issue {
            let session_fragment = format!("issue-{issue}");
            let session_visible = live_sessions.iter().any(|s| s.contains(&session_fragment));
            if !session_visible && age > ctx.config.startup_grace_period as i64 && !has_progress {
                actions.push(SupervisionAction::MissingSession {
                    shepherd_id: shepherd_id.clone(),
                    issue,
                });
            }
        }

        if has_progress {
            continue;
        }

        // Tier 0: inside startup grace, ignore entirely.
        if age < ctx.config.startup_grace_period as i64 {
            continue;
        }

        // Tier 2: past the hard-reclaim grace.
        if age >= ctx.config.no_progress_grace_period as i64 {
            hard_reclaim(ctx, shepherd_id, entry.issue).await;
            actions.push(SupervisionAction::HardReclaim {
                shepherd_id: shepherd_id.clone(),
                issue: entry.issue,
            });
            continue;
        }

        // Tier 1: record the warning once and capture diagnostics.
        if entry.startup_warning_at.is_none() {
            warn!(
                shepherd_id,
                age, "no progress file past startup grace, recording warning"
            );
            capture_shepherd_diagnostics(ctx, entry.issue).await;
            let ts = ctx.timestamp();
            let id = shepherd_id.clone();
            let result = ctx
                .store
                .update::<DaemonState, _>(&ctx.paths.daemon_state(), |state| {
                    if let Some(entry) = state.shepherds.get_mut(&id) {
                        entry.startup_warning_at = Some(ts.clone());
                    }
                });
            if let Err(e) = result {
                warn!(shepherd_id, error = %e, "failed to record startup warning");
            }
            actions.push(SupervisionAction::StartupWarning {
                shepherd_id: shepherd_id.clone(),
            });
        }
    }

    actions
}

/// Tier-2 reclaim: diagnostics, graceful interrupt then kill, claim
/// invalidation, slot reset.
async fn hard_reclaim<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    shepherd_id: &str,
    issue: Option<u64>,
) where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    warn!(shepherd_id, issue, "hard reclaim: no progress past grace period");

    capture_shepherd_diagnostics(ctx, issue).await;

    if let Some(issue) = issue {
        // Graceful ctrl-C first, then kill every session working the issue
        let fragment = format!("issue-{issue}");
        if let Ok(sessions) = ctx.sessions.list_sessions().await {
            for session in sessions.iter().filter(|s| s.contains(&fragment)) {
                let _ = ctx.sessions.send_interrupt(session).await;
                let _ = ctx.sessions.kill(session).await;
                info!(session = %session, "killed unresponsive worker session");
            }
        }
        if let Err(e) = ctx.claims.invalidate(issue) {
            warn!(issue, error = %e, "claim invalidation failed");
        }
    }

    let ts = ctx.timestamp();
    let id = shepherd_id.to_string();
    let result = ctx
        .store
        .update::<DaemonState, _>(&ctx.paths.daemon_state(), |state| {
            if let Some(entry) = state.shepherds.get_mut(&id) {
                entry.reset_to_idle("no_progress_reclaim", &ts);
            }
        });
    if let Err(e) = result {
        warn!(shepherd_id, error = %e, "failed to reset reclaimed shepherd");
    }
}

/// Capture scrollback for every session working the issue into timestamped
/// stall diagnostics. Always runs before any destructive action.
async fn capture_shepherd_diagnostics<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    issue: Option<u64>,
) where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let Some(issue) = issue else { return };
    let fragment = format!("issue-{issue}");
    let Ok(sessions) = ctx.sessions.list_sessions().await else {
        return;
    };
    for session in sessions.iter().filter(|s| s.contains(&fragment)) {
        let Ok(output) = ctx.sessions.capture_output(session, DIAGNOSTIC_LINES).await else {
            continue;
        };
        let compact = ctx.clock.now_utc().format("%Y%m%d-%H%M%S").to_string();
        let path = ctx.paths.stall_diagnostic(session, &compact);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&path, output) {
            warn!(session = %session, error = %e, "failed to save stall diagnostic");
        }
    }
}

#[cfg(test)]
#[path = "supervise_tests.rs"]
mod tests;
