// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, crash recovery, shutdown.
//!
//! A PID-file lock guards against duplicate daemons; a unique
//! `<epoch>-<pid>` session id written into the state document arbitrates
//! between daemons that slip past the lock (e.g. across hosts sharing a
//! filesystem). Startup archives the previous session's artefacts and runs
//! orphan recovery to clean up after any prior crash.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use loom_adapters::{SessionHost, Tracker, Vcs};
use loom_core::{Clock, DaemonMetrics, DaemonState};
use loom_engine::{run_orphan_recovery, EngineContext, OrphanRecoveryResult};
use loom_storage::StoreError;
use thiserror::Error;
use tracing::{info, warn};

/// Archived metric files kept on disk.
const MAX_METRIC_ARCHIVES: usize = 10;

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("repository root not found (no .loom directory)")]
    NoRepoRoot,

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("state error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Walk up from `start` to find a directory containing `.loom/`.
pub fn find_repo_root(start: &Path) -> Result<PathBuf, LifecycleError> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(".loom").is_dir() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(LifecycleError::NoRepoRoot);
        }
    }
}

/// Unique id for this daemon session: `<epoch>-<pid>`.
pub fn make_session_id<C: Clock>(clock: &C) -> String {
    format!("{}-{}", clock.now_utc().timestamp(), std::process::id())
}

/// Held for the daemon's lifetime; dropping releases the PID lock.
pub struct DaemonLock {
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    file: File,
}

/// Acquire the PID-file lock, writing our PID into it.
pub fn acquire_pid_lock(pid_path: &Path) -> Result<DaemonLock, LifecycleError> {
    if let Some(parent) = pid_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Avoid truncating before we hold the lock, which would wipe the
    // running daemon's PID.
    let file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(pid_path)?;
    file.try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    let mut file = file;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;

    Ok(DaemonLock { file })
}

/// Result of daemon startup.
pub struct StartupReport {
    pub session_id: String,
    pub orphan_recovery: OrphanRecoveryResult,
}

/// Initialize state for a new daemon session.
///
/// Rotates the previous state file, archives old metrics (keeping the last
/// ten), stamps the session id, and runs orphan recovery with repair enabled
/// to clean artefacts from any prior crash.
pub async fn startup<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    force_mode: bool,
) -> Result<StartupReport, LifecycleError>
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let session_id = make_session_id(&ctx.clock);
    let now = ctx.timestamp();

    rotate_state_file(ctx)?;
    archive_metrics_file(ctx)?;

    // Initialize (or refresh) the state document, preserving history fields
    ctx.store
        .update::<DaemonState, _>(&ctx.paths.daemon_state(), |state| {
            state.schema_version = loom_core::daemon_state::DAEMON_STATE_VERSION;
            state.started_at = Some(now.clone());
            state.stopped_at = None;
            state.running = true;
            state.iteration = 0;
            state.force_mode = force_mode;
            state.daemon_session_id = Some(session_id.clone());
            state.warnings.clear();
        })?;

    // Fresh metrics document per session
    ctx.store
        .store(&ctx.paths.daemon_metrics(), &DaemonMetrics::new(&now))?;

    // Clear a leftover stop signal so the new session doesn't exit at once
    let stop = ctx.paths.stop_daemon_signal();
    if stop.exists() {
        let _ = std::fs::remove_file(&stop);
    }

    info!(session_id = %session_id, "running startup orphan recovery");
    let orphan_recovery = run_orphan_recovery(ctx, true).await;
    if !orphan_recovery.orphaned.is_empty() || !orphan_recovery.recovered.is_empty() {
        info!(
            orphaned = orphan_recovery.orphaned.len(),
            recovered = orphan_recovery.recovered.len(),
            "startup recovery complete"
        );
    }

    Ok(StartupReport {
        session_id,
        orphan_recovery,
    })
}

/// Mark the state stopped and remove the PID and stop-signal files.
pub fn shutdown<T, S, V, C>(ctx: &EngineContext<T, S, V, C>) -> Result<(), LifecycleError>
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let now = ctx.timestamp();
    ctx.store
        .update::<DaemonState, _>(&ctx.paths.daemon_state(), |state| {
            state.running = false;
            state.stopped_at = Some(now.clone());
        })?;

    for path in [ctx.paths.stop_daemon_signal(), ctx.paths.pid_file()] {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "cleanup failed");
            }
        }
    }

    info!("daemon shutdown complete");
    Ok(())
}

/// Keep a copy of the previous session's state next to the live file.
fn rotate_state_file<T, S, V, C>(ctx: &EngineContext<T, S, V, C>) -> Result<(), LifecycleError>
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let state_path = ctx.paths.daemon_state();
    if !state_path.exists() {
        return Ok(());
    }
    let prev = state_path.with_extension("prev.json");
    std::fs::copy(&state_path, &prev)?;
    info!(archive = %prev.display(), "rotated previous daemon state");
    Ok(())
}

/// Archive the previous metrics file when it has meaningful data; prune
/// archives beyond the last ten.
fn archive_metrics_file<T, S, V, C>(ctx: &EngineContext<T, S, V, C>) -> Result<(), LifecycleError>
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let metrics_path = ctx.paths.daemon_metrics();
    if !metrics_path.exists() {
        return Ok(());
    }
    let metrics: DaemonMetrics = ctx.store.load(&metrics_path)?;
    if metrics.total_iterations == 0 {
        return Ok(());
    }

    let compact = ctx.clock.now_utc().format("%Y%m%d-%H%M%S").to_string();
    let archive = ctx.paths.metrics_archive(&compact);
    std::fs::copy(&metrics_path, &archive)?;
    info!(archive = %archive.display(), "archived previous daemon metrics");

    // Prune old archives (keep the newest MAX_METRIC_ARCHIVES)
    let mut archives: Vec<PathBuf> = std::fs::read_dir(ctx.paths.loom_dir())?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .map(|n| {
                    let n = n.to_string_lossy();
                    n.starts_with("daemon-metrics-") && n.ends_with(".json")
                })
                .unwrap_or(false)
        })
        .collect();
    archives.sort();
    if archives.len() > MAX_METRIC_ARCHIVES {
        let excess = archives.len() - MAX_METRIC_ARCHIVES;
        for old in archives.into_iter().take(excess) {
            let _ = std::fs::remove_file(old);
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
