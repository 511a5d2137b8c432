// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repo-anchored `.loom/` directory layout.

use std::path::{Path, PathBuf};

/// Per-worktree checkpoint file name.
pub const CHECKPOINT_FILE: &str = ".loom-checkpoint";
/// Per-worktree lease marker.
pub const IN_USE_MARKER: &str = ".loom-in-use";
/// Worker-committed no-op marker.
pub const NO_CHANGES_MARKER: &str = ".no-changes-needed";
/// Optional worker-written PR body for richer recovery PRs.
pub const PR_BODY_FILE: &str = ".loom/pr-body.md";

/// All persistent paths, anchored at the repository root.
#[derive(Debug, Clone)]
pub struct LoomPaths {
    root: PathBuf,
}

impl LoomPaths {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            root: repo_root.into(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.root
    }

    pub fn loom_dir(&self) -> PathBuf {
        self.root.join(".loom")
    }

    pub fn daemon_state(&self) -> PathBuf {
        self.loom_dir().join("daemon-state.json")
    }

    pub fn daemon_metrics(&self) -> PathBuf {
        self.loom_dir().join("daemon-metrics.json")
    }

    pub fn health_metrics(&self) -> PathBuf {
        self.loom_dir().join("health-metrics.json")
    }

    pub fn alerts(&self) -> PathBuf {
        self.loom_dir().join("alerts.json")
    }

    pub fn stuck_history(&self) -> PathBuf {
        self.loom_dir().join("stuck-history.json")
    }

    pub fn failure_log(&self) -> PathBuf {
        self.loom_dir().join("issue-failures.json")
    }

    pub fn progress_dir(&self) -> PathBuf {
        self.loom_dir().join("progress")
    }

    pub fn progress_file(&self, task_id: &str) -> PathBuf {
        self.progress_dir().join(format!("shepherd-{task_id}.json"))
    }

    pub fn claims_dir(&self) -> PathBuf {
        self.loom_dir().join("claims")
    }

    pub fn claim_file(&self, issue: u64) -> PathBuf {
        self.claims_dir().join(format!("{issue}.json"))
    }

    pub fn worktrees_dir(&self) -> PathBuf {
        self.loom_dir().join("worktrees")
    }

    pub fn worktree(&self, issue: u64) -> PathBuf {
        self.worktrees_dir().join(format!("issue-{issue}"))
    }

    pub fn worktree_checkpoint(&self, issue: u64) -> PathBuf {
        self.worktree(issue).join(CHECKPOINT_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.loom_dir().join("logs")
    }

    pub fn session_log(&self, session: &str) -> PathBuf {
        self.logs_dir().join(format!("{session}.log"))
    }

    pub fn daemon_log(&self) -> PathBuf {
        self.loom_dir().join("daemon.log")
    }

    pub fn diagnostics_dir(&self) -> PathBuf {
        self.loom_dir().join("diagnostics")
    }

    pub fn stall_diagnostic(&self, session: &str, timestamp_compact: &str) -> PathBuf {
        self.logs_dir()
            .join(format!("stall-diagnostic-{session}-{timestamp_compact}.log"))
    }

    pub fn metrics_dir(&self) -> PathBuf {
        self.loom_dir().join("metrics")
    }

    pub fn recovery_events(&self) -> PathBuf {
        self.metrics_dir().join("recovery-events.json")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.loom_dir().join("daemon-loop.pid")
    }

    pub fn stop_daemon_signal(&self) -> PathBuf {
        self.loom_dir().join("stop-daemon")
    }

    pub fn stop_shepherds_signal(&self) -> PathBuf {
        self.loom_dir().join("stop-shepherds")
    }

    pub fn signals_dir(&self) -> PathBuf {
        self.loom_dir().join("signals")
    }

    pub fn stop_signal(&self, name: &str) -> PathBuf {
        self.signals_dir().join(format!("stop-{name}"))
    }

    pub fn pause_signal(&self, name: &str) -> PathBuf {
        self.signals_dir().join(format!("pause-{name}"))
    }

    /// Archived daemon metrics (`daemon-metrics-<YYYYmmdd-HHMMSS>.json`).
    pub fn metrics_archive(&self, timestamp_compact: &str) -> PathBuf {
        self.loom_dir()
            .join(format!("daemon-metrics-{timestamp_compact}.json"))
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
