// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tmux session adapter on a dedicated socket.

use super::{SessionHost, SessionError};
use crate::subprocess::{run_with_timeout, TMUX_TIMEOUT};
use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;

/// Session name prefix applied to every spawned worker.
pub const SESSION_PREFIX: &str = "loom-";

/// Tmux-based session host.
///
/// All sessions live on a dedicated socket (`tmux -L <socket>`) so worker
/// sessions never collide with the operator's own tmux server.
#[derive(Clone)]
pub struct TmuxSessionHost {
    socket: String,
}

impl TmuxSessionHost {
    pub fn new(socket: impl Into<String>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    async fn tmux(&self, args: &[&str], description: &str) -> Result<Output, SessionError> {
        let mut cmd = Command::new("tmux");
        cmd.arg("-L").arg(&self.socket).args(args);
        run_with_timeout(cmd, TMUX_TIMEOUT, description)
            .await
            .map_err(SessionError::CommandFailed)
    }
}

#[async_trait]
impl SessionHost for TmuxSessionHost {
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<String, SessionError> {
        // Precondition: cwd must exist
        if !cwd.exists() {
            return Err(SessionError::SpawnFailed(format!(
                "working directory does not exist: {}",
                cwd.display()
            )));
        }

        let session_id = format!("{SESSION_PREFIX}{name}");

        // Check if session already exists and clean it up
        let existing = self
            .tmux(&["has-session", "-t", &session_id], "tmux has-session")
            .await;
        if existing.map(|o| o.status.success()).unwrap_or(false) {
            tracing::warn!(session_id, "session already exists, killing first");
            let _ = self
                .tmux(&["kill-session", "-t", &session_id], "tmux kill-session")
                .await;
        }

        let mut tmux_cmd = Command::new("tmux");
        tmux_cmd
            .arg("-L")
            .arg(&self.socket)
            .arg("new-session")
            .arg("-d")
            .arg("-s")
            .arg(&session_id)
            .arg("-c")
            .arg(cwd);

        for (key, value) in env {
            tmux_cmd.arg("-e").arg(format!("{key}={value}"));
        }

        tmux_cmd.arg(cmd);

        let output = run_with_timeout(tmux_cmd, TMUX_TIMEOUT, "tmux new-session")
            .await
            .map_err(SessionError::SpawnFailed)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(
                session_id,
                stderr = %stderr,
                "tmux spawn failed"
            );
            return Err(SessionError::SpawnFailed(stderr.to_string()));
        }

        // Log stderr even on success - may contain useful warnings
        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(
                session_id,
                stderr = %stderr,
                "tmux spawn stderr (non-fatal)"
            );
        }

        Ok(session_id)
    }

    async fn send(&self, id: &str, input: &str) -> Result<(), SessionError> {
        let output = self
            .tmux(&["send-keys", "-t", id, input], "tmux send-keys")
            .await?;
        if !output.status.success() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn send_enter(&self, id: &str) -> Result<(), SessionError> {
        let output = self
            .tmux(&["send-keys", "-t", id, "Enter"], "tmux send-keys Enter")
            .await?;
        if !output.status.success() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn send_interrupt(&self, id: &str) -> Result<(), SessionError> {
        let output = self
            .tmux(&["send-keys", "-t", id, "C-c"], "tmux send-keys C-c")
            .await?;
        if !output.status.success() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn kill(&self, id: &str) -> Result<(), SessionError> {
        // Session might already be dead, which is fine
        let _ = self
            .tmux(&["kill-session", "-t", id], "tmux kill-session")
            .await?;
        Ok(())
    }

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError> {
        let output = self
            .tmux(&["has-session", "-t", id], "tmux has-session")
            .await?;
        Ok(output.status.success())
    }

    async fn capture_output(&self, id: &str, lines: u32) -> Result<String, SessionError> {
        let start = format!("-{lines}");
        let output = self
            .tmux(
                &["capture-pane", "-t", id, "-p", "-S", &start],
                "tmux capture-pane",
            )
            .await?;
        if !output.status.success() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn list_sessions(&self) -> Result<Vec<String>, SessionError> {
        let output = self
            .tmux(
                &["list-sessions", "-F", "#{session_name}"],
                "tmux list-sessions",
            )
            .await?;
        // No server running means no sessions, not an error
        if !output.status.success() {
            return Ok(Vec::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }

    async fn exit_code(&self, id: &str) -> Result<Option<i32>, SessionError> {
        let output = self
            .tmux(
                &["display-message", "-t", id, "-p", "#{pane_dead_status}"],
                "tmux display-message",
            )
            .await?;
        if !output.status.success() {
            return Err(SessionError::NotFound(id.to_string()));
        }

        let status_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if status_str.is_empty() {
            // Process is still running
            return Ok(None);
        }
        Ok(status_str.parse::<i32>().ok())
    }
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
