// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker session management adapters

mod tmux;

pub use tmux::TmuxSessionHost;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSession, FakeSessionHost};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// Adapter for managing named worker sessions (tmux).
#[async_trait]
pub trait SessionHost: Clone + Send + Sync + 'static {
    /// Spawn a new detached session; returns the full session id.
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<String, SessionError>;

    /// Send input keys to a session.
    async fn send(&self, id: &str, input: &str) -> Result<(), SessionError>;

    /// Send the Enter key to a session.
    async fn send_enter(&self, id: &str) -> Result<(), SessionError>;

    /// Send an interrupt (ctrl-C) to a session.
    async fn send_interrupt(&self, id: &str) -> Result<(), SessionError>;

    /// Kill a session. Killing a dead session is not an error.
    async fn kill(&self, id: &str) -> Result<(), SessionError>;

    /// Check if a session is alive.
    async fn is_alive(&self, id: &str) -> Result<bool, SessionError>;

    /// Capture recent scrollback from a session.
    async fn capture_output(&self, id: &str, lines: u32) -> Result<String, SessionError>;

    /// Enumerate live session names.
    async fn list_sessions(&self) -> Result<Vec<String>, SessionError>;

    /// Exit code of the pane's process, `None` while still running.
    async fn exit_code(&self, id: &str) -> Result<Option<i32>, SessionError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
