// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory session host for tests.

use super::{SessionHost, SessionError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// One fake session's state.
#[derive(Debug, Clone, Default)]
pub struct FakeSession {
    pub alive: bool,
    pub cwd: String,
    pub cmd: String,
    pub pane_content: String,
    pub sent_keys: Vec<String>,
    pub interrupts: u32,
    pub exit_code: Option<i32>,
}

#[derive(Default)]
struct Inner {
    sessions: BTreeMap<String, FakeSession>,
    spawn_error: Option<String>,
}

/// Fake session host recording every interaction.
#[derive(Clone, Default)]
pub struct FakeSessionHost {
    inner: Arc<Mutex<Inner>>,
}

impl FakeSessionHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register a live session (e.g. for reconnect tests).
    pub fn add_session(&self, id: &str, pane_content: &str) {
        self.inner.lock().sessions.insert(
            id.to_string(),
            FakeSession {
                alive: true,
                pane_content: pane_content.to_string(),
                ..Default::default()
            },
        );
    }

    /// Replace a session's pane content.
    pub fn set_pane_content(&self, id: &str, content: &str) {
        if let Some(s) = self.inner.lock().sessions.get_mut(id) {
            s.pane_content = content.to_string();
        }
    }

    /// Mark a session's process exited with a code.
    pub fn set_exit_code(&self, id: &str, code: i32) {
        if let Some(s) = self.inner.lock().sessions.get_mut(id) {
            s.exit_code = Some(code);
        }
    }

    /// Mark a session dead (killed externally).
    pub fn mark_dead(&self, id: &str) {
        if let Some(s) = self.inner.lock().sessions.get_mut(id) {
            s.alive = false;
        }
    }

    /// Make the next spawn fail.
    pub fn fail_next_spawn(&self, message: &str) {
        self.inner.lock().spawn_error = Some(message.to_string());
    }

    /// Inspect a session's recorded state.
    pub fn session(&self, id: &str) -> Option<FakeSession> {
        self.inner.lock().sessions.get(id).cloned()
    }
}

#[async_trait]
impl SessionHost for FakeSessionHost {
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        _env: &[(String, String)],
    ) -> Result<String, SessionError> {
        let mut inner = self.inner.lock();
        if let Some(err) = inner.spawn_error.take() {
            return Err(SessionError::SpawnFailed(err));
        }
        let id = format!("loom-{name}");
        inner.sessions.insert(
            id.clone(),
            FakeSession {
                alive: true,
                cwd: cwd.display().to_string(),
                cmd: cmd.to_string(),
                ..Default::default()
            },
        );
        Ok(id)
    }

    async fn send(&self, id: &str, input: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        match inner.sessions.get_mut(id) {
            Some(s) if s.alive => {
                s.sent_keys.push(input.to_string());
                Ok(())
            }
            _ => Err(SessionError::NotFound(id.to_string())),
        }
    }

    async fn send_enter(&self, id: &str) -> Result<(), SessionError> {
        self.send(id, "Enter").await
    }

    async fn send_interrupt(&self, id: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        match inner.sessions.get_mut(id) {
            Some(s) if s.alive => {
                s.interrupts += 1;
                Ok(())
            }
            _ => Err(SessionError::NotFound(id.to_string())),
        }
    }

    async fn kill(&self, id: &str) -> Result<(), SessionError> {
        if let Some(s) = self.inner.lock().sessions.get_mut(id) {
            s.alive = false;
        }
        Ok(())
    }

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError> {
        Ok(self
            .inner
            .lock()
            .sessions
            .get(id)
            .map(|s| s.alive)
            .unwrap_or(false))
    }

    async fn capture_output(&self, id: &str, _lines: u32) -> Result<String, SessionError> {
        let inner = self.inner.lock();
        match inner.sessions.get(id) {
            Some(s) if s.alive => Ok(s.pane_content.clone()),
            _ => Err(SessionError::NotFound(id.to_string())),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<String>, SessionError> {
        Ok(self
            .inner
            .lock()
            .sessions
            .iter()
            .filter(|(_, s)| s.alive)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn exit_code(&self, id: &str) -> Result<Option<i32>, SessionError> {
        let inner = self.inner.lock();
        match inner.sessions.get(id) {
            Some(s) => Ok(s.exit_code),
            None => Err(SessionError::NotFound(id.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
