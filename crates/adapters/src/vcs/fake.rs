// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory VCS for tests: per-directory canned state, recorded mutations.

use super::{Vcs, VcsError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Recorded mutation for side-effect assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcsCall {
    Stage { dir: PathBuf, paths: Vec<String> },
    Commit { dir: PathBuf, message: String },
    Push { dir: PathBuf, branch: String },
    RemoveWorktree { worktree: PathBuf },
    DeleteLocalBranch { branch: String },
    DeleteRemoteBranch { branch: String },
}

#[derive(Debug, Clone, Default)]
struct DirState {
    is_repo: bool,
    status_lines: Vec<String>,
    branch: String,
    default_branch: String,
    ahead: Option<u32>,
    behind: Option<u32>,
    has_upstream: bool,
    unpushed_log: Vec<String>,
    committed_files: Vec<String>,
    diff_stat: String,
}

#[derive(Default)]
struct Inner {
    dirs: BTreeMap<PathBuf, DirState>,
    calls: Vec<VcsCall>,
    fail_push: bool,
    fail_commit: bool,
}

/// Fake VCS with interior mutability.
#[derive(Clone, Default)]
pub struct FakeVcs {
    inner: Arc<Mutex<Inner>>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a directory as a git checkout.
    pub fn add_repo(&self, dir: &Path, branch: &str) {
        self.inner.lock().dirs.insert(
            dir.to_path_buf(),
            DirState {
                is_repo: true,
                branch: branch.to_string(),
                default_branch: "main".to_string(),
                ahead: Some(0),
                behind: Some(0),
                ..Default::default()
            },
        );
    }

    pub fn set_status(&self, dir: &Path, lines: &[&str]) {
        if let Some(state) = self.inner.lock().dirs.get_mut(dir) {
            state.status_lines = lines.iter().map(|l| l.to_string()).collect();
        }
    }

    pub fn set_ahead_behind(&self, dir: &Path, ahead: Option<u32>, behind: Option<u32>) {
        if let Some(state) = self.inner.lock().dirs.get_mut(dir) {
            state.ahead = ahead;
            state.behind = behind;
        }
    }

    pub fn set_upstream(&self, dir: &Path, has_upstream: bool) {
        if let Some(state) = self.inner.lock().dirs.get_mut(dir) {
            state.has_upstream = has_upstream;
        }
    }

    pub fn set_unpushed_log(&self, dir: &Path, lines: &[&str]) {
        if let Some(state) = self.inner.lock().dirs.get_mut(dir) {
            state.unpushed_log = lines.iter().map(|l| l.to_string()).collect();
        }
    }

    pub fn set_committed_files(&self, dir: &Path, files: &[&str]) {
        if let Some(state) = self.inner.lock().dirs.get_mut(dir) {
            state.committed_files = files.iter().map(|l| l.to_string()).collect();
        }
    }

    pub fn set_diff_stat(&self, dir: &Path, stat: &str) {
        if let Some(state) = self.inner.lock().dirs.get_mut(dir) {
            state.diff_stat = stat.to_string();
        }
    }

    pub fn fail_next_push(&self) {
        self.inner.lock().fail_push = true;
    }

    pub fn fail_next_commit(&self) {
        self.inner.lock().fail_commit = true;
    }

    pub fn calls(&self) -> Vec<VcsCall> {
        self.inner.lock().calls.clone()
    }

    fn dir_state(&self, dir: &Path) -> Result<DirState, VcsError> {
        self.inner
            .lock()
            .dirs
            .get(dir)
            .filter(|s| s.is_repo)
            .cloned()
            .ok_or_else(|| VcsError::NotARepo(dir.display().to_string()))
    }
}

#[async_trait]
impl Vcs for FakeVcs {
    async fn status_porcelain(&self, dir: &Path) -> Result<Vec<String>, VcsError> {
        Ok(self.dir_state(dir)?.status_lines)
    }

    async fn current_branch(&self, dir: &Path) -> Result<String, VcsError> {
        Ok(self.dir_state(dir)?.branch)
    }

    async fn default_branch(&self, dir: &Path) -> Result<String, VcsError> {
        Ok(self.dir_state(dir)?.default_branch)
    }

    async fn commits_ahead(&self, dir: &Path, _base: &str) -> Result<Option<u32>, VcsError> {
        Ok(self.dir_state(dir)?.ahead)
    }

    async fn commits_behind(&self, dir: &Path, _base: &str) -> Result<Option<u32>, VcsError> {
        Ok(self.dir_state(dir)?.behind)
    }

    async fn has_upstream(&self, dir: &Path) -> Result<bool, VcsError> {
        Ok(self.dir_state(dir)?.has_upstream)
    }

    async fn log_oneline(&self, dir: &Path, _range: &str) -> Result<Vec<String>, VcsError> {
        Ok(self.dir_state(dir)?.unpushed_log)
    }

    async fn committed_files_vs_upstream(&self, dir: &Path) -> Result<Vec<String>, VcsError> {
        Ok(self.dir_state(dir)?.committed_files)
    }

    async fn stage(&self, dir: &Path, paths: &[String]) -> Result<(), VcsError> {
        self.dir_state(dir)?;
        self.inner.lock().calls.push(VcsCall::Stage {
            dir: dir.to_path_buf(),
            paths: paths.to_vec(),
        });
        Ok(())
    }

    async fn commit(&self, dir: &Path, message: &str) -> Result<(), VcsError> {
        self.dir_state(dir)?;
        let mut inner = self.inner.lock();
        if inner.fail_commit {
            inner.fail_commit = false;
            return Err(VcsError::CommandFailed("injected commit failure".into()));
        }
        inner.calls.push(VcsCall::Commit {
            dir: dir.to_path_buf(),
            message: message.to_string(),
        });
        // A commit clears the working tree and adds an unpushed commit.
        if let Some(state) = inner.dirs.get_mut(dir) {
            state.status_lines.clear();
            state.unpushed_log.push(format!("abc1234 {message}"));
            state.ahead = Some(state.ahead.unwrap_or(0) + 1);
        }
        Ok(())
    }

    async fn push_upstream(&self, dir: &Path, branch: &str) -> Result<(), VcsError> {
        self.dir_state(dir)?;
        let mut inner = self.inner.lock();
        if inner.fail_push {
            inner.fail_push = false;
            return Err(VcsError::CommandFailed("injected push failure".into()));
        }
        inner.calls.push(VcsCall::Push {
            dir: dir.to_path_buf(),
            branch: branch.to_string(),
        });
        if let Some(state) = inner.dirs.get_mut(dir) {
            state.has_upstream = true;
            state.unpushed_log.clear();
        }
        Ok(())
    }

    async fn diff_stat(&self, dir: &Path, _base: &str) -> Result<String, VcsError> {
        Ok(self.dir_state(dir)?.diff_stat)
    }

    async fn remove_worktree(&self, _repo_root: &Path, worktree: &Path) -> Result<(), VcsError> {
        let mut inner = self.inner.lock();
        inner.calls.push(VcsCall::RemoveWorktree {
            worktree: worktree.to_path_buf(),
        });
        inner.dirs.remove(worktree);
        Ok(())
    }

    async fn delete_local_branch(&self, _repo_root: &Path, branch: &str) -> Result<(), VcsError> {
        self.inner.lock().calls.push(VcsCall::DeleteLocalBranch {
            branch: branch.to_string(),
        });
        Ok(())
    }

    async fn delete_remote_branch(&self, _repo_root: &Path, branch: &str) -> Result<(), VcsError> {
        self.inner.lock().calls.push(VcsCall::DeleteRemoteBranch {
            branch: branch.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
