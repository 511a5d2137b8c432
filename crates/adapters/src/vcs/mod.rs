// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Version-control adapters for worktree inspection and mechanical recovery.

mod git;

pub use git::GitVcs;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeVcs, VcsCall};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from VCS operations
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error("not a git directory: {0}")]
    NotARepo(String),
}

/// Abstract VCS operations, all scoped to an explicit directory.
#[async_trait]
pub trait Vcs: Clone + Send + Sync + 'static {
    /// `git status --porcelain` lines (empty when clean). Errors when the
    /// directory is not a valid git checkout.
    async fn status_porcelain(&self, dir: &Path) -> Result<Vec<String>, VcsError>;

    /// Current branch name.
    async fn current_branch(&self, dir: &Path) -> Result<String, VcsError>;

    /// Default branch name (from `origin/HEAD`, falling back to `main`).
    async fn default_branch(&self, dir: &Path) -> Result<String, VcsError>;

    /// Commit count `origin/<base>..HEAD`; `None` when indeterminable.
    async fn commits_ahead(&self, dir: &Path, base: &str) -> Result<Option<u32>, VcsError>;

    /// Commit count `HEAD..origin/<base>`; `None` when indeterminable.
    async fn commits_behind(&self, dir: &Path, base: &str) -> Result<Option<u32>, VcsError>;

    /// True when the branch has a configured upstream.
    async fn has_upstream(&self, dir: &Path) -> Result<bool, VcsError>;

    /// `git log --oneline <range>` lines.
    async fn log_oneline(&self, dir: &Path, range: &str) -> Result<Vec<String>, VcsError>;

    /// Files changed in commits `@{upstream}..HEAD`.
    async fn committed_files_vs_upstream(&self, dir: &Path) -> Result<Vec<String>, VcsError>;

    /// Stage the given paths.
    async fn stage(&self, dir: &Path, paths: &[String]) -> Result<(), VcsError>;

    /// Commit staged changes.
    async fn commit(&self, dir: &Path, message: &str) -> Result<(), VcsError>;

    /// Push the branch, setting upstream (`git push -u origin <branch>`).
    async fn push_upstream(&self, dir: &Path, branch: &str) -> Result<(), VcsError>;

    /// `git diff --stat <base>...HEAD`.
    async fn diff_stat(&self, dir: &Path, base: &str) -> Result<String, VcsError>;

    /// Remove a worktree (`git worktree remove --force`), run from the
    /// repository root.
    async fn remove_worktree(&self, repo_root: &Path, worktree: &Path) -> Result<(), VcsError>;

    /// Delete a local branch, best-effort.
    async fn delete_local_branch(&self, repo_root: &Path, branch: &str) -> Result<(), VcsError>;

    /// Delete a remote branch, best-effort.
    async fn delete_remote_branch(&self, repo_root: &Path, branch: &str) -> Result<(), VcsError>;
}

/// Extract the file path from one `git status --porcelain` line.
///
/// Handles the rename arrow (`R  old -> new` yields `new`) and surrounding
/// quotes on paths with special characters.
pub fn parse_porcelain_path(line: &str) -> Option<String> {
    if line.len() < 4 {
        return None;
    }
    let path_part = line[3..].trim();
    let path_part = match path_part.split_once(" -> ") {
        Some((_, renamed)) => renamed,
        None => path_part,
    };
    let cleaned = path_part.trim_matches('"');
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
