// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git implementation of the VCS adapter.

use super::{Vcs, VcsError};
use crate::subprocess::{run_with_timeout, GIT_TIMEOUT};
use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;

/// Git subprocess adapter.
#[derive(Clone, Default)]
pub struct GitVcs;

impl GitVcs {
    pub fn new() -> Self {
        Self
    }

    async fn git(&self, dir: &Path, args: &[&str], description: &str) -> Result<Output, VcsError> {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(dir).args(args);
        run_with_timeout(cmd, GIT_TIMEOUT, description)
            .await
            .map_err(VcsError::CommandFailed)
    }

    async fn git_ok(&self, dir: &Path, args: &[&str], description: &str) -> Result<String, VcsError> {
        let output = self.git(dir, args, description).await?;
        if !output.status.success() {
            return Err(VcsError::CommandFailed(format!(
                "{}: {}",
                description,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Vcs for GitVcs {
    async fn status_porcelain(&self, dir: &Path) -> Result<Vec<String>, VcsError> {
        let output = self
            .git(dir, &["status", "--porcelain"], "git status")
            .await?;
        if !output.status.success() {
            return Err(VcsError::NotARepo(dir.display().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.to_string())
            .collect())
    }

    async fn current_branch(&self, dir: &Path) -> Result<String, VcsError> {
        self.git_ok(
            dir,
            &["rev-parse", "--abbrev-ref", "HEAD"],
            "git rev-parse HEAD",
        )
        .await
    }

    async fn default_branch(&self, dir: &Path) -> Result<String, VcsError> {
        let output = self
            .git(
                dir,
                &["symbolic-ref", "refs/remotes/origin/HEAD"],
                "git symbolic-ref origin/HEAD",
            )
            .await?;
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout)
                .trim()
                .replace("refs/remotes/origin/", "");
            if !name.is_empty() {
                return Ok(name);
            }
        }
        Ok("main".to_string())
    }

    async fn commits_ahead(&self, dir: &Path, base: &str) -> Result<Option<u32>, VcsError> {
        let range = format!("origin/{base}..HEAD");
        let output = self
            .git(dir, &["rev-list", "--count", &range], "git rev-list ahead")
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().parse().ok())
    }

    async fn commits_behind(&self, dir: &Path, base: &str) -> Result<Option<u32>, VcsError> {
        let range = format!("HEAD..origin/{base}");
        let output = self
            .git(dir, &["rev-list", "--count", &range], "git rev-list behind")
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().parse().ok())
    }

    async fn has_upstream(&self, dir: &Path) -> Result<bool, VcsError> {
        let output = self
            .git(
                dir,
                &["rev-parse", "--abbrev-ref", "@{upstream}"],
                "git rev-parse upstream",
            )
            .await?;
        Ok(output.status.success())
    }

    async fn log_oneline(&self, dir: &Path, range: &str) -> Result<Vec<String>, VcsError> {
        let output = self
            .git(dir, &["log", "--oneline", range], "git log")
            .await?;
        if !output.status.success() {
            // An unborn upstream range is "no commits", not an error.
            return Ok(Vec::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.to_string())
            .collect())
    }

    async fn committed_files_vs_upstream(&self, dir: &Path) -> Result<Vec<String>, VcsError> {
        let output = self
            .git(
                dir,
                &["diff", "--name-only", "@{upstream}..HEAD"],
                "git diff --name-only",
            )
            .await?;
        if !output.status.success() {
            return Ok(Vec::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    async fn stage(&self, dir: &Path, paths: &[String]) -> Result<(), VcsError> {
        let mut args = vec!["add", "--"];
        let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
        args.extend(path_refs);
        self.git_ok(dir, &args, "git add").await?;
        Ok(())
    }

    async fn commit(&self, dir: &Path, message: &str) -> Result<(), VcsError> {
        self.git_ok(dir, &["commit", "-m", message], "git commit")
            .await?;
        Ok(())
    }

    async fn push_upstream(&self, dir: &Path, branch: &str) -> Result<(), VcsError> {
        self.git_ok(dir, &["push", "-u", "origin", branch], "git push")
            .await?;
        Ok(())
    }

    async fn diff_stat(&self, dir: &Path, base: &str) -> Result<String, VcsError> {
        let range = format!("{base}...HEAD");
        let output = self
            .git(dir, &["diff", "--stat", &range], "git diff --stat")
            .await?;
        if !output.status.success() {
            return Ok(String::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn remove_worktree(&self, repo_root: &Path, worktree: &Path) -> Result<(), VcsError> {
        let worktree_str = worktree.display().to_string();
        self.git_ok(
            repo_root,
            &["worktree", "remove", &worktree_str, "--force"],
            "git worktree remove",
        )
        .await?;
        Ok(())
    }

    async fn delete_local_branch(&self, repo_root: &Path, branch: &str) -> Result<(), VcsError> {
        // Best-effort; the branch may already be gone
        let _ = self
            .git(repo_root, &["branch", "-D", branch], "git branch -D")
            .await?;
        Ok(())
    }

    async fn delete_remote_branch(&self, repo_root: &Path, branch: &str) -> Result<(), VcsError> {
        let _ = self
            .git(
                repo_root,
                &["push", "origin", "--delete", branch],
                "git push --delete",
            )
            .await?;
        Ok(())
    }
}
