// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracker entities as seen by the snapshot: issues and pull requests.
//!
//! Only numeric references cross subsystem boundaries; no back-pointers are
//! persisted.

use serde::{Deserialize, Serialize};

/// An issue as returned by a label query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// RFC-3339 creation timestamp; empty when the query omitted it.
    #[serde(default)]
    pub created_at: String,
}

/// A pull request as returned by a label query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Head branch name (e.g. `feature/issue-42`).
    #[serde(default)]
    pub head_ref: String,
}

/// Canonical feature branch for an issue.
pub fn feature_branch(issue: u64) -> String {
    format!("feature/issue-{issue}")
}

/// Worktree directory name for an issue (under `.loom/worktrees/`).
pub fn worktree_name(issue: u64) -> String {
    format!("issue-{issue}")
}

/// PR title generated from an issue title, conventional-commit style.
///
/// Titles that already carry a conventional prefix are kept as-is; otherwise
/// a `feat:` prefix is added. Falls back to a generic title when the issue
/// title is unavailable.
pub fn pr_title(issue_title: Option<&str>, issue: u64) -> String {
    const PREFIXES: [&str; 8] = [
        "feat", "fix", "docs", "refactor", "test", "chore", "perf", "ci",
    ];
    match issue_title {
        Some(title) if !title.trim().is_empty() => {
            let title = title.trim();
            let has_prefix = title
                .split_once(':')
                .map(|(head, _)| {
                    let head = head.trim_end_matches(|c: char| c == '!' || c == ')');
                    let head = head.split_once('(').map_or(head, |(t, _)| t);
                    PREFIXES.contains(&head)
                })
                .unwrap_or(false);
            if has_prefix {
                title.to_string()
            } else {
                format!("feat: {title}")
            }
        }
        _ => format!("feat: resolve issue #{issue}"),
    }
}

#[cfg(test)]
#[path = "issue_tests.rs"]
mod tests;
