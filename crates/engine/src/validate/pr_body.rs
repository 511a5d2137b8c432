// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PR body and commit-message synthesis for builder recovery.

use crate::context::EngineContext;
use loom_adapters::{SessionHost, Tracker, Vcs};
use loom_core::Clock;
use std::path::Path;

/// Derive a conventional commit message from the staged file set.
///
/// Single-file changes name the file; multi-file changes summarize the
/// dominant top-level directory.
pub fn derive_commit_message(issue: u64, staged_files: &[String]) -> String {
    match staged_files {
        [] => format!("feat: changes for issue #{issue}"),
        [only] => format!("feat: update {only} for issue #{issue}"),
        files => {
            let mut top_dirs: Vec<&str> = files
                .iter()
                .filter_map(|f| f.split('/').next())
                .collect();
            top_dirs.sort_unstable();
            top_dirs.dedup();
            match top_dirs.as_slice() {
                [single] => format!(
                    "feat: update {single} ({} files) for issue #{issue}",
                    files.len()
                ),
                _ => format!("feat: changes for issue #{issue} ({} files)", files.len()),
            }
        }
    }
}

/// Build a descriptive PR body for recovery-created PRs.
///
/// Prefers a pre-written `.loom/pr-body.md` in the worktree (written by the
/// builder while context was fresh), ensuring it carries a closing keyword.
/// Falls back to a synthesized body from diff stats and the commit shortlog.
/// `rate_limited` softens the messaging: the work completed, only the PR
/// creation step was interrupted.
pub async fn build_recovery_pr_body<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    issue: u64,
    worktree: &str,
    rate_limited: bool,
) -> String
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let wt = Path::new(worktree);
    let prewritten = wt.join(".loom").join("pr-body.md");
    if let Ok(content) = std::fs::read_to_string(&prewritten) {
        let mut body = content.trim().to_string();
        let has_close = [
            format!("Closes #{issue}"),
            format!("Fixes #{issue}"),
            format!("Resolves #{issue}"),
        ]
        .iter()
        .any(|kw| body.contains(kw));
        if !has_close {
            body.push_str(&format!("\n\nCloses #{issue}"));
        }
        return body;
    }

    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("Closes #{issue}"));
    lines.push(String::new());
    if rate_limited {
        lines.push(
            "> **Note:** Builder was rate-limited after completing work. \
             PR created via recovery path."
                .to_string(),
        );
    } else {
        lines.push(
            "> **Note:** This PR was created automatically via the builder \
             recovery path. The builder produced changes but exited before \
             creating a PR. Reviewers should examine the diff carefully."
                .to_string(),
        );
    }
    lines.push(String::new());

    let default_branch = ctx
        .vcs
        .default_branch(wt)
        .await
        .unwrap_or_else(|_| "main".to_string());
    let base = format!("origin/{default_branch}");

    if let Ok(stat) = ctx.vcs.diff_stat(wt, &base).await {
        if !stat.is_empty() {
            lines.push("## Changes".to_string());
            lines.push(String::new());
            lines.push("```".to_string());
            lines.push(stat);
            lines.push("```".to_string());
            lines.push(String::new());
        }
    }

    if let Ok(commits) = ctx.vcs.log_oneline(wt, &format!("{base}..HEAD")).await {
        if !commits.is_empty() {
            lines.push("## Commits".to_string());
            lines.push(String::new());
            for commit in commits {
                lines.push(format!("- `{commit}`"));
            }
            lines.push(String::new());
        }
    }

    lines.push("## Test plan".to_string());
    lines.push(String::new());
    if rate_limited {
        lines.push("- [ ] Verify changes match issue requirements".to_string());
        lines.push(
            "- [ ] Confirm tests pass (builder completed tests before rate limit)".to_string(),
        );
    } else {
        lines.push("- [ ] Review diff carefully (recovery-created PR)".to_string());
        lines.push("- [ ] Verify changes match issue requirements".to_string());
        lines.push("- [ ] Run tests locally if needed".to_string());
    }

    lines.join("\n")
}

/// Whether the most recent builder log for the issue shows the Claude CLI
/// rate-limit prompt. Distinguishes "work done, PR step interrupted" from a
/// genuinely abandoned build.
pub fn is_rate_limited_builder_exit<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    issue: u64,
) -> bool
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let logs_dir = ctx.paths.logs_dir();
    let Ok(entries) = std::fs::read_dir(&logs_dir) else {
        return false;
    };

    let prefix = format!("loom-builder-issue-{issue}");
    let mut candidates: Vec<_> = entries
        .flatten()
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            // Retry suffixes (-a1, -a2) share the prefix
            name.starts_with(&prefix) && name.ends_with(".log")
        })
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((modified, e.path()))
        })
        .collect();
    candidates.sort_by_key(|(modified, _)| *modified);

    let Some((_, newest)) = candidates.last() else {
        return false;
    };
    std::fs::read_to_string(newest)
        .map(|content| content.contains("/rate-limit-options"))
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "pr_body_tests.rs"]
mod tests;
