// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builder failure diagnostics: worktree state, previous-attempt progress,
//! log tail, and manual recovery recipes.

use super::strip_ansi;
use crate::context::EngineContext;
use loom_adapters::{SessionHost, Tracker, Vcs};
use loom_core::{Clock, ShepherdProgress};
use loom_storage::find_progress_for_issue;
use std::path::Path;

/// Diagnostic information gathered when builder validation fails.
#[derive(Debug, Clone, Default)]
pub struct BuilderDiagnostics {
    pub issue: u64,
    pub worktree_path: String,
    pub worktree_exists: bool,
    pub branch: String,
    pub commits_ahead: String,
    pub commits_behind: String,
    pub has_remote_tracking: bool,
    pub log_tail: String,
    pub log_path: String,
    pub issue_labels: String,
    pub main_uncommitted: String,
    pub progress_started_at: String,
    pub progress_last_heartbeat: String,
    pub progress_phase: String,
    pub progress_milestones: Vec<String>,
}

impl BuilderDiagnostics {
    /// Render as the collapsible diagnostic block attached to the issue.
    pub fn to_markdown(&self) -> String {
        let mut parts: Vec<String> =
            vec!["<details>\n<summary>Diagnostic Information</summary>\n".to_string()];

        if !self.progress_started_at.is_empty() {
            parts.push("### Previous Attempt".to_string());
            parts.push(format!("**Started**: {}", self.progress_started_at));
            if !self.progress_phase.is_empty() {
                parts.push(format!("**Last phase**: `{}`", self.progress_phase));
            }
            if !self.progress_last_heartbeat.is_empty() {
                parts.push(format!("**Last heartbeat**: {}", self.progress_last_heartbeat));
            }
            if !self.progress_milestones.is_empty() {
                parts.push("**Recent milestones**:".to_string());
                for milestone in self.progress_milestones.iter().rev().take(5).rev() {
                    parts.push(format!("  - {milestone}"));
                }
            }
            parts.push(String::new());
        }

        parts.push("### Worktree State".to_string());
        if self.worktree_exists {
            parts.push(format!("**Worktree**: `{}` exists", self.worktree_path));
            parts.push(format!("**Branch**: `{}`", self.branch));
            parts.push(format!("**Commits ahead of main**: {}", self.commits_ahead));
            parts.push(format!("**Commits behind main**: {}", self.commits_behind));
            let tracking = if self.has_remote_tracking {
                "configured"
            } else {
                "not configured (branch never pushed)"
            };
            parts.push(format!("**Remote tracking**: {tracking}"));
        } else {
            parts.push(format!(
                "**Worktree**: `{}` does not exist",
                self.worktree_path
            ));
        }

        if !self.log_tail.is_empty() {
            parts.push(format!(
                "\n**Last 15 lines from session log** (`{}`):",
                self.log_path
            ));
            parts.push(format!("```\n{}\n```", self.log_tail));
        }

        if !self.issue_labels.is_empty() {
            parts.push(format!("\n**Current issue labels**: {}", self.issue_labels));
        }

        if !self.main_uncommitted.is_empty() {
            parts.push(
                "\n**⚠️ WARNING: Uncommitted changes detected on main branch**:".to_string(),
            );
            parts.push(format!("```\n{}\n```", self.main_uncommitted));
            parts.push(
                "This suggests the builder may have worked directly on main instead of in a worktree.\n\
                 This is a workflow violation - builders MUST work in worktrees."
                    .to_string(),
            );
        }

        parts.push("\n### Possible Causes".to_string());
        if !self.worktree_exists {
            parts.push("- Worktree was never created (agent may have failed early)".to_string());
            parts.push("- Worktree creation script failed".to_string());
            parts.push(
                "- **Agent worked on main instead of worktree** (check for uncommitted changes on main)"
                    .to_string(),
            );
        } else if self.commits_ahead == "0" || self.commits_ahead == "?" {
            parts.push("- Builder exited without making any commits".to_string());
            parts.push(
                "- Builder may have determined issue was invalid or already resolved".to_string(),
            );
            parts.push("- Builder may have encountered an error during implementation".to_string());
            parts.push("- Builder may have timed out before completing work".to_string());
        }

        let issue = self.issue;
        parts.push(format!(
            r#"
### Recovery Options

**Option A: Clean worktree and retry** (recommended if worktree has no valuable changes)
```bash
# Navigate to repo root first (worktree removal breaks shell CWD)
cd "$(git rev-parse --show-toplevel)"
# Remove stale worktree
git worktree remove .loom/worktrees/issue-{issue} --force 2>/dev/null || true
git branch -D feature/issue-{issue} 2>/dev/null || true
# Reset labels and retry
gh issue edit {issue} --remove-label loom:blocked --add-label loom:issue
```

**Option B: Retry preserving worktree** (if worktree may have partial work)
```bash
gh issue edit {issue} --remove-label loom:blocked --add-label loom:issue
```

**Option C: Complete manually**
1. Navigate: `cd .loom/worktrees/issue-{issue}`
2. Implement the fix, commit changes
3. Push and create PR:
   ```bash
   git push -u origin feature/issue-{issue}
   gh pr create --label loom:review-requested --body "Closes #{issue}"
   ```
4. Remove blocked label: `gh issue edit {issue} --remove-label loom:blocked`

</details>"#
        ));

        parts.join("\n")
    }
}

/// Gather diagnostic info about a failed builder phase.
pub(crate) async fn gather_builder_diagnostics<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    issue: u64,
    worktree: &str,
) -> BuilderDiagnostics
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let mut diag = BuilderDiagnostics {
        issue,
        worktree_path: worktree.to_string(),
        commits_ahead: "?".to_string(),
        commits_behind: "?".to_string(),
        ..Default::default()
    };

    let wt = Path::new(worktree);
    if wt.is_dir() {
        diag.worktree_exists = true;

        diag.branch = ctx
            .vcs
            .current_branch(wt)
            .await
            .unwrap_or_else(|_| "unknown".to_string());

        let main_branch = ctx
            .vcs
            .default_branch(wt)
            .await
            .unwrap_or_else(|_| "main".to_string());

        if let Ok(Some(ahead)) = ctx.vcs.commits_ahead(wt, &main_branch).await {
            diag.commits_ahead = ahead.to_string();
        }
        if let Ok(Some(behind)) = ctx.vcs.commits_behind(wt, &main_branch).await {
            diag.commits_behind = behind.to_string();
        }
        diag.has_remote_tracking = ctx.vcs.has_upstream(wt).await.unwrap_or(false);
    }

    if let Some(progress) = find_progress_for_issue(&ctx.paths, issue) {
        fill_progress(&mut diag, &progress);
    }

    // Session log tail, ANSI-stripped for readability in the comment
    let session = format!("loom-builder-issue-{issue}");
    let log_path = ctx.paths.session_log(&session);
    if log_path.is_file() {
        diag.log_path = log_path.display().to_string();
        if let Ok(content) = std::fs::read_to_string(&log_path) {
            let lines: Vec<&str> = content.lines().collect();
            let skip = lines.len().saturating_sub(15);
            diag.log_tail = strip_ansi(&lines[skip..].join("\n"));
        }
    }

    if let Ok(issue_labels) = ctx.tracker.issue_labels(issue).await {
        diag.issue_labels = issue_labels.join(", ");
    }

    // Main-branch contamination check
    if let Ok(status) = ctx.vcs.status_porcelain(ctx.paths.repo_root()).await {
        if !status.is_empty() {
            diag.main_uncommitted = status
                .iter()
                .take(10)
                .cloned()
                .collect::<Vec<_>>()
                .join("\n");
        }
    }

    diag
}

fn fill_progress(diag: &mut BuilderDiagnostics, progress: &ShepherdProgress) {
    diag.progress_started_at = progress.started_at.clone();
    diag.progress_last_heartbeat = progress.last_heartbeat.clone().unwrap_or_default();
    diag.progress_phase = progress.current_phase.clone();
    diag.progress_milestones = progress
        .milestones
        .iter()
        .map(|m| {
            if m.data.is_empty() {
                format!("{} at {}", m.event, m.timestamp)
            } else {
                format!(
                    "{} at {} ({})",
                    m.event,
                    m.timestamp,
                    serde_json::Value::Object(m.data.clone())
                )
            }
        })
        .collect();
}

#[cfg(test)]
#[path = "diagnostics_tests.rs"]
mod tests;
