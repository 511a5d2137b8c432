// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! GitHub tracker shelling out to the `gh` CLI.

use super::{CheckCounts, EntityState, PrFile, Tracker, TrackerError};
use crate::subprocess::{run_with_timeout, TRACKER_TIMEOUT};
use async_trait::async_trait;
use loom_core::{Issue, PullRequest};
use serde::Deserialize;
use std::path::PathBuf;
use tokio::process::Command;

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    labels: Vec<GhLabel>,
    #[serde(default, rename = "createdAt")]
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct GhPr {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    labels: Vec<GhLabel>,
    #[serde(default, rename = "headRefName")]
    head_ref: String,
}

#[derive(Debug, Deserialize)]
struct GhPrFile {
    path: String,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
}

#[derive(Debug, Deserialize)]
struct GhCheck {
    #[serde(default)]
    state: String,
    #[serde(default)]
    conclusion: String,
}

/// Tracker backed by the `gh` CLI, run from the repository root.
#[derive(Clone)]
pub struct GithubTracker {
    repo_root: PathBuf,
}

impl GithubTracker {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    async fn gh(&self, args: &[&str], description: &str) -> Result<String, TrackerError> {
        let mut cmd = Command::new("gh");
        cmd.args(args).current_dir(&self.repo_root);
        let output = run_with_timeout(cmd, TRACKER_TIMEOUT, description)
            .await
            .map_err(TrackerError::QueryFailed)?;
        if !output.status.success() {
            return Err(TrackerError::QueryFailed(format!(
                "{}: {}",
                description,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn gh_mutate(&self, args: &[&str], description: &str) -> Result<(), TrackerError> {
        let mut cmd = Command::new("gh");
        cmd.args(args).current_dir(&self.repo_root);
        let output = run_with_timeout(cmd, TRACKER_TIMEOUT, description)
            .await
            .map_err(TrackerError::MutationFailed)?;
        if !output.status.success() {
            return Err(TrackerError::MutationFailed(format!(
                "{}: {}",
                description,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, TrackerError> {
        serde_json::from_str(raw).map_err(|e| TrackerError::BadOutput(e.to_string()))
    }
}

fn parse_pr_number(raw: &str) -> Option<u64> {
    let text = raw.trim();
    if text.is_empty() || text == "null" {
        return None;
    }
    text.parse().ok()
}

fn state_str(state: EntityState) -> &'static str {
    match state {
        EntityState::Open => "open",
        EntityState::Closed => "closed",
        EntityState::Merged => "merged",
    }
}

#[async_trait]
impl Tracker for GithubTracker {
    async fn list_issues(&self, label: Option<&str>) -> Result<Vec<Issue>, TrackerError> {
        let raw = match label {
            Some(label) => {
                self.gh(
                    &[
                        "issue",
                        "list",
                        "--label",
                        label,
                        "--state",
                        "open",
                        "--json",
                        "number,title,labels,createdAt",
                    ],
                    "gh issue list",
                )
                .await?
            }
            None => {
                self.gh(
                    &[
                        "issue",
                        "list",
                        "--state",
                        "open",
                        "--json",
                        "number,title,labels,createdAt",
                        "--limit",
                        "100",
                    ],
                    "gh issue list (all open)",
                )
                .await?
            }
        };
        let issues: Vec<GhIssue> = Self::parse_json(&raw)?;
        Ok(issues
            .into_iter()
            .map(|i| Issue {
                number: i.number,
                title: i.title,
                labels: i.labels.into_iter().map(|l| l.name).collect(),
                created_at: i.created_at,
            })
            .collect())
    }

    async fn list_prs(&self, label: &str) -> Result<Vec<PullRequest>, TrackerError> {
        let raw = self
            .gh(
                &[
                    "pr",
                    "list",
                    "--label",
                    label,
                    "--state",
                    "open",
                    "--json",
                    "number,title,labels,headRefName",
                ],
                "gh pr list",
            )
            .await?;
        let prs: Vec<GhPr> = Self::parse_json(&raw)?;
        Ok(prs
            .into_iter()
            .map(|p| PullRequest {
                number: p.number,
                title: p.title,
                labels: p.labels.into_iter().map(|l| l.name).collect(),
                head_ref: p.head_ref,
            })
            .collect())
    }

    async fn issue_state(&self, issue: u64) -> Result<EntityState, TrackerError> {
        let raw = self
            .gh(
                &[
                    "issue",
                    "view",
                    &issue.to_string(),
                    "--json",
                    "state",
                    "--jq",
                    ".state",
                ],
                "gh issue view state",
            )
            .await?;
        EntityState::parse(&raw).ok_or_else(|| TrackerError::BadOutput(raw))
    }

    async fn issue_labels(&self, issue: u64) -> Result<Vec<String>, TrackerError> {
        let raw = self
            .gh(
                &[
                    "issue",
                    "view",
                    &issue.to_string(),
                    "--json",
                    "labels",
                    "--jq",
                    ".labels[].name",
                ],
                "gh issue view labels",
            )
            .await?;
        Ok(raw.lines().map(|l| l.trim().to_string()).collect())
    }

    async fn issue_title(&self, issue: u64) -> Result<Option<String>, TrackerError> {
        let raw = self
            .gh(
                &[
                    "issue",
                    "view",
                    &issue.to_string(),
                    "--json",
                    "title",
                    "--jq",
                    ".title",
                ],
                "gh issue view title",
            )
            .await?;
        Ok(if raw.is_empty() { None } else { Some(raw) })
    }

    async fn edit_issue_labels(
        &self,
        issue: u64,
        remove: &[&str],
        add: &[&str],
    ) -> Result<(), TrackerError> {
        let issue_str = issue.to_string();
        let mut args = vec!["issue", "edit", &issue_str];
        for label in remove {
            args.push("--remove-label");
            args.push(label);
        }
        for label in add {
            args.push("--add-label");
            args.push(label);
        }
        self.gh_mutate(&args, "gh issue edit labels").await
    }

    async fn comment_issue(&self, issue: u64, body: &str) -> Result<(), TrackerError> {
        self.gh_mutate(
            &["issue", "comment", &issue.to_string(), "--body", body],
            "gh issue comment",
        )
        .await
    }

    async fn reopen_issue(&self, issue: u64) -> Result<(), TrackerError> {
        self.gh_mutate(&["issue", "reopen", &issue.to_string()], "gh issue reopen")
            .await
    }

    async fn pr_state(&self, pr: u64) -> Result<EntityState, TrackerError> {
        let raw = self
            .gh(
                &[
                    "pr",
                    "view",
                    &pr.to_string(),
                    "--json",
                    "state",
                    "--jq",
                    ".state",
                ],
                "gh pr view state",
            )
            .await?;
        EntityState::parse(&raw).ok_or_else(|| TrackerError::BadOutput(raw))
    }

    async fn pr_labels(&self, pr: u64) -> Result<Vec<String>, TrackerError> {
        let raw = self
            .gh(
                &[
                    "pr",
                    "view",
                    &pr.to_string(),
                    "--json",
                    "labels",
                    "--jq",
                    ".labels[].name",
                ],
                "gh pr view labels",
            )
            .await?;
        Ok(raw.lines().map(|l| l.trim().to_string()).collect())
    }

    async fn pr_title(&self, pr: u64) -> Result<String, TrackerError> {
        self.gh(
            &[
                "pr",
                "view",
                &pr.to_string(),
                "--json",
                "title",
                "--jq",
                ".title",
            ],
            "gh pr view title",
        )
        .await
    }

    async fn pr_body(&self, pr: u64) -> Result<String, TrackerError> {
        let raw = self
            .gh(
                &[
                    "pr",
                    "view",
                    &pr.to_string(),
                    "--json",
                    "body",
                    "--jq",
                    ".body",
                ],
                "gh pr view body",
            )
            .await?;
        Ok(if raw == "null" { String::new() } else { raw })
    }

    async fn edit_pr_body(&self, pr: u64, body: &str) -> Result<(), TrackerError> {
        self.gh_mutate(
            &["pr", "edit", &pr.to_string(), "--body", body],
            "gh pr edit body",
        )
        .await
    }

    async fn edit_pr_labels(
        &self,
        pr: u64,
        remove: &[&str],
        add: &[&str],
    ) -> Result<(), TrackerError> {
        let pr_str = pr.to_string();
        let mut args = vec!["pr", "edit", &pr_str];
        for label in remove {
            args.push("--remove-label");
            args.push(label);
        }
        for label in add {
            args.push("--add-label");
            args.push(label);
        }
        self.gh_mutate(&args, "gh pr edit labels").await
    }

    async fn create_pr(
        &self,
        head: &str,
        title: &str,
        body: &str,
        labels: &[&str],
    ) -> Result<u64, TrackerError> {
        let mut args = vec![
            "pr", "create", "--head", head, "--title", title, "--body", body,
        ];
        for label in labels {
            args.push("--label");
            args.push(label);
        }
        let raw = self.gh(&args, "gh pr create").await?;
        // Output is the PR URL; the number is the last path segment.
        let number = raw
            .rsplit('/')
            .next()
            .and_then(parse_pr_number)
            .ok_or_else(|| TrackerError::BadOutput(raw.clone()))?;
        Ok(number)
    }

    async fn find_pr_by_head(
        &self,
        branch: &str,
        state: EntityState,
    ) -> Result<Option<u64>, TrackerError> {
        let raw = self
            .gh(
                &[
                    "pr",
                    "list",
                    "--head",
                    branch,
                    "--state",
                    state_str(state),
                    "--json",
                    "number",
                    "--jq",
                    ".[0].number",
                ],
                "gh pr list by head",
            )
            .await?;
        Ok(parse_pr_number(&raw))
    }

    async fn search_open_prs(&self, query: &str) -> Result<Option<u64>, TrackerError> {
        let raw = self
            .gh(
                &[
                    "pr",
                    "list",
                    "--search",
                    query,
                    "--state",
                    "open",
                    "--json",
                    "number",
                    "--jq",
                    ".[0].number",
                ],
                "gh pr search",
            )
            .await?;
        Ok(parse_pr_number(&raw))
    }

    async fn pr_changes_requested_reviews(&self, pr: u64) -> Result<u32, TrackerError> {
        let endpoint = format!("repos/{{owner}}/{{repo}}/pulls/{pr}/reviews");
        let raw = self
            .gh(
                &[
                    "api",
                    &endpoint,
                    "--jq",
                    r#"[.[] | select(.state == "CHANGES_REQUESTED")] | length"#,
                ],
                "gh api pr reviews",
            )
            .await?;
        raw.parse()
            .map_err(|_| TrackerError::BadOutput(raw.clone()))
    }

    async fn pr_files(&self, pr: u64) -> Result<Vec<PrFile>, TrackerError> {
        let raw = self
            .gh(
                &[
                    "pr",
                    "view",
                    &pr.to_string(),
                    "--json",
                    "files",
                    "--jq",
                    ".files",
                ],
                "gh pr view files",
            )
            .await?;
        let files: Vec<GhPrFile> = Self::parse_json(&raw)?;
        Ok(files
            .into_iter()
            .map(|f| PrFile {
                path: f.path,
                additions: f.additions,
                deletions: f.deletions,
            })
            .collect())
    }

    async fn pr_checks(&self, pr: u64) -> Result<CheckCounts, TrackerError> {
        let raw = self
            .gh(
                &[
                    "pr",
                    "view",
                    &pr.to_string(),
                    "--json",
                    "statusCheckRollup",
                    "--jq",
                    ".statusCheckRollup",
                ],
                "gh pr view checks",
            )
            .await?;
        if raw.is_empty() || raw == "null" {
            return Ok(CheckCounts::default());
        }
        let checks: Vec<GhCheck> = Self::parse_json(&raw)?;
        let mut counts = CheckCounts {
            total: checks.len() as u32,
            ..Default::default()
        };
        for check in checks {
            let conclusion = if check.conclusion.is_empty() {
                check.state
            } else {
                check.conclusion
            };
            match conclusion.to_ascii_uppercase().as_str() {
                "SUCCESS" | "NEUTRAL" | "SKIPPED" => counts.passed += 1,
                "FAILURE" | "ERROR" | "TIMED_OUT" | "CANCELLED" | "ACTION_REQUIRED" => {
                    counts.failed += 1
                }
                _ => counts.pending += 1,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
#[path = "github_tests.rs"]
mod tests;
