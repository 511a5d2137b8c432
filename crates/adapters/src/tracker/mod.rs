// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Issue/PR tracker adapters.
//!
//! The tracker is the authoritative home of the label state machine. Label
//! transitions use a single remove+add call so readers see at most one
//! transient inconsistency; validators additionally fall back to PR-body and
//! branch-name evidence.

mod github;

pub use github::GithubTracker;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeTracker, TrackerCall};

use async_trait::async_trait;
use loom_core::{Issue, PullRequest};
use thiserror::Error;

/// Errors from tracker operations
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker query failed: {0}")]
    QueryFailed(String),
    #[error("tracker mutation failed: {0}")]
    MutationFailed(String),
    #[error("unexpected tracker output: {0}")]
    BadOutput(String),
}

/// Entity open/closed state as reported by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Open,
    Closed,
    Merged,
}

impl EntityState {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Some(Self::Open),
            "CLOSED" => Some(Self::Closed),
            "MERGED" => Some(Self::Merged),
            _ => None,
        }
    }
}

/// One changed file in a PR.
#[derive(Debug, Clone, Default)]
pub struct PrFile {
    pub path: String,
    pub additions: u64,
    pub deletions: u64,
}

/// Status-check rollup for a PR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckCounts {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub pending: u32,
}

/// Abstract tracker (issues, PRs, labels, comments, reviews, checks).
#[async_trait]
pub trait Tracker: Clone + Send + Sync + 'static {
    /// Open issues carrying a label (all open issues when `label` is None).
    async fn list_issues(&self, label: Option<&str>) -> Result<Vec<Issue>, TrackerError>;

    /// Open PRs carrying a label.
    async fn list_prs(&self, label: &str) -> Result<Vec<PullRequest>, TrackerError>;

    async fn issue_state(&self, issue: u64) -> Result<EntityState, TrackerError>;
    async fn issue_labels(&self, issue: u64) -> Result<Vec<String>, TrackerError>;
    async fn issue_title(&self, issue: u64) -> Result<Option<String>, TrackerError>;

    /// Remove and add labels in one call.
    async fn edit_issue_labels(
        &self,
        issue: u64,
        remove: &[&str],
        add: &[&str],
    ) -> Result<(), TrackerError>;

    async fn comment_issue(&self, issue: u64, body: &str) -> Result<(), TrackerError>;
    async fn reopen_issue(&self, issue: u64) -> Result<(), TrackerError>;

    async fn pr_state(&self, pr: u64) -> Result<EntityState, TrackerError>;
    async fn pr_labels(&self, pr: u64) -> Result<Vec<String>, TrackerError>;
    async fn pr_title(&self, pr: u64) -> Result<String, TrackerError>;
    async fn pr_body(&self, pr: u64) -> Result<String, TrackerError>;
    async fn edit_pr_body(&self, pr: u64, body: &str) -> Result<(), TrackerError>;

    /// Remove and add labels in one call.
    async fn edit_pr_labels(
        &self,
        pr: u64,
        remove: &[&str],
        add: &[&str],
    ) -> Result<(), TrackerError>;

    /// Create a PR; returns the new PR number.
    async fn create_pr(
        &self,
        head: &str,
        title: &str,
        body: &str,
        labels: &[&str],
    ) -> Result<u64, TrackerError>;

    /// First PR whose head branch matches, in the given state.
    async fn find_pr_by_head(
        &self,
        branch: &str,
        state: EntityState,
    ) -> Result<Option<u64>, TrackerError>;

    /// First open PR whose body matches a search query (e.g. `Closes #42`).
    async fn search_open_prs(&self, query: &str) -> Result<Option<u64>, TrackerError>;

    /// Count of CHANGES_REQUESTED review submissions on a PR.
    async fn pr_changes_requested_reviews(&self, pr: u64) -> Result<u32, TrackerError>;

    /// Changed files with addition/deletion counts.
    async fn pr_files(&self, pr: u64) -> Result<Vec<PrFile>, TrackerError>;

    /// Status-check rollup for the PR's head.
    async fn pr_checks(&self, pr: u64) -> Result<CheckCounts, TrackerError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
