// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory tracker for tests: canned data plus mutation recording.

use super::{CheckCounts, EntityState, PrFile, Tracker, TrackerError};
use async_trait::async_trait;
use loom_core::{Issue, PullRequest};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Recorded mutation, for side-effect assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCall {
    EditIssueLabels {
        issue: u64,
        remove: Vec<String>,
        add: Vec<String>,
    },
    CommentIssue {
        issue: u64,
    },
    ReopenIssue {
        issue: u64,
    },
    EditPrBody {
        pr: u64,
    },
    EditPrLabels {
        pr: u64,
        remove: Vec<String>,
        add: Vec<String>,
    },
    CreatePr {
        head: String,
    },
}

#[derive(Debug, Clone, Default)]
struct FakeIssue {
    title: String,
    labels: Vec<String>,
    state: Option<EntityState>,
    created_at: String,
    comments: Vec<String>,
}

#[derive(Debug, Clone)]
struct FakePr {
    title: String,
    body: String,
    labels: Vec<String>,
    head_ref: String,
    state: EntityState,
    changes_requested_reviews: u32,
    files: Vec<PrFile>,
    checks: CheckCounts,
}

impl Default for FakePr {
    fn default() -> Self {
        Self {
            title: String::new(),
            body: String::new(),
            labels: Vec::new(),
            head_ref: String::new(),
            state: EntityState::Open,
            changes_requested_reviews: 0,
            files: Vec::new(),
            checks: CheckCounts::default(),
        }
    }
}

#[derive(Default)]
struct Inner {
    issues: BTreeMap<u64, FakeIssue>,
    prs: BTreeMap<u64, FakePr>,
    next_pr_number: u64,
    calls: Vec<TrackerCall>,
    failing_labels: BTreeSet<String>,
}

/// Fake tracker with interior mutability.
#[derive(Clone, Default)]
pub struct FakeTracker {
    inner: Arc<Mutex<Inner>>,
}

impl FakeTracker {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.inner.lock().next_pr_number = 100;
        fake
    }

    pub fn add_issue(&self, number: u64, title: &str, labels: &[&str], created_at: &str) {
        self.inner.lock().issues.insert(
            number,
            FakeIssue {
                title: title.to_string(),
                labels: labels.iter().map(|l| l.to_string()).collect(),
                state: Some(EntityState::Open),
                created_at: created_at.to_string(),
                comments: Vec::new(),
            },
        );
    }

    pub fn close_issue(&self, number: u64) {
        if let Some(issue) = self.inner.lock().issues.get_mut(&number) {
            issue.state = Some(EntityState::Closed);
        }
    }

    pub fn add_pr(&self, number: u64, head_ref: &str, title: &str, body: &str, labels: &[&str]) {
        self.inner.lock().prs.insert(
            number,
            FakePr {
                title: title.to_string(),
                body: body.to_string(),
                labels: labels.iter().map(|l| l.to_string()).collect(),
                head_ref: head_ref.to_string(),
                ..Default::default()
            },
        );
    }

    pub fn set_pr_state(&self, number: u64, state: EntityState) {
        if let Some(pr) = self.inner.lock().prs.get_mut(&number) {
            pr.state = state;
        }
    }

    pub fn set_pr_reviews(&self, number: u64, changes_requested: u32) {
        if let Some(pr) = self.inner.lock().prs.get_mut(&number) {
            pr.changes_requested_reviews = changes_requested;
        }
    }

    pub fn set_pr_files(&self, number: u64, files: Vec<PrFile>) {
        if let Some(pr) = self.inner.lock().prs.get_mut(&number) {
            pr.files = files;
        }
    }

    pub fn set_pr_checks(&self, number: u64, checks: CheckCounts) {
        if let Some(pr) = self.inner.lock().prs.get_mut(&number) {
            pr.checks = checks;
        }
    }

    /// Make label-list queries for this label fail (partial-failure tests).
    pub fn fail_queries_for_label(&self, label: &str) {
        self.inner.lock().failing_labels.insert(label.to_string());
    }

    /// All recorded mutations, in order.
    pub fn calls(&self) -> Vec<TrackerCall> {
        self.inner.lock().calls.clone()
    }

    /// Comments posted to an issue.
    pub fn issue_comments(&self, issue: u64) -> Vec<String> {
        self.inner
            .lock()
            .issues
            .get(&issue)
            .map(|i| i.comments.clone())
            .unwrap_or_default()
    }

    /// Current labels on an issue (panics in tests if the issue is unknown).
    pub fn labels_of_issue(&self, issue: u64) -> Vec<String> {
        self.inner
            .lock()
            .issues
            .get(&issue)
            .map(|i| i.labels.clone())
            .unwrap_or_default()
    }

    pub fn labels_of_pr(&self, pr: u64) -> Vec<String> {
        self.inner
            .lock()
            .prs
            .get(&pr)
            .map(|p| p.labels.clone())
            .unwrap_or_default()
    }

    pub fn body_of_pr(&self, pr: u64) -> String {
        self.inner
            .lock()
            .prs
            .get(&pr)
            .map(|p| p.body.clone())
            .unwrap_or_default()
    }
}

fn apply_label_edit(labels: &mut Vec<String>, remove: &[&str], add: &[&str]) {
    labels.retain(|l| !remove.contains(&l.as_str()));
    for label in add {
        if !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
    }
}

#[async_trait]
impl Tracker for FakeTracker {
    async fn list_issues(&self, label: Option<&str>) -> Result<Vec<Issue>, TrackerError> {
        let inner = self.inner.lock();
        if let Some(label) = label {
            if inner.failing_labels.contains(label) {
                return Err(TrackerError::QueryFailed(format!(
                    "injected failure for {label}"
                )));
            }
        }
        Ok(inner
            .issues
            .iter()
            .filter(|(_, i)| i.state == Some(EntityState::Open))
            .filter(|(_, i)| label.map(|l| i.labels.iter().any(|x| x == l)).unwrap_or(true))
            .map(|(number, i)| Issue {
                number: *number,
                title: i.title.clone(),
                labels: i.labels.clone(),
                created_at: i.created_at.clone(),
            })
            .collect())
    }

    async fn list_prs(&self, label: &str) -> Result<Vec<PullRequest>, TrackerError> {
        let inner = self.inner.lock();
        if inner.failing_labels.contains(label) {
            return Err(TrackerError::QueryFailed(format!(
                "injected failure for {label}"
            )));
        }
        Ok(inner
            .prs
            .iter()
            .filter(|(_, p)| p.state == EntityState::Open)
            .filter(|(_, p)| p.labels.iter().any(|x| x == label))
            .map(|(number, p)| PullRequest {
                number: *number,
                title: p.title.clone(),
                labels: p.labels.clone(),
                head_ref: p.head_ref.clone(),
            })
            .collect())
    }

    async fn issue_state(&self, issue: u64) -> Result<EntityState, TrackerError> {
        self.inner
            .lock()
            .issues
            .get(&issue)
            .and_then(|i| i.state)
            .ok_or_else(|| TrackerError::QueryFailed(format!("no issue {issue}")))
    }

    async fn issue_labels(&self, issue: u64) -> Result<Vec<String>, TrackerError> {
        Ok(self.labels_of_issue(issue))
    }

    async fn issue_title(&self, issue: u64) -> Result<Option<String>, TrackerError> {
        Ok(self.inner.lock().issues.get(&issue).map(|i| i.title.clone()))
    }

    async fn edit_issue_labels(
        &self,
        issue: u64,
        remove: &[&str],
        add: &[&str],
    ) -> Result<(), TrackerError> {
        let mut inner = self.inner.lock();
        inner.calls.push(TrackerCall::EditIssueLabels {
            issue,
            remove: remove.iter().map(|s| s.to_string()).collect(),
            add: add.iter().map(|s| s.to_string()).collect(),
        });
        if let Some(i) = inner.issues.get_mut(&issue) {
            apply_label_edit(&mut i.labels, remove, add);
        }
        Ok(())
    }

    async fn comment_issue(&self, issue: u64, body: &str) -> Result<(), TrackerError> {
        let mut inner = self.inner.lock();
        inner.calls.push(TrackerCall::CommentIssue { issue });
        if let Some(i) = inner.issues.get_mut(&issue) {
            i.comments.push(body.to_string());
        }
        Ok(())
    }

    async fn reopen_issue(&self, issue: u64) -> Result<(), TrackerError> {
        let mut inner = self.inner.lock();
        inner.calls.push(TrackerCall::ReopenIssue { issue });
        if let Some(i) = inner.issues.get_mut(&issue) {
            i.state = Some(EntityState::Open);
        }
        Ok(())
    }

    async fn pr_state(&self, pr: u64) -> Result<EntityState, TrackerError> {
        self.inner
            .lock()
            .prs
            .get(&pr)
            .map(|p| p.state)
            .ok_or_else(|| TrackerError::QueryFailed(format!("no PR {pr}")))
    }

    async fn pr_labels(&self, pr: u64) -> Result<Vec<String>, TrackerError> {
        Ok(self.labels_of_pr(pr))
    }

    async fn pr_title(&self, pr: u64) -> Result<String, TrackerError> {
        Ok(self
            .inner
            .lock()
            .prs
            .get(&pr)
            .map(|p| p.title.clone())
            .unwrap_or_default())
    }

    async fn pr_body(&self, pr: u64) -> Result<String, TrackerError> {
        Ok(self.body_of_pr(pr))
    }

    async fn edit_pr_body(&self, pr: u64, body: &str) -> Result<(), TrackerError> {
        let mut inner = self.inner.lock();
        inner.calls.push(TrackerCall::EditPrBody { pr });
        if let Some(p) = inner.prs.get_mut(&pr) {
            p.body = body.to_string();
        }
        Ok(())
    }

    async fn edit_pr_labels(
        &self,
        pr: u64,
        remove: &[&str],
        add: &[&str],
    ) -> Result<(), TrackerError> {
        let mut inner = self.inner.lock();
        inner.calls.push(TrackerCall::EditPrLabels {
            pr,
            remove: remove.iter().map(|s| s.to_string()).collect(),
            add: add.iter().map(|s| s.to_string()).collect(),
        });
        if let Some(p) = inner.prs.get_mut(&pr) {
            apply_label_edit(&mut p.labels, remove, add);
        }
        Ok(())
    }

    async fn create_pr(
        &self,
        head: &str,
        title: &str,
        body: &str,
        labels: &[&str],
    ) -> Result<u64, TrackerError> {
        let mut inner = self.inner.lock();
        inner.calls.push(TrackerCall::CreatePr {
            head: head.to_string(),
        });
        let number = inner.next_pr_number;
        inner.next_pr_number += 1;
        inner.prs.insert(
            number,
            FakePr {
                title: title.to_string(),
                body: body.to_string(),
                labels: labels.iter().map(|l| l.to_string()).collect(),
                head_ref: head.to_string(),
                ..Default::default()
            },
        );
        Ok(number)
    }

    async fn find_pr_by_head(
        &self,
        branch: &str,
        state: EntityState,
    ) -> Result<Option<u64>, TrackerError> {
        Ok(self
            .inner
            .lock()
            .prs
            .iter()
            .find(|(_, p)| p.head_ref == branch && p.state == state)
            .map(|(number, _)| *number))
    }

    async fn search_open_prs(&self, query: &str) -> Result<Option<u64>, TrackerError> {
        let query_lower = query.to_lowercase();
        Ok(self
            .inner
            .lock()
            .prs
            .iter()
            .find(|(_, p)| {
                p.state == EntityState::Open && p.body.to_lowercase().contains(&query_lower)
            })
            .map(|(number, _)| *number))
    }

    async fn pr_changes_requested_reviews(&self, pr: u64) -> Result<u32, TrackerError> {
        Ok(self
            .inner
            .lock()
            .prs
            .get(&pr)
            .map(|p| p.changes_requested_reviews)
            .unwrap_or(0))
    }

    async fn pr_files(&self, pr: u64) -> Result<Vec<PrFile>, TrackerError> {
        Ok(self
            .inner
            .lock()
            .prs
            .get(&pr)
            .map(|p| p.files.clone())
            .unwrap_or_default())
    }

    async fn pr_checks(&self, pr: u64) -> Result<CheckCounts, TrackerError> {
        Ok(self
            .inner
            .lock()
            .prs
            .get(&pr)
            .map(|p| p.checks)
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
