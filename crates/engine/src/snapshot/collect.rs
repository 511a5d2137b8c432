// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parallel tracker data collection.
//!
//! Ten label queries run concurrently under a fixed permit cap. A failed
//! query yields an empty collection plus a warning; it never aborts the
//! snapshot.

use super::derive::SpinningPr;
use loom_adapters::{Tracker, TrackerError};
use loom_core::{labels, Issue, LoomConfig, PullRequest};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tokio::sync::Semaphore;
use tracing::warn;

// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static CLOSING_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(Closes|Fixes|Resolves)\s+#(\d+)").expect("constant regex pattern is valid")
});

/// Maximum tracker queries in flight during collection.
const QUERY_POOL_SIZE: usize = 8;

/// Raw pipeline collections, one per label bucket.
#[derive(Debug, Clone, Default)]
pub struct PipelineData {
    pub ready_issues: Vec<Issue>,
    pub building_issues: Vec<Issue>,
    pub blocked_issues: Vec<Issue>,
    pub architect_proposals: Vec<Issue>,
    pub hermit_proposals: Vec<Issue>,
    pub curated_issues: Vec<Issue>,
    pub review_requested: Vec<PullRequest>,
    pub changes_requested: Vec<PullRequest>,
    pub ready_to_merge: Vec<PullRequest>,
    pub uncurated_issues: Vec<Issue>,
    /// `query_failed:<bucket>` entries for collections that errored.
    pub warnings: Vec<String>,
}

async fn issues_guarded<T: Tracker>(
    tracker: &T,
    semaphore: &Semaphore,
    label: Option<&str>,
) -> Result<Vec<Issue>, TrackerError> {
    // Closed semaphores never happen here; treat failure as an empty permit.
    let _permit = semaphore.acquire().await;
    tracker.list_issues(label).await
}

async fn prs_guarded<T: Tracker>(
    tracker: &T,
    semaphore: &Semaphore,
    label: &str,
) -> Result<Vec<PullRequest>, TrackerError> {
    let _permit = semaphore.acquire().await;
    tracker.list_prs(label).await
}

fn unwrap_issues(
    result: Result<Vec<Issue>, TrackerError>,
    bucket: &str,
    warnings: &mut Vec<String>,
) -> Vec<Issue> {
    match result {
        Ok(issues) => issues,
        Err(e) => {
            warn!(bucket, error = %e, "pipeline query failed, treating as empty");
            warnings.push(format!("query_failed:{bucket}"));
            Vec::new()
        }
    }
}

fn unwrap_prs(
    result: Result<Vec<PullRequest>, TrackerError>,
    bucket: &str,
    warnings: &mut Vec<String>,
) -> Vec<PullRequest> {
    match result {
        Ok(prs) => prs,
        Err(e) => {
            warn!(bucket, error = %e, "pipeline query failed, treating as empty");
            warnings.push(format!("query_failed:{bucket}"));
            Vec::new()
        }
    }
}

/// Run the ten pipeline queries in one bounded parallel batch.
pub async fn collect_pipeline_data<T: Tracker>(tracker: &T) -> PipelineData {
    let semaphore = Arc::new(Semaphore::new(QUERY_POOL_SIZE));

    let (
        ready,
        building,
        architect,
        hermit,
        curated,
        blocked,
        review_requested,
        changes_requested,
        ready_to_merge,
        all_open,
    ) = tokio::join!(
        issues_guarded(tracker, &semaphore, Some(labels::ISSUE)),
        issues_guarded(tracker, &semaphore, Some(labels::BUILDING)),
        issues_guarded(tracker, &semaphore, Some(labels::ARCHITECT)),
        issues_guarded(tracker, &semaphore, Some(labels::HERMIT)),
        issues_guarded(tracker, &semaphore, Some(labels::CURATED)),
        issues_guarded(tracker, &semaphore, Some(labels::BLOCKED)),
        prs_guarded(tracker, &semaphore, labels::REVIEW_REQUESTED),
        prs_guarded(tracker, &semaphore, labels::CHANGES_REQUESTED),
        prs_guarded(tracker, &semaphore, labels::PR_APPROVED),
        issues_guarded(tracker, &semaphore, None),
    );

    let mut warnings = Vec::new();
    let ready_issues = unwrap_issues(ready, "ready", &mut warnings);
    let building_issues = unwrap_issues(building, "building", &mut warnings);
    let architect_proposals = unwrap_issues(architect, "architect", &mut warnings);
    let hermit_proposals = unwrap_issues(hermit, "hermit", &mut warnings);
    let curated_raw = unwrap_issues(curated, "curated", &mut warnings);
    let blocked_issues = unwrap_issues(blocked, "blocked", &mut warnings);
    let review_requested = unwrap_prs(review_requested, "review_requested", &mut warnings);
    let changes_requested = unwrap_prs(changes_requested, "changes_requested", &mut warnings);
    let ready_to_merge = unwrap_prs(ready_to_merge, "ready_to_merge", &mut warnings);
    let all_open_issues = unwrap_issues(all_open, "all_open", &mut warnings);

    // Curated excludes entries already promoted or claimed.
    let curated_issues = curated_raw
        .into_iter()
        .filter(|i| {
            !labels::has_label(&i.labels, labels::BUILDING)
                && !labels::has_label(&i.labels, labels::ISSUE)
        })
        .collect();

    // Uncurated: open issues carrying none of the processed/claimed labels.
    let uncurated_issues = all_open_issues
        .into_iter()
        .filter(|i| {
            !i.labels
                .iter()
                .any(|l| labels::CURATED_SKIP_LABELS.contains(&l.as_str()))
        })
        .collect();

    PipelineData {
        ready_issues,
        building_issues,
        blocked_issues,
        architect_proposals,
        hermit_proposals,
        curated_issues,
        review_requested,
        changes_requested,
        ready_to_merge,
        uncurated_issues,
        warnings,
    }
}

/// Detect PRs stuck in review cycles.
///
/// Only PRs already labelled changes-requested are examined: those are the
/// ones actively looping. A PR is spinning once it has accumulated at least
/// `threshold` CHANGES_REQUESTED reviews.
pub async fn detect_spinning_prs<T: Tracker>(
    tracker: &T,
    changes_requested: &[PullRequest],
    cfg: &LoomConfig,
) -> Vec<SpinningPr> {
    let mut spinning = Vec::new();
    for pr in changes_requested {
        let review_cycles = match tracker.pr_changes_requested_reviews(pr.number).await {
            Ok(count) => count,
            Err(e) => {
                warn!(pr = pr.number, error = %e, "review count query failed");
                continue;
            }
        };
        if review_cycles < cfg.spinning_review_threshold {
            continue;
        }
        let linked_issue = match tracker.pr_body(pr.number).await {
            Ok(body) => CLOSING_KEYWORD
                .captures(&body)
                .and_then(|c| c.get(2))
                .and_then(|m| m.as_str().parse().ok()),
            Err(_) => None,
        };
        spinning.push(SpinningPr {
            pr_number: pr.number,
            review_cycles,
            linked_issue,
        });
    }
    spinning
}

#[cfg(test)]
#[path = "collect_tests.rs"]
mod tests;
