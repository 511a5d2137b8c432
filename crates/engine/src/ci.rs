// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CI status polling for the doctor hand-back.
//!
//! After a doctor run the shepherd waits for the PR's status checks before
//! returning to the judge: passed/failed/no-checks are terminal, a timeout
//! yields PENDING and the pipeline proceeds anyway.

use loom_adapters::{CheckCounts, Tracker};
use std::time::Duration;
use tracing::{info, warn};

/// Poll interval between CI status reads.
pub const CI_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Default ceiling on the CI wait.
pub const DEFAULT_CI_TIMEOUT: Duration = Duration::from_secs(300);

/// Terminal and non-terminal CI states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiStatus {
    Passed,
    Failed,
    Pending,
    NoChecks,
    Unknown,
}

/// Outcome of a CI wait.
#[derive(Debug, Clone)]
pub struct CiResult {
    pub status: CiStatus,
    pub message: String,
    pub counts: CheckCounts,
}

impl CiResult {
    fn from_counts(counts: CheckCounts) -> Self {
        if counts.total == 0 {
            return Self {
                status: CiStatus::NoChecks,
                message: "no status checks configured".to_string(),
                counts,
            };
        }
        if counts.failed > 0 {
            return Self {
                status: CiStatus::Failed,
                message: format!(
                    "CI failed: {}/{} checks failed",
                    counts.failed, counts.total
                ),
                counts,
            };
        }
        if counts.pending > 0 {
            return Self {
                status: CiStatus::Pending,
                message: format!(
                    "CI running: {}/{} checks pending",
                    counts.pending, counts.total
                ),
                counts,
            };
        }
        Self {
            status: CiStatus::Passed,
            message: format!(
                "CI passed: {}/{} checks succeeded",
                counts.passed, counts.total
            ),
            counts,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            CiStatus::Passed | CiStatus::Failed | CiStatus::NoChecks
        )
    }
}

/// Read the current CI state for a PR once.
pub async fn ci_status<T: Tracker>(tracker: &T, pr: u64) -> CiResult {
    match tracker.pr_checks(pr).await {
        Ok(counts) => CiResult::from_counts(counts),
        Err(e) => CiResult {
            status: CiStatus::Unknown,
            message: format!("failed to fetch CI status: {e}"),
            counts: CheckCounts::default(),
        },
    }
}

/// Wait for CI to complete on a PR.
///
/// `shutdown` is polled between reads; when it reports true the wait ends
/// with `Unknown` so the caller can exit cleanly.
pub async fn wait_for_ci<T, F>(
    tracker: &T,
    pr: u64,
    timeout: Duration,
    shutdown: F,
) -> CiResult
where
    T: Tracker,
    F: Fn() -> bool,
{
    let started = tokio::time::Instant::now();
    let mut last_message = String::new();

    info!(pr, "waiting for CI checks");

    loop {
        let result = ci_status(tracker, pr).await;

        if result.message != last_message {
            info!(pr, status = ?result.status, "{}", result.message);
            last_message = result.message.clone();
        }

        if result.is_terminal() {
            return result;
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            warn!(
                pr,
                pending = result.counts.pending,
                "CI timeout after {}s, proceeding with checks pending",
                elapsed.as_secs()
            );
            return CiResult {
                status: CiStatus::Pending,
                message: format!(
                    "CI timeout after {}s: {} checks still running",
                    elapsed.as_secs(),
                    result.counts.pending
                ),
                counts: result.counts,
            };
        }

        if shutdown() {
            info!(pr, "shutdown signal while waiting for CI");
            return CiResult {
                status: CiStatus::Unknown,
                message: "shutdown signal received".to_string(),
                counts: result.counts,
            };
        }

        tokio::time::sleep(CI_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
#[path = "ci_tests.rs"]
mod tests;
