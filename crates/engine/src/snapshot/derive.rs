// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Derived snapshot fields: ordering, staleness, orphans, validation.

use super::collect::PipelineData;
use chrono::{DateTime, Utc};
use loom_core::{
    elapsed_seconds, labels, DaemonState, Issue, IssueStrategy, LoomConfig, PullRequest,
    ShepherdProgress, TaskId,
};
use loom_storage::IssueFailureLog;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Sort issues in place: urgent always precedes non-urgent, then by strategy.
pub fn sort_issues_by_strategy(issues: &mut Vec<Issue>, strategy: IssueStrategy) {
    let mut urgent: Vec<Issue> = Vec::new();
    let mut normal: Vec<Issue> = Vec::new();
    for issue in issues.drain(..) {
        if labels::has_label(&issue.labels, labels::URGENT) {
            urgent.push(issue);
        } else {
            normal.push(issue);
        }
    }

    let sort = |list: &mut Vec<Issue>| match strategy {
        // Priority ordering degenerates to fifo within an urgency class.
        IssueStrategy::Fifo | IssueStrategy::Priority => {
            list.sort_by(|a, b| a.created_at.cmp(&b.created_at))
        }
        IssueStrategy::Lifo => list.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    };
    sort(&mut urgent);
    sort(&mut normal);

    issues.extend(urgent);
    issues.extend(normal);
}

/// Drop issues that are auto-blocked or inside their iteration backoff window.
pub fn filter_issues_by_failure_backoff(
    issues: Vec<Issue>,
    failure_log: &IssueFailureLog,
    current_iteration: u64,
) -> Vec<Issue> {
    if failure_log.entries.is_empty() {
        return issues;
    }

    issues
        .into_iter()
        .filter(|issue| {
            let Some(entry) = failure_log.entry(issue.number) else {
                return true;
            };
            if entry.should_auto_block() {
                warn!(
                    issue = issue.number,
                    failures = entry.total_failures,
                    "skipping issue: at failure threshold, should be auto-blocked"
                );
                return false;
            }
            if failure_log.in_backoff(issue.number, current_iteration) {
                info!(
                    issue = issue.number,
                    failures = entry.total_failures,
                    backoff_iters = entry.backoff_iterations(),
                    "skipping issue: in failure backoff"
                );
                return false;
            }
            true
        })
        .collect()
}

/// Progress document with computed heartbeat fields.
#[derive(Debug, Clone)]
pub struct EnhancedProgress {
    pub progress: ShepherdProgress,
    /// -1 when no heartbeat has been recorded.
    pub heartbeat_age_seconds: i64,
    pub heartbeat_stale: bool,
}

/// Compute heartbeat staleness per progress file.
///
/// An age strictly greater than the stale threshold is stale, unless the
/// shepherd is inside its startup grace: 300s before the first heartbeat
/// was ever observed, 180s once one has been (deaths detected faster).
pub fn enhance_progress(
    progress_files: Vec<ShepherdProgress>,
    cfg: &LoomConfig,
    now: DateTime<Utc>,
) -> Vec<EnhancedProgress> {
    progress_files
        .into_iter()
        .map(|progress| {
            let mut age = -1;
            let mut stale = false;

            if let Some(heartbeat) = progress.last_heartbeat.as_deref() {
                if let Some(elapsed) = elapsed_seconds(heartbeat, now) {
                    age = elapsed;
                    if elapsed > cfg.heartbeat_stale_threshold as i64 {
                        stale = true;
                    }
                }
            }

            if stale && !progress.started_at.is_empty() {
                if let Some(spawn_age) = elapsed_seconds(&progress.started_at, now) {
                    let effective_grace = if progress.last_heartbeat.is_some() {
                        cfg.heartbeat_active_grace_period
                    } else {
                        cfg.heartbeat_grace_period
                    };
                    if spawn_age < effective_grace as i64 {
                        stale = false;
                    }
                }
            }

            EnhancedProgress {
                progress,
                heartbeat_age_seconds: age,
                heartbeat_stale: stale,
            }
        })
        .collect()
}

/// An orphaned shepherd as seen by the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrphanedShepherd {
    /// `loom:building` issue with no daemon entry and no fresh progress.
    UntrackedBuilding { issue: u64 },
    /// Working progress file whose heartbeat went stale.
    StaleHeartbeat {
        task_id: String,
        issue: Option<u64>,
        age_seconds: i64,
    },
}

/// Detect orphaned shepherds from building issues and progress staleness.
pub fn detect_orphaned_shepherds(
    daemon_state: &DaemonState,
    building_issues: &[Issue],
    progress: &[EnhancedProgress],
) -> Vec<OrphanedShepherd> {
    let tracked: BTreeSet<u64> = daemon_state.tracked_issues().into_iter().collect();
    let mut orphaned = Vec::new();

    for issue in building_issues {
        if tracked.contains(&issue.number) {
            continue;
        }
        let has_active = progress.iter().any(|p| {
            p.progress.issue == Some(issue.number) && p.progress.is_working() && !p.heartbeat_stale
        });
        if !has_active {
            orphaned.push(OrphanedShepherd::UntrackedBuilding {
                issue: issue.number,
            });
        }
    }

    for p in progress {
        if p.progress.is_working() && p.heartbeat_stale {
            orphaned.push(OrphanedShepherd::StaleHeartbeat {
                task_id: p.progress.task_id.clone(),
                issue: p.progress.issue,
                age_seconds: p.heartbeat_age_seconds,
            });
        }
    }

    orphaned
}

/// Which phase an orphaned PR needs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeededRole {
    Judge,
    Doctor,
}

/// A PR needing attention that no working shepherd tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanedPr {
    pub pr_number: u64,
    pub needed_role: NeededRole,
}

/// Detect PRs awaiting judge or doctor with no shepherd tracking them.
///
/// Sorted FIFO by PR number so targeted dispatch services the oldest first.
pub fn detect_orphaned_prs(
    daemon_state: &DaemonState,
    review_requested: &[PullRequest],
    changes_requested: &[PullRequest],
) -> Vec<OrphanedPr> {
    let tracked: BTreeSet<u64> = daemon_state.tracked_prs().into_iter().collect();
    let mut orphaned: Vec<OrphanedPr> = review_requested
        .iter()
        .filter(|pr| !tracked.contains(&pr.number))
        .map(|pr| OrphanedPr {
            pr_number: pr.number,
            needed_role: NeededRole::Judge,
        })
        .chain(
            changes_requested
                .iter()
                .filter(|pr| !tracked.contains(&pr.number))
                .map(|pr| OrphanedPr {
                    pr_number: pr.number,
                    needed_role: NeededRole::Doctor,
                }),
        )
        .collect();
    orphaned.sort_by_key(|o| o.pr_number);
    orphaned
}

/// A PR that has cycled through too many review rounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpinningPr {
    pub pr_number: u64,
    pub review_cycles: u32,
    pub linked_issue: Option<u64>,
}

/// A task id failing the canonical format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTaskId {
    /// `shepherds` or `support_roles`.
    pub location: &'static str,
    pub key: String,
    pub task_id: String,
}

/// Check all task ids in daemon state against the 7-hex format.
pub fn validate_task_ids(daemon_state: &DaemonState) -> Vec<InvalidTaskId> {
    let mut invalid = Vec::new();

    for (key, entry) in &daemon_state.shepherds {
        if let Some(tid) = entry.task_id.as_deref() {
            if !TaskId::is_valid(tid) {
                invalid.push(InvalidTaskId {
                    location: "shepherds",
                    key: key.clone(),
                    task_id: tid.to_string(),
                });
            }
        }
    }

    for (key, entry) in &daemon_state.support_roles {
        if let Some(tid) = entry.task_id.as_deref() {
            if !TaskId::is_valid(tid) {
                invalid.push(InvalidTaskId {
                    location: "support_roles",
                    key: key.clone(),
                    task_id: tid.to_string(),
                });
            }
        }
    }

    invalid
}

/// An entity carrying labels from one exclusion group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelContradiction {
    /// `issue` or `pr`.
    pub entity_type: &'static str,
    pub number: u64,
    pub conflicting_labels: Vec<String>,
}

/// Find entities appearing in multiple mutually-exclusive label buckets.
pub fn detect_contradictory_labels(data: &PipelineData) -> Vec<LabelContradiction> {
    let mut conflicts = Vec::new();

    let mut pr_labels: BTreeMap<u64, BTreeSet<&'static str>> = BTreeMap::new();
    for (bucket, label) in [
        (&data.review_requested, labels::REVIEW_REQUESTED),
        (&data.changes_requested, labels::CHANGES_REQUESTED),
        (&data.ready_to_merge, labels::PR_APPROVED),
    ] {
        for pr in bucket {
            pr_labels.entry(pr.number).or_default().insert(label);
        }
    }
    for (number, found) in pr_labels {
        if found.len() > 1 {
            conflicts.push(LabelContradiction {
                entity_type: "pr",
                number,
                conflicting_labels: found.into_iter().map(String::from).collect(),
            });
        }
    }

    let mut issue_labels: BTreeMap<u64, BTreeSet<&'static str>> = BTreeMap::new();
    for (bucket, label) in [
        (&data.ready_issues, labels::ISSUE),
        (&data.building_issues, labels::BUILDING),
        (&data.blocked_issues, labels::BLOCKED),
    ] {
        for issue in bucket {
            issue_labels.entry(issue.number).or_default().insert(label);
        }
    }
    for (number, found) in issue_labels {
        if found.len() > 1 {
            conflicts.push(LabelContradiction {
                entity_type: "issue",
                number,
                conflicting_labels: found.into_iter().map(String::from).collect(),
            });
        }
    }

    conflicts
}

/// Computed idle/trigger state for one support role.
#[derive(Debug, Clone, Default)]
pub struct SupportRoleState {
    pub status: String,
    pub idle_seconds: i64,
    pub interval: u64,
    pub needs_trigger: bool,
}

/// Compute idle times and `needs_trigger` for all eight support roles.
pub fn compute_support_role_state(
    daemon_state: &DaemonState,
    cfg: &LoomConfig,
    now: DateTime<Utc>,
) -> BTreeMap<String, SupportRoleState> {
    let mut result = BTreeMap::new();

    for role in loom_core::SUPPORT_ROLES {
        let entry = daemon_state.support_roles.get(role);
        let status = entry
            .map(|e| e.status.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "idle".to_string());
        let interval = cfg.role_interval(role);

        let mut idle_seconds = 0;
        let mut needs_trigger = false;

        match entry.and_then(|e| e.last_completed.as_deref()) {
            Some(last_completed) if last_completed != "null" => {
                if let Some(elapsed) = elapsed_seconds(last_completed, now) {
                    idle_seconds = elapsed;
                    if status != "running" && elapsed > interval as i64 {
                        needs_trigger = true;
                    }
                }
            }
            _ => {
                // Never run; trigger unless currently running
                if status != "running" {
                    needs_trigger = true;
                }
            }
        }

        result.insert(
            role.to_string(),
            SupportRoleState {
                status,
                idle_seconds,
                interval,
                needs_trigger,
            },
        );
    }

    result
}

#[cfg(test)]
#[path = "derive_tests.rs"]
mod tests;
