// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline health classification and snapshot-level health warnings.

use super::derive::{LabelContradiction, SpinningPr};
use super::SnapshotCounts;
use chrono::{DateTime, Utc};
use loom_core::{
    effective_cooldown, elapsed_seconds, retry_policy, DaemonState, Issue, LoomConfig,
};

/// Pipeline status, cheapest classification first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineStatus {
    #[default]
    Healthy,
    Degraded,
    Stalled,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Stalled => "stalled",
        }
    }
}

/// A blocked issue whose retry cooldown has elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryableIssue {
    pub number: u64,
    pub retry_count: u32,
}

/// An issue whose retry budget is exhausted and needs a human.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationNeeded {
    pub number: u64,
    pub error_class: String,
    pub retry_count: u32,
    pub reason: String,
}

/// Pipeline health with retry metadata.
#[derive(Debug, Clone, Default)]
pub struct PipelineHealth {
    pub status: PipelineStatus,
    pub stall_reason: Option<&'static str>,
    pub blocked_count: u32,
    pub retryable_count: u32,
    pub permanent_blocked_count: u32,
    pub retryable_issues: Vec<RetryableIssue>,
    pub escalation_needed: Vec<EscalationNeeded>,
}

/// Classify pipeline health and split blocked issues into retryable and
/// permanent per their error-class policy.
pub fn compute_pipeline_health(
    counts: &SnapshotCounts,
    blocked_issues: &[Issue],
    daemon_state: &DaemonState,
    cfg: &LoomConfig,
    now: DateTime<Utc>,
) -> PipelineHealth {
    let mut retryable_issues = Vec::new();
    let mut escalation_needed = Vec::new();
    let mut permanent_count = 0u32;

    for issue in blocked_issues {
        let retry_info = daemon_state
            .blocked_issue_retries
            .get(&issue.number.to_string());
        let error_class = retry_info
            .map(|r| r.error_class.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let policy = retry_policy(&error_class, cfg);
        let retry_count = retry_info.map(|r| r.retry_count).unwrap_or(0);

        // Budget exhausted?
        let exhausted = retry_info
            .map(|r| r.retry_exhausted || retry_count >= policy.max_retries)
            .unwrap_or(policy.max_retries == 0);
        if exhausted {
            permanent_count += 1;
            let already_escalated = retry_info.map(|r| r.escalated_to_human).unwrap_or(false);
            if policy.escalate && !already_escalated {
                let reason = if policy.max_retries > 0 {
                    format!("Exceeded {} retries for {}", policy.max_retries, error_class)
                } else {
                    format!("Error class {error_class} requires immediate human review")
                };
                escalation_needed.push(EscalationNeeded {
                    number: issue.number,
                    error_class,
                    retry_count,
                    reason,
                });
            }
            continue;
        }

        // Cooldown elapsed?
        let cooldown = effective_cooldown(&error_class, retry_count, cfg);
        let cooldown_elapsed = match retry_info.and_then(|r| r.last_retry_at.as_deref()) {
            Some(last_retry) if cooldown > 0 => elapsed_seconds(last_retry, now)
                .map(|elapsed| elapsed >= cooldown as i64)
                .unwrap_or(true),
            _ => true,
        };

        if cooldown_elapsed {
            retryable_issues.push(RetryableIssue {
                number: issue.number,
                retry_count,
            });
        } else {
            permanent_count += 1;
        }
    }

    let (status, stall_reason) = classify_status(counts);

    PipelineHealth {
        status,
        stall_reason,
        blocked_count: counts.blocked,
        retryable_count: retryable_issues.len() as u32,
        permanent_blocked_count: permanent_count,
        retryable_issues,
        escalation_needed,
    }
}

fn classify_status(counts: &SnapshotCounts) -> (PipelineStatus, Option<&'static str>) {
    if counts.ready == 0 && counts.blocked > 0 && counts.building == 0 {
        (PipelineStatus::Stalled, Some("all_issues_blocked"))
    } else if counts.ready == 0
        && counts.blocked == 0
        && counts.building == 0
        && counts.total_in_flight == 0
    {
        (PipelineStatus::Stalled, Some("no_ready_issues"))
    } else if counts.blocked > 0 && counts.blocked > counts.ready {
        (PipelineStatus::Degraded, None)
    } else {
        (PipelineStatus::Healthy, None)
    }
}

/// Computed systemic-failure state with cooldown and probe information.
#[derive(Debug, Clone, Default)]
pub struct SystematicFailureState {
    pub active: bool,
    pub pattern: String,
    pub probe_count: u32,
    pub cooldown_elapsed: bool,
    pub cooldown_remaining_seconds: i64,
    pub probes_exhausted: bool,
}

/// Compute systemic-failure cooldown/probe state.
///
/// Cooldown reference is `cooldown_until` when set, otherwise
/// `detected_at + cooldown * 2^probe_count`. A parse failure counts as
/// elapsed so a mangled timestamp never blocks recovery forever.
pub fn compute_systematic_failure_state(
    daemon_state: &DaemonState,
    cfg: &LoomConfig,
    now: DateTime<Utc>,
) -> SystematicFailureState {
    let sf = &daemon_state.systematic_failure;
    if !sf.active {
        return SystematicFailureState::default();
    }

    let probes_exhausted = sf.probe_count >= cfg.systematic_failure_max_probes;
    let effective_cooldown =
        cfg.systematic_failure_cooldown as i64 * (1i64 << sf.probe_count.min(30));

    let mut cooldown_elapsed = true;
    let mut cooldown_remaining = 0;

    if let Some(until) = sf.cooldown_until.as_deref() {
        match elapsed_seconds(until, now) {
            // cooldown_until is the target time: non-negative elapsed means past it
            Some(elapsed) => {
                cooldown_elapsed = elapsed >= 0;
                cooldown_remaining = (-elapsed).max(0);
            }
            None => cooldown_elapsed = true,
        }
    } else if let Some(detected) = sf.detected_at.as_deref() {
        match elapsed_seconds(detected, now) {
            Some(elapsed) => {
                cooldown_elapsed = elapsed >= effective_cooldown;
                cooldown_remaining = (effective_cooldown - elapsed).max(0);
            }
            None => cooldown_elapsed = true,
        }
    }

    SystematicFailureState {
        active: sf.active,
        pattern: sf.pattern.clone(),
        probe_count: sf.probe_count,
        cooldown_elapsed,
        cooldown_remaining_seconds: cooldown_remaining,
        probes_exhausted,
    }
}

/// Snapshot-level traffic light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthIndicator {
    #[default]
    Healthy,
    Degraded,
    Stalled,
}

/// Warning level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningLevel {
    Info,
    Warning,
}

/// One snapshot health warning.
#[derive(Debug, Clone)]
pub struct HealthWarning {
    pub code: &'static str,
    pub level: WarningLevel,
    pub message: String,
}

/// Compute health status and warnings for the snapshot.
///
/// Any warning-level entry classifies the snapshot as stalled; info-only as
/// degraded; none as healthy.
pub fn compute_health(
    counts: &SnapshotCounts,
    contradictions: &[LabelContradiction],
    spinning_prs: &[SpinningPr],
    orphaned_count: u32,
    session_percent: f64,
    query_warnings: &[String],
) -> (HealthIndicator, Vec<HealthWarning>) {
    let mut warnings = Vec::new();

    for conflict in contradictions {
        warnings.push(HealthWarning {
            code: "contradictory_labels",
            level: WarningLevel::Warning,
            message: format!(
                "{} #{} has contradictory labels: {}",
                conflict.entity_type,
                conflict.number,
                conflict.conflicting_labels.join(", ")
            ),
        });
    }

    if counts.ready == 0 && counts.building == 0 && counts.blocked > 0 {
        warnings.push(HealthWarning {
            code: "pipeline_stalled",
            level: WarningLevel::Warning,
            message: format!(
                "0 ready, {} blocked, 0 building — pipeline has no actionable work",
                counts.blocked
            ),
        });
    }

    if counts.ready == 0 && counts.building == 0 && counts.total_proposals > 0 {
        warnings.push(HealthWarning {
            code: "proposal_backlog",
            level: WarningLevel::Info,
            message: format!(
                "{} proposals awaiting approval, pipeline empty",
                counts.total_proposals
            ),
        });
    }

    let human_input_items = counts.curated + counts.architect + counts.hermit;
    if counts.ready == 0 && counts.building == 0 && human_input_items > 0 {
        let mut parts = Vec::new();
        if counts.curated > 0 {
            parts.push(format!("{} curated issue(s) need approval", counts.curated));
        }
        if counts.architect > 0 {
            parts.push(format!(
                "{} architect proposal(s) need review",
                counts.architect
            ));
        }
        if counts.hermit > 0 {
            parts.push(format!("{} hermit proposal(s) need review", counts.hermit));
        }
        warnings.push(HealthWarning {
            code: "needs_human_input",
            level: WarningLevel::Warning,
            message: format!("Pipeline blocked on human input: {}", parts.join(", ")),
        });
    }

    if counts.ready == 0
        && counts.building == 0
        && counts.blocked == 0
        && counts.total_proposals == 0
    {
        warnings.push(HealthWarning {
            code: "no_work_available",
            level: WarningLevel::Info,
            message: "No ready, building, blocked, or proposed issues — pipeline is empty"
                .to_string(),
        });
    }

    if counts.stale_heartbeats > 0 {
        warnings.push(HealthWarning {
            code: "stale_heartbeats",
            level: WarningLevel::Warning,
            message: format!(
                "{} shepherd(s) with stale heartbeats — may be stuck",
                counts.stale_heartbeats
            ),
        });
    }

    if orphaned_count > 0 {
        warnings.push(HealthWarning {
            code: "orphaned_issues",
            level: WarningLevel::Warning,
            message: format!("{orphaned_count} orphaned shepherd(s) detected — recovery needed"),
        });
    }

    if session_percent >= 97.0 {
        warnings.push(HealthWarning {
            code: "session_budget_low",
            level: WarningLevel::Warning,
            message: format!("Session usage at {session_percent}% — nearing budget limit"),
        });
    }

    if !spinning_prs.is_empty() {
        let pr_nums = spinning_prs
            .iter()
            .map(|s| format!("#{}", s.pr_number))
            .collect::<Vec<_>>()
            .join(", ");
        warnings.push(HealthWarning {
            code: "spinning_prs",
            level: WarningLevel::Warning,
            message: format!(
                "{} PR(s) stuck in review cycles: {pr_nums}",
                spinning_prs.len()
            ),
        });
    }

    for query in query_warnings {
        warnings.push(HealthWarning {
            code: "query_failed",
            level: WarningLevel::Info,
            message: format!("pipeline collection incomplete: {query}"),
        });
    }

    let has_warning = warnings.iter().any(|w| w.level == WarningLevel::Warning);
    let status = if has_warning {
        HealthIndicator::Stalled
    } else if !warnings.is_empty() {
        HealthIndicator::Degraded
    } else {
        HealthIndicator::Healthy
    };

    (status, warnings)
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
