// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One iteration's immutable view of pipeline state.
//!
//! Collection runs the tracker label queries in one bounded parallel batch;
//! derivation is pure so the same inputs always reproduce the same snapshot.
//! Building performs reads only — no side effects.

mod actions;
mod collect;
mod derive;
mod health;

pub use actions::{compute_recommended_actions, Action, DemandFlags, HumanInputBlocker};
pub use collect::{collect_pipeline_data, detect_spinning_prs, PipelineData};
pub use derive::{
    compute_support_role_state, detect_contradictory_labels, detect_orphaned_prs,
    detect_orphaned_shepherds, enhance_progress, filter_issues_by_failure_backoff,
    sort_issues_by_strategy, validate_task_ids, EnhancedProgress, InvalidTaskId,
    LabelContradiction, OrphanedPr, OrphanedShepherd, SpinningPr, SupportRoleState,
};
pub use health::{
    compute_health, compute_pipeline_health, compute_systematic_failure_state, HealthIndicator,
    HealthWarning, PipelineHealth, PipelineStatus, SystematicFailureState, WarningLevel,
};

use chrono::{DateTime, Utc};
use loom_core::{format_utc, DaemonState, LoomConfig};
use loom_storage::IssueFailureLog;
use std::collections::BTreeMap;

/// Derived counts exposed to the scheduler.
#[derive(Debug, Clone, Default)]
pub struct SnapshotCounts {
    pub ready: u32,
    pub building: u32,
    pub blocked: u32,
    pub uncurated: u32,
    pub curated: u32,
    pub architect: u32,
    pub hermit: u32,
    pub total_proposals: u32,
    pub total_in_flight: u32,
    pub review_requested: u32,
    pub changes_requested: u32,
    pub ready_to_merge: u32,
    pub active_shepherds: u32,
    pub available_shepherd_slots: u32,
    pub stale_heartbeats: u32,
    pub needs_work_generation: bool,
}

/// The immutable per-iteration snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub timestamp: String,
    /// Pipeline data with ready issues already sorted and backoff-filtered.
    pub data: PipelineData,
    pub counts: SnapshotCounts,
    pub progress: Vec<EnhancedProgress>,
    pub orphaned_shepherds: Vec<OrphanedShepherd>,
    pub orphaned_prs: Vec<OrphanedPr>,
    pub spinning_prs: Vec<SpinningPr>,
    pub invalid_task_ids: Vec<InvalidTaskId>,
    pub contradictions: Vec<LabelContradiction>,
    pub support_roles: BTreeMap<String, SupportRoleState>,
    pub pipeline_health: PipelineHealth,
    pub systematic_failure: SystematicFailureState,
    pub recommended_actions: Vec<Action>,
    pub demand: DemandFlags,
    pub promotable_proposals: Vec<u64>,
    pub health_status: HealthIndicator,
    pub health_warnings: Vec<HealthWarning>,
}

/// Pure snapshot derivation from already-collected inputs.
///
/// `spinning_prs` come from collection (they need extra tracker queries);
/// `session_percent` is the LLM session budget reading, 0 when unavailable.
#[allow(clippy::too_many_arguments)]
pub fn build_snapshot(
    mut data: PipelineData,
    spinning_prs: Vec<SpinningPr>,
    daemon_state: &DaemonState,
    failure_log: &IssueFailureLog,
    progress_files: Vec<loom_core::ShepherdProgress>,
    cfg: &LoomConfig,
    now: DateTime<Utc>,
    current_iteration: u64,
    session_percent: f64,
) -> Snapshot {
    // Sort ready issues and drop those in failure backoff.
    sort_issues_by_strategy(&mut data.ready_issues, cfg.issue_strategy);
    data.ready_issues =
        filter_issues_by_failure_backoff(data.ready_issues, failure_log, current_iteration);

    // Heartbeat staleness with two-tier startup grace.
    let progress = enhance_progress(progress_files, cfg, now);
    let stale_heartbeats = progress
        .iter()
        .filter(|p| p.heartbeat_stale && p.progress.is_working())
        .count() as u32;

    // Orphans and validation.
    let orphaned_shepherds = detect_orphaned_shepherds(daemon_state, &data.building_issues, &progress);
    let orphaned_prs =
        detect_orphaned_prs(daemon_state, &data.review_requested, &data.changes_requested);
    let invalid_task_ids = validate_task_ids(daemon_state);
    let contradictions = detect_contradictory_labels(&data);

    // Counts.
    let ready = data.ready_issues.len() as u32;
    let building = data.building_issues.len() as u32;
    let blocked = data.blocked_issues.len() as u32;
    let curated = data.curated_issues.len() as u32;
    let architect = data.architect_proposals.len() as u32;
    let hermit = data.hermit_proposals.len() as u32;
    let review_requested = data.review_requested.len() as u32;
    let changes_requested = data.changes_requested.len() as u32;
    let ready_to_merge = data.ready_to_merge.len() as u32;
    let total_proposals = architect + hermit + curated;
    let total_in_flight = building + review_requested + changes_requested + ready_to_merge;
    let active_shepherds = daemon_state.active_shepherd_count();
    let available_shepherd_slots = cfg.max_shepherds.saturating_sub(active_shepherds);
    let needs_work_generation = ready < cfg.issue_threshold && total_proposals < cfg.max_proposals;

    let counts = SnapshotCounts {
        ready,
        building,
        blocked,
        uncurated: data.uncurated_issues.len() as u32,
        curated,
        architect,
        hermit,
        total_proposals,
        total_in_flight,
        review_requested,
        changes_requested,
        ready_to_merge,
        active_shepherds,
        available_shepherd_slots,
        stale_heartbeats,
        needs_work_generation,
    };

    // Support roles and pipeline health.
    let support_roles = compute_support_role_state(daemon_state, cfg, now);
    let pipeline_health = compute_pipeline_health(&counts, &data.blocked_issues, daemon_state, cfg, now);
    let systematic_failure = compute_systematic_failure_state(daemon_state, cfg, now);

    // Recommended actions.
    let (recommended_actions, demand) = compute_recommended_actions(
        &counts,
        &support_roles,
        orphaned_shepherds.len() as u32,
        invalid_task_ids.len() as u32,
        &systematic_failure,
        &pipeline_health,
        &orphaned_prs,
        &spinning_prs,
        now,
    );

    let promotable_proposals = data
        .architect_proposals
        .iter()
        .chain(data.hermit_proposals.iter())
        .chain(data.curated_issues.iter())
        .map(|i| i.number)
        .collect();

    let (health_status, health_warnings) = compute_health(
        &counts,
        &contradictions,
        &spinning_prs,
        orphaned_shepherds.len() as u32,
        session_percent,
        &data.warnings,
    );

    Snapshot {
        timestamp: format_utc(now),
        data,
        counts,
        progress,
        orphaned_shepherds,
        orphaned_prs,
        spinning_prs,
        invalid_task_ids,
        contradictions,
        support_roles,
        pipeline_health,
        systematic_failure,
        recommended_actions,
        demand,
        promotable_proposals,
        health_status,
        health_warnings,
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
