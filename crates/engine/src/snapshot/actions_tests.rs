// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).single().unwrap()
}

fn roles() -> BTreeMap<String, SupportRoleState> {
    // Fresh daemon: every role would trigger. Quiet that down for action
    // tests by marking them recently completed.
    let mut map = BTreeMap::new();
    for role in loom_core::SUPPORT_ROLES {
        map.insert(
            role.to_string(),
            SupportRoleState {
                status: "idle".to_string(),
                idle_seconds: 0,
                interval: 300,
                needs_trigger: false,
            },
        );
    }
    map
}

fn base_counts() -> SnapshotCounts {
    SnapshotCounts {
        ready: 2,
        building: 0,
        available_shepherd_slots: 3,
        ..Default::default()
    }
}

fn compute(
    counts: &SnapshotCounts,
    sf: &SystematicFailureState,
    health: &PipelineHealth,
    orphaned_prs: &[OrphanedPr],
    spinning: &[SpinningPr],
) -> (Vec<Action>, DemandFlags) {
    compute_recommended_actions(
        counts,
        &roles(),
        0,
        0,
        sf,
        health,
        orphaned_prs,
        spinning,
        now(),
    )
}

#[test]
fn ready_issues_with_slots_spawn_shepherds() {
    let (actions, _) = compute(
        &base_counts(),
        &SystematicFailureState::default(),
        &PipelineHealth::default(),
        &[],
        &[],
    );
    assert!(actions.contains(&Action::SpawnShepherds));
    assert!(!actions.contains(&Action::Wait));
}

#[test]
fn no_slots_means_no_spawn() {
    let mut counts = base_counts();
    counts.available_shepherd_slots = 0;
    let (actions, _) = compute(
        &counts,
        &SystematicFailureState::default(),
        &PipelineHealth::default(),
        &[],
        &[],
    );
    assert!(!actions.contains(&Action::SpawnShepherds));
}

#[test]
fn systemic_failure_suppresses_spawning_until_cooldown() {
    let sf = SystematicFailureState {
        active: true,
        cooldown_elapsed: false,
        ..Default::default()
    };
    let (actions, _) = compute(
        &base_counts(),
        &sf,
        &PipelineHealth::default(),
        &[],
        &[],
    );
    assert!(!actions.contains(&Action::SpawnShepherds));
    assert!(!actions.contains(&Action::ProbeSystematicFailure));
}

#[test]
fn cooldown_elapsed_allows_single_probe() {
    let sf = SystematicFailureState {
        active: true,
        cooldown_elapsed: true,
        probe_count: 1,
        probes_exhausted: false,
        ..Default::default()
    };
    let (actions, _) = compute(
        &base_counts(),
        &sf,
        &PipelineHealth::default(),
        &[],
        &[],
    );
    assert!(actions.contains(&Action::ProbeSystematicFailure));
    assert!(actions.contains(&Action::SpawnShepherds));
}

#[test]
fn probes_exhausted_requires_manual_intervention() {
    let sf = SystematicFailureState {
        active: true,
        cooldown_elapsed: true,
        probes_exhausted: true,
        ..Default::default()
    };
    let (actions, _) = compute(
        &base_counts(),
        &sf,
        &PipelineHealth::default(),
        &[],
        &[],
    );
    assert!(actions.contains(&Action::SystematicFailureManualIntervention));
    assert!(!actions.contains(&Action::SpawnShepherds));
}

#[test]
fn targeted_doctor_dispatch_preempts_generic_demand() {
    let mut counts = base_counts();
    counts.changes_requested = 2;
    let orphaned = vec![OrphanedPr {
        pr_number: 120,
        needed_role: NeededRole::Doctor,
    }];
    let (actions, demand) = compute(
        &counts,
        &SystematicFailureState::default(),
        &PipelineHealth::default(),
        &orphaned,
        &[],
    );
    assert!(actions.contains(&Action::SpawnDoctorTargeted));
    assert!(!actions.contains(&Action::SpawnDoctorDemand));
    assert!(demand.doctor_demand);
    assert_eq!(demand.doctor_targeted_prs, vec![120]);
}

#[test]
fn demand_preempts_interval_trigger() {
    let mut counts = base_counts();
    counts.review_requested = 1;
    let mut support = roles();
    if let Some(judge) = support.get_mut("judge") {
        judge.needs_trigger = true;
    }
    let (actions, demand) = compute_recommended_actions(
        &counts,
        &support,
        0,
        0,
        &SystematicFailureState::default(),
        &PipelineHealth::default(),
        &[],
        &[],
        now(),
    );
    assert!(actions.contains(&Action::SpawnJudgeDemand));
    assert!(!actions.contains(&Action::TriggerJudge));
    assert!(demand.judge_demand);
}

#[test]
fn wait_is_emitted_only_when_nothing_fires() {
    let counts = SnapshotCounts::default();
    let (actions, _) = compute(
        &counts,
        &SystematicFailureState::default(),
        &PipelineHealth::default(),
        &[],
        &[],
    );
    assert!(actions.contains(&Action::Wait));
}

#[test]
fn lone_check_stuck_still_waits() {
    let mut counts = SnapshotCounts::default();
    counts.building = 1;
    let (actions, _) = compute(
        &counts,
        &SystematicFailureState::default(),
        &PipelineHealth::default(),
        &[],
        &[],
    );
    assert_eq!(actions, vec![Action::CheckStuck, Action::Wait]);
}

#[test]
fn stalled_with_retryable_recommends_retry() {
    let mut counts = SnapshotCounts::default();
    counts.blocked = 2;
    let health = PipelineHealth {
        status: PipelineStatus::Stalled,
        retryable_count: 1,
        ..Default::default()
    };
    let (actions, _) = compute(
        &counts,
        &SystematicFailureState::default(),
        &health,
        &[],
        &[],
    );
    assert!(actions.contains(&Action::RetryBlockedIssues));
}

#[test]
fn spinning_prs_escalate() {
    let spinning = vec![SpinningPr {
        pr_number: 200,
        review_cycles: 4,
        linked_issue: None,
    }];
    let (actions, _) = compute(
        &base_counts(),
        &SystematicFailureState::default(),
        &PipelineHealth::default(),
        &[],
        &spinning,
    );
    assert!(actions.contains(&Action::EscalateSpinningIssues));
}

#[test]
fn idle_pipeline_surfaces_human_input_blockers() {
    let mut counts = SnapshotCounts::default();
    counts.curated = 2;
    counts.blocked = 1;
    counts.total_proposals = 2;
    let (actions, demand) = compute(
        &counts,
        &SystematicFailureState::default(),
        &PipelineHealth::default(),
        &[],
        &[],
    );
    assert!(actions.contains(&Action::NeedsHumanInput));
    assert_eq!(demand.human_input_blockers.len(), 2);
    assert_eq!(demand.human_input_blockers[0].kind, "approval_needed");
    assert_eq!(demand.human_input_blockers[1].kind, "blocked");
}

#[test]
fn work_generation_triggers_when_queue_is_low() {
    let mut counts = SnapshotCounts::default();
    counts.ready = 1;
    counts.needs_work_generation = true;
    let mut support = roles();
    for role in ["architect", "hermit"] {
        if let Some(r) = support.get_mut(role) {
            r.needs_trigger = true;
        }
    }
    let (actions, _) = compute_recommended_actions(
        &counts,
        &support,
        0,
        0,
        &SystematicFailureState::default(),
        &PipelineHealth::default(),
        &[],
        &[],
        now(),
    );
    assert!(actions.contains(&Action::TriggerArchitect));
    assert!(actions.contains(&Action::TriggerHermit));
}
