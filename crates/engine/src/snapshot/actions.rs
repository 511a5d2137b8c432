// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recommended-actions engine.
//!
//! Produces a totally ordered action list per iteration. Suppression rules:
//! no shepherd spawning while systemic failure is active (unless probing),
//! demand-triggered role dispatch preempts interval triggers, and `wait`
//! fires only when nothing else does.

use super::derive::{NeededRole, OrphanedPr, SpinningPr, SupportRoleState};
use super::health::{PipelineHealth, PipelineStatus, SystematicFailureState};
use super::SnapshotCounts;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Scheduler actions in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    PromoteProposals,
    SystematicFailureManualIntervention,
    ProbeSystematicFailure,
    SpawnShepherds,
    TriggerArchitect,
    TriggerHermit,
    CheckStuck,
    SpawnChampionDemand,
    SpawnDoctorTargeted,
    SpawnDoctorDemand,
    SpawnJudgeTargeted,
    SpawnJudgeDemand,
    TriggerGuide,
    TriggerChampion,
    TriggerDoctor,
    TriggerAuditor,
    TriggerJudge,
    TriggerCurator,
    RecoverOrphans,
    ValidateState,
    RetryBlockedIssues,
    EscalateSpinningIssues,
    Wait,
    NeedsHumanInput,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PromoteProposals => "promote_proposals",
            Self::SystematicFailureManualIntervention => "systematic_failure_manual_intervention",
            Self::ProbeSystematicFailure => "probe_systematic_failure",
            Self::SpawnShepherds => "spawn_shepherds",
            Self::TriggerArchitect => "trigger_architect",
            Self::TriggerHermit => "trigger_hermit",
            Self::CheckStuck => "check_stuck",
            Self::SpawnChampionDemand => "spawn_champion_demand",
            Self::SpawnDoctorTargeted => "spawn_doctor_targeted",
            Self::SpawnDoctorDemand => "spawn_doctor_demand",
            Self::SpawnJudgeTargeted => "spawn_judge_targeted",
            Self::SpawnJudgeDemand => "spawn_judge_demand",
            Self::TriggerGuide => "trigger_guide",
            Self::TriggerChampion => "trigger_champion",
            Self::TriggerDoctor => "trigger_doctor",
            Self::TriggerAuditor => "trigger_auditor",
            Self::TriggerJudge => "trigger_judge",
            Self::TriggerCurator => "trigger_curator",
            Self::RecoverOrphans => "recover_orphans",
            Self::ValidateState => "validate_state",
            Self::RetryBlockedIssues => "retry_blocked_issues",
            Self::EscalateSpinningIssues => "escalate_spinning_issues",
            Self::Wait => "wait",
            Self::NeedsHumanInput => "needs_human_input",
        }
    }
}

/// Something a human could do to unblock an idle pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanInputBlocker {
    /// `approval_needed`, `proposal_review`, or `blocked`.
    pub kind: &'static str,
    pub count: u32,
    pub description: String,
}

/// Demand flags accompanying the action list.
#[derive(Debug, Clone, Default)]
pub struct DemandFlags {
    pub champion_demand: bool,
    pub doctor_demand: bool,
    pub judge_demand: bool,
    pub doctor_targeted_prs: Vec<u64>,
    pub judge_targeted_prs: Vec<u64>,
    pub human_input_blockers: Vec<HumanInputBlocker>,
}

fn role_status<'a>(roles: &'a BTreeMap<String, SupportRoleState>, role: &str) -> &'a str {
    roles.get(role).map(|r| r.status.as_str()).unwrap_or("idle")
}

fn role_needs_trigger(roles: &BTreeMap<String, SupportRoleState>, role: &str) -> bool {
    roles.get(role).map(|r| r.needs_trigger).unwrap_or(false)
}

/// Compute the action list and demand flags for one iteration.
#[allow(clippy::too_many_arguments)]
pub fn compute_recommended_actions(
    counts: &SnapshotCounts,
    support_roles: &BTreeMap<String, SupportRoleState>,
    orphaned_count: u32,
    invalid_task_id_count: u32,
    systematic_failure: &SystematicFailureState,
    pipeline_health: &PipelineHealth,
    orphaned_prs: &[OrphanedPr],
    spinning_prs: &[SpinningPr],
    _now: DateTime<Utc>,
) -> (Vec<Action>, DemandFlags) {
    let mut actions = Vec::new();
    let mut demand = DemandFlags::default();

    // Promote proposals (acted on only in force mode)
    if counts.total_proposals > 0 {
        actions.push(Action::PromoteProposals);
    }

    // Systemic failure handling
    let mut suppress_spawning = systematic_failure.active;
    if systematic_failure.active && systematic_failure.cooldown_elapsed {
        if systematic_failure.probes_exhausted {
            actions.push(Action::SystematicFailureManualIntervention);
        } else {
            actions.push(Action::ProbeSystematicFailure);
            // A single probe shepherd is allowed through
            suppress_spawning = false;
        }
    }

    if counts.ready > 0 && counts.available_shepherd_slots > 0 && !suppress_spawning {
        actions.push(Action::SpawnShepherds);
    }

    // Work generation: cooldown elapsed, proposal slots open, not running
    if counts.needs_work_generation
        && role_needs_trigger(support_roles, "architect")
        && counts.architect < 2
        && role_status(support_roles, "architect") != "running"
    {
        actions.push(Action::TriggerArchitect);
    }
    if counts.needs_work_generation
        && role_needs_trigger(support_roles, "hermit")
        && counts.hermit < 2
        && role_status(support_roles, "hermit") != "running"
    {
        actions.push(Action::TriggerHermit);
    }

    if counts.building > 0 {
        actions.push(Action::CheckStuck);
    }

    // Demand-based spawning; targeted dispatch (FIFO orphaned PRs) preempts
    // generic demand.
    demand.doctor_targeted_prs = orphaned_prs
        .iter()
        .filter(|o| o.needed_role == NeededRole::Doctor)
        .map(|o| o.pr_number)
        .collect();
    demand.judge_targeted_prs = orphaned_prs
        .iter()
        .filter(|o| o.needed_role == NeededRole::Judge)
        .map(|o| o.pr_number)
        .collect();

    if counts.ready_to_merge > 0 && role_status(support_roles, "champion") != "running" {
        actions.push(Action::SpawnChampionDemand);
        demand.champion_demand = true;
    }

    if counts.changes_requested > 0 && role_status(support_roles, "doctor") != "running" {
        if demand.doctor_targeted_prs.is_empty() {
            actions.push(Action::SpawnDoctorDemand);
        } else {
            actions.push(Action::SpawnDoctorTargeted);
        }
        demand.doctor_demand = true;
    }

    if counts.review_requested > 0 && role_status(support_roles, "judge") != "running" {
        if demand.judge_targeted_prs.is_empty() {
            actions.push(Action::SpawnJudgeDemand);
        } else {
            actions.push(Action::SpawnJudgeTargeted);
        }
        demand.judge_demand = true;
    }

    // Interval-based triggers; demand preempts.
    if role_needs_trigger(support_roles, "guide") {
        actions.push(Action::TriggerGuide);
    }
    if role_needs_trigger(support_roles, "champion") && !demand.champion_demand {
        actions.push(Action::TriggerChampion);
    }
    if role_needs_trigger(support_roles, "doctor") && !demand.doctor_demand {
        actions.push(Action::TriggerDoctor);
    }
    if role_needs_trigger(support_roles, "auditor") {
        actions.push(Action::TriggerAuditor);
    }
    if role_needs_trigger(support_roles, "judge") && !demand.judge_demand {
        actions.push(Action::TriggerJudge);
    }
    if role_needs_trigger(support_roles, "curator") && counts.uncurated > 0 {
        actions.push(Action::TriggerCurator);
    }

    if orphaned_count > 0 {
        actions.push(Action::RecoverOrphans);
    }

    if invalid_task_id_count > 0 {
        actions.push(Action::ValidateState);
    }

    if pipeline_health.status == PipelineStatus::Stalled && pipeline_health.retryable_count > 0 {
        actions.push(Action::RetryBlockedIssues);
    }

    if !spinning_prs.is_empty() {
        actions.push(Action::EscalateSpinningIssues);
    }

    // Wait fallback: nothing actionable, or only a passive stuck check
    if actions.is_empty() || actions == [Action::CheckStuck] {
        actions.push(Action::Wait);
    }

    // Human-input blockers when the pipeline is idle. Keyed off counts (not
    // the wait action) because promote_proposals applies only in force mode
    // and would otherwise mask an effectively idle pipeline.
    if counts.ready == 0 && counts.building == 0 {
        if counts.curated > 0 {
            demand.human_input_blockers.push(HumanInputBlocker {
                kind: "approval_needed",
                count: counts.curated,
                description: format!(
                    "{} curated issue(s) awaiting human approval to become loom:issue",
                    counts.curated
                ),
            });
        }
        if counts.architect > 0 {
            demand.human_input_blockers.push(HumanInputBlocker {
                kind: "proposal_review",
                count: counts.architect,
                description: format!(
                    "{} architect proposal(s) awaiting human review",
                    counts.architect
                ),
            });
        }
        if counts.hermit > 0 {
            demand.human_input_blockers.push(HumanInputBlocker {
                kind: "proposal_review",
                count: counts.hermit,
                description: format!(
                    "{} hermit proposal(s) awaiting human review",
                    counts.hermit
                ),
            });
        }
        if counts.blocked > 0 {
            demand.human_input_blockers.push(HumanInputBlocker {
                kind: "blocked",
                count: counts.blocked,
                description: format!(
                    "{} issue(s) blocked — may need human intervention",
                    counts.blocked
                ),
            });
        }
        if !demand.human_input_blockers.is_empty() {
            actions.push(Action::NeedsHumanInput);
        }
    }

    (actions, demand)
}

#[cfg(test)]
#[path = "actions_tests.rs"]
mod tests;
