// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action dispatch: turns the snapshot's recommended actions into work.
//!
//! Shepherd engines run as background tasks; the dispatcher assigns slots
//! and issues, the engines write their own completion state back. The
//! scheduler never blocks on a single worker.

use loom_adapters::{SessionHost, Tracker, Vcs};
use loom_core::{
    labels, Clock, DaemonState, Milestone, RandomTaskIdGen, ShepherdEntry, ShepherdStatus,
    StuckThresholds, TaskId, TaskIdGen,
};
use loom_engine::{
    run_orphan_recovery, Action, EngineContext, Shepherd, ShepherdOutcome, Snapshot,
};
use loom_storage::find_progress_for_task;
use tracing::{info, warn};

/// Summary of what one dispatch pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub shepherds_spawned: u32,
    pub issues_retried: u32,
    pub roles_triggered: Vec<String>,
    pub orphans_recovered: u32,
    pub escalated_issues: Vec<u64>,
    pub proposals_promoted: u32,
    pub probe_dispatched: bool,
}

/// Dispatch every recommended action, in order.
pub async fn dispatch_actions<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    snapshot: &Snapshot,
    force_mode: bool,
) -> DispatchSummary
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let mut summary = DispatchSummary::default();

    for action in &snapshot.recommended_actions {
        match action {
            Action::PromoteProposals => {
                if force_mode {
                    summary.proposals_promoted = promote_proposals(ctx, snapshot).await;
                }
            }
            Action::ProbeSystematicFailure => {
                dispatch_probe(ctx).await;
                summary.probe_dispatched = true;
            }
            Action::SystematicFailureManualIntervention => {
                warn!(
                    pattern = %snapshot.systematic_failure.pattern,
                    probes = snapshot.systematic_failure.probe_count,
                    "systemic failure probes exhausted, manual intervention required"
                );
            }
            Action::SpawnShepherds => {
                // A probe allows exactly one shepherd through.
                let budget = if summary.probe_dispatched {
                    1
                } else {
                    snapshot.counts.available_shepherd_slots
                };
                summary.shepherds_spawned = spawn_shepherds(ctx, snapshot, budget).await;
            }
            Action::CheckStuck => {
                check_stuck(ctx).await;
            }
            Action::RecoverOrphans => {
                let result = run_orphan_recovery(ctx, true).await;
                summary.orphans_recovered = result.recovered.len() as u32;
            }
            Action::ValidateState => {
                // Invalid task ids are repaired by the orphan-recovery pass;
                // surface them here so the operator sees the problem even
                // when recovery was not recommended this tick.
                for invalid in &snapshot.invalid_task_ids {
                    warn!(
                        location = invalid.location,
                        key = %invalid.key,
                        task_id = %invalid.task_id,
                        "invalid task id in daemon state"
                    );
                }
            }
            Action::RetryBlockedIssues => {
                summary.issues_retried = retry_blocked_issues(ctx, snapshot).await;
            }
            Action::EscalateSpinningIssues => {
                // Alert-only until the escalation endpoint is defined.
                for spinning in &snapshot.spinning_prs {
                    warn!(
                        pr = spinning.pr_number,
                        cycles = spinning.review_cycles,
                        linked_issue = ?spinning.linked_issue,
                        "PR spinning through review cycles"
                    );
                }
            }
            Action::NeedsHumanInput => {
                escalate_to_human(ctx, snapshot, &mut summary).await;
            }
            Action::SpawnChampionDemand => {
                trigger_role(ctx, "champion", None, &mut summary).await;
            }
            Action::SpawnDoctorTargeted => {
                let target = snapshot.demand.doctor_targeted_prs.first().copied();
                trigger_role(ctx, "doctor", target, &mut summary).await;
            }
            Action::SpawnDoctorDemand => {
                trigger_role(ctx, "doctor", None, &mut summary).await;
            }
            Action::SpawnJudgeTargeted => {
                let target = snapshot.demand.judge_targeted_prs.first().copied();
                trigger_role(ctx, "judge", target, &mut summary).await;
            }
            Action::SpawnJudgeDemand => {
                trigger_role(ctx, "judge", None, &mut summary).await;
            }
            Action::TriggerGuide => trigger_role(ctx, "guide", None, &mut summary).await,
            Action::TriggerChampion => trigger_role(ctx, "champion", None, &mut summary).await,
            Action::TriggerDoctor => trigger_role(ctx, "doctor", None, &mut summary).await,
            Action::TriggerAuditor => trigger_role(ctx, "auditor", None, &mut summary).await,
            Action::TriggerJudge => trigger_role(ctx, "judge", None, &mut summary).await,
            Action::TriggerCurator => trigger_role(ctx, "curator", None, &mut summary).await,
            Action::TriggerArchitect => trigger_role(ctx, "architect", None, &mut summary).await,
            Action::TriggerHermit => trigger_role(ctx, "hermit", None, &mut summary).await,
            Action::Wait => {}
        }
    }

    summary
}

/// Pop ready issues (already sorted and filtered) into shepherd tasks.
async fn spawn_shepherds<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    snapshot: &Snapshot,
    budget: u32,
) -> u32
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let gen = RandomTaskIdGen;
    let mut spawned = 0;

    for issue in snapshot.data.ready_issues.iter().take(budget as usize) {
        let issue_number = issue.number;
        let task_id = gen.next();
        let now = ctx.timestamp();

        // Allocate a slot; bail when the pool is exhausted.
        let mut slot = None;
        let worktree = ctx.paths.worktree(issue_number).display().to_string();
        let allocate = ctx
            .store
            .update::<DaemonState, _>(&ctx.paths.daemon_state(), |state| {
                if let Some(id) = state.free_shepherd_slot(ctx.config.max_shepherds) {
                    state.shepherds.insert(
                        id.clone(),
                        ShepherdEntry {
                            status: ShepherdStatus::Working,
                            issue: Some(issue_number),
                            task_id: Some(task_id.to_string()),
                            started: Some(now.clone()),
                            worktree: Some(worktree.clone()),
                            ..Default::default()
                        },
                    );
                    slot = Some(id);
                }
            });
        if let Err(e) = allocate {
            warn!(issue = issue_number, error = %e, "slot allocation failed");
            break;
        }
        let Some(slot) = slot else {
            break;
        };

        // Move the issue into building before the worker starts.
        if let Err(e) = ctx
            .tracker
            .edit_issue_labels(issue_number, &[labels::ISSUE], &[labels::BUILDING])
            .await
        {
            warn!(issue = issue_number, error = %e, "failed to label issue building");
        }

        info!(issue = issue_number, slot = %slot, task_id = %task_id, "spawning shepherd");
        spawn_shepherd_task(ctx.clone(), slot, task_id, issue_number);
        spawned += 1;
    }

    spawned
}

/// Run one shepherd engine as a background task, writing completion state
/// back when it finishes.
fn spawn_shepherd_task<T, S, V, C>(
    ctx: EngineContext<T, S, V, C>,
    slot: String,
    task_id: TaskId,
    issue: u64,
) where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    tokio::spawn(async move {
        let shepherd = Shepherd::new(ctx.clone(), slot.clone(), task_id, issue);
        let outcome = shepherd.run().await;
        info!(issue, slot = %slot, outcome = ?outcome, "shepherd finished");

        let ts = ctx.timestamp();
        let completed = matches!(outcome, ShepherdOutcome::Completed { .. });
        let result = ctx
            .store
            .update::<DaemonState, _>(&ctx.paths.daemon_state(), |state| {
                if completed && !state.completed_issues.contains(&issue) {
                    state.completed_issues.push(issue);
                }
                if let Some(entry) = state.shepherds.get_mut(&slot) {
                    let reason = match &outcome {
                        ShepherdOutcome::Completed { .. } => "completed",
                        ShepherdOutcome::Blocked { .. } => "blocked",
                        ShepherdOutcome::Shutdown => "shutdown",
                        ShepherdOutcome::Skipped { .. } => "skipped",
                    };
                    entry.reset_to_idle(reason, &ts);
                }
            });
        if let Err(e) = result {
            warn!(issue, error = %e, "failed to record shepherd completion");
        }
    });
}

/// Allow one probe shepherd through the systemic-failure breaker: bump the
/// probe count and push the cooldown out (doubling with each probe).
async fn dispatch_probe<T, S, V, C>(ctx: &EngineContext<T, S, V, C>)
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let base = ctx.config.systematic_failure_cooldown;
    let now = ctx.clock.now_utc();
    let result = ctx
        .store
        .update::<DaemonState, _>(&ctx.paths.daemon_state(), |state| {
            let sf = &mut state.systematic_failure;
            sf.probe_count += 1;
            let cooldown = base as i64 * (1i64 << sf.probe_count.min(30));
            sf.cooldown_until = Some(loom_core::format_utc(
                now + chrono::Duration::seconds(cooldown),
            ));
            info!(
                probe = sf.probe_count,
                next_cooldown_seconds = cooldown,
                "dispatching systemic-failure probe"
            );
        });
    if let Err(e) = result {
        warn!(error = %e, "failed to record probe dispatch");
    }
}

/// Swap retryable blocked issues back into the ready queue.
async fn retry_blocked_issues<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    snapshot: &Snapshot,
) -> u32
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let mut retried = 0;
    for retryable in &snapshot.pipeline_health.retryable_issues {
        let issue = retryable.number;
        if let Err(e) = ctx
            .tracker
            .edit_issue_labels(issue, &[labels::BLOCKED], &[labels::ISSUE])
            .await
        {
            warn!(issue, error = %e, "failed to retry blocked issue");
            continue;
        }
        let ts = ctx.timestamp();
        let result = ctx
            .store
            .update::<DaemonState, _>(&ctx.paths.daemon_state(), |state| {
                let entry = state
                    .blocked_issue_retries
                    .entry(issue.to_string())
                    .or_default();
                entry.retry_count += 1;
                entry.last_retry_at = Some(ts.clone());
            });
        if let Err(e) = result {
            warn!(issue, error = %e, "failed to record retry");
        }
        info!(issue, "blocked issue returned to ready queue for retry");
        retried += 1;
    }
    retried
}

/// Mark exhausted issues escalated, once per issue.
async fn escalate_to_human<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    snapshot: &Snapshot,
    summary: &mut DispatchSummary,
) where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    for escalation in &snapshot.pipeline_health.escalation_needed {
        let issue = escalation.number;
        let reason = escalation.reason.clone();
        let result = ctx
            .store
            .update::<DaemonState, _>(&ctx.paths.daemon_state(), |state| {
                let entry = state
                    .blocked_issue_retries
                    .entry(issue.to_string())
                    .or_default();
                if !entry.escalated_to_human {
                    entry.escalated_to_human = true;
                    entry.retry_exhausted = true;
                }
            });
        match result {
            Ok(_) => {
                warn!(issue, reason = %reason, "issue escalated to human");
                summary.escalated_issues.push(issue);
            }
            Err(e) => warn!(issue, error = %e, "failed to record escalation"),
        }
    }
}

/// Promote proposals into the ready queue (force mode only).
async fn promote_proposals<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    snapshot: &Snapshot,
) -> u32
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let mut promoted = 0;
    for issue in &snapshot.promotable_proposals {
        if let Err(e) = ctx
            .tracker
            .edit_issue_labels(
                *issue,
                &[labels::CURATED, labels::ARCHITECT, labels::HERMIT],
                &[labels::ISSUE],
            )
            .await
        {
            warn!(issue, error = %e, "failed to promote proposal");
            continue;
        }
        info!(issue, "proposal promoted to ready queue (force mode)");
        promoted += 1;
    }
    promoted
}

/// Spawn a support-role worker session and track its lifecycle.
async fn trigger_role<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    role: &str,
    target_pr: Option<u64>,
    summary: &mut DispatchSummary,
) where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let gen = RandomTaskIdGen;
    let task_id = gen.next();
    let command = match target_pr {
        Some(pr) => format!("claude \"/{role} {pr}\""),
        None => format!("claude \"/{role}\""),
    };
    let mut env = vec![("LOOM_TASK_ID".to_string(), task_id.to_string())];
    if let Some(pr) = target_pr {
        env.push(("LOOM_TARGET_PR".to_string(), pr.to_string()));
    }

    let session_id = match ctx
        .sessions
        .spawn(role, ctx.paths.repo_root(), &command, &env)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            warn!(role, error = %e, "role spawn failed");
            return;
        }
    };

    let role_name = role.to_string();
    let tid = task_id.to_string();
    let result = ctx
        .store
        .update::<DaemonState, _>(&ctx.paths.daemon_state(), |state| {
            let entry = state.support_roles.entry(role_name.clone()).or_default();
            entry.status = "running".to_string();
            entry.task_id = Some(tid.clone());
        });
    if let Err(e) = result {
        warn!(role, error = %e, "failed to record role start");
    }

    info!(role, session = %session_id, target_pr = ?target_pr, "support role triggered");
    summary.roles_triggered.push(role.to_string());

    // Watch the session in the background; mark the role idle when it ends.
    let ctx = ctx.clone();
    let role = role.to_string();
    tokio::spawn(async move {
        loop {
            match ctx.sessions.is_alive(&session_id).await {
                Ok(true) => tokio::time::sleep(std::time::Duration::from_secs(15)).await,
                _ => break,
            }
            if ctx.sessions.exit_code(&session_id).await.ok().flatten().is_some() {
                break;
            }
        }
        let ts = ctx.timestamp();
        let result = ctx
            .store
            .update::<DaemonState, _>(&ctx.paths.daemon_state(), |state| {
                if let Some(entry) = state.support_roles.get_mut(&role) {
                    entry.status = "idle".to_string();
                    entry.task_id = None;
                    entry.last_completed = Some(ts.clone());
                }
            });
        if let Err(e) = result {
            warn!(role = %role, error = %e, "failed to record role completion");
        }
    });
}

/// Run stuck detection across working shepherds and record the history.
async fn check_stuck<T, S, V, C>(ctx: &EngineContext<T, S, V, C>)
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let state: DaemonState = match ctx.store.load(&ctx.paths.daemon_state()) {
        Ok(state) => state,
        Err(_) => return,
    };
    let now = ctx.clock.now_utc();
    let thresholds = StuckThresholds {
        idle: ctx.config.stuck_idle_threshold,
        working: ctx.config.stuck_working_threshold,
        loop_count: ctx.config.stuck_loop_threshold,
        error_spike: ctx.config.stuck_error_spike_threshold,
        heartbeat_stale: ctx.config.heartbeat_stale_threshold,
        no_worktree: ctx.config.stuck_no_worktree_threshold,
    };

    for (shepherd_id, entry) in &state.shepherds {
        if !entry.is_working() {
            continue;
        }
        let progress = entry
            .task_id
            .as_deref()
            .and_then(|tid| find_progress_for_task(&ctx.paths, tid));
        let probe =
            loom_engine::observe_stuck(ctx, shepherd_id, entry, progress.as_ref(), now).await;
        let detection = loom_engine::evaluate_stuck(&probe, &thresholds, now);
        if detection.stuck {
            warn!(
                shepherd_id,
                severity = ?detection.severity,
                indicators = ?detection.indicators,
                "stuck detection fired"
            );
            if let Err(e) = loom_engine::stuck::record_detection(ctx, &detection) {
                warn!(error = %e, "failed to record stuck detection");
            }
            // Progress milestone so the shepherd's own log shows it
            if let Some(task_id) = entry.task_id.as_deref() {
                let path = ctx.paths.progress_file(task_id);
                if path.is_file() {
                    let ts = ctx.timestamp();
                    let indicator = detection.indicators.join(",");
                    let _ = ctx.store.update::<loom_core::ShepherdProgress, _>(
                        &path,
                        |progress| {
                            progress.milestones.push(
                                Milestone::new("stuck_detected", &ts)
                                    .with_data("indicators", indicator.clone()),
                            );
                        },
                    );
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
