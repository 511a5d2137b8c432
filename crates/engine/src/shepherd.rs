// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-issue shepherd engine.
//!
//! Drives one issue through the fixed phase pipeline (curate → build →
//! judge ⇄ doctor), retrying stuck workers, dispatching the doctor for test
//! failures, and classifying every failure by error class for the
//! scheduler's retry budgets.

use crate::ci::{wait_for_ci, CiStatus, DEFAULT_CI_TIMEOUT};
use crate::context::EngineContext;
use crate::monitor::{watch_worker, MonitorConfig, WaitStatus};
use crate::validate::{validate_phase, ValidateOptions};
use loom_adapters::{EntityState, SessionHost, Tracker, Vcs};
use loom_core::{
    error_class, feature_branch, labels, Clock, DaemonState, FailureMode, Milestone, Phase,
    ShepherdProgress, TaskId, WorkerExit,
};
use loom_storage::IssueFailureLog;
use std::time::Duration;
use tracing::{info, warn};

/// Cooldown between stuck-retry attempts.
const STUCK_RETRY_COOLDOWN: Duration = Duration::from_secs(30);

/// Maximum doctor rounds per judge cycle before escalation.
const MAX_DOCTOR_ROUNDS: u32 = 3;

/// Maximum doctor test-fix attempts after a builder test failure.
const MAX_TEST_FIX_ATTEMPTS: u32 = 3;

/// Scrollback lines captured into a stall diagnostic.
const DIAGNOSTIC_LINES: u32 = 500;

/// Final outcome of one shepherd run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShepherdOutcome {
    /// Pipeline completed; the PR is approved (or already merged).
    Completed { pr_number: Option<u64> },
    /// Issue marked blocked with an error class.
    Blocked {
        error_class: String,
        failure_mode: Option<FailureMode>,
    },
    /// Shutdown or abort signal observed; claim released cleanly.
    Shutdown,
    /// Another agent holds the claim.
    Skipped { reason: String },
}

/// Outcome of running one phase's worker (including retries).
#[derive(Debug, Clone, PartialEq, Eq)]
enum PhaseRun {
    Ok,
    Stuck,
    Shutdown,
    TestFailure,
    Failed(String),
}

/// One shepherd instance, driving one issue.
pub struct Shepherd<T, S, V, C> {
    ctx: EngineContext<T, S, V, C>,
    shepherd_id: String,
    task_id: TaskId,
    issue: u64,
}

impl<T, S, V, C> Shepherd<T, S, V, C>
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    pub fn new(
        ctx: EngineContext<T, S, V, C>,
        shepherd_id: impl Into<String>,
        task_id: TaskId,
        issue: u64,
    ) -> Self {
        Self {
            ctx,
            shepherd_id: shepherd_id.into(),
            task_id,
            issue,
        }
    }

    fn worktree_path(&self) -> String {
        self.ctx.paths.worktree(self.issue).display().to_string()
    }

    fn worker_command(&self, phase: Phase) -> String {
        format!("claude \"/{} {}\"", phase, self.issue)
    }

    fn session_name(&self, phase: Phase, attempt: u32) -> String {
        if attempt == 0 {
            format!("{}-issue-{}", phase, self.issue)
        } else {
            format!("{}-issue-{}-a{}", phase, self.issue, attempt)
        }
    }

    /// Drive the full pipeline. Releases the claim on every exit path.
    pub async fn run(&self) -> ShepherdOutcome {
        let now = self.ctx.clock.now_utc();
        match self.ctx.claims.acquire(self.issue, &self.shepherd_id, now) {
            Ok(true) => {}
            Ok(false) => {
                return ShepherdOutcome::Skipped {
                    reason: "claim held by another agent".to_string(),
                };
            }
            Err(e) => {
                return ShepherdOutcome::Skipped {
                    reason: format!("claim acquisition failed: {e}"),
                };
            }
        }

        self.init_progress();
        let outcome = self.run_pipeline().await;

        let ts = self.ctx.timestamp();
        match &outcome {
            ShepherdOutcome::Completed { .. } => self.update_progress(|progress| {
                progress.status = loom_core::ProgressStatus::Completed;
                progress.last_heartbeat = Some(ts.clone());
            }),
            // Blocked status was written by block_issue; a shutdown leaves
            // the last real status in place for the next session to read.
            _ => self.update_progress(|progress| {
                progress.last_heartbeat = Some(ts.clone());
            }),
        }

        if let Err(e) = self.ctx.claims.release(self.issue, &self.shepherd_id) {
            warn!(issue = self.issue, error = %e, "claim release failed");
        }
        outcome
    }

    async fn run_pipeline(&self) -> ShepherdOutcome {
        // Curate
        match self.run_phase_with_retry(Phase::Curator).await {
            PhaseRun::Ok => {}
            PhaseRun::Shutdown => return ShepherdOutcome::Shutdown,
            PhaseRun::Stuck => {
                return self
                    .block_issue(error_class::SHEPHERD_FAILURE, None)
                    .await;
            }
            PhaseRun::TestFailure | PhaseRun::Failed(_) => {
                return self
                    .block_issue(error_class::SHEPHERD_FAILURE, None)
                    .await;
            }
        }

        // Build, with the doctor's test-fix loop on explicit test failures
        let mut test_fix_attempts = 0;
        loop {
            match self.run_phase_with_retry(Phase::Builder).await {
                PhaseRun::Ok => break,
                PhaseRun::Shutdown => return ShepherdOutcome::Shutdown,
                PhaseRun::Stuck => {
                    return self
                        .block_issue(error_class::BUILDER_UNKNOWN_FAILURE, None)
                        .await;
                }
                PhaseRun::TestFailure => {
                    test_fix_attempts += 1;
                    if test_fix_attempts > MAX_TEST_FIX_ATTEMPTS {
                        return self
                            .block_issue(error_class::BUILDER_TEST_FAILURE, None)
                            .await;
                    }
                    info!(
                        issue = self.issue,
                        attempt = test_fix_attempts,
                        "builder reported test failures, dispatching doctor in test-fix mode"
                    );
                    match self.run_phase_with_retry(Phase::Doctor).await {
                        PhaseRun::Shutdown => return ShepherdOutcome::Shutdown,
                        PhaseRun::Ok => continue,
                        _ => {
                            return self
                                .block_issue(error_class::BUILDER_TEST_FAILURE, None)
                                .await;
                        }
                    }
                }
                PhaseRun::Failed(_) => {
                    return self
                        .block_issue(error_class::BUILDER_NO_PR, None)
                        .await;
                }
            }
        }

        // The builder contract is satisfied; resolve the PR number.
        let Some(pr_number) = self.find_pr().await else {
            return self.block_issue(error_class::BUILDER_NO_PR, None).await;
        };
        self.update_progress(|progress| {
            let ts = progress.last_heartbeat.clone().unwrap_or_default();
            progress
                .milestones
                .push(Milestone::new("pr_created", ts).with_data("pr_number", pr_number));
        });

        // Judge ⇄ Doctor
        let mut doctor_rounds = 0;
        loop {
            match self.run_phase_with_retry(Phase::Judge).await {
                PhaseRun::Ok => {}
                PhaseRun::Shutdown => return ShepherdOutcome::Shutdown,
                _ => {
                    return self
                        .block_issue(error_class::JUDGE_EXHAUSTED, None)
                        .await;
                }
            }

            let pr_labels = self
                .ctx
                .tracker
                .pr_labels(pr_number)
                .await
                .unwrap_or_default();
            if labels::has_label(&pr_labels, labels::PR_APPROVED) {
                info!(issue = self.issue, pr = pr_number, "PR approved, pipeline complete");
                return ShepherdOutcome::Completed {
                    pr_number: Some(pr_number),
                };
            }
            if !labels::has_label(&pr_labels, labels::CHANGES_REQUESTED) {
                return self
                    .block_issue(error_class::JUDGE_EXHAUSTED, Some(FailureMode::ValidationFailed))
                    .await;
            }

            doctor_rounds += 1;
            if doctor_rounds > MAX_DOCTOR_ROUNDS {
                return self
                    .block_issue(error_class::DOCTOR_EXHAUSTED, None)
                    .await;
            }

            match self.run_doctor_round(pr_number).await {
                PhaseRun::Ok => continue,
                PhaseRun::Shutdown => return ShepherdOutcome::Shutdown,
                PhaseRun::Failed(mode) => {
                    let failure_mode = match mode.as_str() {
                        "no_progress" => Some(FailureMode::NoProgress),
                        "insufficient_changes" => Some(FailureMode::InsufficientChanges),
                        _ => Some(FailureMode::ValidationFailed),
                    };
                    let class = if failure_mode == Some(FailureMode::NoProgress) {
                        error_class::DOCTOR_NO_PROGRESS
                    } else {
                        error_class::DOCTOR_EXHAUSTED
                    };
                    return self.block_issue(class, failure_mode).await;
                }
                _ => {
                    return self
                        .block_issue(error_class::DOCTOR_EXHAUSTED, None)
                        .await;
                }
            }
        }
    }

    /// One doctor round: run the worker, diagnose, recover labels if the
    /// doctor made commits, then wait for CI before handing back to judge.
    async fn run_doctor_round(&self, pr_number: u64) -> PhaseRun {
        let worktree = self.ctx.paths.worktree(self.issue);
        let commits_before = self
            .ctx
            .vcs
            .commits_ahead(&worktree, "main")
            .await
            .ok()
            .flatten()
            .unwrap_or(0);

        let run = self.run_phase_with_retry(Phase::Doctor).await;
        if matches!(run, PhaseRun::Shutdown) {
            return run;
        }

        // Diagnostics run regardless of the worker's exit code.
        let commits_after = self
            .ctx
            .vcs
            .commits_ahead(&worktree, "main")
            .await
            .ok()
            .flatten()
            .unwrap_or(commits_before);
        let commits_made = commits_after.saturating_sub(commits_before);

        let opts = ValidateOptions {
            pr_number: Some(pr_number),
            task_id: Some(self.task_id.to_string()),
            quiet: true,
            ..Default::default()
        };
        let validation = validate_phase(&self.ctx, Phase::Doctor, self.issue, &opts).await;

        if !validation.is_satisfied() {
            if commits_made > 0 {
                // The doctor did work but the labels never moved; reset to a
                // known state so the judge can re-evaluate.
                if self.recover_doctor_labels(pr_number).await {
                    info!(
                        issue = self.issue,
                        pr = pr_number,
                        commits_made,
                        "doctor label recovery applied"
                    );
                } else {
                    return PhaseRun::Failed("insufficient_changes".to_string());
                }
            } else {
                return PhaseRun::Failed("no_progress".to_string());
            }
        }

        // Wait for CI before the judge sees the PR again. A timeout returns
        // PENDING and the pipeline proceeds with a heartbeat note.
        let paths = self.ctx.paths.clone();
        let ci = wait_for_ci(&self.ctx.tracker, pr_number, DEFAULT_CI_TIMEOUT, move || {
            paths.stop_shepherds_signal().exists()
        })
        .await;
        match ci.status {
            CiStatus::Unknown if ci.message.contains("shutdown") => return PhaseRun::Shutdown,
            CiStatus::Pending => {
                self.heartbeat(&format!("CI pending on PR #{pr_number}: {}", ci.message));
            }
            _ => {
                self.heartbeat(&format!("CI complete on PR #{pr_number}: {}", ci.message));
            }
        }

        PhaseRun::Ok
    }

    async fn recover_doctor_labels(&self, pr_number: u64) -> bool {
        let pr_labels = self
            .ctx
            .tracker
            .pr_labels(pr_number)
            .await
            .unwrap_or_default();
        if labels::has_label(&pr_labels, labels::CHANGES_REQUESTED)
            && !labels::has_label(&pr_labels, labels::REVIEW_REQUESTED)
        {
            return self
                .ctx
                .tracker
                .edit_pr_labels(
                    pr_number,
                    &[labels::CHANGES_REQUESTED],
                    &[labels::REVIEW_REQUESTED],
                )
                .await
                .is_ok();
        }
        false
    }

    /// Run one phase's worker with stuck-aware retries, then validate its
    /// contract. Intermediate attempts validate quietly; the final failure
    /// is loud.
    async fn run_phase_with_retry(&self, phase: Phase) -> PhaseRun {
        let max_attempts = self.ctx.config.stuck_max_retries + 1;

        for attempt in 0..max_attempts {
            if self.ctx.paths.stop_shepherds_signal().exists() {
                return PhaseRun::Shutdown;
            }

            let run = self.run_worker_attempt(phase, attempt).await;
            match run {
                PhaseRun::Stuck if attempt + 1 < max_attempts => {
                    warn!(
                        issue = self.issue,
                        phase = %phase,
                        attempt,
                        "worker stuck, retrying after cooldown"
                    );
                    tokio::time::sleep(STUCK_RETRY_COOLDOWN).await;
                    continue;
                }
                other => return other,
            }
        }

        PhaseRun::Stuck
    }

    async fn run_worker_attempt(&self, phase: Phase, attempt: u32) -> PhaseRun {
        let name = self.session_name(phase, attempt);
        let cwd = if phase == Phase::Builder {
            // Builders work inside their worktree when it already exists
            let worktree = self.ctx.paths.worktree(self.issue);
            if worktree.is_dir() {
                worktree
            } else {
                self.ctx.paths.repo_root().to_path_buf()
            }
        } else {
            self.ctx.paths.repo_root().to_path_buf()
        };

        let env = [("LOOM_TASK_ID".to_string(), self.task_id.to_string())];
        let session_id = match self
            .ctx
            .sessions
            .spawn(&name, &cwd, &self.worker_command(phase), &env)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(issue = self.issue, phase = %phase, error = %e, "worker spawn failed");
                return PhaseRun::Failed(format!("spawn failed: {e}"));
            }
        };

        self.heartbeat(&format!("{phase} worker started ({session_id})"));
        self.update_progress(|progress| {
            progress.current_phase = phase.name().to_string();
        });

        let mut monitor_config = MonitorConfig::new(&session_id, self.issue, phase);
        monitor_config.task_id = Some(self.task_id.to_string());
        monitor_config.worktree = Some(self.worktree_path());
        if matches!(phase, Phase::Judge | Phase::Doctor) {
            monitor_config.pr_number = self.find_pr().await;
        }
        let result = watch_worker(&self.ctx, &monitor_config).await;

        match result.status {
            WaitStatus::Exited(code) => match WorkerExit::from_code(code) {
                WorkerExit::Success => self.validate_after_worker(phase, true).await,
                WorkerExit::Shutdown => PhaseRun::Shutdown,
                WorkerExit::Stuck => {
                    self.capture_diagnostic(&session_id).await;
                    let _ = self.ctx.sessions.kill(&session_id).await;
                    PhaseRun::Stuck
                }
                WorkerExit::NoOp => PhaseRun::TestFailure,
                WorkerExit::Failure(code) => {
                    self.capture_diagnostic(&session_id).await;
                    let _ = self.ctx.sessions.kill(&session_id).await;
                    // The contract may still hold (e.g. the worker crashed
                    // after finishing its externally visible work).
                    match self.validate_after_worker(phase, true).await {
                        PhaseRun::Ok => PhaseRun::Ok,
                        _ => PhaseRun::Failed(format!("worker exited with {code}")),
                    }
                }
            },
            WaitStatus::ContractSatisfied => {
                let _ = self.ctx.sessions.kill(&session_id).await;
                PhaseRun::Ok
            }
            WaitStatus::SessionGone => self.validate_after_worker(phase, false).await,
            WaitStatus::Shutdown | WaitStatus::Aborted => PhaseRun::Shutdown,
            WaitStatus::Errored => PhaseRun::Failed("progress_file_errored".to_string()),
            WaitStatus::Timeout => {
                self.capture_diagnostic(&session_id).await;
                let _ = self.ctx.sessions.send_interrupt(&session_id).await;
                let _ = self.ctx.sessions.kill(&session_id).await;
                PhaseRun::Stuck
            }
        }
    }

    /// Validate a phase contract after the worker finished. `quiet` governs
    /// whether a failure may post labels/comments; the pipeline's final
    /// failure path is always loud via `block_issue`.
    async fn validate_after_worker(&self, phase: Phase, quiet: bool) -> PhaseRun {
        let opts = ValidateOptions {
            worktree: Some(self.worktree_path()),
            pr_number: self.find_pr().await,
            task_id: Some(self.task_id.to_string()),
            quiet,
            ..Default::default()
        };
        let result = validate_phase(&self.ctx, phase, self.issue, &opts).await;
        if result.is_satisfied() {
            self.heartbeat(&format!("{phase} contract satisfied: {}", result.message));
            PhaseRun::Ok
        } else {
            PhaseRun::Failed(result.message)
        }
    }

    async fn find_pr(&self) -> Option<u64> {
        if let Ok(Some(pr)) = self
            .ctx
            .tracker
            .find_pr_by_head(&feature_branch(self.issue), EntityState::Open)
            .await
        {
            return Some(pr);
        }
        for keyword in ["Closes", "Fixes", "Resolves"] {
            if let Ok(Some(pr)) = self
                .ctx
                .tracker
                .search_open_prs(&format!("{keyword} #{}", self.issue))
                .await
            {
                return Some(pr);
            }
        }
        None
    }

    /// Save worker scrollback to a timestamped stall diagnostic before any
    /// destructive action.
    async fn capture_diagnostic(&self, session_id: &str) {
        let Ok(output) = self
            .ctx
            .sessions
            .capture_output(session_id, DIAGNOSTIC_LINES)
            .await
        else {
            return;
        };
        let compact = self
            .ctx
            .clock
            .now_utc()
            .format("%Y%m%d-%H%M%S")
            .to_string();
        let path = self.ctx.paths.stall_diagnostic(session_id, &compact);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&path, output) {
            warn!(session = session_id, error = %e, "failed to save stall diagnostic");
        } else {
            info!(session = session_id, path = %path.display(), "saved stall diagnostic");
        }
    }

    /// Mark the issue blocked, record the failure, and update the systemic
    /// failure tracker.
    async fn block_issue(
        &self,
        class: &str,
        failure_mode: Option<FailureMode>,
    ) -> ShepherdOutcome {
        warn!(issue = self.issue, error_class = class, "blocking issue");

        if let Err(e) = self
            .ctx
            .tracker
            .edit_issue_labels(self.issue, &[labels::BUILDING], &[labels::BLOCKED])
            .await
        {
            warn!(issue = self.issue, error = %e, "failed to apply blocked label");
        }

        let ts = self.ctx.timestamp();
        if let Err(e) =
            self.ctx
                .store
                .update::<IssueFailureLog, _>(&self.ctx.paths.failure_log(), |log| {
                    log.record_failure(self.issue, &ts);
                })
        {
            warn!(issue = self.issue, error = %e, "failed to record failure");
        }

        self.record_systemic_failure(class);

        self.update_progress(|progress| {
            progress.status = loom_core::ProgressStatus::Blocked;
            progress.milestones.push(
                Milestone::new("blocked", ts.clone()).with_data("error_class", class),
            );
        });

        ShepherdOutcome::Blocked {
            error_class: class.to_string(),
            failure_mode,
        }
    }

    /// Track same-class failures; enough of them within the window flips the
    /// systemic-failure breaker and suppresses new spawning.
    fn record_systemic_failure(&self, class: &str) {
        let threshold = self.ctx.config.systematic_failure_threshold;
        let cooldown = self.ctx.config.systematic_failure_cooldown;
        let now = self.ctx.clock.now_utc();
        let issue = self.issue;
        let class = class.to_string();
        let result = self
            .ctx
            .store
            .update::<DaemonState, _>(&self.ctx.paths.daemon_state(), |state| {
                let retry = state
                    .blocked_issue_retries
                    .entry(issue.to_string())
                    .or_default();
                retry.error_class = class.clone();
                retry.last_retry_at = Some(loom_core::format_utc(now));

                let sf = &mut state.systematic_failure;
                if sf.pattern == class {
                    sf.count += 1;
                } else {
                    sf.pattern = class.clone();
                    sf.count = 1;
                }
                if sf.count >= threshold && !sf.active {
                    sf.active = true;
                    sf.detected_at = Some(loom_core::format_utc(now));
                    sf.cooldown_until = Some(loom_core::format_utc(
                        now + chrono::Duration::seconds(cooldown as i64),
                    ));
                    sf.probe_count = 0;
                }
            });
        if let Err(e) = result {
            warn!(issue = self.issue, error = %e, "failed to update systemic failure state");
        }
    }

    fn init_progress(&self) {
        let now = self.ctx.timestamp();
        let progress = ShepherdProgress::new(self.task_id.to_string(), self.issue, &now);
        if let Err(e) = self
            .ctx
            .store
            .store(&self.ctx.paths.progress_file(self.task_id.as_str()), &progress)
        {
            warn!(issue = self.issue, error = %e, "failed to create progress file");
        }
    }

    fn update_progress(&self, mutate: impl FnOnce(&mut ShepherdProgress)) {
        let path = self.ctx.paths.progress_file(self.task_id.as_str());
        if let Err(e) = self.ctx.store.update::<ShepherdProgress, _>(&path, mutate) {
            warn!(issue = self.issue, error = %e, "failed to update progress file");
        }
    }

    fn heartbeat(&self, action: &str) {
        let now = self.ctx.timestamp();
        let action = action.to_string();
        self.update_progress(|progress| {
            progress.heartbeat(&now, None);
            progress
                .milestones
                .push(Milestone::new("heartbeat", &now).with_data("action", action.clone()));
        });
    }
}

#[cfg(test)]
#[path = "shepherd_tests.rs"]
mod tests;
