// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Passive watcher for one worker session.
//!
//! Runs cooperatively with explicit sleeps: watches for completion evidence
//! (exit code, phase contract, completion patterns), shutdown and abort
//! signals, errored progress files, and the stuck-at-prompt state, nudging
//! the worker back to life when recovery is allowed.

use crate::context::EngineContext;
use crate::validate::{validate_phase, ValidateOptions};
use loom_adapters::{SessionHost, Tracker, Vcs};
use loom_core::{labels, Clock, Phase, ShepherdProgress};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{info, warn};

/// Pane text shown while the worker is actively processing.
const PROCESSING_INDICATOR: &str = "esc to interrupt";

/// No contract checks before this much elapsed time.
const CONTRACT_INITIAL_DELAY: u64 = 180;

// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static ROLE_COMMAND_AT_PROMPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"❯\s*/?(builder|judge|curator|doctor|shepherd)")
        .expect("constant regex pattern is valid")
});

/// Contract check interval for the elapsed time since the worker started.
///
/// Contract checks are expensive (tracker API calls), so the schedule starts
/// sparse and tightens as completion becomes likely:
/// 0-180s none, 180-270s every 90s, 270-330s every 60s, 330-360s every 30s,
/// beyond 360s every 10s. An override pins a fixed interval; zero means skip.
pub fn adaptive_contract_interval(elapsed: u64, override_secs: u64) -> u64 {
    if override_secs > 0 {
        return override_secs;
    }
    match elapsed {
        0..=179 => 0,
        180..=269 => 90,
        270..=329 => 60,
        330..=359 => 30,
        _ => 10,
    }
}

/// Why monitoring ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitStatus {
    /// Worker process exited with a code.
    Exited(i32),
    /// Phase contract observed satisfied while the worker still ran.
    ContractSatisfied,
    /// Session disappeared without a recorded exit code.
    SessionGone,
    /// Global shutdown signal.
    Shutdown,
    /// Per-issue abort label.
    Aborted,
    /// Progress file flipped to errored.
    Errored,
    /// Monitoring timeout expired.
    Timeout,
}

/// Result of one monitoring run.
#[derive(Debug, Clone)]
pub struct WaitResult {
    pub status: WaitStatus,
    pub elapsed_seconds: u64,
}

/// Monitor configuration for one worker.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Full session id (e.g. `loom-builder-issue-42`).
    pub session_id: String,
    pub issue: u64,
    pub phase: Phase,
    pub task_id: Option<String>,
    pub worktree: Option<String>,
    /// PR number for contract checks that need one (judge/doctor).
    pub pr_number: Option<u64>,
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Fixed contract interval override (0 = adaptive schedule).
    pub contract_interval_override: u64,
    /// Idle window before a backup contract check fires.
    pub idle_backup_after: Duration,
    /// Seconds a prompt-stuck state must persist before recovery.
    pub prompt_stuck_age_threshold: u64,
    /// Seconds between prompt-stuck checks.
    pub prompt_stuck_check_interval: u64,
    /// Cooldown before re-attempting prompt-stuck recovery.
    pub prompt_stuck_recovery_cooldown: u64,
}

impl MonitorConfig {
    pub fn new(session_id: impl Into<String>, issue: u64, phase: Phase) -> Self {
        Self {
            session_id: session_id.into(),
            issue,
            phase,
            task_id: None,
            worktree: None,
            pr_number: None,
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(3600),
            contract_interval_override: 0,
            idle_backup_after: Duration::from_secs(300),
            prompt_stuck_age_threshold: 30,
            prompt_stuck_check_interval: 15,
            prompt_stuck_recovery_cooldown: 120,
        }
    }
}

/// Cheap non-cryptographic pane-content hash for progress tracking.
fn pane_hash(content: &str) -> u64 {
    // FNV-1a
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in content.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Monitor one worker session until it completes or a signal fires.
pub async fn watch_worker<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    config: &MonitorConfig,
) -> WaitResult
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let started = tokio::time::Instant::now();
    let mut last_contract_check: Option<tokio::time::Instant> = None;
    let mut last_pane_hash: u64 = 0;
    let mut last_progress_at = started;
    let mut idle_contract_checked = false;

    // Prompt-stuck tracking
    let mut prompt_stuck_since: Option<tokio::time::Instant> = None;
    let mut last_prompt_check: Option<tokio::time::Instant> = None;
    let mut last_recovery_at: Option<tokio::time::Instant> = None;

    info!(
        session = %config.session_id,
        issue = config.issue,
        phase = %config.phase,
        "monitoring worker"
    );

    loop {
        let elapsed = started.elapsed();
        if elapsed >= config.timeout {
            return WaitResult {
                status: WaitStatus::Timeout,
                elapsed_seconds: elapsed.as_secs(),
            };
        }

        // Worker exit code is the primary completion signal.
        match ctx.sessions.exit_code(&config.session_id).await {
            Ok(Some(code)) => {
                return WaitResult {
                    status: WaitStatus::Exited(code),
                    elapsed_seconds: elapsed.as_secs(),
                };
            }
            Ok(None) => {}
            Err(_) => {
                // Session gone entirely
                return WaitResult {
                    status: WaitStatus::SessionGone,
                    elapsed_seconds: elapsed.as_secs(),
                };
            }
        }

        if !ctx
            .sessions
            .is_alive(&config.session_id)
            .await
            .unwrap_or(false)
        {
            return WaitResult {
                status: WaitStatus::SessionGone,
                elapsed_seconds: elapsed.as_secs(),
            };
        }

        // Signals
        if ctx.paths.stop_shepherds_signal().exists() {
            warn!(session = %config.session_id, "shutdown signal detected (stop-shepherds)");
            return WaitResult {
                status: WaitStatus::Shutdown,
                elapsed_seconds: elapsed.as_secs(),
            };
        }
        if let Ok(issue_labels) = ctx.tracker.issue_labels(config.issue).await {
            if labels::has_label(&issue_labels, labels::ABORT) {
                warn!(issue = config.issue, "abort signal detected");
                return WaitResult {
                    status: WaitStatus::Aborted,
                    elapsed_seconds: elapsed.as_secs(),
                };
            }
        }

        // Fast error detection via the progress file
        if let Some(task_id) = config.task_id.as_deref() {
            if progress_errored(ctx, task_id) {
                warn!(session = %config.session_id, "progress file errored, killing session");
                let _ = ctx.sessions.kill(&config.session_id).await;
                return WaitResult {
                    status: WaitStatus::Errored,
                    elapsed_seconds: elapsed.as_secs(),
                };
            }
        }

        // Pane-content progress tracking
        let pane = ctx
            .sessions
            .capture_output(&config.session_id, 50)
            .await
            .unwrap_or_default();
        let hash = pane_hash(&pane);
        if hash != last_pane_hash {
            last_pane_hash = hash;
            last_progress_at = tokio::time::Instant::now();
            idle_contract_checked = false;
        }

        // Stuck-at-prompt detection and recovery
        check_prompt_stuck(
            ctx,
            config,
            &pane,
            &mut prompt_stuck_since,
            &mut last_prompt_check,
            &mut last_recovery_at,
        )
        .await;

        // Proactive contract checking on the adaptive schedule
        let interval = adaptive_contract_interval(
            elapsed.as_secs(),
            config.contract_interval_override,
        );
        let check_due = interval > 0
            && last_contract_check
                .map(|at| at.elapsed() >= Duration::from_secs(interval))
                .unwrap_or(elapsed.as_secs() >= CONTRACT_INITIAL_DELAY);

        // Idle-triggered backup check
        let idle_check_due = !idle_contract_checked
            && last_progress_at.elapsed() >= config.idle_backup_after;

        if check_due || idle_check_due {
            last_contract_check = Some(tokio::time::Instant::now());
            if idle_check_due {
                idle_contract_checked = true;
            }
            if contract_satisfied(ctx, config).await {
                info!(
                    session = %config.session_id,
                    "phase contract satisfied, worker considered complete"
                );
                return WaitResult {
                    status: WaitStatus::ContractSatisfied,
                    elapsed_seconds: elapsed.as_secs(),
                };
            }
        }

        tokio::time::sleep(config.poll_interval).await;
    }
}

fn progress_errored<T, S, V, C>(ctx: &EngineContext<T, S, V, C>, task_id: &str) -> bool
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    loom_storage::find_progress_for_task(&ctx.paths, task_id)
        .map(|p: ShepherdProgress| p.status == loom_core::ProgressStatus::Errored)
        .unwrap_or(false)
}

async fn contract_satisfied<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    config: &MonitorConfig,
) -> bool
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let opts = ValidateOptions {
        worktree: config.worktree.clone(),
        pr_number: config.pr_number,
        task_id: config.task_id.clone(),
        check_only: true,
        ..Default::default()
    };
    validate_phase(ctx, config.phase, config.issue, &opts)
        .await
        .is_satisfied()
}

/// True when a role slash command sits at the prompt with no processing
/// indicator: the worker typed its command but never submitted it.
fn is_stuck_at_prompt(pane: &str) -> bool {
    ROLE_COMMAND_AT_PROMPT.is_match(pane) && !pane.contains(PROCESSING_INDICATOR)
}

async fn check_prompt_stuck<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    config: &MonitorConfig,
    pane: &str,
    stuck_since: &mut Option<tokio::time::Instant>,
    last_check: &mut Option<tokio::time::Instant>,
    last_recovery: &mut Option<tokio::time::Instant>,
) where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    // Processing again: reset tracking immediately, even off-interval.
    if stuck_since.is_some() && pane.contains(PROCESSING_INDICATOR) {
        info!(session = %config.session_id, "worker processing again, resetting stuck tracking");
        *stuck_since = None;
        return;
    }

    let check_interval = Duration::from_secs(config.prompt_stuck_check_interval);
    if last_check
        .map(|at| at.elapsed() < check_interval)
        .unwrap_or(false)
    {
        return;
    }
    *last_check = Some(tokio::time::Instant::now());

    if !is_stuck_at_prompt(pane) {
        *stuck_since = None;
        return;
    }

    let since = *stuck_since.get_or_insert_with(tokio::time::Instant::now);
    let stuck_for = since.elapsed().as_secs();
    if stuck_for < config.prompt_stuck_age_threshold {
        info!(
            session = %config.session_id,
            stuck_for,
            threshold = config.prompt_stuck_age_threshold,
            "worker may be stuck at prompt, waiting for age threshold"
        );
        return;
    }

    let cooldown = Duration::from_secs(config.prompt_stuck_recovery_cooldown);
    if last_recovery
        .map(|at| at.elapsed() < cooldown)
        .unwrap_or(false)
    {
        return;
    }
    *last_recovery = Some(tokio::time::Instant::now());

    warn!(
        session = %config.session_id,
        stuck_for,
        "worker stuck at prompt, attempting recovery"
    );

    // Strategy 1: Enter-key nudge
    let _ = ctx.sessions.send_enter(&config.session_id).await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    let after = ctx
        .sessions
        .capture_output(&config.session_id, 50)
        .await
        .unwrap_or_default();
    if after.contains(PROCESSING_INDICATOR) {
        info!(session = %config.session_id, "worker recovered via Enter nudge");
        *stuck_since = None;
        return;
    }

    // Strategy 2: re-send the role command
    let command = format!("/{} {}", config.phase, config.issue);
    let _ = ctx.sessions.send(&config.session_id, &command).await;
    let _ = ctx.sessions.send_enter(&config.session_id).await;
    info!(session = %config.session_id, command = %command, "re-sent role command");
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
