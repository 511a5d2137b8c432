// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The iteration scheduler: the daemon's periodic control loop.
//!
//! Each tick builds a snapshot, runs the supervision plane, dispatches the
//! recommended actions, persists metrics and transient warnings, and sleeps.
//! Repeated failures (or a stalled pipeline) engage exponential backoff; any
//! success resets it to the poll interval.

use crate::dispatch::{dispatch_actions, DispatchSummary};
use crate::supervise::supervise_no_progress;
use loom_adapters::{Notifier, SessionHost, Tracker, Vcs};
use loom_core::{
    Clock, DaemonMetrics, DaemonState, DaemonWarning, IterationStatus, IterationTiming,
    LoomConfig,
};
use loom_engine::{
    build_snapshot, collect_pipeline_data, detect_spinning_prs, snapshot::WarningLevel,
    EngineContext, HealthIndicator, Snapshot,
};
use loom_storage::{read_progress_files, IssueFailureLog};
use std::time::Duration;
use tracing::{info, warn};

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Stop-signal file observed.
    StopSignal,
    /// Another daemon owns the state file; exited without further writes.
    SessionConflict,
}

/// Result of one iteration.
pub struct IterationResult {
    pub status: IterationStatus,
    pub duration_seconds: u64,
    pub summary: String,
    pub snapshot: Option<Snapshot>,
    pub dispatch: DispatchSummary,
}

/// The daemon's main loop controller.
pub struct DaemonLoop<T, S, V, C, N> {
    ctx: EngineContext<T, S, V, C>,
    notifier: N,
    session_id: String,
    force_mode: bool,
    iteration: u64,
    consecutive_failures: u32,
    current_backoff: u64,
}

impl<T, S, V, C, N> DaemonLoop<T, S, V, C, N>
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
    N: Notifier,
{
    pub fn new(
        ctx: EngineContext<T, S, V, C>,
        notifier: N,
        session_id: String,
        force_mode: bool,
    ) -> Self {
        let current_backoff = ctx.config.poll_interval;
        Self {
            ctx,
            notifier,
            session_id,
            force_mode,
            iteration: 0,
            consecutive_failures: 0,
            current_backoff,
        }
    }

    fn config(&self) -> &LoomConfig {
        &self.ctx.config
    }

    fn stop_requested(&self) -> bool {
        self.ctx.paths.stop_daemon_signal().exists()
    }

    /// Verify we still own the state file. A mismatch means another daemon
    /// has taken over; we must yield without further writes.
    fn validate_session_ownership(&self) -> bool {
        let state: DaemonState = match self.ctx.store.load(&self.ctx.paths.daemon_state()) {
            Ok(state) => state,
            Err(_) => return true,
        };
        match state.daemon_session_id.as_deref() {
            Some(owner) if owner != self.session_id => {
                warn!(
                    ours = %self.session_id,
                    file = %owner,
                    "SESSION CONFLICT: another daemon has taken over the state file; yielding"
                );
                false
            }
            _ => true,
        }
    }

    /// Run the loop until a stop signal or session conflict.
    pub async fn run(&mut self) -> LoopExit {
        loop {
            self.iteration += 1;

            if self.stop_requested() {
                info!(iteration = self.iteration, "shutdown signal detected");
                return LoopExit::StopSignal;
            }

            if !self.validate_session_ownership() {
                return LoopExit::SessionConflict;
            }

            info!(iteration = self.iteration, "iteration starting");
            let result = self.run_iteration_with_timeout().await;

            self.record_metrics(&result);
            self.update_state_timing();
            self.check_slow_iteration(result.duration_seconds);
            self.persist_warnings(result.snapshot.as_ref());

            // Health collection runs off the same snapshot as the iteration
            if let Some(snapshot) = result.snapshot.as_ref() {
                if let Err(e) =
                    loom_engine::health::collect(&self.ctx, &self.notifier, snapshot, 0.0).await
                {
                    warn!(error = %e, "health collection failed");
                }
            }

            let pipeline_stalled = result
                .snapshot
                .as_ref()
                .map(|s| s.health_status == HealthIndicator::Stalled)
                .unwrap_or(false);
            info!(
                iteration = self.iteration,
                status = ?result.status,
                duration = result.duration_seconds,
                "{}",
                result.summary
            );
            self.update_backoff(result.status == IterationStatus::Success, pipeline_stalled);

            if self.stop_requested() {
                info!("shutdown signal detected after iteration");
                return LoopExit::StopSignal;
            }

            info!(backoff = self.current_backoff, "sleeping until next iteration");
            tokio::time::sleep(Duration::from_secs(self.current_backoff)).await;
        }
    }

    async fn run_iteration_with_timeout(&self) -> IterationResult {
        let started = tokio::time::Instant::now();
        let timeout = Duration::from_secs(self.config().iteration_timeout);
        match tokio::time::timeout(timeout, self.run_iteration()).await {
            Ok(result) => result,
            Err(_) => IterationResult {
                status: IterationStatus::Timeout,
                duration_seconds: started.elapsed().as_secs(),
                summary: format!(
                    "TIMEOUT (iteration exceeded {}s)",
                    self.config().iteration_timeout
                ),
                snapshot: None,
                dispatch: DispatchSummary::default(),
            },
        }
    }

    /// One full iteration: snapshot → supervision → dispatch → persist.
    pub async fn run_iteration(&self) -> IterationResult {
        let started = tokio::time::Instant::now();

        // Snapshot collection (parallel tracker queries) and derivation
        let data = collect_pipeline_data(&self.ctx.tracker).await;
        let spinning =
            detect_spinning_prs(&self.ctx.tracker, &data.changes_requested, self.config()).await;

        let daemon_state: DaemonState = self
            .ctx
            .store
            .load(&self.ctx.paths.daemon_state())
            .unwrap_or_default();
        let failure_log: IssueFailureLog = self
            .ctx
            .store
            .load(&self.ctx.paths.failure_log())
            .unwrap_or_default();
        let progress_files = read_progress_files(&self.ctx.paths);

        let snapshot = build_snapshot(
            data,
            spinning,
            &daemon_state,
            &failure_log,
            progress_files,
            self.config(),
            self.ctx.clock.now_utc(),
            self.iteration,
            0.0,
        );

        // Supervision plane: two-tier no-progress reclaim. Slot arithmetic
        // is recomputed defensively at spawn time inside dispatch.
        let supervision = supervise_no_progress(&self.ctx).await;
        if !supervision.is_empty() {
            info!(actions = ?supervision, "supervision actions taken");
        }

        // Dispatch recommended actions in order
        let dispatch = dispatch_actions(&self.ctx, &snapshot, self.force_mode).await;

        // Persist the iteration count
        let iteration = self.iteration;
        if let Err(e) = self
            .ctx
            .store
            .update::<DaemonState, _>(&self.ctx.paths.daemon_state(), |state| {
                state.iteration = iteration;
            })
        {
            warn!(error = %e, "failed to persist iteration count");
        }

        let had_query_failures = !snapshot.data.warnings.is_empty();
        let summary = format!(
            "ready={} building={} blocked={} in_flight={} spawned={} actions=[{}]",
            snapshot.counts.ready,
            snapshot.counts.building,
            snapshot.counts.blocked,
            snapshot.counts.total_in_flight,
            dispatch.shepherds_spawned,
            snapshot
                .recommended_actions
                .iter()
                .map(|a| a.as_str())
                .collect::<Vec<_>>()
                .join(","),
        );

        IterationResult {
            // Individual collection failures degrade the snapshot but do
            // not fail the iteration.
            status: if had_query_failures {
                IterationStatus::Failure
            } else {
                IterationStatus::Success
            },
            duration_seconds: started.elapsed().as_secs(),
            summary,
            snapshot: Some(snapshot),
            dispatch,
        }
    }

    fn record_metrics(&self, result: &IterationResult) {
        let timestamp = self.ctx.timestamp();
        let update = self.ctx.store.update::<DaemonMetrics, _>(
            &self.ctx.paths.daemon_metrics(),
            |metrics| {
                metrics.record_iteration(
                    result.status,
                    result.duration_seconds,
                    &result.summary,
                    &timestamp,
                );
            },
        );
        if let Err(e) = update {
            warn!(error = %e, "failed to update daemon metrics");
        }
    }

    /// Mirror iteration timing into the state document.
    fn update_state_timing(&self) {
        let metrics: DaemonMetrics = match self.ctx.store.load(&self.ctx.paths.daemon_metrics()) {
            Ok(metrics) => metrics,
            Err(_) => return,
        };
        let timing = IterationTiming {
            last_duration_seconds: metrics
                .last_iteration
                .as_ref()
                .map(|l| l.duration_seconds)
                .unwrap_or(0),
            avg_duration_seconds: metrics.average_iteration_seconds,
            max_duration_seconds: metrics.max_duration(),
        };
        if let Err(e) = self
            .ctx
            .store
            .update::<DaemonState, _>(&self.ctx.paths.daemon_state(), |state| {
                state.iteration_timing = timing.clone();
            })
        {
            warn!(error = %e, "failed to persist iteration timing");
        }
    }

    fn check_slow_iteration(&self, duration: u64) {
        let metrics: DaemonMetrics = match self.ctx.store.load(&self.ctx.paths.daemon_metrics()) {
            Ok(metrics) => metrics,
            Err(_) => return,
        };
        if metrics.total_iterations < 3 || metrics.average_iteration_seconds == 0 {
            return;
        }
        let threshold =
            metrics.average_iteration_seconds * self.config().slow_iteration_multiplier;
        if duration > threshold {
            warn!(
                duration,
                avg = metrics.average_iteration_seconds,
                threshold,
                "slow iteration detected"
            );
        }
    }

    /// Replace the transient warnings with the ones computed this iteration.
    fn persist_warnings(&self, snapshot: Option<&Snapshot>) {
        let timestamp = self.ctx.timestamp();
        let warnings: Vec<DaemonWarning> = snapshot
            .map(|s| {
                s.health_warnings
                    .iter()
                    .map(|w| DaemonWarning {
                        code: w.code.to_string(),
                        level: match w.level {
                            WarningLevel::Warning => "warning".to_string(),
                            WarningLevel::Info => "info".to_string(),
                        },
                        message: w.message.clone(),
                        time: timestamp.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Err(e) = self
            .ctx
            .store
            .update::<DaemonState, _>(&self.ctx.paths.daemon_state(), |state| {
                state.warnings = warnings.clone();
            })
        {
            warn!(error = %e, "failed to persist warnings");
        }
    }

    /// Exponential backoff on repeated failures; success resets. A stalled
    /// pipeline counts as a soft failure: the backoff holds or grows but a
    /// working tracker keeps the daemon responsive.
    fn update_backoff(&mut self, success: bool, pipeline_stalled: bool) {
        if success && !pipeline_stalled {
            if self.consecutive_failures > 0 || self.current_backoff != self.config().poll_interval
            {
                self.consecutive_failures = 0;
                self.current_backoff = self.config().poll_interval;
                info!(backoff = self.current_backoff, "backoff reset");
            }
            return;
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config().backoff_threshold {
            let new_backoff = (self.current_backoff * self.config().backoff_multiplier)
                .min(self.config().max_backoff);
            if new_backoff != self.current_backoff {
                self.current_backoff = new_backoff;
                if pipeline_stalled {
                    info!(backoff = self.current_backoff, "pipeline stalled, increasing backoff");
                } else {
                    info!(
                        backoff = self.current_backoff,
                        failures = self.consecutive_failures,
                        "backing off"
                    );
                }
            }
        } else if pipeline_stalled {
            info!(
                backoff = self.current_backoff,
                soft_failures = self.consecutive_failures,
                threshold = self.config().backoff_threshold,
                "pipeline stalled, maintaining backoff"
            );
        }
    }

    /// Current backoff in seconds (for tests and status displays).
    pub fn current_backoff(&self) -> u64 {
        self.current_backoff
    }

    /// Consecutive failure count (for tests and status displays).
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
