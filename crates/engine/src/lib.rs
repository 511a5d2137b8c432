// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loom-engine: snapshot, supervision, validation, and shepherd orchestration.

pub mod ci;
pub mod context;
pub mod health;
pub mod monitor;
pub mod orphans;
pub mod shepherd;
pub mod snapshot;
pub mod stuck;
pub mod validate;

pub use ci::{ci_status, wait_for_ci, CiResult, CiStatus, CI_POLL_INTERVAL, DEFAULT_CI_TIMEOUT};
pub use context::EngineContext;
pub use monitor::{adaptive_contract_interval, watch_worker, MonitorConfig, WaitResult, WaitStatus};
pub use orphans::{run_orphan_recovery, Orphan, OrphanRecoveryResult, RecoveryAction};
pub use shepherd::{Shepherd, ShepherdOutcome};
pub use snapshot::{
    build_snapshot, collect_pipeline_data, detect_spinning_prs, Action, DemandFlags,
    EnhancedProgress, HealthIndicator, OrphanedPr, OrphanedShepherd, PipelineData, PipelineHealth,
    PipelineStatus, Snapshot, SnapshotCounts, SpinningPr, SystematicFailureState,
};
pub use stuck::{evaluate as evaluate_stuck, observe as observe_stuck, StuckProbe};
pub use validate::{validate_phase, BuilderDiagnostics, ValidateOptions};
