// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loom-core: core types for the Loom orchestration daemon.

pub mod clock;
pub mod config;
pub mod daemon_metrics;
pub mod daemon_state;
pub mod health;
pub mod id;
pub mod issue;
pub mod labels;
pub mod phase;
pub mod progress;
pub mod retry;
pub mod stuck;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{elapsed_seconds, format_utc, parse_utc, Clock, FakeClock, SystemClock};
pub use config::{IssueStrategy, LoomConfig};
pub use daemon_metrics::{
    DaemonHealth, DaemonMetrics, IterationStatus, LastIteration, MAX_DURATION_SAMPLES,
};
pub use daemon_state::{
    BlockedIssueRetry, CleanupState, DaemonState, DaemonWarning, IterationTiming, ShepherdEntry,
    ShepherdStatus, SupportRoleEntry, SystematicFailure, DEMAND_ROLES, SUPPORT_ROLES,
};
pub use health::{
    Alert, AlertSeverity, AlertType, AlertsFile, ErrorRates, HealthMetrics, HealthStatus,
    LatencyMetric, MetricEntry, PipelineHealthMetric, QueueDepths, ResourceUsage,
    ThroughputMetric, MAX_ALERTS,
};
pub use id::{
    RandomTaskIdGen, SequentialTaskIdGen, SessionName, ShepherdId, ShortId, TaskId, TaskIdGen,
};
pub use issue::{feature_branch, pr_title, worktree_name, Issue, PullRequest};
pub use phase::{FailureMode, Phase, ValidationResult, ValidationStatus, WorkerExit};
pub use progress::{Milestone, ProgressStatus, ShepherdProgress};
pub use retry::{effective_cooldown, error_class, is_known_class, retry_policy, RetryPolicy};
pub use stuck::{
    DetectionResult, StuckDetection, StuckHistory, StuckHistoryEntry, StuckMetrics, StuckSeverity,
    StuckThresholds, SuggestedIntervention, MAX_STUCK_HISTORY,
};
