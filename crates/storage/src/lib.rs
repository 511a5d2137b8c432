// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loom-storage: atomic persistence for the Loom daemon.

pub mod checkpoint;
pub mod claims;
pub mod failure_log;
pub mod migration;
pub mod paths;
pub mod progress_files;
pub mod recovery_log;
pub mod store;

pub use checkpoint::{read_checkpoint, write_checkpoint, Checkpoint, CheckpointStage};
pub use claims::{Claim, ClaimError, ClaimManager};
pub use failure_log::{FailureEntry, IssueFailureLog, MAX_FAILURES_BEFORE_BLOCK};
pub use migration::MigrationRegistry;
pub use paths::{LoomPaths, CHECKPOINT_FILE, IN_USE_MARKER, NO_CHANGES_MARKER, PR_BODY_FILE};
pub use progress_files::{find_progress_for_issue, find_progress_for_task, read_progress_files};
pub use recovery_log::{
    log_recovery_event, read_recovery_events, RecoveryEvent, MAX_RECOVERY_EVENTS,
};
pub use store::{StateStore, StoreError};
