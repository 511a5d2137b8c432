// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-worktree checkpoints.
//!
//! The worker writes a checkpoint before and after externally visible side
//! effects; the builder validator reads it to tolerate Tracker visibility
//! lag (a PR the worker just created may not be queryable yet).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::paths::CHECKPOINT_FILE;

/// Checkpoint stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStage {
    PreTests,
    Implementing,
    PrCreated,
}

/// The checkpoint document (`<worktree>/.loom-checkpoint`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stage: CheckpointStage,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Checkpoint {
    pub fn new(stage: CheckpointStage, timestamp: impl Into<String>) -> Self {
        Self {
            stage,
            timestamp: timestamp.into(),
            data: serde_json::Map::new(),
        }
    }
}

/// Read the checkpoint from a worktree, if present and parseable.
pub fn read_checkpoint(worktree: &Path) -> Option<Checkpoint> {
    let content = fs::read_to_string(worktree.join(CHECKPOINT_FILE)).ok()?;
    serde_json::from_str(&content).ok()
}

/// Write a checkpoint into a worktree (write-then-rename).
pub fn write_checkpoint(worktree: &Path, checkpoint: &Checkpoint) -> std::io::Result<()> {
    let path = worktree.join(CHECKPOINT_FILE);
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_string_pretty(checkpoint)?)?;
    fs::rename(&tmp, &path)
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
