// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

#[test]
fn write_then_read() {
    let dir = TempDir::new().unwrap();
    let cp = Checkpoint::new(CheckpointStage::PrCreated, "2026-01-15T12:00:00Z");
    write_checkpoint(dir.path(), &cp).unwrap();

    let back = read_checkpoint(dir.path()).unwrap();
    assert_eq!(back.stage, CheckpointStage::PrCreated);
    assert_eq!(back.timestamp, "2026-01-15T12:00:00Z");
}

#[test]
fn missing_checkpoint_is_none() {
    let dir = TempDir::new().unwrap();
    assert!(read_checkpoint(dir.path()).is_none());
}

#[test]
fn corrupt_checkpoint_is_none() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(CHECKPOINT_FILE), "garbage").unwrap();
    assert!(read_checkpoint(dir.path()).is_none());
}

#[test]
fn stage_serializes_snake_case() {
    let cp = Checkpoint::new(CheckpointStage::PreTests, "t");
    let json = serde_json::to_string(&cp).unwrap();
    assert!(json.contains(r#""stage":"pre_tests""#));
}
