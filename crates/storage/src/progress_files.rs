// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reading the per-shepherd progress directory.
//!
//! The daemon only reads these files; the owning worker writes them.
//! Unparsable files are skipped with a warning rather than failing the
//! whole scan.

use loom_core::ShepherdProgress;
use std::fs;
use tracing::warn;

use crate::paths::LoomPaths;

/// Read all `shepherd-*.json` progress documents.
pub fn read_progress_files(paths: &LoomPaths) -> Vec<ShepherdProgress> {
    let dir = paths.progress_dir();
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut result = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with("shepherd-") || !name.ends_with(".json") {
            continue;
        }
        match fs::read_to_string(entry.path()) {
            Ok(content) => match serde_json::from_str::<ShepherdProgress>(&content) {
                Ok(progress) => result.push(progress),
                Err(e) => {
                    warn!(file = %name, error = %e, "skipping unparsable progress file");
                }
            },
            Err(e) => {
                warn!(file = %name, error = %e, "skipping unreadable progress file");
            }
        }
    }
    // Stable order for deterministic snapshots
    result.sort_by(|a, b| a.task_id.cmp(&b.task_id));
    result
}

/// Find the progress document for a task id.
pub fn find_progress_for_task(paths: &LoomPaths, task_id: &str) -> Option<ShepherdProgress> {
    let content = fs::read_to_string(paths.progress_file(task_id)).ok()?;
    serde_json::from_str(&content).ok()
}

/// Find a progress document for an issue (first match by task-id order).
pub fn find_progress_for_issue(paths: &LoomPaths, issue: u64) -> Option<ShepherdProgress> {
    read_progress_files(paths)
        .into_iter()
        .find(|p| p.issue == Some(issue))
}

#[cfg(test)]
#[path = "progress_files_tests.rs"]
mod tests;
