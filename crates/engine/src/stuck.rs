// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stuck agent detection.
//!
//! Observation gathers raw signals (heartbeat age, output idle, repeated
//! errors, PR existence); evaluation runs the detector registry over those
//! signals and merges the results, taking the maximum severity. Stuck means
//! running but struggling — orphan recovery handles the not-running case.

use crate::context::EngineContext;
use chrono::{DateTime, Utc};
use loom_adapters::{SessionHost, Tracker, Vcs};
use loom_core::{
    elapsed_seconds, feature_branch, format_utc, Clock, DetectionResult, ShepherdEntry,
    ShepherdProgress, StuckDetection, StuckHistory, StuckHistoryEntry, StuckMetrics,
    StuckSeverity, StuckThresholds, SuggestedIntervention,
};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

// Allow expect here as the regexes are compile-time verified to be valid
#[allow(clippy::expect_used)]
static LOOP_ERROR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error|failed|exception|cannot|unable")
        .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static SPIKE_ERROR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error|failed|exception|panic|fatal").expect("constant regex pattern is valid")
});

/// Raw observations about one agent, gathered before evaluation.
#[derive(Debug, Clone, Default)]
pub struct StuckProbe {
    pub agent_id: String,
    pub issue: Option<u64>,
    pub status: String,
    /// Seconds since the last heartbeat; `None` when no heartbeat exists.
    pub heartbeat_age: Option<i64>,
    /// Seconds since the output file last changed; `None` without a file.
    pub output_idle: Option<i64>,
    /// Seconds since the shepherd started working this issue.
    pub working_seconds: Option<i64>,
    /// Whether a PR for the issue already exists on the tracker.
    pub pr_exists: bool,
    /// Max repetitions of a single error line in the recent output.
    pub loop_count: u32,
    /// Error-pattern matches in the wider recent output window.
    pub error_count: u32,
    /// Whether the `worktree_created` milestone has been recorded.
    pub has_worktree_milestone: bool,
    pub current_phase: String,
}

/// Read approximately the last `lines` lines of a file.
fn read_tail(path: &Path, lines: usize) -> Vec<String> {
    let Ok(content) = std::fs::read(path) else {
        return Vec::new();
    };
    // ~100 bytes/line estimate keeps large logs cheap to scan
    let start = content.len().saturating_sub(lines * 100);
    let text = String::from_utf8_lossy(&content[start..]);
    let collected: Vec<String> = text.lines().map(|l| l.to_string()).collect();
    let skip = collected.len().saturating_sub(lines);
    collected.into_iter().skip(skip).collect()
}

/// Max repetitions of any single error-matching line.
fn count_repeated_errors(lines: &[String]) -> u32 {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for line in lines {
        if LOOP_ERROR_PATTERN.is_match(line) {
            *counts.entry(line.as_str()).or_insert(0) += 1;
        }
    }
    counts.values().copied().max().unwrap_or(0)
}

/// Total error-pattern matches in the window.
fn count_errors(lines: &[String]) -> u32 {
    lines
        .iter()
        .filter(|l| SPIKE_ERROR_PATTERN.is_match(l))
        .count() as u32
}

/// Whether an open PR exists for the issue (closing keyword or branch name).
async fn pr_exists_for_issue<T: Tracker>(tracker: &T, issue: u64) -> bool {
    for keyword in ["Closes", "Fixes", "Resolves"] {
        if let Ok(Some(_)) = tracker.search_open_prs(&format!("{keyword} #{issue}")).await {
            return true;
        }
    }
    matches!(
        tracker
            .find_pr_by_head(&feature_branch(issue), loom_adapters::EntityState::Open)
            .await,
        Ok(Some(_))
    )
}

/// Gather raw stuck signals for one working shepherd.
pub async fn observe<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    agent_id: &str,
    entry: &ShepherdEntry,
    progress: Option<&ShepherdProgress>,
    now: DateTime<Utc>,
) -> StuckProbe
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let mut probe = StuckProbe {
        agent_id: agent_id.to_string(),
        issue: entry.issue,
        status: if entry.is_working() {
            "working".to_string()
        } else {
            "idle".to_string()
        },
        ..Default::default()
    };

    if let Some(progress) = progress {
        probe.current_phase = progress.current_phase.clone();
        probe.has_worktree_milestone = progress.has_milestone("worktree_created");
        if let Some(heartbeat) = progress.last_heartbeat.as_deref() {
            probe.heartbeat_age = elapsed_seconds(heartbeat, now);
        }
    }

    if let Some(started) = entry.started.as_deref() {
        probe.working_seconds = elapsed_seconds(started, now);
    }

    if let Some(output_file) = entry.output_file.as_deref() {
        let path = Path::new(output_file);
        if let Ok(meta) = path.metadata() {
            if let Ok(modified) = meta.modified() {
                let mtime: DateTime<Utc> = modified.into();
                probe.output_idle = Some((now - mtime).num_seconds());
            }
        }
        let tail = read_tail(path, 500);
        probe.error_count = count_errors(&tail);
        let last_100_skip = tail.len().saturating_sub(100);
        probe.loop_count = count_repeated_errors(&tail[last_100_skip..]);
    }

    if let Some(issue) = entry.issue {
        // Only query the tracker when the extended-work detector could fire.
        let working_long = probe
            .working_seconds
            .map(|w| w >= ctx.config.stuck_working_threshold as i64)
            .unwrap_or(false);
        if working_long {
            probe.pr_exists = pr_exists_for_issue(&ctx.tracker, issue).await;
        }
    }

    probe
}

type Detector = fn(&StuckProbe, &StuckThresholds) -> DetectionResult;

/// The detector registry, evaluated in order.
///
/// Heartbeat-based idle takes precedence over output-file idle: the first
/// detector consumes the heartbeat signal, the second only fires when no
/// heartbeat is available.
const DETECTORS: &[Detector] = &[
    detect_stale_heartbeat,
    detect_idle_timeout,
    detect_extended_work,
    detect_loop,
    detect_error_spike,
    detect_missing_milestone,
];

fn detect_stale_heartbeat(probe: &StuckProbe, thresholds: &StuckThresholds) -> DetectionResult {
    match probe.heartbeat_age {
        Some(age) if age >= thresholds.idle as i64 => DetectionResult::detected(
            format!("stale_heartbeat:{age}s"),
            StuckSeverity::Warning,
            SuggestedIntervention::Alert,
        ),
        _ => DetectionResult::clear(),
    }
}

fn detect_idle_timeout(probe: &StuckProbe, thresholds: &StuckThresholds) -> DetectionResult {
    if probe.heartbeat_age.is_some() {
        return DetectionResult::clear();
    }
    match probe.output_idle {
        Some(idle) if idle >= thresholds.idle as i64 => DetectionResult::detected(
            format!("no_progress:{idle}s"),
            StuckSeverity::Warning,
            SuggestedIntervention::Alert,
        ),
        _ => DetectionResult::clear(),
    }
}

fn detect_extended_work(probe: &StuckProbe, thresholds: &StuckThresholds) -> DetectionResult {
    match probe.working_seconds {
        Some(working) if working >= thresholds.working as i64 && !probe.pr_exists => {
            DetectionResult::detected(
                format!("extended_work:{working}s"),
                StuckSeverity::Elevated,
                SuggestedIntervention::Suggest,
            )
        }
        _ => DetectionResult::clear(),
    }
}

fn detect_loop(probe: &StuckProbe, thresholds: &StuckThresholds) -> DetectionResult {
    if probe.loop_count >= thresholds.loop_count {
        DetectionResult::detected(
            format!("looping:{}x", probe.loop_count),
            StuckSeverity::Critical,
            SuggestedIntervention::Pause,
        )
    } else {
        DetectionResult::clear()
    }
}

fn detect_error_spike(probe: &StuckProbe, thresholds: &StuckThresholds) -> DetectionResult {
    if probe.error_count >= thresholds.error_spike {
        DetectionResult::detected(
            format!("error_spike:{}", probe.error_count),
            StuckSeverity::Elevated,
            SuggestedIntervention::Clarify,
        )
    } else {
        DetectionResult::clear()
    }
}

fn detect_missing_milestone(probe: &StuckProbe, thresholds: &StuckThresholds) -> DetectionResult {
    match probe.working_seconds {
        Some(working)
            if working > thresholds.no_worktree as i64 && !probe.has_worktree_milestone =>
        {
            DetectionResult::detected(
                "missing_milestone:worktree_created",
                StuckSeverity::Warning,
                SuggestedIntervention::Alert,
            )
        }
        _ => DetectionResult::clear(),
    }
}

/// Evaluate all detectors over a probe and merge the results.
pub fn evaluate(probe: &StuckProbe, thresholds: &StuckThresholds, now: DateTime<Utc>) -> StuckDetection {
    let mut indicators = Vec::new();
    let mut severity = StuckSeverity::None;
    let mut intervention = SuggestedIntervention::None;

    for detector in DETECTORS {
        let result = detector(probe, thresholds);
        if !result.detected {
            continue;
        }
        if let Some(indicator) = result.indicator {
            indicators.push(indicator);
        }
        if result.severity > severity {
            severity = result.severity;
            intervention = result.suggested_intervention;
        }
    }

    StuckDetection {
        agent_id: probe.agent_id.clone(),
        issue: probe.issue,
        status: probe.status.clone(),
        stuck: !indicators.is_empty(),
        severity,
        suggested_intervention: intervention,
        indicators,
        metrics: StuckMetrics {
            idle_seconds: probe.heartbeat_age.or(probe.output_idle).unwrap_or(0),
            working_seconds: probe.working_seconds.unwrap_or(0),
            loop_count: probe.loop_count,
            error_count: probe.error_count,
            heartbeat_age: probe.heartbeat_age.unwrap_or(-1),
            current_phase: probe.current_phase.clone(),
        },
        checked_at: format_utc(now),
    }
}

/// Append a detection to the bounded stuck history document.
pub fn record_detection<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    detection: &StuckDetection,
) -> Result<(), loom_storage::StoreError>
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let now = ctx.timestamp();
    ctx.store
        .update::<StuckHistory, _>(&ctx.paths.stuck_history(), |history| {
            if history.created_at.is_empty() {
                history.created_at = now.clone();
            }
            history.push_bounded(StuckHistoryEntry {
                detected_at: now.clone(),
                detection: detection.clone(),
            });
        })?;
    Ok(())
}

#[cfg(test)]
#[path = "stuck_tests.rs"]
mod tests;
