// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn success_resets_consecutive_failures() {
    let mut metrics = DaemonMetrics::new("2026-01-15T12:00:00Z");
    metrics.record_iteration(IterationStatus::Failure, 10, "boom", "t1");
    metrics.record_iteration(IterationStatus::Failure, 10, "boom", "t2");
    assert_eq!(metrics.health.consecutive_failures, 2);

    metrics.record_iteration(IterationStatus::Success, 5, "ok", "t3");
    assert_eq!(metrics.health.consecutive_failures, 0);
    assert_eq!(metrics.health.status, "healthy");
    assert_eq!(metrics.health.last_success.as_deref(), Some("t3"));
}

#[test]
fn three_consecutive_failures_are_unhealthy() {
    let mut metrics = DaemonMetrics::new("t0");
    for i in 0..3 {
        metrics.record_iteration(IterationStatus::Timeout, 300, "timeout", &format!("t{i}"));
    }
    assert_eq!(metrics.health.status, "unhealthy");
    assert_eq!(metrics.timeout_iterations, 3);
}

#[test]
fn rolling_average_uses_at_most_100_samples() {
    let mut metrics = DaemonMetrics::new("t0");
    // 150 iterations of 10s, then 100 of 20s: only the last 100 count.
    for i in 0..150 {
        metrics.record_iteration(IterationStatus::Success, 10, "ok", &format!("t{i}"));
    }
    for i in 0..100 {
        metrics.record_iteration(IterationStatus::Success, 20, "ok", &format!("u{i}"));
    }
    assert_eq!(metrics.iteration_durations.len(), MAX_DURATION_SAMPLES);
    assert_eq!(metrics.average_iteration_seconds, 20);
    assert_eq!(metrics.max_duration(), 20);
}

#[test]
fn average_is_mean_of_retained_window() {
    let mut metrics = DaemonMetrics::new("t0");
    for (i, d) in [10u64, 20, 30].iter().enumerate() {
        metrics.record_iteration(IterationStatus::Success, *d, "ok", &format!("t{i}"));
    }
    assert_eq!(metrics.average_iteration_seconds, 20);
    let expected: u64 =
        metrics.iteration_durations.iter().sum::<u64>() / metrics.iteration_durations.len() as u64;
    assert_eq!(metrics.average_iteration_seconds, expected);
}

#[test]
fn success_rate_bounds() {
    let mut metrics = DaemonMetrics::new("t0");
    assert_eq!(metrics.success_rate(), 100.0);
    metrics.record_iteration(IterationStatus::Success, 1, "ok", "t1");
    metrics.record_iteration(IterationStatus::Failure, 1, "no", "t2");
    assert_eq!(metrics.success_rate(), 50.0);
}
