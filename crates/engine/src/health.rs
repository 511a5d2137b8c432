// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proactive health monitoring: time-series metrics, the composite 0-100
//! score, and alert generation with acknowledgement.

use crate::context::EngineContext;
use crate::snapshot::{PipelineStatus, Snapshot};
use chrono::{DateTime, Utc};
use loom_adapters::{Notifier, SessionHost, Tracker, Vcs};
use loom_core::{
    format_utc, parse_utc, Alert, AlertSeverity, AlertType, AlertsFile, Clock, DaemonMetrics,
    DaemonState, ErrorRates, HealthMetrics, HealthStatus, LatencyMetric, LoomConfig, MetricEntry,
    PipelineHealthMetric, QueueDepths, ResourceUsage, ThroughputMetric,
};
use tracing::warn;

/// Compose a metric entry from the current snapshot and daemon metrics.
pub fn collect_current_metrics(
    snapshot: &Snapshot,
    daemon_metrics: &DaemonMetrics,
    daemon_state: &DaemonState,
    now: DateTime<Utc>,
    session_percent: f64,
) -> MetricEntry {
    // Throughput from completions over daemon uptime
    let mut issues_per_hour = 0.0;
    let mut prs_per_hour = 0.0;
    if let Some(started) = daemon_state.started_at.as_deref().and_then(parse_utc) {
        let hours_running = (now - started).num_seconds() as f64 / 3600.0;
        if hours_running > 0.0 {
            issues_per_hour = daemon_state.completed_issues.len() as f64 / hours_running;
            prs_per_hour = daemon_state.total_prs_merged as f64 / hours_running;
        }
    }

    MetricEntry {
        timestamp: format_utc(now),
        throughput: ThroughputMetric {
            issues_per_hour: (issues_per_hour * 100.0).round() / 100.0,
            prs_per_hour: (prs_per_hour * 100.0).round() / 100.0,
        },
        latency: LatencyMetric {
            avg_iteration_seconds: daemon_metrics.average_iteration_seconds,
        },
        queue_depths: QueueDepths {
            ready: snapshot.counts.ready as i64,
            building: snapshot.counts.building as i64,
            review_requested: snapshot.counts.review_requested as i64,
            changes_requested: snapshot.counts.changes_requested as i64,
            ready_to_merge: snapshot.counts.ready_to_merge as i64,
        },
        error_rates: ErrorRates {
            consecutive_failures: daemon_metrics.health.consecutive_failures,
            success_rate: (daemon_metrics.success_rate() * 10.0).round() / 10.0,
            stuck_agents: snapshot.counts.stale_heartbeats,
        },
        resource_usage: ResourceUsage {
            active_shepherds: snapshot.counts.active_shepherds,
            session_percent,
        },
        pipeline_health: PipelineHealthMetric {
            status: snapshot.pipeline_health.status.as_str().to_string(),
            blocked_count: snapshot.pipeline_health.blocked_count,
            retryable_count: snapshot.pipeline_health.retryable_count,
            permanent_blocked_count: snapshot.pipeline_health.permanent_blocked_count,
            systematic_failure_active: snapshot.systematic_failure.active,
        },
    }
}

/// Composite health score (0-100) from the latest metrics.
///
/// Eight weighted factors, each deducting from 100 by band.
pub fn calculate_health_score(metrics: &HealthMetrics, cfg: &LoomConfig) -> u32 {
    let Some(latest) = metrics.metrics.last() else {
        return 100;
    };
    let mut score: i64 = 100;

    // Factor 1: error rate (up to -25)
    let sr = latest.error_rates.success_rate;
    if sr < 50.0 {
        score -= 25;
    } else if sr < 70.0 {
        score -= 15;
    } else if sr < 90.0 {
        score -= 5;
    }

    // Factor 2: consecutive failures (up to -15)
    let cf = latest.error_rates.consecutive_failures;
    if cf >= 5 {
        score -= 15;
    } else if cf >= 3 {
        score -= 10;
    } else if cf >= 1 {
        score -= 5;
    }

    // Factor 3: stuck agents (up to -20)
    let stuck = latest.error_rates.stuck_agents;
    if stuck >= 3 {
        score -= 20;
    } else if stuck >= 2 {
        score -= 15;
    } else if stuck >= 1 {
        score -= 10;
    }

    // Factor 4: queue growth vs the previous sample (up to -15)
    if metrics.metrics.len() >= 2 {
        let prev = &metrics.metrics[metrics.metrics.len() - 2];
        let growth = latest.queue_depths.ready - prev.queue_depths.ready;
        if growth >= cfg.queue_growth_threshold {
            score -= 15;
        } else if growth >= 3 {
            score -= 10;
        } else if growth >= 1 {
            score -= 5;
        }
    }

    // Factor 5: session budget usage (up to -15)
    let sp = latest.resource_usage.session_percent;
    if sp >= 95.0 {
        score -= 15;
    } else if sp >= 90.0 {
        score -= 10;
    } else if sp >= 80.0 {
        score -= 5;
    }

    // Factor 6: throughput decline (up to -15)
    if metrics.metrics.len() >= 2 {
        let prev = &metrics.metrics[metrics.metrics.len() - 2];
        let prev_throughput = prev.throughput.issues_per_hour;
        let cur_throughput = latest.throughput.issues_per_hour;
        if prev_throughput > 0.0 && cur_throughput < prev_throughput {
            let decline_pct = ((prev_throughput - cur_throughput) * 100.0) / prev_throughput;
            if decline_pct >= cfg.throughput_decline_threshold as f64 {
                score -= 15;
            } else if decline_pct >= 30.0 {
                score -= 10;
            } else if decline_pct >= 10.0 {
                score -= 5;
            }
        }
    }

    // Factor 7: pipeline stalled/degraded (-20/-10)
    match latest.pipeline_health.status.as_str() {
        "stalled" => score -= 20,
        "degraded" => score -= 10,
        _ => {}
    }

    // Factor 8: systemic failure (-15)
    if latest.pipeline_health.systematic_failure_active {
        score -= 15;
    }

    score.clamp(0, 100) as u32
}

/// Generate alerts from the latest metric sample.
pub fn generate_alerts(
    metrics: &HealthMetrics,
    cfg: &LoomConfig,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let Some(latest) = metrics.metrics.last() else {
        return Vec::new();
    };
    let timestamp = format_utc(now);
    let epoch = now.timestamp();
    let mut alerts = Vec::new();

    let stuck = latest.error_rates.stuck_agents;
    if stuck >= 1 {
        let severity = if stuck >= 3 {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        alerts.push(
            Alert::new(
                AlertType::StuckAgents,
                severity,
                format!("{stuck} agent(s) with stale heartbeats"),
                &timestamp,
                epoch,
            )
            .with_context("stuck_count", stuck),
        );
    }

    let cf = latest.error_rates.consecutive_failures;
    if cf >= 3 {
        let severity = if cf >= 5 {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        alerts.push(
            Alert::new(
                AlertType::HighErrorRate,
                severity,
                format!("{cf} consecutive iteration failures"),
                &timestamp,
                epoch,
            )
            .with_context("consecutive_failures", cf),
        );
    }

    let sp = latest.resource_usage.session_percent;
    if sp >= 90.0 {
        let severity = if sp >= 97.0 {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        alerts.push(
            Alert::new(
                AlertType::ResourceExhaustion,
                severity,
                format!("Session budget at {sp}%"),
                &timestamp,
                epoch,
            )
            .with_context("session_percent", sp),
        );
    }

    if latest.pipeline_health.status == "stalled" {
        let blocked = latest.pipeline_health.blocked_count;
        let retryable = latest.pipeline_health.retryable_count;
        let permanent = latest.pipeline_health.permanent_blocked_count;
        let severity = if retryable == 0 {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        alerts.push(
            Alert::new(
                AlertType::PipelineStall,
                severity,
                format!(
                    "Pipeline stalled: {blocked} blocked ({retryable} retryable, {permanent} permanent)"
                ),
                &timestamp,
                epoch,
            )
            .with_context("blocked_count", blocked)
            .with_context("retryable_count", retryable)
            .with_context("permanent_blocked_count", permanent),
        );
    }

    if latest.pipeline_health.systematic_failure_active {
        alerts.push(Alert::new(
            AlertType::SystematicFailure,
            AlertSeverity::Critical,
            "Systematic failure detected - shepherd spawning paused",
            &timestamp,
            epoch,
        ));
    }

    if metrics.metrics.len() >= 2 {
        let prev = &metrics.metrics[metrics.metrics.len() - 2];
        let growth = latest.queue_depths.ready - prev.queue_depths.ready;
        if growth >= cfg.queue_growth_threshold {
            alerts.push(
                Alert::new(
                    AlertType::QueueGrowth,
                    AlertSeverity::Warning,
                    format!(
                        "Ready queue grew by {growth} (now {})",
                        latest.queue_depths.ready
                    ),
                    &timestamp,
                    epoch,
                )
                .with_context("growth", growth)
                .with_context("current", latest.queue_depths.ready),
            );
        }
    }

    alerts
}

/// Collect metrics, update the health score, and store new alerts.
///
/// Returns the resulting health score and status.
pub async fn collect<T, S, V, C, N>(
    ctx: &EngineContext<T, S, V, C>,
    notifier: &N,
    snapshot: &Snapshot,
    session_percent: f64,
) -> Result<(u32, HealthStatus), loom_storage::StoreError>
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
    N: Notifier,
{
    let now = ctx.clock.now_utc();
    let timestamp = format_utc(now);

    let daemon_metrics: DaemonMetrics = ctx.store.load(&ctx.paths.daemon_metrics())?;
    let daemon_state: DaemonState = ctx.store.load(&ctx.paths.daemon_state())?;
    let entry =
        collect_current_metrics(snapshot, &daemon_metrics, &daemon_state, now, session_percent);

    let retention = ctx.config.health_retention_hours;
    let cfg = ctx.config.clone();
    let mut score = 100;
    let mut status = HealthStatus::Excellent;
    let health = ctx
        .store
        .update::<HealthMetrics, _>(&ctx.paths.health_metrics(), |health| {
            if health.initialized_at.is_empty() {
                health.initialized_at = timestamp.clone();
                health.retention_hours = retention;
            }
            health.metrics.push(entry.clone());

            // Prune samples older than the retention window
            let cutoff = now - chrono::Duration::hours(retention as i64);
            health
                .metrics
                .retain(|m| parse_utc(&m.timestamp).map(|t| t > cutoff).unwrap_or(false));

            score = calculate_health_score(health, &cfg);
            status = HealthStatus::from_score(score);
            health.health_score = score;
            health.health_status = status;
            health.last_updated = timestamp.clone();
        })?;

    let new_alerts = generate_alerts(&health, &ctx.config, now);
    if !new_alerts.is_empty() {
        let has_critical = new_alerts
            .iter()
            .any(|a| a.severity == AlertSeverity::Critical);
        let first_critical = new_alerts
            .iter()
            .find(|a| a.severity == AlertSeverity::Critical)
            .map(|a| a.message.clone());

        ctx.store
            .update::<AlertsFile, _>(&ctx.paths.alerts(), |alerts| {
                if alerts.initialized_at.is_empty() {
                    alerts.initialized_at = timestamp.clone();
                }
                alerts.push_bounded(new_alerts.clone());
            })?;

        if has_critical {
            if let Some(message) = first_critical {
                notifier.notify("loom: critical alert", &message).await;
            }
        }
    }

    Ok((score, status))
}

/// Mark an alert acknowledged. Returns false when the id is unknown.
pub fn acknowledge_alert<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    alert_id: &str,
) -> Result<bool, loom_storage::StoreError>
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let timestamp = ctx.timestamp();
    let mut found = false;
    ctx.store
        .update::<AlertsFile, _>(&ctx.paths.alerts(), |alerts| {
            for alert in &mut alerts.alerts {
                if alert.id == alert_id {
                    alert.acknowledged = true;
                    alert.acknowledged_at = Some(timestamp.clone());
                    found = true;
                    break;
                }
            }
        })?;
    if !found {
        warn!(alert_id, "acknowledge requested for unknown alert");
    }
    Ok(found)
}

/// Clear all alerts.
pub fn clear_alerts<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
) -> Result<(), loom_storage::StoreError>
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let timestamp = ctx.timestamp();
    ctx.store.store(
        &ctx.paths.alerts(),
        &AlertsFile {
            initialized_at: timestamp,
            alerts: Vec::new(),
        },
    )?;
    Ok(())
}

/// Whether the latest stored sample reports a stalled pipeline.
pub fn pipeline_stalled_in_latest_sample<T, S, V, C>(ctx: &EngineContext<T, S, V, C>) -> bool
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    ctx.store
        .load::<HealthMetrics>(&ctx.paths.health_metrics())
        .ok()
        .and_then(|h| h.metrics.last().map(|m| m.pipeline_health.status.clone()))
        .map(|status| status == PipelineStatus::Stalled.as_str())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
