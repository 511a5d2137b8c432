// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Short-TTL memoized label reads with targeted invalidation.
//!
//! Label reads dominate the Tracker call budget during validation; a short
//! TTL keeps them fresh enough for the label state machine while recovery
//! paths invalidate the exact entity they just mutated.

use crate::tracker::{Tracker, TrackerError};
use loom_core::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct CachedLabels {
    labels: Vec<String>,
    fetched_at: Instant,
}

#[derive(Default)]
struct Inner {
    issues: HashMap<u64, CachedLabels>,
    prs: HashMap<u64, CachedLabels>,
}

/// TTL-memoized label reads over a [`Tracker`].
#[derive(Clone)]
pub struct LabelCache<T, C> {
    tracker: T,
    clock: C,
    ttl: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl<T: Tracker, C: Clock> LabelCache<T, C> {
    /// Default cache TTL.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

    pub fn new(tracker: T, clock: C, ttl: Duration) -> Self {
        Self {
            tracker,
            clock,
            ttl,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub async fn issue_labels(&self, issue: u64) -> Result<Vec<String>, TrackerError> {
        let now = self.clock.now();
        if let Some(cached) = self.inner.lock().issues.get(&issue) {
            if now.duration_since(cached.fetched_at) < self.ttl {
                return Ok(cached.labels.clone());
            }
        }
        let labels = self.tracker.issue_labels(issue).await?;
        self.inner.lock().issues.insert(
            issue,
            CachedLabels {
                labels: labels.clone(),
                fetched_at: now,
            },
        );
        Ok(labels)
    }

    pub async fn pr_labels(&self, pr: u64) -> Result<Vec<String>, TrackerError> {
        let now = self.clock.now();
        if let Some(cached) = self.inner.lock().prs.get(&pr) {
            if now.duration_since(cached.fetched_at) < self.ttl {
                return Ok(cached.labels.clone());
            }
        }
        let labels = self.tracker.pr_labels(pr).await?;
        self.inner.lock().prs.insert(
            pr,
            CachedLabels {
                labels: labels.clone(),
                fetched_at: now,
            },
        );
        Ok(labels)
    }

    pub fn invalidate_issue(&self, issue: u64) {
        self.inner.lock().issues.remove(&issue);
    }

    pub fn invalidate_pr(&self, pr: u64) {
        self.inner.lock().prs.remove(&pr);
    }
}

#[cfg(test)]
#[path = "label_cache_tests.rs"]
mod tests;
