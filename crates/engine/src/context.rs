// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine context: configuration, clock, and external collaborators.
//!
//! Everything the engine touches flows through this value; there are no
//! hidden singletons. Tests swap in fake adapters and a fake clock.

use loom_adapters::{SessionHost, Tracker, Vcs};
use loom_core::{Clock, LoomConfig};
use loom_storage::{ClaimManager, LoomPaths, StateStore};

/// Shared context threaded through engine components.
#[derive(Clone)]
pub struct EngineContext<T, S, V, C> {
    pub tracker: T,
    pub sessions: S,
    pub vcs: V,
    pub clock: C,
    pub store: StateStore,
    pub paths: LoomPaths,
    pub claims: ClaimManager,
    pub config: LoomConfig,
}

impl<T, S, V, C> EngineContext<T, S, V, C>
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    pub fn new(
        tracker: T,
        sessions: S,
        vcs: V,
        clock: C,
        paths: LoomPaths,
        config: LoomConfig,
    ) -> Self {
        let claims = ClaimManager::new(paths.clone(), config.claim_ttl);
        Self {
            tracker,
            sessions,
            vcs,
            clock,
            store: StateStore::new(),
            paths,
            claims,
            config,
        }
    }

    /// Current wall-clock RFC-3339 timestamp.
    pub fn timestamp(&self) -> String {
        self.clock.timestamp()
    }
}
