// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema migration for persisted documents.
//!
//! Documents carry a `schema_version` field; older documents are upgraded
//! stepwise on load. Documents without a version are treated as version 1.
//! Unknown future versions pass through untouched — forward compatibility
//! comes from serde ignoring unknown keys.

use loom_core::daemon_state::DAEMON_STATE_VERSION;
use serde_json::Value;
use std::path::Path;
use tracing::info;

type MigrationFn = fn(Value) -> Value;

/// Registry of per-document migration chains.
pub struct MigrationRegistry {
    daemon_state: Vec<(u32, MigrationFn)>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self {
            // (from_version, migration) pairs applied in order
            daemon_state: vec![(1, migrate_daemon_state_v1_to_v2)],
        }
    }

    /// Migrate a document value loaded from `path` to the current schema.
    ///
    /// Only the daemon state document is versioned today; other documents
    /// pass through unchanged.
    pub fn migrate(&self, path: &Path, value: Value) -> Value {
        let is_daemon_state = path
            .file_name()
            .map(|n| n == "daemon-state.json")
            .unwrap_or(false);
        if !is_daemon_state {
            return value;
        }
        self.migrate_daemon_state(value)
    }

    fn migrate_daemon_state(&self, mut value: Value) -> Value {
        let mut version = value
            .get("schema_version")
            .and_then(|v| v.as_u64())
            .unwrap_or(1) as u32;

        for (from, migration) in &self.daemon_state {
            if version == *from && version < DAEMON_STATE_VERSION {
                info!(from = version, to = version + 1, "migrating daemon state");
                value = migration(value);
                version += 1;
            }
        }

        if let Value::Object(ref mut map) = value {
            map.insert("schema_version".to_string(), Value::from(version));
        }
        value
    }
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// v1 → v2: `support_roles` and `systematic_failure` became first-class
/// sections; older states stored neither.
fn migrate_daemon_state_v1_to_v2(mut value: Value) -> Value {
    if let Value::Object(ref mut map) = value {
        map.entry("support_roles")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        map.entry("systematic_failure").or_insert_with(|| {
            serde_json::json!({
                "active": false,
                "pattern": "",
                "count": 0,
                "probe_count": 0,
            })
        });
        map.insert("schema_version".to_string(), Value::from(2));
    }
    value
}

#[cfg(test)]
#[path = "migration_tests.rs"]
mod tests;
