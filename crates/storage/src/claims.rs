// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-based exclusive claims on issues.
//!
//! A claim prevents two agents from working the same issue. Acquisition is
//! create-or-fail on the claim file; a claim past its TTL is treated as
//! absent. Recovery code must check `is_held_valid` before any destructive
//! action on an issue — a freshly spawned CLI worker may hold a claim the
//! daemon knows nothing else about.

use chrono::{DateTime, Utc};
use loom_core::clock::{format_utc, parse_utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use thiserror::Error;
use tracing::{debug, warn};

use crate::paths::LoomPaths;

/// Errors from claim operations
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The claim document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub issue: u64,
    pub holder: String,
    pub acquired_at: String,
    pub ttl_seconds: u64,
}

impl Claim {
    /// True while `acquired_at + ttl` is in the future. Unparseable
    /// timestamps count as expired so a mangled claim never wedges an issue.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        match parse_utc(&self.acquired_at) {
            Some(acquired) => (now - acquired).num_seconds() < self.ttl_seconds as i64,
            None => false,
        }
    }
}

/// Manages exclusive file claims under `.loom/claims/`.
#[derive(Clone)]
pub struct ClaimManager {
    paths: LoomPaths,
    ttl_seconds: u64,
}

impl ClaimManager {
    pub fn new(paths: LoomPaths, ttl_seconds: u64) -> Self {
        Self { paths, ttl_seconds }
    }

    /// Acquire a claim on an issue.
    ///
    /// Returns true on success. Succeeds when no claim exists, when the
    /// existing claim is expired, or when the same holder re-acquires
    /// (idempotent). Returns false while another holder's claim is valid.
    pub fn acquire(&self, issue: u64, holder: &str, now: DateTime<Utc>) -> Result<bool, ClaimError> {
        fs::create_dir_all(self.paths.claims_dir())?;
        let path = self.paths.claim_file(issue);

        match self.read_claim(issue) {
            Some(existing) if existing.is_valid(now) => {
                if existing.holder == holder {
                    debug!(issue, holder, "claim already held by us");
                    return Ok(true);
                }
                debug!(issue, holder = %existing.holder, "claim held by another agent");
                return Ok(false);
            }
            Some(_) => {
                // Expired claim; remove before the create-or-fail below.
                let _ = fs::remove_file(&path);
            }
            None => {}
        }

        let claim = Claim {
            issue,
            holder: holder.to_string(),
            acquired_at: format_utc(now),
            ttl_seconds: self.ttl_seconds,
        };

        // create_new gives atomic create-or-fail semantics; losing the race
        // means someone else claimed between our read and write.
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                file.write_all(serde_json::to_string_pretty(&claim)?.as_bytes())?;
                file.sync_all()?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(issue, holder, "lost claim race");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// True when a claim file exists, parses, and is within TTL.
    pub fn is_held_valid(&self, issue: u64, now: DateTime<Utc>) -> bool {
        self.read_claim(issue)
            .map(|c| c.is_valid(now))
            .unwrap_or(false)
    }

    /// Current holder of a valid claim, if any.
    pub fn holder(&self, issue: u64, now: DateTime<Utc>) -> Option<String> {
        self.read_claim(issue)
            .filter(|c| c.is_valid(now))
            .map(|c| c.holder)
    }

    /// Remove a claim regardless of holder.
    ///
    /// For supervision only: used after the holder has been confirmed dead
    /// (hard reclaim). Normal release paths must use [`Self::release`].
    pub fn invalidate(&self, issue: u64) -> Result<(), ClaimError> {
        let path = self.paths.claim_file(issue);
        if path.exists() {
            fs::remove_file(&path)?;
            warn!(issue, "claim invalidated");
        }
        Ok(())
    }

    /// Release a claim iff the holder matches; silently succeeds otherwise.
    pub fn release(&self, issue: u64, holder: &str) -> Result<(), ClaimError> {
        let path = self.paths.claim_file(issue);
        match self.read_claim(issue) {
            Some(claim) if claim.holder == holder => {
                fs::remove_file(&path)?;
                debug!(issue, holder, "claim released");
            }
            Some(claim) => {
                warn!(
                    issue,
                    holder,
                    actual = %claim.holder,
                    "release skipped: claim held by another agent"
                );
            }
            None => {}
        }
        Ok(())
    }

    fn read_claim(&self, issue: u64) -> Option<Claim> {
        let path = self.paths.claim_file(issue);
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

#[cfg(test)]
#[path = "claims_tests.rs"]
mod tests;
