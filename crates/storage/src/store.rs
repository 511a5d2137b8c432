// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic, typed JSON document persistence.
//!
//! Writes are write-then-rename on the same filesystem. Within one process,
//! writes are serialized per store; there is no cross-process lock —
//! correctness relies on session ownership (daemon state) and claims.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::migration::MigrationRegistry;

/// Errors that can occur in store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Typed JSON document store over a fixed directory layout.
#[derive(Clone)]
pub struct StateStore {
    migrations: Arc<MigrationRegistry>,
    // Serializes write-then-rename sequences within this process.
    write_lock: Arc<Mutex<()>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            migrations: Arc::new(MigrationRegistry::new()),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load a typed document.
    ///
    /// A missing file returns the type's default. A corrupt file is rotated
    /// to a `.bak` and the default returned, so one bad document never wedges
    /// the daemon. Documents carrying an older `schema_version` are migrated
    /// before deserialization.
    pub fn load<T>(&self, path: &Path) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Default,
    {
        if !path.exists() {
            return Ok(T::default());
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let value: serde_json::Value = match serde_json::from_reader(reader) {
            Ok(v) => v,
            Err(e) => {
                let bak = rotate_bak_path(path);
                warn!(
                    error = %e,
                    path = %path.display(),
                    bak = %bak.display(),
                    "corrupt document, moving to .bak and starting fresh",
                );
                fs::rename(path, &bak)?;
                return Ok(T::default());
            }
        };

        let value = self.migrations.migrate(path, value);
        match serde_json::from_value(value) {
            Ok(doc) => Ok(doc),
            Err(e) => {
                let bak = rotate_bak_path(path);
                warn!(
                    error = %e,
                    path = %path.display(),
                    bak = %bak.display(),
                    "unreadable document shape, moving to .bak and starting fresh",
                );
                fs::rename(path, &bak)?;
                Ok(T::default())
            }
        }
    }

    /// Store a typed document atomically (write to `.tmp`, fsync, rename).
    pub fn store<T>(&self, path: &Path, doc: &T) -> Result<(), StoreError>
    where
        T: Serialize,
    {
        let _guard = self.write_lock.lock();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, doc)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Load, mutate, and store a document in one step.
    pub fn update<T, F>(&self, path: &Path, mutator: F) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T),
    {
        let mut doc: T = self.load(path)?;
        mutator(&mut doc);
        self.store(path, &doc)?;
        Ok(doc)
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`.
/// The oldest backup is removed when the limit is reached.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
