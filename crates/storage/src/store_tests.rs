// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use loom_core::DaemonState;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Doc {
    #[serde(default)]
    count: u32,
    #[serde(default)]
    name: String,
}

#[test]
fn missing_file_returns_default() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new();
    let doc: Doc = store.load(&dir.path().join("missing.json")).unwrap();
    assert_eq!(doc, Doc::default());
}

#[test]
fn store_then_load_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("doc.json");
    let store = StateStore::new();

    let doc = Doc {
        count: 7,
        name: "seven".into(),
    };
    store.store(&path, &doc).unwrap();
    let back: Doc = store.load(&path).unwrap();
    assert_eq!(back, doc);
}

#[test]
fn store_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a/b/c/doc.json");
    let store = StateStore::new();
    store.store(&path, &Doc::default()).unwrap();
    assert!(path.exists());
}

#[test]
fn no_tmp_file_left_behind() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("doc.json");
    let store = StateStore::new();
    store.store(&path, &Doc::default()).unwrap();
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn corrupt_file_rotated_to_bak_and_default_returned() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("doc.json");
    std::fs::write(&path, "{not json at all").unwrap();

    let store = StateStore::new();
    let doc: Doc = store.load(&path).unwrap();
    assert_eq!(doc, Doc::default());
    assert!(!path.exists());
    assert!(path.with_extension("bak").exists());
}

#[test]
fn bak_rotation_keeps_three() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("doc.json");
    let store = StateStore::new();

    for i in 0..5 {
        std::fs::write(&path, format!("corrupt {i}")).unwrap();
        let _: Doc = store.load(&path).unwrap();
    }

    assert!(path.with_extension("bak").exists());
    assert!(path.with_extension("bak.2").exists());
    assert!(path.with_extension("bak.3").exists());
    assert!(!path.with_extension("bak.4").exists());
    // Newest corruption lands in .bak
    let newest = std::fs::read_to_string(path.with_extension("bak")).unwrap();
    assert_eq!(newest, "corrupt 4");
}

#[test]
fn update_applies_mutator() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("doc.json");
    let store = StateStore::new();

    store
        .update::<Doc, _>(&path, |doc| {
            doc.count += 1;
        })
        .unwrap();
    let result = store
        .update::<Doc, _>(&path, |doc| {
            doc.count += 1;
        })
        .unwrap();
    assert_eq!(result.count, 2);
}

#[test]
fn old_daemon_state_is_migrated_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("daemon-state.json");
    std::fs::write(
        &path,
        r#"{"running": true, "iteration": 12, "shepherds": {}}"#,
    )
    .unwrap();

    let store = StateStore::new();
    let state: DaemonState = store.load(&path).unwrap();
    assert!(state.running);
    assert_eq!(state.iteration, 12);
    assert_eq!(state.schema_version, 2);
}

#[test]
fn unknown_keys_survive_load_without_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("doc.json");
    std::fs::write(&path, r#"{"count": 1, "future_field": [1, 2, 3]}"#).unwrap();

    let store = StateStore::new();
    let doc: Doc = store.load(&path).unwrap();
    assert_eq!(doc.count, 1);
}
