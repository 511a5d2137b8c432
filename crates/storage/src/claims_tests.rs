// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use tempfile::TempDir;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).single().unwrap()
}

fn manager(dir: &TempDir) -> ClaimManager {
    ClaimManager::new(LoomPaths::new(dir.path()), 3600)
}

#[test]
fn acquire_then_check_then_release() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(&dir);

    assert!(mgr.acquire(42, "shepherd-1", now()).unwrap());
    assert!(mgr.is_held_valid(42, now()));
    assert_eq!(mgr.holder(42, now()).as_deref(), Some("shepherd-1"));

    mgr.release(42, "shepherd-1").unwrap();
    assert!(!mgr.is_held_valid(42, now()));
}

#[test]
fn reacquire_by_same_holder_is_noop_ok() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(&dir);

    assert!(mgr.acquire(42, "shepherd-1", now()).unwrap());
    assert!(mgr.acquire(42, "shepherd-1", now()).unwrap());
    assert!(mgr.is_held_valid(42, now()));
}

#[test]
fn acquire_by_other_holder_fails_during_validity() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(&dir);

    assert!(mgr.acquire(42, "shepherd-1", now()).unwrap());
    assert!(!mgr.acquire(42, "shepherd-2", now()).unwrap());
    assert_eq!(mgr.holder(42, now()).as_deref(), Some("shepherd-1"));
}

#[test]
fn expired_claim_can_be_taken_over() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(&dir);

    assert!(mgr.acquire(42, "shepherd-1", now()).unwrap());
    let later = now() + chrono::Duration::seconds(3601);
    assert!(!mgr.is_held_valid(42, later));
    assert!(mgr.acquire(42, "shepherd-2", later).unwrap());
    assert_eq!(mgr.holder(42, later).as_deref(), Some("shepherd-2"));
}

#[test]
fn claim_valid_exactly_at_ttl_boundary_is_expired() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(&dir);

    assert!(mgr.acquire(42, "shepherd-1", now()).unwrap());
    let at_ttl = now() + chrono::Duration::seconds(3600);
    assert!(!mgr.is_held_valid(42, at_ttl));
    let just_before = now() + chrono::Duration::seconds(3599);
    assert!(mgr.is_held_valid(42, just_before));
}

#[test]
fn release_by_wrong_holder_is_silent_and_preserves_claim() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(&dir);

    assert!(mgr.acquire(42, "shepherd-1", now()).unwrap());
    mgr.release(42, "shepherd-2").unwrap();
    assert!(mgr.is_held_valid(42, now()));
}

#[test]
fn release_without_claim_is_silent() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(&dir);
    mgr.release(999, "shepherd-1").unwrap();
}

#[test]
fn mangled_claim_file_counts_as_expired() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(&dir);

    std::fs::create_dir_all(LoomPaths::new(dir.path()).claims_dir()).unwrap();
    std::fs::write(LoomPaths::new(dir.path()).claim_file(42), "not json").unwrap();

    assert!(!mgr.is_held_valid(42, now()));
    assert!(mgr.acquire(42, "shepherd-1", now()).unwrap());
}

#[test]
fn invalidate_removes_regardless_of_holder() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(&dir);

    assert!(mgr.acquire(42, "shepherd-1", now()).unwrap());
    mgr.invalidate(42).unwrap();
    assert!(!mgr.is_held_valid(42, now()));
    // Idempotent on a missing claim
    mgr.invalidate(42).unwrap();
}

#[test]
fn claims_are_per_issue() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(&dir);

    assert!(mgr.acquire(42, "shepherd-1", now()).unwrap());
    assert!(mgr.acquire(43, "shepherd-2", now()).unwrap());
    assert_eq!(mgr.holder(42, now()).as_deref(), Some("shepherd-1"));
    assert_eq!(mgr.holder(43, now()).as_deref(), Some("shepherd-2"));
}
