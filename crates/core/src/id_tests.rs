// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashSet;
use yare::parameterized;

#[test]
fn task_id_display_and_as_str() {
    let id = TaskId::new("a1b2c3d");
    assert_eq!(id.as_str(), "a1b2c3d");
    assert_eq!(id.to_string(), "a1b2c3d");
}

#[test]
fn short_id_truncates() {
    let id = SessionName::new("loom-builder-issue-42");
    assert_eq!(id.short(4), "loom");
    assert_eq!("ab".short(4), "ab");
}

#[parameterized(
    canonical = { "a1b2c3d", true },
    all_digits = { "0123456", true },
    all_hex_letters = { "abcdef0", true },
    too_short = { "a1b2c3", false },
    too_long = { "a1b2c3d4", false },
    uppercase = { "A1B2C3D", false },
    non_hex = { "g1b2c3d", false },
    empty = { "", false },
    uuid_prefix = { "a1b2c3d-", false },
)]
fn task_id_format(candidate: &str, valid: bool) {
    assert_eq!(TaskId::is_valid(candidate), valid);
}

#[test]
fn random_gen_produces_valid_ids() {
    let gen = RandomTaskIdGen;
    for _ in 0..100 {
        let id = gen.next();
        assert!(TaskId::is_valid(id.as_str()), "invalid id: {}", id);
    }
}

#[test]
fn random_gen_ids_are_distinct() {
    let gen = RandomTaskIdGen;
    let ids: HashSet<_> = (0..50).map(|_| gen.next()).collect();
    // Collisions in 50 draws from 16^7 would be astronomically unlikely.
    assert_eq!(ids.len(), 50);
}

#[test]
fn sequential_gen_is_deterministic() {
    let gen = SequentialTaskIdGen::new();
    assert_eq!(gen.next().as_str(), "0000001");
    assert_eq!(gen.next().as_str(), "0000002");
    assert!(TaskId::is_valid(gen.next().as_str()));
}

#[test]
fn shepherd_id_borrow_str_lookup() {
    use std::collections::HashMap;
    let mut map = HashMap::new();
    map.insert(ShepherdId::new("shepherd-1"), 42);
    assert_eq!(map.get("shepherd-1"), Some(&42));
}
