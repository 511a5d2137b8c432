// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn check_counts_default_is_empty() {
    let counts = CheckCounts::default();
    assert_eq!(counts.total, 0);
    assert_eq!(counts.pending, 0);
}

#[test]
fn entity_state_round_trip() {
    for (s, expected) in [
        ("OPEN", EntityState::Open),
        ("CLOSED", EntityState::Closed),
        ("MERGED", EntityState::Merged),
    ] {
        assert_eq!(EntityState::parse(s), Some(expected));
    }
}
