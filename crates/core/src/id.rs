// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID generation abstractions.
//!
//! Worker task ids are exactly seven lowercase hex characters; the format is
//! load-bearing because orphan detection treats any malformed id as evidence
//! of corrupted daemon state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for truncating identifiers to a short prefix.
pub trait ShortId {
    /// Returns a string slice truncated to at most `n` characters.
    fn short(&self, n: usize) -> &str;
}

impl ShortId for str {
    fn short(&self, n: usize) -> &str {
        if self.len() <= n {
            self
        } else {
            &self[..n]
        }
    }
}

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `short()`, `Display`, `From<String>`,
/// `From<&str>`, `PartialEq<str>`, `PartialEq<&str>`, and `Borrow<str>`
/// implementations.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns a string slice truncated to at most `n` characters.
            pub fn short(&self, n: usize) -> &str {
                if self.0.len() <= n {
                    &self.0
                } else {
                    &self.0[..n]
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Worker task identifier (`^[a-f0-9]{7}$`).
    pub struct TaskId;
}

define_id! {
    /// Logical shepherd slot identifier (`shepherd-<N>`).
    pub struct ShepherdId;
}

define_id! {
    /// Terminal multiplexer session name (e.g. `loom-builder-issue-42`).
    pub struct SessionName;
}

impl TaskId {
    /// Check that a candidate matches the canonical 7-hex-char format.
    pub fn is_valid(candidate: &str) -> bool {
        candidate.len() == 7
            && candidate
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

/// Generates worker task ids.
pub trait TaskIdGen: Clone + Send + Sync {
    fn next(&self) -> TaskId;
}

/// Random 7-hex-char generator for production use.
#[derive(Clone, Default)]
pub struct RandomTaskIdGen;

impl TaskIdGen for RandomTaskIdGen {
    fn next(&self) -> TaskId {
        use rand::Rng;
        let mut rng = rand::rng();
        let id: String = (0..7)
            .map(|_| format!("{:x}", rng.random::<u8>() % 16))
            .collect();
        TaskId::new(id)
    }
}

/// Sequential generator for deterministic tests (`0000001`, `0000002`, ...).
#[derive(Clone)]
pub struct SequentialTaskIdGen {
    counter: Arc<AtomicU64>,
}

impl SequentialTaskIdGen {
    pub fn new() -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for SequentialTaskIdGen {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskIdGen for SequentialTaskIdGen {
    fn next(&self) -> TaskId {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        TaskId::new(format!("{:07x}", n))
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
