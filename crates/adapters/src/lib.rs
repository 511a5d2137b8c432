// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loom-adapters: external collaborators (tracker, sessions, VCS, notify).

pub mod label_cache;
pub mod notify;
pub mod session;
pub mod subprocess;
pub mod tracker;
pub mod vcs;

pub use label_cache::LabelCache;
pub use notify::{DesktopNotifier, NoopNotifier, Notifier};
pub use session::{SessionError, SessionHost, TmuxSessionHost};
pub use subprocess::{run_with_timeout, GIT_TIMEOUT, TMUX_TIMEOUT, TRACKER_TIMEOUT};
pub use tracker::{
    CheckCounts, EntityState, GithubTracker, PrFile, Tracker, TrackerError,
};
pub use vcs::{parse_porcelain_path, GitVcs, Vcs, VcsError};

#[cfg(any(test, feature = "test-support"))]
pub use notify::FakeNotifier;
#[cfg(any(test, feature = "test-support"))]
pub use session::{FakeSession, FakeSessionHost};
#[cfg(any(test, feature = "test-support"))]
pub use tracker::{FakeTracker, TrackerCall};
#[cfg(any(test, feature = "test-support"))]
pub use vcs::{FakeVcs, VcsCall};
