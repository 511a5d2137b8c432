// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator notification adapters

mod desktop;
mod noop;

pub use desktop::DesktopNotifier;
pub use noop::NoopNotifier;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeNotifier;

use async_trait::async_trait;

/// Sends a notification to the operator. Best-effort: failures are logged,
/// never propagated.
#[async_trait]
pub trait Notifier: Clone + Send + Sync + 'static {
    async fn notify(&self, title: &str, message: &str);
}
