// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Desktop notification adapter (notify-rust).

use super::Notifier;
use async_trait::async_trait;

/// Desktop notifier via the platform notification service.
#[derive(Clone, Default)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn notify(&self, title: &str, message: &str) {
        let title = title.to_string();
        let message = message.to_string();
        // notify-rust blocks on DBus; keep it off the async threads.
        let result = tokio::task::spawn_blocking(move || {
            notify_rust::Notification::new()
                .summary(&title)
                .body(&message)
                .show()
                .map(|_| ())
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "desktop notification failed"),
            Err(e) => tracing::debug!(error = %e, "notification task panicked"),
        }
    }
}
