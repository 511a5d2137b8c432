// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording notifier for tests.

use super::Notifier;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct FakeNotifier {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, title: &str, message: &str) {
        self.sent
            .lock()
            .push((title.to_string(), message.to_string()));
    }
}
