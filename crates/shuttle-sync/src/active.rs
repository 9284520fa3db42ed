// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tracking of in-flight syncs, keyed by event id.
//!
//! The drain gate on shutdown waits for this map to empty so in-flight jobs
//! complete before the process exits.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
pub struct ActiveSyncs {
	inner: Mutex<HashMap<String, Instant>>,
}

impl ActiveSyncs {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn track(&self, id: &str) {
		let mut inner = self.inner.lock().expect("active syncs mutex poisoned");
		inner.insert(id.to_string(), Instant::now());
	}

	pub fn untrack(&self, id: &str) {
		let mut inner = self.inner.lock().expect("active syncs mutex poisoned");
		inner.remove(id);
	}

	pub fn len(&self) -> usize {
		self.inner.lock().expect("active syncs mutex poisoned").len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Waits until every tracked sync has finished or `cancel` fires.
	pub async fn wait_empty(&self, cancel: &CancellationToken) {
		loop {
			if self.is_empty() {
				return;
			}
			tracing::trace!(active = self.len(), "waiting for syncs");
			tokio::select! {
				_ = tokio::time::sleep(WAIT_POLL_INTERVAL) => {}
				_ = cancel.cancelled() => return,
			}
		}
	}
}
