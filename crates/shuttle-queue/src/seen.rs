// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Deduplication memory shared by every queue backend.
//!
//! Event ids are remembered for a sliding five-minute window; a sweeper
//! reclaims aged entries once a minute. The whole table is a no-op when
//! deduplication is disabled by configuration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

pub const DEDUP_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct SeenEvents {
	enabled: bool,
	entries: Mutex<HashMap<String, Instant>>,
}

impl SeenEvents {
	pub fn new(enabled: bool) -> Self {
		Self {
			enabled,
			entries: Mutex::new(HashMap::new()),
		}
	}

	/// Records `id` as seen now.
	pub fn mark(&self, id: &str) {
		let mut entries = self.entries.lock().expect("seen mutex poisoned");
		entries.insert(id.to_string(), Instant::now());
	}

	/// True when dedup is enabled and `id` was marked within the window.
	/// Age is checked at read time; the sweeper only reclaims memory.
	pub fn seen(&self, id: &str) -> bool {
		if !self.enabled {
			return false;
		}
		let entries = self.entries.lock().expect("seen mutex poisoned");
		entries
			.get(id)
			.map(|at| at.elapsed() <= DEDUP_WINDOW)
			.unwrap_or(false)
	}

	pub fn sweep(&self) {
		let mut entries = self.entries.lock().expect("seen mutex poisoned");
		entries.retain(|_, at| at.elapsed() <= DEDUP_WINDOW);
	}

	pub fn len(&self) -> usize {
		self.entries.lock().expect("seen mutex poisoned").len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Background sweep loop, one per queue backend.
	pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) {
		let seen = Arc::clone(self);
		tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = tokio::time::sleep(SWEEP_INTERVAL) => seen.sweep(),
					_ = cancel.cancelled() => break,
				}
			}
		});
	}

	#[cfg(test)]
	fn mark_at(&self, id: &str, at: Instant) {
		let mut entries = self.entries.lock().expect("seen mutex poisoned");
		entries.insert(id.to_string(), at);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn disabled_table_never_reports_seen() {
		let seen = SeenEvents::new(false);
		seen.mark("evt-1");
		assert!(!seen.seen("evt-1"));
	}

	#[test]
	fn marked_ids_are_seen_within_window() {
		let seen = SeenEvents::new(true);
		assert!(!seen.seen("evt-1"));
		seen.mark("evt-1");
		assert!(seen.seen("evt-1"));
		assert!(!seen.seen("evt-2"));
	}

	#[test]
	fn aged_ids_fall_out_of_the_window() {
		let seen = SeenEvents::new(true);
		let old = Instant::now() - (DEDUP_WINDOW + Duration::from_secs(1));
		seen.mark_at("evt-1", old);
		assert!(!seen.seen("evt-1"));
		seen.sweep();
		assert!(seen.is_empty());
	}

	#[test]
	fn sweep_keeps_fresh_entries() {
		let seen = SeenEvents::new(true);
		seen.mark("fresh");
		let old = Instant::now() - (DEDUP_WINDOW + Duration::from_secs(1));
		seen.mark_at("stale", old);
		seen.sweep();
		assert_eq!(seen.len(), 1);
		assert!(seen.seen("fresh"));
	}
}
