// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Feedback interfaces to the specification owner.
//!
//! The control plane that owns `SecretSync` resources is an external
//! collaborator; the engine only ever talks to it through these two small
//! traits. In-memory implementations back tests and single-process
//! deployments.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use shuttle_core::hash::spec_hash;
use shuttle_core::{SecretSync, SecretSyncStatus};

/// Observed sync state written back onto the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
	Initialized,
	Synced,
	Failed,
	DryRun,
}

impl fmt::Display for SyncStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			SyncStatus::Initialized => "Initialized",
			SyncStatus::Synced => "Synced",
			SyncStatus::Failed => "Failed",
			SyncStatus::DryRun => "DryRun",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
	Normal,
	Warning,
}

impl fmt::Display for EventSeverity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EventSeverity::Normal => f.write_str("Normal"),
			EventSeverity::Warning => f.write_str("Warning"),
		}
	}
}

#[derive(Debug, Error)]
#[error("status sink error: {0}")]
pub struct SinkError(pub String);

/// Writes sync status back to the resource owner.
#[async_trait]
pub trait StatusSink: Send + Sync {
	async fn set_status(&self, sync: &SecretSync, status: SyncStatus) -> Result<(), SinkError>;

	/// Removes annotations after they have been acted on, so one-shot
	/// triggers do not fire twice.
	async fn remove_annotations(&self, sync: &SecretSync, keys: &[&str]) -> Result<(), SinkError>;
}

/// Records operational events against a resource.
#[async_trait]
pub trait EventSink: Send + Sync {
	async fn record(
		&self,
		namespace: &str,
		name: &str,
		severity: EventSeverity,
		reason: &str,
		message: &str,
	);
}

/// In-memory status sink; derives the status fields the way a control-plane
/// implementation would.
#[derive(Debug, Default)]
pub struct MemoryStatusSink {
	statuses: Mutex<HashMap<String, SecretSyncStatus>>,
	removed_annotations: Mutex<Vec<(String, String)>>,
}

impl MemoryStatusSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn status_of(&self, key: &str) -> Option<SecretSyncStatus> {
		self.statuses
			.lock()
			.expect("status sink mutex poisoned")
			.get(key)
			.cloned()
	}

	pub fn removed_annotations(&self) -> Vec<(String, String)> {
		self.removed_annotations
			.lock()
			.expect("status sink mutex poisoned")
			.clone()
	}
}

#[async_trait]
impl StatusSink for MemoryStatusSink {
	async fn set_status(&self, sync: &SecretSync, status: SyncStatus) -> Result<(), SinkError> {
		let hash = spec_hash(&sync.spec).map_err(|e| SinkError(e.to_string()))?;
		let mut statuses = self.statuses.lock().expect("status sink mutex poisoned");
		statuses.insert(
			sync.key(),
			SecretSyncStatus {
				status: status.to_string(),
				last_sync_time: Some(Utc::now()),
				sync_destinations: sync.spec.dest.len(),
				hash,
			},
		);
		Ok(())
	}

	async fn remove_annotations(&self, sync: &SecretSync, keys: &[&str]) -> Result<(), SinkError> {
		let mut removed = self
			.removed_annotations
			.lock()
			.expect("status sink mutex poisoned");
		for key in keys {
			removed.push((sync.key(), key.to_string()));
		}
		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
	pub namespace: String,
	pub name: String,
	pub severity: EventSeverity,
	pub reason: String,
	pub message: String,
}

/// In-memory event sink.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
	events: Mutex<Vec<RecordedEvent>>,
}

impl MemoryEventSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn events(&self) -> Vec<RecordedEvent> {
		self.events.lock().expect("event sink mutex poisoned").clone()
	}

	pub fn reasons(&self) -> Vec<String> {
		self.events()
			.into_iter()
			.map(|event| event.reason)
			.collect()
	}
}

#[async_trait]
impl EventSink for MemoryEventSink {
	async fn record(
		&self,
		namespace: &str,
		name: &str,
		severity: EventSeverity,
		reason: &str,
		message: &str,
	) {
		tracing::debug!(%namespace, %name, %severity, %reason, %message, "recorded event");
		let mut events = self.events.lock().expect("event sink mutex poisoned");
		events.push(RecordedEvent {
			namespace: namespace.to_string(),
			name: name.to_string(),
			severity,
			reason: reason.to_string(),
			message: message.to_string(),
		});
	}
}
