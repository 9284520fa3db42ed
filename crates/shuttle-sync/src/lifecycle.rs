// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Specification lifecycle handling.
//!
//! The control plane notifies us when a `SecretSync` is applied or removed;
//! this handler keeps the registry current, schedules an initial sync when
//! the spec actually changed (hash, destination count, or first sight), and
//! honours the `force-sync` and `delete-on-removal` annotations.

use std::sync::Arc;

use tracing::instrument;

use shuttle_core::hash::spec_hash;
use shuttle_core::{Operation, SecretSync, SyncRegistry};
use shuttle_metrics::Metrics;
use shuttle_queue::Queue;

use crate::error::Result;
use crate::sinks::{EventSeverity, EventSink, StatusSink};
use crate::trigger::manual_trigger;

pub const FORCE_SYNC_ANNOTATION: &str = "force-sync";
pub const OPERATION_ANNOTATION: &str = "op";
pub const DELETE_ON_REMOVAL_ANNOTATION: &str = "delete-on-removal";

pub struct LifecycleHandler {
	registry: Arc<SyncRegistry>,
	queue: Arc<dyn Queue>,
	status: Arc<dyn StatusSink>,
	events: Arc<dyn EventSink>,
	metrics: Arc<Metrics>,
}

impl LifecycleHandler {
	pub fn new(
		registry: Arc<SyncRegistry>,
		queue: Arc<dyn Queue>,
		status: Arc<dyn StatusSink>,
		events: Arc<dyn EventSink>,
		metrics: Arc<Metrics>,
	) -> Self {
		Self {
			registry,
			queue,
			status,
			events,
			metrics,
		}
	}

	/// Handles a create-or-update notification.
	#[instrument(skip(self, resource), fields(key = %resource.key()))]
	pub async fn apply(&self, resource: SecretSync) -> Result<()> {
		if resource.metadata.deletion_timestamp.is_some() {
			tracing::debug!("resource is terminating");
			return self.delete(resource).await;
		}

		let mut sync_now = false;
		if resource.status.status.is_empty() {
			tracing::debug!("initializing resource");
			sync_now = true;
		}
		if resource.status.sync_destinations != resource.spec.dest.len() {
			tracing::debug!("number of destinations has changed");
			sync_now = true;
		}
		let hash = spec_hash(&resource.spec)?;
		if hash != resource.status.hash {
			tracing::debug!(old = %resource.status.hash, new = %hash, "hash has changed");
			sync_now = true;
		}

		self.registry.upsert(resource.clone())?;

		if sync_now {
			if let Err(error) = manual_trigger(
				self.queue.as_ref(),
				&self.metrics,
				&resource,
				Operation::Update,
			)
			.await
			{
				tracing::error!(%error, "failed to trigger initial sync");
				self.events
					.record(
						&resource.metadata.namespace,
						&resource.metadata.name,
						EventSeverity::Warning,
						"Created",
						"failed to trigger initial sync",
					)
					.await;
			}
		}

		self.annotation_operations(&resource).await
	}

	/// Handles a deletion notification. `delete-on-removal` fires before
	/// the registry entry disappears so the manual event can still resolve
	/// its sync.
	#[instrument(skip(self, resource), fields(key = %resource.key()))]
	pub async fn delete(&self, resource: SecretSync) -> Result<()> {
		if resource
			.metadata
			.annotations
			.get(DELETE_ON_REMOVAL_ANNOTATION)
			.map(String::as_str)
			== Some("true")
		{
			if let Err(error) = manual_trigger(
				self.queue.as_ref(),
				&self.metrics,
				&resource,
				Operation::Delete,
			)
			.await
			{
				tracing::error!(%error, "failed to trigger deletion sync");
				self.events
					.record(
						&resource.metadata.namespace,
						&resource.metadata.name,
						EventSeverity::Warning,
						"Deleting",
						"failed to delete secret",
					)
					.await;
			}
		}
		if let Err(error) = self.registry.remove(&resource.key()) {
			tracing::debug!(%error, "resource was not registered");
		}
		self.events
			.record(
				&resource.metadata.namespace,
				&resource.metadata.name,
				EventSeverity::Normal,
				"Deleted",
				"sync removed from registry",
			)
			.await;
		Ok(())
	}

	/// Removal by key alone, for control planes that no longer have the
	/// full resource at deletion time.
	pub async fn delete_by_key(&self, key: &str) -> Result<()> {
		match self.registry.get_by_key(key) {
			Some(resource) => self.delete(resource).await,
			None => {
				tracing::debug!(%key, "no registered sync to remove");
				Ok(())
			}
		}
	}

	async fn annotation_operations(&self, resource: &SecretSync) -> Result<()> {
		let force = resource
			.metadata
			.annotations
			.get(FORCE_SYNC_ANNOTATION)
			.filter(|value| !value.is_empty());
		if force.is_none() {
			return Ok(());
		}
		let operation = resource
			.metadata
			.annotations
			.get(OPERATION_ANNOTATION)
			.map(|op| op.parse().unwrap_or(Operation::Unknown))
			.unwrap_or(Operation::Update);
		tracing::debug!(%operation, "force-sync annotation found");
		if let Err(error) =
			manual_trigger(self.queue.as_ref(), &self.metrics, resource, operation).await
		{
			self.events
				.record(
					&resource.metadata.namespace,
					&resource.metadata.name,
					EventSeverity::Warning,
					"ManualTrigger",
					"failed to trigger force-sync sync",
				)
				.await;
			return Err(error);
		}
		if let Err(error) = self
			.status
			.remove_annotations(resource, &[FORCE_SYNC_ANNOTATION, OPERATION_ANNOTATION])
			.await
		{
			tracing::error!(%error, "failed to remove force-sync annotations");
		}
		self.events
			.record(
				&resource.metadata.namespace,
				&resource.metadata.name,
				EventSeverity::Normal,
				"ManualTrigger",
				"force-sync sync triggered",
			)
			.await;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::BTreeMap;

	use chrono::Utc;
	use shuttle_core::spec::{Destination, ResourceMeta, SecretSyncSpec, VaultConfig};
	use shuttle_queue::MemoryQueue;
	use tokio_util::sync::CancellationToken;

	use crate::sinks::{MemoryEventSink, MemoryStatusSink};

	struct Fixture {
		handler: LifecycleHandler,
		queue: Arc<MemoryQueue>,
		registry: Arc<SyncRegistry>,
		status: Arc<MemoryStatusSink>,
		events: Arc<MemoryEventSink>,
	}

	async fn fixture() -> Fixture {
		let registry = Arc::new(SyncRegistry::new());
		let queue = Arc::new(MemoryQueue::new(false));
		queue.start().await.unwrap();
		let status = Arc::new(MemoryStatusSink::new());
		let events = Arc::new(MemoryEventSink::new());
		let handler = LifecycleHandler::new(
			Arc::clone(&registry),
			queue.clone(),
			status.clone(),
			events.clone(),
			Arc::new(Metrics::new()),
		);
		Fixture {
			handler,
			queue,
			registry,
			status,
			events,
		}
	}

	fn resource(annotations: &[(&str, &str)]) -> SecretSync {
		SecretSync {
			metadata: ResourceMeta {
				namespace: "ns".into(),
				name: "creds".into(),
				annotations: annotations
					.iter()
					.map(|(k, v)| (k.to_string(), v.to_string()))
					.collect::<BTreeMap<_, _>>(),
				..Default::default()
			},
			spec: SecretSyncSpec {
				source: Some(VaultConfig {
					address: "https://v1".into(),
					path: "secret/foo".into(),
					..Default::default()
				}),
				dest: vec![Destination::Vault(VaultConfig {
					address: "https://v2".into(),
					path: "copy/foo".into(),
					..Default::default()
				})],
				..Default::default()
			},
			..Default::default()
		}
	}

	async fn next_event(queue: &Arc<MemoryQueue>) -> shuttle_core::SyncEvent {
		let cancel = CancellationToken::new();
		let mut rx = queue.subscribe(cancel.clone()).await.unwrap();
		let event = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
			.await
			.expect("timed out waiting for event")
			.expect("stream closed");
		cancel.cancel();
		event
	}

	#[tokio::test]
	async fn first_apply_registers_and_triggers_initial_sync() {
		let fx = fixture().await;
		fx.handler.apply(resource(&[])).await.unwrap();
		assert!(fx.registry.get_by_key("ns/creds").is_some());
		let event = next_event(&fx.queue).await;
		assert!(event.manual);
		assert_eq!(event.operation, Operation::Update);
		assert_eq!(event.sync_name, "ns/creds");
	}

	#[tokio::test]
	async fn unchanged_hash_does_not_resync() {
		let fx = fixture().await;
		let mut res = resource(&[]);
		res.status.status = "Synced".into();
		res.status.sync_destinations = res.spec.dest.len();
		res.status.hash = spec_hash(&res.spec).unwrap();
		fx.handler.apply(res).await.unwrap();
		// Nothing was pushed; the local stream stays empty.
		assert!(fx.registry.get_by_key("ns/creds").is_some());
		let cancel = CancellationToken::new();
		let mut rx = fx.queue.subscribe(cancel.clone()).await.unwrap();
		let got =
			tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv()).await;
		assert!(got.is_err(), "unexpected event scheduled");
		cancel.cancel();
	}

	#[tokio::test]
	async fn force_sync_annotation_triggers_and_is_removed() {
		let fx = fixture().await;
		let mut res = resource(&[("force-sync", "now"), ("op", "delete")]);
		res.status.status = "Synced".into();
		res.status.sync_destinations = res.spec.dest.len();
		res.status.hash = spec_hash(&res.spec).unwrap();
		fx.handler.apply(res).await.unwrap();

		let event = next_event(&fx.queue).await;
		assert_eq!(event.operation, Operation::Delete);
		assert!(event.manual);

		let removed = fx.status.removed_annotations();
		assert!(removed.contains(&("ns/creds".to_string(), "force-sync".to_string())));
		assert!(removed.contains(&("ns/creds".to_string(), "op".to_string())));
		assert!(fx.events.reasons().contains(&"ManualTrigger".to_string()));
	}

	#[tokio::test]
	async fn terminating_resource_is_removed() {
		let fx = fixture().await;
		fx.handler.apply(resource(&[])).await.unwrap();
		// Drain the initial sync trigger.
		let _ = next_event(&fx.queue).await;

		let mut res = resource(&[]);
		res.metadata.deletion_timestamp = Some(Utc::now());
		fx.handler.apply(res).await.unwrap();
		assert!(fx.registry.get_by_key("ns/creds").is_none());
	}

	#[tokio::test]
	async fn delete_on_removal_triggers_delete_before_removal() {
		let fx = fixture().await;
		fx.handler
			.apply(resource(&[("delete-on-removal", "true")]))
			.await
			.unwrap();
		let _ = next_event(&fx.queue).await;

		fx.handler
			.delete(resource(&[("delete-on-removal", "true")]))
			.await
			.unwrap();
		let event = next_event(&fx.queue).await;
		assert_eq!(event.operation, Operation::Delete);
		assert!(fx.registry.get_by_key("ns/creds").is_none());
	}

	#[tokio::test]
	async fn delete_by_key_tolerates_unknown_keys() {
		let fx = fixture().await;
		fx.handler.delete_by_key("ns/ghost").await.unwrap();
	}
}
