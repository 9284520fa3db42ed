// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The event processor: N queue subscriptions, each feeding a pool of W
//! workers.
//!
//! Each subscription forwards its stream into a dispatch channel; workers
//! pull one event at a time and hand it to the executor. A failing event is
//! logged and counted but never stops its worker. When the root token is
//! cancelled the subscriptions end, the dispatch channels close, and
//! workers drain what they already hold.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use shuttle_core::SyncEvent;
use shuttle_queue::Queue;

use crate::error::Result;
use crate::executor::SyncExecutor;

pub const DEFAULT_WORKER_POOL_SIZE: usize = 10;
pub const DEFAULT_NUM_SUBSCRIPTIONS: usize = 10;

pub struct EventProcessor {
	queue: Arc<dyn Queue>,
	executor: Arc<SyncExecutor>,
}

impl EventProcessor {
	pub fn new(queue: Arc<dyn Queue>, executor: Arc<SyncExecutor>) -> Self {
		Self { queue, executor }
	}

	/// Runs until `cancel` fires. In-flight jobs keep running past
	/// cancellation; pair with [`EventProcessor::drain`] to wait for them.
	#[instrument(skip(self, cancel))]
	pub async fn run(
		&self,
		cancel: CancellationToken,
		num_subscriptions: usize,
		worker_pool_size: usize,
	) -> Result<()> {
		for subscription in 0..num_subscriptions.max(1) {
			self.start_subscription(subscription, worker_pool_size.max(1), cancel.clone())
				.await?;
		}
		cancel.cancelled().await;
		tracing::debug!("event processor stopping");
		Ok(())
	}

	async fn start_subscription(
		&self,
		subscription: usize,
		workers: usize,
		cancel: CancellationToken,
	) -> Result<()> {
		let mut stream = self.queue.subscribe(cancel).await?;
		let (tx, rx) = mpsc::channel::<SyncEvent>(1);
		let rx = Arc::new(Mutex::new(rx));

		for worker in 0..workers {
			let worker_id = subscription * workers + worker;
			let rx = Arc::clone(&rx);
			let executor = Arc::clone(&self.executor);
			tokio::spawn(async move {
				tracing::trace!(worker = worker_id, "worker started");
				loop {
					let event = { rx.lock().await.recv().await };
					let Some(event) = event else {
						break;
					};
					if let Err(error) = executor.sync(event).await {
						tracing::error!(worker = worker_id, %error, "sync failed");
					}
				}
				tracing::trace!(worker = worker_id, "worker stopped");
			});
		}

		// Forward the subscription stream; dropping the sender closes the
		// dispatch channel and releases the workers.
		tokio::spawn(async move {
			while let Some(event) = stream.recv().await {
				if tx.send(event).await.is_err() {
					break;
				}
			}
			tracing::trace!(subscription, "subscription ended");
		});
		Ok(())
	}

	/// Waits until every active sync has completed or `cancel` fires.
	pub async fn drain(&self, cancel: &CancellationToken) {
		self.executor.active().wait_empty(cancel).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::time::Duration;

	use shuttle_core::spec::{Destination, ResourceMeta, SecretSyncSpec, VaultConfig};
	use shuttle_core::{Operation, SecretSync, SyncRegistry};
	use shuttle_metrics::Metrics;
	use shuttle_notify::{Notifier, NotifyDefaults};
	use shuttle_queue::{MemoryQueue, Queue};
	use shuttle_store::{MemoryFactory, SharedSecrets};

	use crate::sinks::{MemoryEventSink, MemoryStatusSink};

	fn sync_resource(path: &str, dest_path: &str) -> SecretSync {
		SecretSync {
			metadata: ResourceMeta {
				namespace: "ns".into(),
				name: "creds".into(),
				..Default::default()
			},
			spec: SecretSyncSpec {
				source: Some(VaultConfig {
					address: "https://v1".into(),
					namespace: Some("n1".into()),
					path: path.into(),
					..Default::default()
				}),
				dest: vec![Destination::Vault(VaultConfig {
					address: "https://v2".into(),
					path: dest_path.into(),
					..Default::default()
				})],
				..Default::default()
			},
			..Default::default()
		}
	}

	fn seed(source: &SharedSecrets, path: &str) {
		let mut data = shuttle_core::SecretData::new();
		data.insert("user".into(), serde_json::json!("svc"));
		source.lock().unwrap().insert(path.into(), data);
	}

	async fn wait_for_key(secrets: &SharedSecrets, key: &str) {
		for _ in 0..100 {
			if secrets.lock().unwrap().contains_key(key) {
				return;
			}
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
		panic!("destination never received {key}");
	}

	#[tokio::test]
	async fn events_flow_from_queue_to_destination() {
		let factory = Arc::new(MemoryFactory::new());
		seed(&factory.source, "secret/foo");
		let registry = Arc::new(SyncRegistry::new());
		registry.upsert(sync_resource("secret/foo", "out/foo")).unwrap();

		let executor = Arc::new(crate::SyncExecutor::new(
			factory.clone(),
			registry,
			Arc::new(MemoryStatusSink::new()),
			Arc::new(MemoryEventSink::new()),
			Arc::new(Notifier::new(NotifyDefaults::default())),
			Arc::new(Metrics::new()),
		));
		let queue: Arc<dyn Queue> = Arc::new(MemoryQueue::new(true));
		queue.start().await.unwrap();
		let processor = EventProcessor::new(Arc::clone(&queue), executor);

		let cancel = CancellationToken::new();
		let run_cancel = cancel.clone();
		let handle = tokio::spawn(async move { processor.run(run_cancel, 2, 2).await });

		queue
			.publish(SyncEvent {
				event_id: "e1".into(),
				address: "https://v1".into(),
				namespace: "n1".into(),
				path: "secret/data/foo".into(),
				operation: Operation::Update,
				..Default::default()
			})
			.await
			.unwrap();

		wait_for_key(&factory.dest, "out/foo").await;
		cancel.cancel();
		handle.await.unwrap().unwrap();
	}
}
