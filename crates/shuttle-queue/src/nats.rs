// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pub/sub topic queue on NATS.
//!
//! Subscribers join a queue group so each event is delivered to exactly one
//! process; within the process the message is decoded into the local
//! unbounded FIFO just like the other broker backends.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use shuttle_core::SyncEvent;

use crate::error::{QueueError, Result};
use crate::fifo::UnboundedFifo;
use crate::seen::SeenEvents;
use crate::Queue;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NatsConfig {
	pub url: String,
	pub subject: String,
	pub queue_group: String,
}

impl Default for NatsConfig {
	fn default() -> Self {
		Self {
			url: "nats://127.0.0.1:4222".into(),
			subject: "shuttle.events".into(),
			queue_group: "shuttle-workers".into(),
		}
	}
}

pub struct NatsQueue {
	cfg: NatsConfig,
	fifo: Arc<UnboundedFifo<SyncEvent>>,
	seen: Arc<SeenEvents>,
	client: Mutex<Option<async_nats::Client>>,
	shutdown: CancellationToken,
}

impl NatsQueue {
	pub fn from_params(params: serde_json::Value, dedupe: bool) -> Result<Self> {
		let cfg: NatsConfig = if params.is_null() {
			NatsConfig::default()
		} else {
			serde_json::from_value(params)?
		};
		Ok(Self {
			cfg,
			fifo: Arc::new(UnboundedFifo::new()),
			seen: Arc::new(SeenEvents::new(dedupe)),
			client: Mutex::new(None),
			shutdown: CancellationToken::new(),
		})
	}

	async fn client(&self) -> Result<async_nats::Client> {
		let client = self.client.lock().await;
		client.clone().ok_or(QueueError::NotStarted)
	}
}

#[async_trait]
impl Queue for NatsQueue {
	async fn start(&self) -> Result<()> {
		let client = async_nats::connect(&self.cfg.url)
			.await
			.map_err(|e| QueueError::Nats(e.to_string()))?;
		*self.client.lock().await = Some(client);
		self.seen.spawn_sweeper(self.shutdown.clone());
		Ok(())
	}

	async fn stop(&self) -> Result<()> {
		self.shutdown.cancel();
		let client = self.client.lock().await.take();
		if let Some(client) = client {
			client
				.drain()
				.await
				.map_err(|e| QueueError::Nats(e.to_string()))?;
		}
		Ok(())
	}

	async fn ping(&self) -> Result<()> {
		let client = self.client().await?;
		client
			.flush()
			.await
			.map_err(|e| QueueError::Nats(e.to_string()))
	}

	async fn publish(&self, event: SyncEvent) -> Result<()> {
		tracing::trace!(driver = "nats", event_id = %event.event_id, "publish");
		let payload = serde_json::to_vec(&event)?;
		let client = self.client().await?;
		client
			.publish(self.cfg.subject.clone(), payload.into())
			.await
			.map_err(|e| QueueError::Nats(e.to_string()))?;
		client
			.flush()
			.await
			.map_err(|e| QueueError::Nats(e.to_string()))
	}

	fn push(&self, event: SyncEvent) -> Result<()> {
		self.fifo.send(event);
		Ok(())
	}

	async fn subscribe(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<SyncEvent>> {
		let client = self.client().await?;
		let mut subscriber = client
			.queue_subscribe(self.cfg.subject.clone(), self.cfg.queue_group.clone())
			.await
			.map_err(|e| QueueError::Nats(e.to_string()))?;

		let fifo = Arc::clone(&self.fifo);
		let consumer_cancel = cancel.clone();
		let consumer_shutdown = self.shutdown.clone();
		tokio::spawn(async move {
			loop {
				let message = tokio::select! {
					message = subscriber.next() => message,
					_ = consumer_cancel.cancelled() => break,
					_ = consumer_shutdown.cancelled() => break,
				};
				let Some(message) = message else {
					break;
				};
				match serde_json::from_slice::<SyncEvent>(&message.payload) {
					Ok(event) => fifo.send(event),
					Err(error) => {
						tracing::error!(driver = "nats", %error, "dropping undecodable message");
					}
				}
			}
		});

		let (tx, rx) = mpsc::channel(1);
		let fifo = Arc::clone(&self.fifo);
		tokio::spawn(async move {
			while let Ok(event) = fifo.receive(&cancel).await {
				if tx.send(event).await.is_err() {
					break;
				}
			}
		});
		Ok(rx)
	}

	fn seen_event(&self, id: &str) {
		self.seen.mark(id);
	}

	fn event_seen(&self, id: &str) -> bool {
		self.seen.seen(id)
	}
}
