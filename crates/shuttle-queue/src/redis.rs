// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! List-backed broker queue on redis.
//!
//! Publishes RPUSH onto a shared list; each subscriber runs a BLPOP loop
//! that decodes into the local unbounded FIFO, so broker reads are never
//! blocked by slow workers. Undecodable messages are logged and dropped;
//! redelivery is the broker's job, not ours.

use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use shuttle_core::SyncEvent;

use crate::error::{QueueError, Result};
use crate::fifo::UnboundedFifo;
use crate::seen::SeenEvents;
use crate::Queue;

const QUEUE_KEY: &str = "shuttle:events";
const POP_TIMEOUT_SECS: f64 = 5.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedisConfig {
	pub host: String,
	pub port: u16,
	pub database: i64,
	pub password: Option<String>,
}

impl Default for RedisConfig {
	fn default() -> Self {
		Self {
			host: "127.0.0.1".into(),
			port: 6379,
			database: 0,
			password: None,
		}
	}
}

impl RedisConfig {
	fn url(&self) -> String {
		match &self.password {
			Some(password) => format!(
				"redis://:{}@{}:{}/{}",
				password, self.host, self.port, self.database
			),
			None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
		}
	}
}

pub struct RedisQueue {
	cfg: RedisConfig,
	fifo: Arc<UnboundedFifo<SyncEvent>>,
	seen: Arc<SeenEvents>,
	client: Mutex<Option<redis::Client>>,
	shutdown: CancellationToken,
}

impl RedisQueue {
	pub fn from_params(params: serde_json::Value, dedupe: bool) -> Result<Self> {
		let cfg: RedisConfig = if params.is_null() {
			RedisConfig::default()
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

	async fn client(&self) -> Result<redis::Client> {
		let client = self.client.lock().await;
		client.clone().ok_or(QueueError::NotStarted)
	}
}

#[async_trait]
impl Queue for RedisQueue {
	async fn start(&self) -> Result<()> {
		let client = redis::Client::open(self.cfg.url())?;
		let mut connection = client.get_multiplexed_tokio_connection().await?;
		redis::cmd("PING").query_async::<()>(&mut connection).await?;
		*self.client.lock().await = Some(client);
		self.seen.spawn_sweeper(self.shutdown.clone());
		Ok(())
	}

	async fn stop(&self) -> Result<()> {
		self.shutdown.cancel();
		*self.client.lock().await = None;
		Ok(())
	}

	async fn ping(&self) -> Result<()> {
		let client = self.client().await?;
		let mut connection = client.get_multiplexed_tokio_connection().await?;
		redis::cmd("PING").query_async::<()>(&mut connection).await?;
		Ok(())
	}

	async fn publish(&self, event: SyncEvent) -> Result<()> {
		tracing::trace!(driver = "redis", event_id = %event.event_id, "publish");
		let payload = serde_json::to_string(&event)?;
		let client = self.client().await?;
		let mut connection = client.get_multiplexed_tokio_connection().await?;
		let _: i64 = connection.rpush(QUEUE_KEY, payload).await?;
		Ok(())
	}

	fn push(&self, event: SyncEvent) -> Result<()> {
		self.fifo.send(event);
		Ok(())
	}

	async fn subscribe(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<SyncEvent>> {
		let client = self.client().await?;
		let mut connection = client.get_multiplexed_tokio_connection().await?;

		// Broker consumer: BLPOP into the local FIFO.
		let fifo = Arc::clone(&self.fifo);
		let consumer_cancel = cancel.clone();
		let consumer_shutdown = self.shutdown.clone();
		tokio::spawn(async move {
			loop {
				let popped: redis::RedisResult<Option<(String, String)>> = tokio::select! {
					result = connection.blpop(QUEUE_KEY, POP_TIMEOUT_SECS) => result,
					_ = consumer_cancel.cancelled() => break,
					_ = consumer_shutdown.cancelled() => break,
				};
				match popped {
					Ok(Some((_, payload))) => match serde_json::from_str::<SyncEvent>(&payload) {
						Ok(event) => fifo.send(event),
						Err(error) => {
							tracing::error!(driver = "redis", %error, "dropping undecodable message");
						}
					},
					Ok(None) => continue,
					Err(error) => {
						tracing::error!(driver = "redis", %error, "BLPOP failed, backing off");
						tokio::time::sleep(std::time::Duration::from_secs(1)).await;
					}
				}
			}
		});

		// Distributor: local FIFO onto the subscriber stream.
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
