// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pluggable event queue.
//!
//! One queue instance is shared by the whole process: the ingress publishes
//! normalized events onto it, the event processor subscribes, and manual
//! triggers inject events into the local stream without a broker round trip.
//! Dedup memory lives on the queue because it must sit in front of publish,
//! whichever backend is active.

pub mod error;
pub mod fifo;
pub mod memory;
pub mod nats;
pub mod redis;
pub mod seen;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use shuttle_core::SyncEvent;
use shuttle_metrics::{ServiceHealth, ServiceStatus};

pub use error::{QueueError, Result};
pub use fifo::UnboundedFifo;
pub use memory::MemoryQueue;
pub use nats::NatsQueue;
pub use redis::RedisQueue;
pub use seen::SeenEvents;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// The queue capability every backend provides.
#[async_trait]
pub trait Queue: Send + Sync {
	async fn start(&self) -> Result<()>;
	async fn stop(&self) -> Result<()>;
	async fn ping(&self) -> Result<()>;

	/// Durable publish through the broker when the backend has one;
	/// best-effort locally otherwise.
	async fn publish(&self, event: SyncEvent) -> Result<()>;

	/// Places an event directly into the local subscriber stream, bypassing
	/// the broker. Used by manual triggers; must not fail on the unbounded
	/// backends.
	fn push(&self, event: SyncEvent) -> Result<()>;

	/// A lazy FIFO stream of events. The stream terminates when `cancel`
	/// fires; each delivered event is consumed by exactly one subscriber.
	async fn subscribe(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<SyncEvent>>;

	fn seen_event(&self, id: &str);
	fn event_seen(&self, id: &str) -> bool;
}

/// Backend selector as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
	Memory,
	Redis,
	Nats,
}

impl Default for QueueKind {
	fn default() -> Self {
		QueueKind::Memory
	}
}

impl fmt::Display for QueueKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			QueueKind::Memory => f.write_str("memory"),
			QueueKind::Redis => f.write_str("redis"),
			QueueKind::Nats => f.write_str("nats"),
		}
	}
}

impl std::str::FromStr for QueueKind {
	type Err = QueueError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"memory" => Ok(QueueKind::Memory),
			"redis" => Ok(QueueKind::Redis),
			"nats" => Ok(QueueKind::Nats),
			other => Err(QueueError::UnknownKind(other.to_string())),
		}
	}
}

/// Builds a queue backend from its tag and free-form parameters.
pub fn new_queue(
	kind: QueueKind,
	params: serde_json::Value,
	dedupe: bool,
) -> Result<Arc<dyn Queue>> {
	match kind {
		QueueKind::Memory => Ok(Arc::new(MemoryQueue::new(dedupe))),
		QueueKind::Redis => Ok(Arc::new(RedisQueue::from_params(params, dedupe)?)),
		QueueKind::Nats => Ok(Arc::new(NatsQueue::from_params(params, dedupe)?)),
	}
}

/// Builds and starts the configured backend, registers its health, and
/// spawns the fatal heartbeat.
pub async fn init(
	kind: QueueKind,
	params: serde_json::Value,
	dedupe: bool,
	health: Arc<ServiceHealth>,
) -> Result<Arc<dyn Queue>> {
	let queue = new_queue(kind, params, dedupe)?;
	if let Err(error) = queue.start().await {
		tracing::error!(%kind, %error, "failed to start queue");
		health.register("queue", ServiceStatus::Critical);
		return Err(error);
	}
	health.register("queue", ServiceStatus::Ok);
	spawn_heartbeat(Arc::clone(&queue), health);
	Ok(queue)
}

/// Polls the backend every ten seconds. A failed ping means the broker is
/// gone and nothing downstream can make progress, so the process dies and
/// lets the supervisor restart it.
fn spawn_heartbeat(queue: Arc<dyn Queue>, health: Arc<ServiceHealth>) {
	tokio::spawn(async move {
		loop {
			if let Err(error) = queue.ping().await {
				health.register("queue", ServiceStatus::Critical);
				tracing::error!(%error, "queue ping failed");
				std::process::exit(1);
			}
			tokio::time::sleep(HEARTBEAT_INTERVAL).await;
		}
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn kind_parses_known_tags() {
		assert_eq!("memory".parse::<QueueKind>().unwrap(), QueueKind::Memory);
		assert_eq!("redis".parse::<QueueKind>().unwrap(), QueueKind::Redis);
		assert_eq!("nats".parse::<QueueKind>().unwrap(), QueueKind::Nats);
		assert!(matches!(
			"sqs".parse::<QueueKind>(),
			Err(QueueError::UnknownKind(_))
		));
	}

	#[tokio::test]
	async fn init_starts_memory_queue_and_marks_health() {
		let health = Arc::new(ServiceHealth::new());
		let queue = init(
			QueueKind::Memory,
			serde_json::Value::Null,
			true,
			Arc::clone(&health),
		)
		.await
		.unwrap();
		assert_eq!(health.overall(), ServiceStatus::Ok);
		queue.push(SyncEvent::default()).unwrap();
	}
}
