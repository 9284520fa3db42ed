// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Single-process queue backend.
//!
//! Valid only when ingestion and processing share the process; startup
//! validation rejects anything else. Publish and push both land in the
//! unbounded local FIFO so events are never dropped while no subscriber is
//! active.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use shuttle_core::SyncEvent;

use crate::error::Result;
use crate::fifo::UnboundedFifo;
use crate::seen::SeenEvents;
use crate::Queue;

pub struct MemoryQueue {
	fifo: Arc<UnboundedFifo<SyncEvent>>,
	seen: Arc<SeenEvents>,
	shutdown: CancellationToken,
}

impl MemoryQueue {
	pub fn new(dedupe: bool) -> Self {
		Self {
			fifo: Arc::new(UnboundedFifo::new()),
			seen: Arc::new(SeenEvents::new(dedupe)),
			shutdown: CancellationToken::new(),
		}
	}
}

#[async_trait]
impl Queue for MemoryQueue {
	async fn start(&self) -> Result<()> {
		self.seen.spawn_sweeper(self.shutdown.clone());
		Ok(())
	}

	async fn stop(&self) -> Result<()> {
		self.shutdown.cancel();
		Ok(())
	}

	async fn ping(&self) -> Result<()> {
		Ok(())
	}

	async fn publish(&self, event: SyncEvent) -> Result<()> {
		tracing::trace!(driver = "memory", event_id = %event.event_id, "publish");
		self.fifo.send(event);
		Ok(())
	}

	fn push(&self, event: SyncEvent) -> Result<()> {
		self.fifo.send(event);
		Ok(())
	}

	async fn subscribe(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<SyncEvent>> {
		let (tx, rx) = mpsc::channel(1);
		let fifo = Arc::clone(&self.fifo);
		let shutdown = self.shutdown.clone();
		tokio::spawn(async move {
			loop {
				let event = tokio::select! {
					received = fifo.receive(&cancel) => match received {
						Ok(event) => event,
						Err(_) => break,
					},
					_ = shutdown.cancelled() => break,
				};
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

#[cfg(test)]
mod tests {
	use super::*;

	fn event(id: &str, path: &str) -> SyncEvent {
		SyncEvent {
			event_id: id.into(),
			path: path.into(),
			..Default::default()
		}
	}

	#[tokio::test]
	async fn publish_reaches_subscriber_in_order() {
		let queue = MemoryQueue::new(true);
		queue.start().await.unwrap();
		let cancel = CancellationToken::new();
		let mut rx = queue.subscribe(cancel.clone()).await.unwrap();

		queue.publish(event("e1", "secret/a")).await.unwrap();
		queue.publish(event("e2", "secret/b")).await.unwrap();

		assert_eq!(rx.recv().await.unwrap().event_id, "e1");
		assert_eq!(rx.recv().await.unwrap().event_id, "e2");
		cancel.cancel();
	}

	#[tokio::test]
	async fn push_without_subscriber_is_buffered() {
		let queue = MemoryQueue::new(true);
		queue.start().await.unwrap();
		queue.push(event("e1", "secret/a")).unwrap();

		let cancel = CancellationToken::new();
		let mut rx = queue.subscribe(cancel.clone()).await.unwrap();
		assert_eq!(rx.recv().await.unwrap().event_id, "e1");
		cancel.cancel();
	}

	#[tokio::test]
	async fn dedup_round_trip() {
		let queue = MemoryQueue::new(true);
		assert!(!queue.event_seen("dup"));
		queue.seen_event("dup");
		assert!(queue.event_seen("dup"));
	}

	#[tokio::test]
	async fn subscriber_stream_ends_on_cancel() {
		let queue = MemoryQueue::new(false);
		queue.start().await.unwrap();
		let cancel = CancellationToken::new();
		let mut rx = queue.subscribe(cancel.clone()).await.unwrap();
		cancel.cancel();
		assert!(rx.recv().await.is_none());
	}
}
