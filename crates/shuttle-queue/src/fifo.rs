// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Unbounded multi-producer multi-consumer FIFO.
//!
//! Broker subscribers decode messages into this queue so that a slow worker
//! never blocks the broker read loop: `send` never blocks, `receive` parks
//! until an item arrives or the caller is cancelled. Insertion order is
//! preserved per producer; each dequeue consumes exactly one item.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{QueueError, Result};

#[derive(Debug)]
pub struct UnboundedFifo<T> {
	items: Mutex<VecDeque<T>>,
	// Carries at most one pending permit, like a buffered ready channel;
	// receivers re-check the list before parking so coalesced notifications
	// are not lost.
	ready: Notify,
}

impl<T> Default for UnboundedFifo<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> UnboundedFifo<T> {
	pub fn new() -> Self {
		Self {
			items: Mutex::new(VecDeque::new()),
			ready: Notify::new(),
		}
	}

	/// Enqueues one item. Never blocks and never fails.
	pub fn send(&self, item: T) {
		{
			let mut items = self.items.lock().expect("fifo mutex poisoned");
			items.push_back(item);
		}
		self.ready.notify_one();
	}

	/// Dequeues the oldest item, waiting until one is available or `cancel`
	/// fires.
	pub async fn receive(&self, cancel: &CancellationToken) -> Result<T> {
		loop {
			{
				let mut items = self.items.lock().expect("fifo mutex poisoned");
				if let Some(item) = items.pop_front() {
					return Ok(item);
				}
			}
			// Cancellation wins when both are ready, so a cancelled
			// receiver never steals an item it cannot deliver.
			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(QueueError::Cancelled),
				_ = self.ready.notified() => continue,
			}
		}
	}

	pub fn len(&self) -> usize {
		self.items.lock().expect("fifo mutex poisoned").len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;
	use std::sync::Arc;
	use std::time::Duration;

	#[tokio::test]
	async fn send_then_receive() {
		let fifo = UnboundedFifo::new();
		let cancel = CancellationToken::new();
		fifo.send("one");
		assert_eq!(fifo.len(), 1);
		assert_eq!(fifo.receive(&cancel).await.unwrap(), "one");
		assert!(fifo.is_empty());
	}

	#[tokio::test]
	async fn preserves_single_producer_order() {
		let fifo = UnboundedFifo::new();
		let cancel = CancellationToken::new();
		for item in ["first", "second", "third", "fourth", "fifth"] {
			fifo.send(item);
		}
		for expected in ["first", "second", "third", "fourth", "fifth"] {
			assert_eq!(fifo.receive(&cancel).await.unwrap(), expected);
		}
	}

	#[tokio::test]
	async fn receive_returns_on_cancellation() {
		let fifo: Arc<UnboundedFifo<u32>> = Arc::new(UnboundedFifo::new());
		let cancel = CancellationToken::new();
		let handle = {
			let fifo = Arc::clone(&fifo);
			let cancel = cancel.clone();
			tokio::spawn(async move { fifo.receive(&cancel).await })
		};
		tokio::time::sleep(Duration::from_millis(50)).await;
		cancel.cancel();
		let result = handle.await.unwrap();
		assert!(matches!(result, Err(QueueError::Cancelled)));
	}

	#[tokio::test]
	async fn concurrent_producers_and_consumers_lose_nothing() {
		const PRODUCERS: usize = 20;
		const PER_PRODUCER: usize = 200;
		let fifo: Arc<UnboundedFifo<String>> = Arc::new(UnboundedFifo::new());
		let cancel = CancellationToken::new();

		let mut producers = Vec::new();
		for p in 0..PRODUCERS {
			let fifo = Arc::clone(&fifo);
			producers.push(tokio::spawn(async move {
				for i in 0..PER_PRODUCER {
					fifo.send(format!("pub-{p}-msg-{i}"));
				}
			}));
		}
		for handle in producers {
			handle.await.unwrap();
		}

		let mut consumers = Vec::new();
		for _ in 0..4 {
			let fifo = Arc::clone(&fifo);
			let cancel = cancel.clone();
			consumers.push(tokio::spawn(async move {
				let mut seen = Vec::new();
				while let Ok(item) = fifo.receive(&cancel).await {
					seen.push(item);
				}
				seen
			}));
		}
		// Let the consumers drain everything, then release them.
		while !fifo.is_empty() {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
		cancel.cancel();

		let mut received = HashSet::new();
		for handle in consumers {
			for item in handle.await.unwrap() {
				assert!(received.insert(item), "duplicate delivery");
			}
		}
		assert_eq!(received.len(), PRODUCERS * PER_PRODUCER);
	}

	#[test]
	fn sequential_multiset_matches() {
		// Whatever one producer sends is received, in order, as a whole.
		proptest::proptest!(|(items: Vec<u32>)| {
			let runtime = tokio::runtime::Builder::new_current_thread()
				.build()
				.unwrap();
			runtime.block_on(async {
				let fifo = UnboundedFifo::new();
				let cancel = CancellationToken::new();
				for item in &items {
					fifo.send(*item);
				}
				let mut out = Vec::with_capacity(items.len());
				for _ in 0..items.len() {
					out.push(fifo.receive(&cancel).await.unwrap());
				}
				proptest::prop_assert_eq!(out, items.clone());
				proptest::prop_assert!(fifo.is_empty());
				Ok(())
			}).unwrap();
		});
	}
}
