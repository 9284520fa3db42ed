// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Manual triggers: a synthetic event pinned to one sync by its canonical
//! key, injected straight into the local queue stream.

use shuttle_core::{Operation, SecretSync, SyncEvent};
use shuttle_metrics::Metrics;
use shuttle_queue::Queue;

use crate::error::Result;

pub async fn manual_trigger(
	queue: &dyn Queue,
	metrics: &Metrics,
	sync: &SecretSync,
	operation: Operation,
) -> Result<()> {
	let namespace = &sync.metadata.namespace;
	let name = &sync.metadata.name;
	metrics
		.manual_sync_requests
		.with_label_values(&[namespace, name])
		.inc();
	let event = SyncEvent {
		sync_name: sync.key(),
		operation,
		manual: true,
		..Default::default()
	};
	tracing::debug!(sync = %event.sync_name, op = %operation, "manual trigger");
	if let Err(error) = queue.push(event) {
		metrics
			.manual_sync_errors
			.with_label_values(&[namespace, name])
			.inc();
		return Err(error.into());
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;

	use shuttle_core::spec::ResourceMeta;
	use shuttle_queue::{MemoryQueue, Queue};
	use tokio_util::sync::CancellationToken;

	#[tokio::test]
	async fn trigger_pushes_named_manual_event() {
		let queue = Arc::new(MemoryQueue::new(false));
		queue.start().await.unwrap();
		let metrics = Metrics::new();
		let sync = SecretSync {
			metadata: ResourceMeta {
				namespace: "ns".into(),
				name: "creds".into(),
				..Default::default()
			},
			..Default::default()
		};

		manual_trigger(queue.as_ref(), &metrics, &sync, Operation::Delete)
			.await
			.unwrap();

		let cancel = CancellationToken::new();
		let mut rx = queue.subscribe(cancel.clone()).await.unwrap();
		let event = rx.recv().await.unwrap();
		assert_eq!(event.sync_name, "ns/creds");
		assert_eq!(event.operation, Operation::Delete);
		assert!(event.manual);
		assert!(event.path.is_empty());
		cancel.cancel();
	}
}
