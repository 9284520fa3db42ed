// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fanning one queued event into the set of syncs that must react.

use shuttle_core::paths::{data_metadata_paths, is_path_match};
use shuttle_core::{Operation, SecretSync, SyncEvent, SyncRegistry};

/// One unit of executor work: one event against one sync.
#[derive(Debug, Clone)]
pub struct SyncJob {
	pub event: SyncEvent,
	pub sync: SecretSync,
}

/// Whether `sync` must react to `event`.
pub fn needs_sync(sync: &SecretSync, event: &SyncEvent) -> bool {
	if sync.spec.suspend() {
		tracing::trace!(sync = %sync.key(), "sync suspended");
		return false;
	}
	if !event.sync_name.is_empty() && sync.key() != event.sync_name {
		return false;
	}
	let Some(source) = &sync.spec.source else {
		tracing::warn!(sync = %sync.key(), "source is not defined");
		return false;
	};
	if event.address != source.address {
		return false;
	}
	let event_namespace = event.namespace.trim_end_matches('/');
	let source_namespace = source.namespace.as_deref().unwrap_or("");
	if !event_namespace.is_empty()
		&& !source_namespace.is_empty()
		&& event_namespace != source_namespace
	{
		return false;
	}
	if event.operation == Operation::Delete && !sync.spec.sync_delete() {
		tracing::trace!(sync = %sync.key(), "delete operation not allowed");
		return false;
	}
	let source_path = &source.path;
	let (data_path, metadata_path) = data_metadata_paths(source_path);
	is_path_match(source_path, &event.path)
		|| is_path_match(&data_path, &event.path)
		|| is_path_match(&metadata_path, &event.path)
}

/// Resolves the jobs for one event. Manual events are pinned to a single
/// sync by name and bypass the tenant index; everything else routes through
/// it and is filtered by [`needs_sync`].
pub fn build_sync_jobs(registry: &SyncRegistry, event: &SyncEvent) -> Vec<SyncJob> {
	if event.manual && !event.sync_name.is_empty() {
		let Some(sync) = registry.get_by_key(&event.sync_name) else {
			tracing::error!(sync = %event.sync_name, "failed to get sync for manual event");
			return Vec::new();
		};
		return vec![SyncJob {
			event: event.clone(),
			sync,
		}];
	}
	registry
		.lookup(event)
		.into_iter()
		.filter(|sync| needs_sync(sync, event))
		.map(|sync| SyncJob {
			event: event.clone(),
			sync,
		})
		.collect()
}
