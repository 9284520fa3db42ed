// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end executor scenarios against in-memory stores.

use std::sync::Arc;

use serde_json::json;

use shuttle_core::spec::{
	AwsConfig, Destination, Filters, FilterList, ResourceMeta, SecretSyncSpec, Transforms,
	VaultConfig,
};
use shuttle_core::{Operation, SecretData, SecretSync, SyncEvent, SyncRegistry};
use shuttle_metrics::Metrics;
use shuttle_notify::{Notifier, NotifyDefaults};
use shuttle_store::{MemoryFactory, SharedSecrets};
use shuttle_sync::{MemoryEventSink, MemoryStatusSink, SyncExecutor};

struct Harness {
	executor: SyncExecutor,
	factory: Arc<MemoryFactory>,
	status: Arc<MemoryStatusSink>,
	events: Arc<MemoryEventSink>,
	registry: Arc<SyncRegistry>,
}

fn harness() -> Harness {
	harness_with(MemoryFactory::new())
}

fn harness_with(factory: MemoryFactory) -> Harness {
	let factory = Arc::new(factory);
	let registry = Arc::new(SyncRegistry::new());
	let status = Arc::new(MemoryStatusSink::new());
	let events = Arc::new(MemoryEventSink::new());
	let executor = SyncExecutor::new(
		factory.clone(),
		Arc::clone(&registry),
		status.clone(),
		events.clone(),
		Arc::new(Notifier::new(NotifyDefaults::default())),
		Arc::new(Metrics::new()),
	);
	Harness {
		executor,
		factory,
		status,
		events,
		registry,
	}
}

fn seed(secrets: &SharedSecrets, path: &str, pairs: &[(&str, serde_json::Value)]) {
	let data: SecretData = pairs
		.iter()
		.map(|(k, v)| (k.to_string(), v.clone()))
		.collect();
	secrets.lock().unwrap().insert(path.to_string(), data);
}

fn dest_keys(secrets: &SharedSecrets) -> Vec<String> {
	secrets.lock().unwrap().keys().cloned().collect()
}

fn dest_value(secrets: &SharedSecrets, path: &str) -> Option<SecretData> {
	secrets.lock().unwrap().get(path).cloned()
}

fn resource(source_path: &str, dest_path: &str) -> SecretSync {
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
				path: source_path.into(),
				..Default::default()
			}),
			dest: vec![Destination::Aws(AwsConfig {
				name: dest_path.into(),
				..Default::default()
			})],
			..Default::default()
		},
		..Default::default()
	}
}

fn update_event(path: &str) -> SyncEvent {
	SyncEvent {
		event_id: "req-1".into(),
		address: "https://v1".into(),
		namespace: "n1".into(),
		path: path.into(),
		operation: Operation::Update,
		..Default::default()
	}
}

// A literal source path syncs to the destination path and reports Synced.
#[tokio::test]
async fn literal_single_sync() {
	let h = harness();
	seed(&h.factory.source, "secret/foo", &[("user", json!("svc"))]);
	h.registry.upsert(resource("secret/foo", "out/foo")).unwrap();

	h.executor
		.sync(update_event("secret/data/foo"))
		.await
		.unwrap();

	assert_eq!(dest_keys(&h.factory.dest), vec!["out/foo"]);
	let written = dest_value(&h.factory.dest, "out/foo").unwrap();
	assert_eq!(written.get("user"), Some(&json!("svc")));
	let status = h.status.status_of("ns/creds").unwrap();
	assert_eq!(status.status, "Synced");
}

// Capture groups in the source pattern substitute into the destination;
// the source read itself uses the logical path.
#[tokio::test]
async fn capture_group_rewrite() {
	let h = harness();
	seed(&h.factory.source, "secret/test", &[("k", json!("v"))]);
	h.registry
		.upsert(resource("secret/(data|other)/(.*)", "dest/$1/$2"))
		.unwrap();

	h.executor
		.sync(update_event("secret/data/test"))
		.await
		.unwrap();

	assert_eq!(dest_keys(&h.factory.dest), vec!["dest/data/test"]);
}

// Without capture groups the matched tail appends to the destination base.
#[tokio::test]
async fn prefix_append_rewrite() {
	let h = harness();
	seed(
		&h.factory.source,
		"secret/foo/bar/x/y/z",
		&[("k", json!("v"))],
	);
	h.registry
		.upsert(resource("secret/foo/bar/(.*)", "dest/hello/world/$1"))
		.unwrap();

	h.executor
		.sync(update_event("secret/foo/bar/x/y/z"))
		.await
		.unwrap();

	assert_eq!(dest_keys(&h.factory.dest), vec!["dest/hello/world/x/y/z"]);
}

// A suspended sync never runs and never touches status.
#[tokio::test]
async fn suspend_blocks_sync() {
	let h = harness();
	seed(&h.factory.source, "secret/foo", &[("user", json!("svc"))]);
	let mut res = resource("secret/foo", "out/foo");
	res.spec.suspend = Some(true);
	h.registry.upsert(res).unwrap();

	h.executor
		.sync(update_event("secret/data/foo"))
		.await
		.unwrap();

	assert!(dest_keys(&h.factory.dest).is_empty());
	assert!(h.status.status_of("ns/creds").is_none());
}

// syncDelete=false drops delete events for that sync.
#[tokio::test]
async fn delete_policy_blocks_delete() {
	let h = harness();
	seed(&h.factory.dest, "out/foo", &[("user", json!("svc"))]);
	let mut res = resource("secret/foo", "out/foo");
	res.spec.sync_delete = Some(false);
	h.registry.upsert(res).unwrap();

	let mut event = update_event("secret/data/foo");
	event.operation = Operation::Delete;
	h.executor.sync(event).await.unwrap();

	assert_eq!(dest_keys(&h.factory.dest), vec!["out/foo"]);
}

// Delete events remove the destination path when allowed.
#[tokio::test]
async fn delete_removes_destination() {
	let h = harness();
	seed(&h.factory.dest, "out/foo", &[("user", json!("svc"))]);
	h.registry.upsert(resource("secret/foo", "out/foo")).unwrap();

	let mut event = update_event("secret/data/foo");
	event.operation = Operation::Delete;
	h.executor.sync(event).await.unwrap();

	assert!(dest_keys(&h.factory.dest).is_empty());
}

// Field include transforms apply before the write.
#[tokio::test]
async fn transform_include_regex() {
	let h = harness();
	seed(
		&h.factory.source,
		"secret/foo",
		&[
			("NEXT_PUBLIC_A", json!(1)),
			("NEXT_PRIVATE_B", json!(2)),
		],
	);
	let mut res = resource("secret/foo", "out/foo");
	res.spec.transforms = Some(Transforms {
		include: vec!["NEXT_PUBLIC_.*".into()],
		..Default::default()
	});
	h.registry.upsert(res).unwrap();

	h.executor
		.sync(update_event("secret/data/foo"))
		.await
		.unwrap();

	let written = dest_value(&h.factory.dest, "out/foo").unwrap();
	assert_eq!(written.len(), 1);
	assert_eq!(written.get("NEXT_PUBLIC_A"), Some(&json!(1)));
}

// Dry run records DryRun status and writes nothing.
#[tokio::test]
async fn dry_run_skips_writes() {
	let h = harness();
	seed(&h.factory.source, "secret/foo", &[("user", json!("svc"))]);
	let mut res = resource("secret/foo", "out/foo");
	res.spec.dry_run = Some(true);
	h.registry.upsert(res).unwrap();

	h.executor
		.sync(update_event("secret/data/foo"))
		.await
		.unwrap();

	assert!(dest_keys(&h.factory.dest).is_empty());
	assert!(h
		.events
		.events()
		.iter()
		.any(|event| event.reason == "DryRun"));
}

// Path filters skip excluded source paths without failing the job.
#[tokio::test]
async fn path_filter_excludes() {
	let h = harness();
	seed(&h.factory.source, "secret/foo", &[("user", json!("svc"))]);
	let mut res = resource("secret/foo", "out/foo");
	res.spec.filters = Some(Filters {
		path: Some(FilterList {
			exclude: vec!["secret/foo".into()],
			..Default::default()
		}),
		..Default::default()
	});
	h.registry.upsert(res).unwrap();

	h.executor
		.sync(update_event("secret/data/foo"))
		.await
		.unwrap();

	assert!(dest_keys(&h.factory.dest).is_empty());
	// The job still counts as a success.
	let status = h.status.status_of("ns/creds").unwrap();
	assert_eq!(status.status, "Synced");
}

// A manual trigger on a regex source enumerates the store and syncs every
// matching leaf.
#[tokio::test]
async fn manual_regex_sync_enumerates() {
	let h = harness();
	seed(&h.factory.source, "secret/app/a", &[("k", json!("v"))]);
	seed(&h.factory.source, "secret/app/b", &[("k", json!("v"))]);
	seed(&h.factory.source, "secret/other/c", &[("k", json!("v"))]);
	h.registry
		.upsert(resource("secret/app/(.*)", "dest/$1"))
		.unwrap();

	let event = SyncEvent {
		sync_name: "ns/creds".into(),
		operation: Operation::Update,
		manual: true,
		..Default::default()
	};
	h.executor.sync(event).await.unwrap();

	let mut keys = dest_keys(&h.factory.dest);
	keys.sort();
	assert_eq!(keys, vec!["dest/a", "dest/b"]);
}

// A failing destination fails the job and records Failed status, but a
// sibling sync against a healthy destination is unaffected.
#[tokio::test]
async fn destination_failure_is_isolated() {
	let mut factory = MemoryFactory::new();
	factory.fail_dest = true;
	let h = harness_with(factory);
	seed(&h.factory.source, "secret/foo", &[("user", json!("svc"))]);
	h.registry.upsert(resource("secret/foo", "out/foo")).unwrap();

	let error = h
		.executor
		.sync(update_event("secret/data/foo"))
		.await
		.unwrap_err();
	assert!(error.to_string().contains("errors"));
	let status = h.status.status_of("ns/creds").unwrap();
	assert_eq!(status.status, "Failed");
}

// Events that match no sync are a clean no-op.
#[tokio::test]
async fn unmatched_event_is_no_op() {
	let h = harness();
	h.registry.upsert(resource("secret/foo", "out/foo")).unwrap();
	h.executor
		.sync(update_event("secret/data/unrelated"))
		.await
		.unwrap();
	assert!(dest_keys(&h.factory.dest).is_empty());
}

// Unknown operations fail the job with a clear error.
#[tokio::test]
async fn unknown_operation_fails() {
	let h = harness();
	seed(&h.factory.source, "secret/foo", &[("user", json!("svc"))]);
	h.registry.upsert(resource("secret/foo", "out/foo")).unwrap();

	let mut event = update_event("secret/data/foo");
	event.operation = Operation::List;
	let error = h.executor.sync(event).await.unwrap_err();
	assert!(error.to_string().contains("operation not defined"));
}
