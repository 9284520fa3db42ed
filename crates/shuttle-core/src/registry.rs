// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory index of active `SecretSync` resources.
//!
//! Two views are maintained under one mutex: a flat map keyed by
//! `"{namespace}/{name}"`, and a tenant index keyed by source address then
//! source namespace so an inbound event can be routed without scanning every
//! resource. For every entry in the flat map there is exactly one entry in
//! the tenant index.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{CoreError, Result};
use crate::event::SyncEvent;
use crate::spec::SecretSync;

#[derive(Debug, Default)]
struct Indexes {
	by_key: HashMap<String, SecretSync>,
	by_tenant: HashMap<String, HashMap<String, Vec<SecretSync>>>,
}

#[derive(Debug, Default)]
pub struct SyncRegistry {
	inner: Mutex<Indexes>,
}

impl SyncRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts or replaces the resource at its canonical key. A replace
	/// removes the previous revision from the tenant index before the new
	/// one is added, so lookups never observe both.
	pub fn upsert(&self, sync: SecretSync) -> Result<()> {
		let (tenant, namespace) = sync.source_tenant_namespace()?;
		let key = sync.key();
		let mut inner = self.inner.lock().expect("registry mutex poisoned");
		if let Some(existing) = inner.by_key.remove(&key) {
			remove_indexed(&mut inner, &existing);
		}
		inner
			.by_tenant
			.entry(tenant)
			.or_default()
			.entry(namespace)
			.or_default()
			.push(sync.clone());
		inner.by_key.insert(key, sync);
		Ok(())
	}

	/// Removes the resource at `key` from both views. Emptied inner maps are
	/// dropped so tenants do not accumulate.
	pub fn remove(&self, key: &str) -> Result<()> {
		let mut inner = self.inner.lock().expect("registry mutex poisoned");
		let Some(existing) = inner.by_key.remove(key) else {
			return Err(CoreError::NotFound(key.to_string()));
		};
		remove_indexed(&mut inner, &existing);
		Ok(())
	}

	pub fn get_by_key(&self, key: &str) -> Option<SecretSync> {
		let inner = self.inner.lock().expect("registry mutex poisoned");
		inner.by_key.get(key).cloned()
	}

	/// All resources indexed under the event's trimmed tenant and namespace.
	pub fn lookup(&self, event: &SyncEvent) -> Vec<SecretSync> {
		let tenant = event.address.trim_end_matches('/');
		let namespace = {
			let ns = event.namespace.trim_end_matches('/');
			if ns.is_empty() {
				"default"
			} else {
				ns
			}
		};
		let inner = self.inner.lock().expect("registry mutex poisoned");
		inner
			.by_tenant
			.get(tenant)
			.and_then(|namespaces| namespaces.get(namespace))
			.cloned()
			.unwrap_or_default()
	}

	/// Snapshot of every registered resource, used by the ingress to resolve
	/// event addresses from source metadata.
	pub fn all(&self) -> Vec<SecretSync> {
		let inner = self.inner.lock().expect("registry mutex poisoned");
		inner.by_key.values().cloned().collect()
	}

	pub fn len(&self) -> usize {
		let inner = self.inner.lock().expect("registry mutex poisoned");
		inner.by_key.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

fn remove_indexed(inner: &mut Indexes, existing: &SecretSync) {
	let Ok((tenant, namespace)) = existing.source_tenant_namespace() else {
		return;
	};
	let Some(namespaces) = inner.by_tenant.get_mut(&tenant) else {
		return;
	};
	if let Some(syncs) = namespaces.get_mut(&namespace) {
		syncs.retain(|s| {
			s.metadata.name != existing.metadata.name
				|| s.metadata.namespace != existing.metadata.namespace
		});
		if syncs.is_empty() {
			namespaces.remove(&namespace);
		}
	}
	if namespaces.is_empty() {
		inner.by_tenant.remove(&tenant);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::spec::{ResourceMeta, SecretSyncSpec, VaultConfig};

	fn sync(namespace: &str, name: &str, address: &str, source_ns: &str, path: &str) -> SecretSync {
		SecretSync {
			metadata: ResourceMeta {
				namespace: namespace.into(),
				name: name.into(),
				..Default::default()
			},
			spec: SecretSyncSpec {
				source: Some(VaultConfig {
					address: address.into(),
					namespace: if source_ns.is_empty() {
						None
					} else {
						Some(source_ns.into())
					},
					path: path.into(),
					..Default::default()
				}),
				..Default::default()
			},
			..Default::default()
		}
	}

	fn event(address: &str, namespace: &str) -> SyncEvent {
		SyncEvent {
			address: address.into(),
			namespace: namespace.into(),
			..Default::default()
		}
	}

	#[test]
	fn upsert_then_lookup_returns_exactly_once() {
		let registry = SyncRegistry::new();
		registry
			.upsert(sync("ns", "a", "https://v1", "team-a", "secret/foo"))
			.unwrap();
		let found = registry.lookup(&event("https://v1", "team-a"));
		assert_eq!(found.len(), 1);
		assert_eq!(found[0].key(), "ns/a");
	}

	#[test]
	fn replace_never_returns_both_revisions() {
		let registry = SyncRegistry::new();
		registry
			.upsert(sync("ns", "a", "https://v1", "team-a", "secret/foo"))
			.unwrap();
		registry
			.upsert(sync("ns", "a", "https://v1", "team-a", "secret/bar"))
			.unwrap();
		let found = registry.lookup(&event("https://v1", "team-a"));
		assert_eq!(found.len(), 1);
		assert_eq!(found[0].spec.source.as_ref().unwrap().path, "secret/bar");
	}

	#[test]
	fn replace_moving_tenants_reindexes() {
		let registry = SyncRegistry::new();
		registry
			.upsert(sync("ns", "a", "https://v1", "team-a", "secret/foo"))
			.unwrap();
		registry
			.upsert(sync("ns", "a", "https://v2", "team-a", "secret/foo"))
			.unwrap();
		assert!(registry.lookup(&event("https://v1", "team-a")).is_empty());
		assert_eq!(registry.lookup(&event("https://v2", "team-a")).len(), 1);
	}

	#[test]
	fn lookup_trims_and_defaults_namespace() {
		let registry = SyncRegistry::new();
		registry
			.upsert(sync("ns", "a", "https://v1", "", "secret/foo"))
			.unwrap();
		assert_eq!(registry.lookup(&event("https://v1/", "")).len(), 1);
		assert_eq!(registry.lookup(&event("https://v1", "default/")).len(), 1);
	}

	#[test]
	fn remove_drops_empty_inner_maps() {
		let registry = SyncRegistry::new();
		registry
			.upsert(sync("ns", "a", "https://v1", "team-a", "secret/foo"))
			.unwrap();
		registry.remove("ns/a").unwrap();
		assert!(registry.is_empty());
		let inner = registry.inner.lock().unwrap();
		assert!(inner.by_tenant.is_empty());
	}

	#[test]
	fn remove_unknown_is_not_found() {
		let registry = SyncRegistry::new();
		assert!(matches!(
			registry.remove("ns/missing"),
			Err(CoreError::NotFound(_))
		));
	}

	#[test]
	fn get_by_key_returns_registered_resource() {
		let registry = SyncRegistry::new();
		registry
			.upsert(sync("ns", "a", "https://v1", "team-a", "secret/foo"))
			.unwrap();
		assert!(registry.get_by_key("ns/a").is_some());
		assert!(registry.get_by_key("ns/b").is_none());
	}
}
