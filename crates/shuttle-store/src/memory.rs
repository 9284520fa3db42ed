// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-process store over a shared map.
//!
//! Backs executor tests and local experimentation; handles into the same
//! shared map observe each other's writes, which is exactly what a per-job
//! client of a real store would see.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use shuttle_core::spec::{Destination, VaultConfig};
use shuttle_core::transforms::SecretPayload;
use shuttle_core::{ResourceMeta, SecretData, StoreKind};

use crate::error::{Result, StoreError};
use crate::{Store, StoreFactory};

pub type SharedSecrets = Arc<Mutex<BTreeMap<String, SecretData>>>;

pub fn shared_secrets() -> SharedSecrets {
	Arc::new(Mutex::new(BTreeMap::new()))
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
	path: String,
	secrets: SharedSecrets,
	fail: bool,
}

impl MemoryStore {
	pub fn new(path: impl Into<String>, secrets: SharedSecrets) -> Self {
		Self {
			path: path.into(),
			secrets,
			fail: false,
		}
	}

	/// A store whose every operation fails, for error-isolation tests.
	pub fn failing(path: impl Into<String>, secrets: SharedSecrets) -> Self {
		Self {
			path: path.into(),
			secrets,
			fail: true,
		}
	}

	fn check(&self) -> Result<()> {
		if self.fail {
			return Err(StoreError::Config("memory store configured to fail".into()));
		}
		Ok(())
	}
}

#[async_trait]
impl Store for MemoryStore {
	async fn init(&mut self) -> Result<()> {
		self.check()
	}

	async fn close(&mut self) -> Result<()> {
		Ok(())
	}

	fn validate(&self) -> Result<()> {
		self.check()
	}

	fn meta(&self) -> SecretData {
		let mut meta = SecretData::new();
		meta.insert("path".into(), self.path.clone().into());
		meta
	}

	fn kind(&self) -> StoreKind {
		StoreKind::Memory
	}

	fn path(&self) -> String {
		self.path.clone()
	}

	async fn get(&self, path: &str) -> Result<SecretData> {
		self.check()?;
		let secrets = self.secrets.lock().expect("memory store mutex poisoned");
		secrets
			.get(path)
			.cloned()
			.ok_or_else(|| StoreError::NotFound(path.to_string()))
	}

	async fn write(
		&self,
		_meta: &ResourceMeta,
		path: &str,
		payload: &SecretPayload,
	) -> Result<SecretData> {
		self.check()?;
		let data = match payload {
			SecretPayload::Structured(data) => data.clone(),
			SecretPayload::Text(text) => {
				let mut data = SecretData::new();
				data.insert("value".into(), text.clone().into());
				data
			}
		};
		let mut secrets = self.secrets.lock().expect("memory store mutex poisoned");
		secrets.insert(path.to_string(), data.clone());
		Ok(data)
	}

	async fn delete(&self, path: &str) -> Result<()> {
		self.check()?;
		let mut secrets = self.secrets.lock().expect("memory store mutex poisoned");
		secrets.remove(path);
		Ok(())
	}

	async fn list(&self, path: &str) -> Result<Vec<String>> {
		self.check()?;
		let prefix = format!("{}/", path.trim_end_matches('/'));
		let secrets = self.secrets.lock().expect("memory store mutex poisoned");
		let mut entries = Vec::new();
		for key in secrets.keys() {
			let Some(remainder) = key.strip_prefix(&prefix) else {
				continue;
			};
			let entry = match remainder.split_once('/') {
				Some((dir, _)) => format!("{dir}/"),
				None => remainder.to_string(),
			};
			if !entries.contains(&entry) {
				entries.push(entry);
			}
		}
		Ok(entries)
	}
}

/// Test factory: every source shares one map, every destination another.
#[derive(Debug, Clone)]
pub struct MemoryFactory {
	pub source: SharedSecrets,
	pub dest: SharedSecrets,
	pub fail_dest: bool,
}

impl Default for MemoryFactory {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryFactory {
	pub fn new() -> Self {
		Self {
			source: shared_secrets(),
			dest: shared_secrets(),
			fail_dest: false,
		}
	}
}

impl StoreFactory for MemoryFactory {
	fn source(&self, cfg: &VaultConfig) -> Result<Box<dyn Store>> {
		Ok(Box::new(MemoryStore::new(
			cfg.path.clone(),
			Arc::clone(&self.source),
		)))
	}

	fn destination(&self, dest: &Destination) -> Result<Box<dyn Store>> {
		let store = if self.fail_dest {
			MemoryStore::failing(dest.path_expression(), Arc::clone(&self.dest))
		} else {
			MemoryStore::new(dest.path_expression(), Arc::clone(&self.dest))
		};
		Ok(Box::new(store))
	}
}
