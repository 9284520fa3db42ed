// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Store drivers.
//!
//! Every source and destination is an implementation of [`Store`]; the sync
//! engine treats them as opaque. Instances are created per job from the
//! destination descriptor, initialized, used, and closed - deliberately
//! never cached, so credentials live no longer than the sync that needed
//! them and no connection state leaks between jobs.

pub mod aws;
pub mod error;
pub mod gcp;
pub mod github;
pub mod http;
pub mod memory;
pub mod ratelimit;
pub mod vault;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Deserialize;

use shuttle_core::spec::{Destination, VaultConfig};
use shuttle_core::transforms::SecretPayload;
use shuttle_core::{paths, ResourceMeta, SecretData, StoreKind};

pub use aws::AwsStore;
pub use error::{Result, StoreError};
pub use gcp::GcpStore;
pub use github::GithubStore;
pub use http::HttpStore;
pub use memory::{MemoryFactory, MemoryStore, SharedSecrets};
pub use vault::VaultStore;

/// The store capability.
#[async_trait]
pub trait Store: Send + Sync {
	/// Creates the underlying client and authenticates. Must be called
	/// before any data operation.
	async fn init(&mut self) -> Result<()>;

	/// Releases the underlying client. Instances must not be reused after
	/// close.
	async fn close(&mut self) -> Result<()>;

	fn validate(&self) -> Result<()>;

	/// Driver configuration as a loose map, for logging and source-address
	/// resolution.
	fn meta(&self) -> SecretData;

	fn kind(&self) -> StoreKind;

	/// The configured path expression for this instance.
	fn path(&self) -> String;

	async fn get(&self, path: &str) -> Result<SecretData>;

	async fn write(
		&self,
		meta: &ResourceMeta,
		path: &str,
		payload: &SecretPayload,
	) -> Result<SecretData>;

	async fn delete(&self, path: &str) -> Result<()>;

	/// Directory entries end in `/`; leaves do not.
	async fn list(&self, path: &str) -> Result<Vec<String>>;
}

/// Process-wide per-kind store defaults, merged into each per-spec instance
/// before the driver is built.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreDefaults {
	pub vault: Option<VaultConfig>,
	pub aws: Option<shuttle_core::spec::AwsConfig>,
	pub gcp: Option<shuttle_core::spec::GcpConfig>,
	pub github: Option<shuttle_core::spec::GithubConfig>,
	pub http: Option<shuttle_core::spec::HttpConfig>,
}

/// Builds store instances for the executor. The production factory
/// dispatches on the destination's kind tag; tests substitute an in-memory
/// factory.
pub trait StoreFactory: Send + Sync {
	fn source(&self, cfg: &VaultConfig) -> Result<Box<dyn Store>>;
	fn destination(&self, dest: &Destination) -> Result<Box<dyn Store>>;
}

/// The production driver table.
#[derive(Debug, Default)]
pub struct DriverFactory {
	defaults: StoreDefaults,
}

impl DriverFactory {
	pub fn new(defaults: StoreDefaults) -> Self {
		Self { defaults }
	}
}

impl StoreFactory for DriverFactory {
	fn source(&self, cfg: &VaultConfig) -> Result<Box<dyn Store>> {
		let mut cfg = cfg.clone();
		if let Some(defaults) = &self.defaults.vault {
			cfg.set_defaults(defaults);
		}
		Ok(Box::new(VaultStore::new(cfg)))
	}

	fn destination(&self, dest: &Destination) -> Result<Box<dyn Store>> {
		match dest {
			Destination::Vault(cfg) => {
				let mut cfg = cfg.clone();
				if let Some(defaults) = &self.defaults.vault {
					cfg.set_defaults(defaults);
				}
				Ok(Box::new(VaultStore::new(cfg)))
			}
			Destination::Aws(cfg) => {
				let mut cfg = cfg.clone();
				if let Some(defaults) = &self.defaults.aws {
					cfg.set_defaults(defaults);
				}
				Ok(Box::new(AwsStore::new(cfg)))
			}
			Destination::Gcp(cfg) => {
				let mut cfg = cfg.clone();
				if let Some(defaults) = &self.defaults.gcp {
					cfg.set_defaults(defaults);
				}
				Ok(Box::new(GcpStore::new(cfg)))
			}
			Destination::Github(cfg) => {
				let mut cfg = cfg.clone();
				if let Some(defaults) = &self.defaults.github {
					cfg.set_defaults(defaults);
				}
				Ok(Box::new(GithubStore::new(cfg)))
			}
			Destination::Http(cfg) => {
				let mut cfg = cfg.clone();
				if let Some(defaults) = &self.defaults.http {
					cfg.set_defaults(defaults);
				}
				Ok(Box::new(HttpStore::new(cfg)))
			}
		}
	}
}

const PATH_FORMAT_ERROR: &str = "must be in kv/path/to/secret format";

fn is_path_format_error(error: &StoreError) -> bool {
	error.to_string().contains(PATH_FORMAT_ERROR)
}

/// Recursively lists the store below the literal prefix of `path`.
///
/// Directory entries (trailing `/`) recurse; leaves accumulate in listing
/// order. A child that reproduces its own parent path stops that directory
/// to guard against infinite loops, and a store that rejects the prefix as
/// unlistable yields the prefix itself as the single leaf.
pub async fn enumerate_below(store: &dyn Store, path: &str) -> Result<Vec<String>> {
	let root = paths::highest_non_regex_prefix(path);
	let mut out = Vec::new();
	walk(store, root, &mut out).await?;
	Ok(out)
}

fn walk<'a>(
	store: &'a dyn Store,
	prefix: String,
	out: &'a mut Vec<String>,
) -> BoxFuture<'a, Result<()>> {
	Box::pin(async move {
		let entries = match store.list(&prefix).await {
			Ok(entries) => entries,
			Err(error) if is_path_format_error(&error) => {
				out.push(prefix);
				return Ok(());
			}
			Err(error) => return Err(error),
		};
		for entry in entries {
			let child = paths::join(&prefix, &entry);
			if entry.ends_with('/') {
				if child == prefix {
					break;
				}
				walk(store, child, out).await?;
			} else {
				out.push(child);
			}
		}
		Ok(())
	})
}
