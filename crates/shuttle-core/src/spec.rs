// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The `SecretSync` resource: one declarative source-to-many-destinations
//! synchronization, including filters, transforms, and notification targets.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Minimal object metadata carried by a `SecretSync` resource.
///
/// This mirrors what the control plane hands us on lifecycle notifications;
/// the controller never talks to the control plane directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
	#[serde(default)]
	pub namespace: String,
	#[serde(default)]
	pub name: String,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub annotations: BTreeMap<String, String>,
	/// Set when the resource is being torn down by the control plane.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deletion_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSync {
	#[serde(default)]
	pub metadata: ResourceMeta,
	#[serde(default)]
	pub spec: SecretSyncSpec,
	#[serde(default)]
	pub status: SecretSyncStatus,
}

impl SecretSync {
	/// Canonical registry key, `"{namespace}/{name}"`.
	pub fn key(&self) -> String {
		crate::canonical_key(&self.metadata.namespace, &self.metadata.name)
	}

	/// Tenant and namespace under which this sync is indexed.
	///
	/// The tenant is the trimmed source address; the namespace is the trimmed
	/// source namespace, defaulting to `"default"` when empty.
	pub fn source_tenant_namespace(&self) -> Result<(String, String), CoreError> {
		let source = self.spec.source.as_ref().ok_or(CoreError::MissingSource)?;
		let tenant = source.address.trim_end_matches('/');
		if tenant.is_empty() {
			return Err(CoreError::EmptyTenant);
		}
		let namespace = source
			.namespace
			.as_deref()
			.map(|ns| ns.trim_end_matches('/'))
			.filter(|ns| !ns.is_empty())
			.unwrap_or("default");
		Ok((tenant.to_string(), namespace.to_string()))
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSyncSpec {
	pub source: Option<VaultConfig>,
	#[serde(default)]
	pub dest: Vec<Destination>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sync_delete: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dry_run: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub suspend: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub filters: Option<Filters>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transforms: Option<Transforms>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub notifications: Vec<NotificationTarget>,
}

impl SecretSyncSpec {
	pub fn sync_delete(&self) -> bool {
		self.sync_delete.unwrap_or(true)
	}

	pub fn dry_run(&self) -> bool {
		self.dry_run.unwrap_or(false)
	}

	pub fn suspend(&self) -> bool {
		self.suspend.unwrap_or(false)
	}
}

/// Observed state written back through the status sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSyncStatus {
	#[serde(default)]
	pub status: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_sync_time: Option<DateTime<Utc>>,
	#[serde(default)]
	pub sync_destinations: usize,
	#[serde(default)]
	pub hash: String,
}

/// Store driver identity tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
	Vault,
	Aws,
	Gcp,
	Github,
	Http,
	Memory,
}

impl fmt::Display for StoreKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			StoreKind::Vault => "vault",
			StoreKind::Aws => "aws",
			StoreKind::Gcp => "gcp",
			StoreKind::Github => "github",
			StoreKind::Http => "http",
			StoreKind::Memory => "memory",
		};
		f.write_str(name)
	}
}

/// One destination store descriptor. Exactly one kind per entry; the config
/// loader rejects anything else by construction of the tagged enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
	Vault(VaultConfig),
	Aws(AwsConfig),
	Gcp(GcpConfig),
	Github(GithubConfig),
	Http(HttpConfig),
}

impl Destination {
	pub fn kind(&self) -> StoreKind {
		match self {
			Destination::Vault(_) => StoreKind::Vault,
			Destination::Aws(_) => StoreKind::Aws,
			Destination::Gcp(_) => StoreKind::Gcp,
			Destination::Github(_) => StoreKind::Github,
			Destination::Http(_) => StoreKind::Http,
		}
	}

	/// The destination path expression, which may carry `$1`..`$9`
	/// capture-group placeholders.
	pub fn path_expression(&self) -> String {
		match self {
			Destination::Vault(c) => c.path.clone(),
			Destination::Aws(c) => c.name.clone(),
			Destination::Gcp(c) => c.name.clone(),
			Destination::Github(c) => c.path_expression(),
			Destination::Http(c) => c.url.clone(),
		}
	}
}

/// Vault-like KV store configuration; used for the mandatory source and as a
/// destination kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfig {
	#[serde(default)]
	pub address: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub namespace: Option<String>,
	#[serde(default)]
	pub path: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_path: Option<String>,
	/// CIDR used by the ingress to attribute events to this source when the
	/// emitting store does not identify itself.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cidr: Option<String>,
}

impl VaultConfig {
	/// Merges process-wide defaults into fields the resource left unset.
	pub fn set_defaults(&mut self, defaults: &VaultConfig) {
		if self.address.is_empty() {
			self.address = defaults.address.clone();
		}
		if self.namespace.is_none() {
			self.namespace = defaults.namespace.clone();
		}
		if self.token.is_none() {
			self.token = defaults.token.clone();
		}
		if self.token_path.is_none() {
			self.token_path = defaults.token_path.clone();
		}
		if self.cidr.is_none() {
			self.cidr = defaults.cidr.clone();
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsConfig {
	/// Destination secret name expression.
	#[serde(default)]
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub region: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role_arn: Option<String>,
}

impl AwsConfig {
	pub fn set_defaults(&mut self, defaults: &AwsConfig) {
		if self.region.is_none() {
			self.region = defaults.region.clone();
		}
		if self.role_arn.is_none() {
			self.role_arn = defaults.role_arn.clone();
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpConfig {
	#[serde(default)]
	pub project: String,
	/// Destination secret name expression.
	#[serde(default)]
	pub name: String,
}

impl GcpConfig {
	pub fn set_defaults(&mut self, defaults: &GcpConfig) {
		if self.project.is_empty() {
			self.project = defaults.project.clone();
		}
	}
}

/// GitHub Actions secrets destination, scoped to a repository, an
/// organization, or a repository environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubConfig {
	#[serde(default)]
	pub owner: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub repo: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub env: Option<String>,
	#[serde(default)]
	pub org: bool,
	/// When false, existing destination secrets are cleared before writing.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub merge: Option<bool>,
	#[serde(default)]
	pub app_id: u64,
	#[serde(default)]
	pub install_id: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub private_key: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub private_key_path: Option<String>,
}

impl GithubConfig {
	pub fn path_expression(&self) -> String {
		match &self.repo {
			Some(repo) => repo.clone(),
			None => self.owner.clone(),
		}
	}

	pub fn merge(&self) -> bool {
		self.merge.unwrap_or(true)
	}

	pub fn set_defaults(&mut self, defaults: &GithubConfig) {
		if self.owner.is_empty() {
			self.owner = defaults.owner.clone();
		}
		if self.repo.is_none() {
			self.repo = defaults.repo.clone();
		}
		if self.env.is_none() {
			self.env = defaults.env.clone();
		}
		if !self.org && defaults.org {
			self.org = defaults.org;
		}
		if self.app_id == 0 {
			self.app_id = defaults.app_id;
		}
		if self.install_id == 0 {
			self.install_id = defaults.install_id;
		}
		if self.private_key.is_none() {
			self.private_key = defaults.private_key.clone();
		}
		if self.private_key_path.is_none() {
			self.private_key_path = defaults.private_key_path.clone();
		}
		if self.merge.is_none() {
			self.merge = defaults.merge;
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
	#[serde(default)]
	pub url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub method: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub headers: BTreeMap<String, String>,
	/// Optional body template; without it the payload is posted as JSON.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub template: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub success_codes: Vec<u16>,
}

impl HttpConfig {
	pub fn set_defaults(&mut self, defaults: &HttpConfig) {
		if self.url.is_empty() {
			self.url = defaults.url.clone();
		}
		if self.method.is_none() {
			self.method = defaults.method.clone();
		}
		if self.headers.is_empty() {
			self.headers = defaults.headers.clone();
		}
		if self.template.is_none() {
			self.template = defaults.template.clone();
		}
		if self.success_codes.is_empty() {
			self.success_codes = defaults.success_codes.clone();
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub regex: Option<FilterList>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<FilterList>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterList {
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub include: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transforms {
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub include: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub exclude: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub rename: Vec<RenameTransform>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub template: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenameTransform {
	pub from: String,
	pub to: String,
}

/// Notification event classes a target can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyEvent {
	Success,
	Failure,
}

/// One notification target; the delivery channels are opaque to the sync
/// engine and handled by the notifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationTarget {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub webhook: Option<WebhookTarget>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<EmailTarget>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub slack: Option<SlackTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookTarget {
	#[serde(default)]
	pub events: Vec<NotifyEvent>,
	#[serde(default)]
	pub url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub method: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub headers: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub body: Option<String>,
	#[serde(default)]
	pub exclude_body: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTarget {
	#[serde(default)]
	pub events: Vec<NotifyEvent>,
	#[serde(default)]
	pub to: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub from: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub subject: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub body: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub host: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub port: Option<u16>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub password: Option<String>,
	#[serde(default)]
	pub insecure_skip_verify: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackTarget {
	#[serde(default)]
	pub events: Vec<NotifyEvent>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub body: Option<String>,
}
