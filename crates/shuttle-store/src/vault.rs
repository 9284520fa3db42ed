// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Vault-like KV-v2 store driver.
//!
//! Logical paths are written the way operators think about them
//! (`mount/path/to/secret`); the driver inserts the `data`/`metadata`
//! segment the HTTP API wants. Writes carry the sync marker header so the
//! audit events they generate are dropped by our own ingress instead of
//! looping.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};

use shuttle_core::spec::VaultConfig;
use shuttle_core::transforms::SecretPayload;
use shuttle_core::{ResourceMeta, SecretData, StoreKind, SYNC_MARKER_HEADER};

use crate::error::{Result, StoreError};
use crate::Store;

pub struct VaultStore {
	cfg: VaultConfig,
	client: Option<reqwest::Client>,
	token: Option<String>,
}

impl VaultStore {
	pub fn new(cfg: VaultConfig) -> Self {
		Self {
			cfg,
			client: None,
			token: None,
		}
	}

	fn client(&self) -> Result<&reqwest::Client> {
		self.client
			.as_ref()
			.ok_or_else(|| StoreError::Config("vault client is not initialized".into()))
	}

	/// Maps a logical KV path onto its API form with `segment` inserted
	/// after the mount.
	fn api_url(&self, logical: &str, segment: &str) -> Result<String> {
		let logical = logical.trim_matches('/');
		let Some((mount, rest)) = logical.split_once('/') else {
			return Err(StoreError::api(
				400,
				format!("secret path {logical} must be in kv/path/to/secret format"),
			));
		};
		Ok(format!(
			"{}/v1/{}/{}/{}",
			self.cfg.address.trim_end_matches('/'),
			mount,
			segment,
			rest
		))
	}

	fn headers(&self, write: bool) -> Result<HeaderMap> {
		let mut headers = HeaderMap::new();
		if let Some(token) = &self.token {
			headers.insert(
				"X-Vault-Token",
				HeaderValue::from_str(token)
					.map_err(|_| StoreError::Config("invalid vault token".into()))?,
			);
		}
		if let Some(namespace) = self.cfg.namespace.as_deref().filter(|ns| !ns.is_empty()) {
			headers.insert(
				"X-Vault-Namespace",
				HeaderValue::from_str(namespace)
					.map_err(|_| StoreError::Config("invalid vault namespace".into()))?,
			);
		}
		if write {
			headers.insert(SYNC_MARKER_HEADER, HeaderValue::from_static("true"));
		}
		Ok(headers)
	}
}

#[async_trait]
impl Store for VaultStore {
	async fn init(&mut self) -> Result<()> {
		self.validate()?;
		self.token = match (&self.cfg.token, &self.cfg.token_path) {
			(Some(token), _) => Some(token.clone()),
			(None, Some(path)) => Some(tokio::fs::read_to_string(path).await?.trim().to_string()),
			(None, None) => None,
		};
		self.client = Some(reqwest::Client::builder().build()?);
		Ok(())
	}

	async fn close(&mut self) -> Result<()> {
		self.client = None;
		self.token = None;
		Ok(())
	}

	fn validate(&self) -> Result<()> {
		if self.cfg.address.is_empty() {
			return Err(StoreError::Config("vault address is required".into()));
		}
		Ok(())
	}

	fn meta(&self) -> SecretData {
		// The token never appears in meta.
		let mut meta = SecretData::new();
		meta.insert("address".into(), self.cfg.address.clone().into());
		if let Some(namespace) = &self.cfg.namespace {
			meta.insert("namespace".into(), namespace.clone().into());
		}
		if let Some(cidr) = &self.cfg.cidr {
			meta.insert("cidr".into(), cidr.clone().into());
		}
		meta.insert("path".into(), self.cfg.path.clone().into());
		meta
	}

	fn kind(&self) -> StoreKind {
		StoreKind::Vault
	}

	fn path(&self) -> String {
		self.cfg.path.clone()
	}

	async fn get(&self, path: &str) -> Result<SecretData> {
		let url = self.api_url(path, "data")?;
		let response = self
			.client()?
			.get(&url)
			.headers(self.headers(false)?)
			.send()
			.await?;
		match response.status() {
			StatusCode::NOT_FOUND => Err(StoreError::NotFound(path.to_string())),
			status if !status.is_success() => {
				Err(StoreError::api(status.as_u16(), response.text().await?))
			}
			_ => {
				let body: serde_json::Value = response.json().await?;
				let data = body
					.pointer("/data/data")
					.and_then(|v| v.as_object())
					.cloned()
					.unwrap_or_default();
				Ok(data)
			}
		}
	}

	async fn write(
		&self,
		_meta: &ResourceMeta,
		path: &str,
		payload: &SecretPayload,
	) -> Result<SecretData> {
		let Some(data) = payload.as_structured() else {
			return Err(StoreError::Config(
				"vault destinations require a JSON object payload".into(),
			));
		};
		let url = self.api_url(path, "data")?;
		let body = serde_json::json!({ "data": data });
		let response = self
			.client()?
			.post(&url)
			.headers(self.headers(true)?)
			.json(&body)
			.send()
			.await?;
		let status = response.status();
		if !status.is_success() {
			return Err(StoreError::api(status.as_u16(), response.text().await?));
		}
		Ok(data.clone())
	}

	async fn delete(&self, path: &str) -> Result<()> {
		// Deleting metadata removes every version.
		let url = self.api_url(path, "metadata")?;
		let response = self
			.client()?
			.delete(&url)
			.headers(self.headers(true)?)
			.send()
			.await?;
		let status = response.status();
		if status == StatusCode::NOT_FOUND {
			return Err(StoreError::NotFound(path.to_string()));
		}
		if !status.is_success() {
			return Err(StoreError::api(status.as_u16(), response.text().await?));
		}
		Ok(())
	}

	async fn list(&self, path: &str) -> Result<Vec<String>> {
		let url = self.api_url(path, "metadata")?;
		let method = Method::from_bytes(b"LIST").expect("LIST is a valid method");
		let response = self
			.client()?
			.request(method, &url)
			.headers(self.headers(false)?)
			.send()
			.await?;
		match response.status() {
			StatusCode::NOT_FOUND => Ok(Vec::new()),
			status if !status.is_success() => {
				Err(StoreError::api(status.as_u16(), response.text().await?))
			}
			_ => {
				let body: serde_json::Value = response.json().await?;
				let keys = body
					.pointer("/data/keys")
					.and_then(|v| v.as_array())
					.map(|keys| {
						keys.iter()
							.filter_map(|k| k.as_str().map(str::to_string))
							.collect()
					})
					.unwrap_or_default();
				Ok(keys)
			}
		}
	}
}
