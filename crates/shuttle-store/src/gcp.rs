// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! GCP Secret Manager destination.
//!
//! Talks to the REST surface directly with tokens from the ambient
//! credential chain. Secret ids cannot contain `/`, so destination paths
//! are flattened with `-` before use; writes create the secret on first
//! sight and then add a version.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::StatusCode;

use shuttle_core::spec::GcpConfig;
use shuttle_core::transforms::SecretPayload;
use shuttle_core::{ResourceMeta, SecretData, StoreKind};

use crate::error::{Result, StoreError};
use crate::Store;

const API_BASE: &str = "https://secretmanager.googleapis.com/v1";
const SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

pub struct GcpStore {
	cfg: GcpConfig,
	client: Option<reqwest::Client>,
	tokens: Option<std::sync::Arc<dyn gcp_auth::TokenProvider>>,
}

impl GcpStore {
	pub fn new(cfg: GcpConfig) -> Self {
		Self {
			cfg,
			client: None,
			tokens: None,
		}
	}

	fn client(&self) -> Result<&reqwest::Client> {
		self.client
			.as_ref()
			.ok_or_else(|| StoreError::Config("gcp client is not initialized".into()))
	}

	async fn token(&self) -> Result<String> {
		let provider = self
			.tokens
			.as_ref()
			.ok_or_else(|| StoreError::Config("gcp token provider is not initialized".into()))?;
		let token = provider
			.token(SCOPES)
			.await
			.map_err(|e| StoreError::Gcp(e.to_string()))?;
		Ok(token.as_str().to_string())
	}

	/// Secret ids may only contain letters, digits, `-` and `_`.
	fn secret_id(path: &str) -> String {
		path.trim_matches('/').replace('/', "-")
	}

	fn secret_url(&self, path: &str) -> String {
		format!(
			"{API_BASE}/projects/{}/secrets/{}",
			self.cfg.project,
			Self::secret_id(path)
		)
	}

	async fn ensure_secret(&self, path: &str) -> Result<()> {
		let url = format!(
			"{API_BASE}/projects/{}/secrets?secretId={}",
			self.cfg.project,
			Self::secret_id(path)
		);
		let body = serde_json::json!({ "replication": { "automatic": {} } });
		let response = self
			.client()?
			.post(url)
			.bearer_auth(self.token().await?)
			.json(&body)
			.send()
			.await?;
		let status = response.status();
		if status.is_success() || status == StatusCode::CONFLICT {
			return Ok(());
		}
		Err(StoreError::api(status.as_u16(), response.text().await?))
	}
}

#[async_trait]
impl Store for GcpStore {
	async fn init(&mut self) -> Result<()> {
		self.validate()?;
		self.tokens = Some(
			gcp_auth::provider()
				.await
				.map_err(|e| StoreError::Gcp(e.to_string()))?,
		);
		self.client = Some(reqwest::Client::builder().build()?);
		Ok(())
	}

	async fn close(&mut self) -> Result<()> {
		self.client = None;
		self.tokens = None;
		Ok(())
	}

	fn validate(&self) -> Result<()> {
		if self.cfg.project.is_empty() {
			return Err(StoreError::Config("project is required".into()));
		}
		if self.cfg.name.is_empty() {
			return Err(StoreError::Config("name is required".into()));
		}
		Ok(())
	}

	fn meta(&self) -> SecretData {
		let mut meta = SecretData::new();
		meta.insert("project".into(), self.cfg.project.clone().into());
		meta.insert("name".into(), self.cfg.name.clone().into());
		meta
	}

	fn kind(&self) -> StoreKind {
		StoreKind::Gcp
	}

	fn path(&self) -> String {
		self.cfg.name.clone()
	}

	async fn get(&self, path: &str) -> Result<SecretData> {
		let url = format!("{}/versions/latest:access", self.secret_url(path));
		let response = self
			.client()?
			.get(url)
			.bearer_auth(self.token().await?)
			.send()
			.await?;
		let status = response.status();
		if status == StatusCode::NOT_FOUND {
			return Err(StoreError::NotFound(path.to_string()));
		}
		if !status.is_success() {
			return Err(StoreError::api(status.as_u16(), response.text().await?));
		}
		let body: serde_json::Value = response.json().await?;
		let encoded = body
			.pointer("/payload/data")
			.and_then(|v| v.as_str())
			.ok_or_else(|| StoreError::Gcp("version payload is missing".into()))?;
		let raw = BASE64
			.decode(encoded)
			.map_err(|e| StoreError::Gcp(e.to_string()))?;
		match serde_json::from_slice::<SecretData>(&raw) {
			Ok(data) => Ok(data),
			Err(_) => {
				let mut data = SecretData::new();
				data.insert(
					"value".into(),
					String::from_utf8_lossy(&raw).into_owned().into(),
				);
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
		let body = payload
			.to_body()
			.map_err(|e| StoreError::Config(e.to_string()))?;
		self.ensure_secret(path).await?;
		let url = format!("{}:addVersion", self.secret_url(path));
		let request_body = serde_json::json!({
			"payload": { "data": BASE64.encode(body.as_bytes()) }
		});
		let response = self
			.client()?
			.post(url)
			.bearer_auth(self.token().await?)
			.json(&request_body)
			.send()
			.await?;
		let status = response.status();
		if !status.is_success() {
			return Err(StoreError::api(status.as_u16(), response.text().await?));
		}
		Ok(payload.as_structured().cloned().unwrap_or_default())
	}

	async fn delete(&self, path: &str) -> Result<()> {
		let response = self
			.client()?
			.delete(self.secret_url(path))
			.bearer_auth(self.token().await?)
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
		let prefix = format!("{}-", Self::secret_id(path));
		let mut names = Vec::new();
		let mut page_token: Option<String> = None;
		loop {
			let mut url = format!("{API_BASE}/projects/{}/secrets", self.cfg.project);
			if let Some(token) = &page_token {
				url = format!("{url}?pageToken={token}");
			}
			let response = self
				.client()?
				.get(url)
				.bearer_auth(self.token().await?)
				.send()
				.await?;
			let status = response.status();
			if !status.is_success() {
				return Err(StoreError::api(status.as_u16(), response.text().await?));
			}
			let body: serde_json::Value = response.json().await?;
			if let Some(secrets) = body.get("secrets").and_then(|v| v.as_array()) {
				for secret in secrets {
					let Some(name) = secret.get("name").and_then(|v| v.as_str()) else {
						continue;
					};
					let id = name.rsplit('/').next().unwrap_or(name);
					if let Some(remainder) = id.strip_prefix(&prefix) {
						names.push(remainder.to_string());
					}
				}
			}
			page_token = body
				.get("nextPageToken")
				.and_then(|v| v.as_str())
				.map(str::to_string);
			if page_token.is_none() {
				return Ok(names);
			}
		}
	}
}
