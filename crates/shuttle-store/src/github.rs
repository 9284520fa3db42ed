// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! GitHub Actions secrets destination.
//!
//! Authenticates as a GitHub App installation, encrypts each value with the
//! scope's libsodium sealed-box public key, and writes one Actions secret
//! per field. Secrets may be repository-, organization-, or
//! environment-scoped. All requests flow through the process-wide rate
//! limiter and the retry policy in [`crate::ratelimit`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use once_cell::sync::Lazy;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use shuttle_core::spec::GithubConfig;
use shuttle_core::transforms::SecretPayload;
use shuttle_core::{ResourceMeta, SecretData, StoreKind};

use crate::error::{Result, StoreError};
use crate::ratelimit::{self, RateLimiter};
use crate::Store;

const API_BASE: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: usize = 100;

// One limiter for every GitHub client in the process; half a second between
// requests keeps us clear of the secondary limits on busy fan-outs.
static LIMITER: Lazy<RateLimiter> = Lazy::new(|| RateLimiter::new(Duration::from_millis(500)));

#[derive(Debug, Serialize)]
struct Claims {
	iat: u64,
	exp: u64,
	iss: String,
}

#[derive(Debug, Deserialize)]
struct InstallationToken {
	token: String,
}

#[derive(Debug, Deserialize)]
struct ScopePublicKey {
	key_id: String,
	key: String,
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
	id: u64,
}

#[derive(Debug, Deserialize)]
struct SecretName {
	name: String,
}

#[derive(Debug, Deserialize)]
struct SecretsPage {
	#[serde(default)]
	secrets: Vec<SecretName>,
}

pub struct GithubStore {
	cfg: GithubConfig,
	client: Option<reqwest::Client>,
	token: Option<String>,
}

impl GithubStore {
	pub fn new(cfg: GithubConfig) -> Self {
		Self {
			cfg,
			client: None,
			token: None,
		}
	}

	fn client(&self) -> Result<&reqwest::Client> {
		self.client
			.as_ref()
			.ok_or_else(|| StoreError::Config("github client is not initialized".into()))
	}

	async fn private_key(&self) -> Result<String> {
		if let Some(key) = &self.cfg.private_key {
			return Ok(key.clone());
		}
		if let Some(path) = &self.cfg.private_key_path {
			return Ok(tokio::fs::read_to_string(path).await?);
		}
		Err(StoreError::Config(
			"privateKey or privateKeyPath is required".into(),
		))
	}

	fn app_jwt(&self, private_key_pem: &str) -> Result<String> {
		let now = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map_err(|e| StoreError::Jwt(e.to_string()))?
			.as_secs();
		let claims = Claims {
			iat: now.saturating_sub(60),
			exp: now + 9 * 60,
			iss: self.cfg.app_id.to_string(),
		};
		let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
			.map_err(|e| StoreError::Jwt(format!("invalid RSA private key: {e}")))?;
		encode(&Header::new(Algorithm::RS256), &claims, &key)
			.map_err(|e| StoreError::Jwt(e.to_string()))
	}

	/// Sends one API request through the limiter, retrying per the rate
	/// limit policy until a non-retryable response arrives or the job is
	/// cancelled.
	async fn send(
		&self,
		method: Method,
		url: String,
		body: Option<serde_json::Value>,
	) -> Result<reqwest::Response> {
		let client = self.client()?;
		let token = self
			.token
			.clone()
			.ok_or_else(|| StoreError::Config("github token is not initialized".into()))?;
		let mut retry_count = 0u32;
		loop {
			LIMITER.acquire().await;
			let mut request = client.request(method.clone(), &url).bearer_auth(&token);
			if let Some(body) = &body {
				request = request.json(body);
			}
			let response = request.send().await?;
			let status = response.status();
			if !ratelimit::should_retry(status) {
				return Ok(response);
			}
			let delay = ratelimit::retry_delay(status, response.headers(), retry_count);
			tracing::warn!(
				status = status.as_u16(),
				retry_count,
				delay_secs = delay.as_secs(),
				%url,
				"github rate limit hit, retrying request"
			);
			tokio::time::sleep(delay).await;
			retry_count += 1;
		}
	}

	async fn repo_id(&self) -> Result<u64> {
		let repo = self
			.cfg
			.repo
			.clone()
			.ok_or_else(|| StoreError::Config("repo is required".into()))?;
		let url = format!("{API_BASE}/repos/{}/{}", self.cfg.owner, repo);
		let response = self.send(Method::GET, url, None).await?;
		if response.status() == StatusCode::NOT_FOUND {
			return Err(StoreError::RepoMissing(repo));
		}
		let status = response.status();
		if !status.is_success() {
			return Err(StoreError::api(status.as_u16(), response.text().await?));
		}
		let info: RepoInfo = response.json().await?;
		Ok(info.id)
	}

	/// Base URL of the Actions secrets collection for the configured scope.
	async fn secrets_base(&self) -> Result<String> {
		if self.cfg.org {
			return Ok(format!("{API_BASE}/orgs/{}/actions/secrets", self.cfg.owner));
		}
		if let Some(env) = &self.cfg.env {
			let repo_id = self.repo_id().await?;
			return Ok(format!(
				"{API_BASE}/repositories/{repo_id}/environments/{env}/secrets"
			));
		}
		let repo = self
			.cfg
			.repo
			.clone()
			.ok_or_else(|| StoreError::Config("repo is required".into()))?;
		Ok(format!(
			"{API_BASE}/repos/{}/{repo}/actions/secrets",
			self.cfg.owner
		))
	}

	async fn public_key(&self) -> Result<ScopePublicKey> {
		let url = format!("{}/public-key", self.secrets_base().await?);
		let response = self.send(Method::GET, url, None).await?;
		let status = response.status();
		if !status.is_success() {
			return Err(self.scope_error(status, response.text().await.unwrap_or_default()));
		}
		let key: ScopePublicKey = response.json().await?;
		if key.key_id.is_empty() {
			return Err(StoreError::Encryption("public key id is empty".into()));
		}
		Ok(key)
	}

	/// Normalizes a 404 on a scoped operation to the missing scope itself.
	fn scope_error(&self, status: StatusCode, message: String) -> StoreError {
		if status == StatusCode::NOT_FOUND {
			if let Some(env) = &self.cfg.env {
				return StoreError::EnvironmentMissing(env.clone());
			}
			if let Some(repo) = &self.cfg.repo {
				return StoreError::RepoMissing(repo.clone());
			}
		}
		StoreError::api(status.as_u16(), message)
	}

	fn seal(&self, key: &ScopePublicKey, plaintext: &str) -> Result<(String, String)> {
		if plaintext.is_empty() {
			return Err(StoreError::Encryption("plaintext is empty".into()));
		}
		let key_bytes = BASE64
			.decode(&key.key)
			.map_err(|e| StoreError::Encryption(e.to_string()))?;
		let key_array: [u8; 32] = key_bytes
			.as_slice()
			.try_into()
			.map_err(|_| StoreError::Encryption("unexpected public key length".into()))?;
		let sealed = crypto_box::PublicKey::from(key_array)
			.seal(&mut rand::rngs::OsRng, plaintext.as_bytes())
			.map_err(|e| StoreError::Encryption(e.to_string()))?;
		Ok((key.key_id.clone(), BASE64.encode(sealed)))
	}

	async fn secret_names(&self) -> Result<Vec<String>> {
		let base = self.secrets_base().await?;
		let mut names = Vec::new();
		let mut page = 1usize;
		loop {
			let url = format!("{base}?per_page={PER_PAGE}&page={page}");
			let response = self.send(Method::GET, url, None).await?;
			let status = response.status();
			if !status.is_success() {
				return Err(self.scope_error(status, response.text().await.unwrap_or_default()));
			}
			let page_body: SecretsPage = response.json().await?;
			let count = page_body.secrets.len();
			names.extend(page_body.secrets.into_iter().map(|s| s.name));
			if count < PER_PAGE {
				return Ok(names);
			}
			page += 1;
		}
	}
}

#[async_trait]
impl Store for GithubStore {
	async fn init(&mut self) -> Result<()> {
		self.validate()?;
		let pem = self.private_key().await?;
		let jwt = self.app_jwt(&pem)?;
		let client = reqwest::Client::builder()
			.user_agent("shuttle")
			.default_headers({
				let mut headers = reqwest::header::HeaderMap::new();
				headers.insert(
					"Accept",
					reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
				);
				headers.insert(
					"X-GitHub-Api-Version",
					reqwest::header::HeaderValue::from_static(API_VERSION),
				);
				headers
			})
			.build()?;
		LIMITER.acquire().await;
		let response = client
			.post(format!(
				"{API_BASE}/app/installations/{}/access_tokens",
				self.cfg.install_id
			))
			.bearer_auth(&jwt)
			.send()
			.await?;
		let status = response.status();
		if !status.is_success() {
			return Err(StoreError::api(status.as_u16(), response.text().await?));
		}
		let token: InstallationToken = response.json().await?;
		self.token = Some(token.token);
		self.client = Some(client);
		Ok(())
	}

	async fn close(&mut self) -> Result<()> {
		self.client = None;
		self.token = None;
		Ok(())
	}

	fn validate(&self) -> Result<()> {
		if self.cfg.owner.is_empty() {
			return Err(StoreError::Config("owner is required".into()));
		}
		if self.cfg.repo.is_some() && self.cfg.org {
			return Err(StoreError::Config(
				"either repo or org can be defined, not both".into(),
			));
		}
		if self.cfg.repo.is_none() && self.cfg.env.is_some() {
			return Err(StoreError::Config(
				"repo is required for env-scoped secrets".into(),
			));
		}
		if self.cfg.repo.is_none() && !self.cfg.org {
			return Err(StoreError::Config("either repo or org is required".into()));
		}
		Ok(())
	}

	fn meta(&self) -> SecretData {
		let mut meta = SecretData::new();
		meta.insert("owner".into(), self.cfg.owner.clone().into());
		if let Some(repo) = &self.cfg.repo {
			meta.insert("repo".into(), repo.clone().into());
		}
		if let Some(env) = &self.cfg.env {
			meta.insert("env".into(), env.clone().into());
		}
		meta.insert("org".into(), self.cfg.org.into());
		meta
	}

	fn kind(&self) -> StoreKind {
		StoreKind::Github
	}

	fn path(&self) -> String {
		self.cfg.path_expression()
	}

	async fn get(&self, _path: &str) -> Result<SecretData> {
		// Actions secret values are write-only by design.
		Err(StoreError::NotImplemented)
	}

	async fn write(
		&self,
		_meta: &ResourceMeta,
		_path: &str,
		payload: &SecretPayload,
	) -> Result<SecretData> {
		let Some(data) = payload.as_structured() else {
			return Err(StoreError::Config(
				"github destinations require a JSON object payload".into(),
			));
		};
		if !self.cfg.merge() {
			self.delete("").await?;
		}
		let base = self.secrets_base().await?;
		let key = self.public_key().await?;
		let mut write_errors = Vec::new();
		for (name, value) in data {
			let plaintext = match value {
				serde_json::Value::String(s) => s.clone(),
				other => other.to_string(),
			};
			if plaintext.is_empty() {
				tracing::debug!(secret = %name, "skipping empty secret value");
				continue;
			}
			let (key_id, encrypted_value) = match self.seal(&key, &plaintext) {
				Ok(sealed) => sealed,
				Err(error) => {
					write_errors.push(format!("{name}: {error}"));
					continue;
				}
			};
			let mut body = serde_json::json!({
				"encrypted_value": encrypted_value,
				"key_id": key_id,
			});
			if self.cfg.org {
				body["visibility"] = "all".into();
			}
			let url = format!("{base}/{name}");
			match self.send(Method::PUT, url, Some(body)).await {
				Ok(response) => {
					let status = response.status();
					if !status.is_success() {
						let message = response.text().await.unwrap_or_default();
						write_errors.push(format!("{name}: {}", self.scope_error(status, message)));
					}
				}
				Err(error) => write_errors.push(format!("{name}: {error}")),
			}
		}
		if !write_errors.is_empty() {
			return Err(StoreError::Config(format!(
				"error writing secrets: {}",
				write_errors.join("; ")
			)));
		}
		Ok(SecretData::new())
	}

	/// Deletes every Actions secret in the configured scope; the path
	/// argument is ignored because the scope itself is the destination.
	async fn delete(&self, _path: &str) -> Result<()> {
		let base = self.secrets_base().await?;
		for name in self.secret_names().await? {
			let url = format!("{base}/{name}");
			let response = self.send(Method::DELETE, url, None).await?;
			let status = response.status();
			if !status.is_success() && status != StatusCode::NO_CONTENT {
				let message = response.text().await.unwrap_or_default();
				return Err(self.scope_error(status, message));
			}
		}
		Ok(())
	}

	async fn list(&self, _path: &str) -> Result<Vec<String>> {
		self.secret_names().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cfg(repo: Option<&str>, env: Option<&str>, org: bool) -> GithubConfig {
		GithubConfig {
			owner: "acme".into(),
			repo: repo.map(Into::into),
			env: env.map(Into::into),
			org,
			app_id: 7,
			install_id: 11,
			private_key: Some("unused".into()),
			..Default::default()
		}
	}

	#[test]
	fn validate_requires_owner() {
		let store = GithubStore::new(GithubConfig::default());
		assert!(store.validate().is_err());
	}

	#[test]
	fn validate_rejects_repo_and_org_together() {
		let store = GithubStore::new(cfg(Some("api"), None, true));
		assert!(store.validate().is_err());
	}

	#[test]
	fn validate_env_requires_repo() {
		let store = GithubStore::new(cfg(None, Some("prod"), true));
		assert!(store.validate().is_err());
		let store = GithubStore::new(cfg(Some("api"), Some("prod"), false));
		assert!(store.validate().is_ok());
	}

	#[test]
	fn validate_requires_repo_or_org() {
		let store = GithubStore::new(cfg(None, None, false));
		assert!(store.validate().is_err());
		let store = GithubStore::new(cfg(None, None, true));
		assert!(store.validate().is_ok());
	}

	#[test]
	fn scope_error_normalizes_missing_env_and_repo() {
		let store = GithubStore::new(cfg(Some("api"), Some("prod"), false));
		let error = store.scope_error(StatusCode::NOT_FOUND, String::new());
		assert!(matches!(error, StoreError::EnvironmentMissing(env) if env == "prod"));

		let store = GithubStore::new(cfg(Some("api"), None, false));
		let error = store.scope_error(StatusCode::NOT_FOUND, String::new());
		assert!(matches!(error, StoreError::RepoMissing(repo) if repo == "api"));

		let store = GithubStore::new(cfg(Some("api"), None, false));
		let error = store.scope_error(StatusCode::UNPROCESSABLE_ENTITY, "bad".into());
		assert!(matches!(error, StoreError::Api { status: 422, .. }));
	}

	#[test]
	fn seal_produces_base64_ciphertext() {
		let store = GithubStore::new(cfg(Some("api"), None, false));
		let secret_key = crypto_box::SecretKey::generate(&mut rand::rngs::OsRng);
		let key = ScopePublicKey {
			key_id: "key-1".into(),
			key: BASE64.encode(secret_key.public_key().as_bytes()),
		};
		let (key_id, sealed) = store.seal(&key, "hunter2").unwrap();
		assert_eq!(key_id, "key-1");
		let raw = BASE64.decode(sealed).unwrap();
		// Sealed boxes carry an ephemeral public key and a MAC.
		assert!(raw.len() > "hunter2".len() + 32);
	}

	#[test]
	fn seal_rejects_empty_plaintext_and_bad_keys() {
		let store = GithubStore::new(cfg(Some("api"), None, false));
		let key = ScopePublicKey {
			key_id: "key-1".into(),
			key: BASE64.encode([0u8; 16]),
		};
		assert!(store.seal(&key, "").is_err());
		assert!(store.seal(&key, "value").is_err());
	}

	#[test]
	fn path_expression_prefers_repo() {
		let store = GithubStore::new(cfg(Some("api"), None, false));
		assert_eq!(store.path(), "api");
		let store = GithubStore::new(cfg(None, None, true));
		assert_eq!(store.path(), "acme");
	}
}
