// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Generic JSON-over-HTTP store.
//!
//! The configured URL is the destination path; writes post the payload
//! (optionally reshaped by a body template) with configured headers, reads
//! and listings expect JSON back. Which statuses count as success is
//! configurable because the receiving side is arbitrary.

use async_trait::async_trait;
use minijinja::Environment;
use reqwest::{Method, StatusCode};

use shuttle_core::spec::HttpConfig;
use shuttle_core::transforms::SecretPayload;
use shuttle_core::{ResourceMeta, SecretData, StoreKind};

use crate::error::{Result, StoreError};
use crate::Store;

const DEFAULT_SUCCESS_CODES: &[u16] = &[200, 201, 202, 204];

pub struct HttpStore {
	cfg: HttpConfig,
	client: Option<reqwest::Client>,
}

impl HttpStore {
	pub fn new(cfg: HttpConfig) -> Self {
		Self { cfg, client: None }
	}

	fn client(&self) -> Result<&reqwest::Client> {
		self.client
			.as_ref()
			.ok_or_else(|| StoreError::Config("http client is not initialized".into()))
	}

	fn with_headers(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		for (name, value) in &self.cfg.headers {
			request = request.header(name, value);
		}
		request
	}

	fn body_for(&self, payload: &SecretPayload) -> Result<String> {
		match self.cfg.template.as_deref().map(str::trim) {
			Some(template) if !template.is_empty() => {
				let data = payload.as_structured().cloned().unwrap_or_else(|| {
					let mut data = SecretData::new();
					if let SecretPayload::Text(text) = payload {
						data.insert("value".into(), text.clone().into());
					}
					data
				});
				let mut env = Environment::new();
				env.add_template("body", template)?;
				Ok(env.get_template("body")?.render(&data)?)
			}
			_ => payload.to_body().map_err(|e| StoreError::Config(e.to_string())),
		}
	}

	fn success(&self, status: StatusCode) -> bool {
		let codes = if self.cfg.success_codes.is_empty() {
			DEFAULT_SUCCESS_CODES
		} else {
			self.cfg.success_codes.as_slice()
		};
		codes.contains(&status.as_u16())
	}
}

#[async_trait]
impl Store for HttpStore {
	async fn init(&mut self) -> Result<()> {
		self.validate()?;
		self.client = Some(reqwest::Client::builder().build()?);
		Ok(())
	}

	async fn close(&mut self) -> Result<()> {
		self.client = None;
		Ok(())
	}

	fn validate(&self) -> Result<()> {
		if self.cfg.url.is_empty() {
			return Err(StoreError::Config("url is required".into()));
		}
		Ok(())
	}

	fn meta(&self) -> SecretData {
		let mut meta = SecretData::new();
		meta.insert("url".into(), self.cfg.url.clone().into());
		if let Some(method) = &self.cfg.method {
			meta.insert("method".into(), method.clone().into());
		}
		meta
	}

	fn kind(&self) -> StoreKind {
		StoreKind::Http
	}

	fn path(&self) -> String {
		self.cfg.url.clone()
	}

	async fn get(&self, path: &str) -> Result<SecretData> {
		let response = self
			.with_headers(self.client()?.get(path))
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
		body.as_object()
			.cloned()
			.ok_or_else(|| StoreError::Config("response body is not a JSON object".into()))
	}

	async fn write(
		&self,
		_meta: &ResourceMeta,
		path: &str,
		payload: &SecretPayload,
	) -> Result<SecretData> {
		let body = self.body_for(payload)?;
		let method = self
			.cfg
			.method
			.as_deref()
			.unwrap_or("POST")
			.parse::<Method>()
			.map_err(|_| StoreError::Config("invalid http method".into()))?;
		let response = self
			.with_headers(self.client()?.request(method, path))
			.body(body)
			.send()
			.await?;
		let status = response.status();
		if !self.success(status) {
			return Err(StoreError::api(status.as_u16(), response.text().await?));
		}
		Ok(payload.as_structured().cloned().unwrap_or_default())
	}

	async fn delete(&self, path: &str) -> Result<()> {
		let response = self
			.with_headers(self.client()?.delete(path))
			.send()
			.await?;
		let status = response.status();
		if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
			return Err(StoreError::api(status.as_u16(), response.text().await?));
		}
		Ok(())
	}

	async fn list(&self, path: &str) -> Result<Vec<String>> {
		let response = self
			.with_headers(self.client()?.get(path))
			.send()
			.await?;
		let status = response.status();
		if !status.is_success() {
			return Err(StoreError::api(status.as_u16(), response.text().await?));
		}
		let body: Vec<String> = response.json().await?;
		Ok(body)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn store(template: Option<&str>, codes: &[u16]) -> HttpStore {
		HttpStore::new(HttpConfig {
			url: "https://sink.example.com/secrets".into(),
			template: template.map(Into::into),
			success_codes: codes.to_vec(),
			..Default::default()
		})
	}

	fn payload() -> SecretPayload {
		let mut data = SecretData::new();
		data.insert("user".into(), json!("svc"));
		SecretPayload::Structured(data)
	}

	#[test]
	fn validate_requires_url() {
		let store = HttpStore::new(HttpConfig::default());
		assert!(store.validate().is_err());
	}

	#[test]
	fn body_defaults_to_json_payload() {
		let store = store(None, &[]);
		assert_eq!(store.body_for(&payload()).unwrap(), r#"{"user":"svc"}"#);
	}

	#[test]
	fn body_template_reshapes_payload() {
		let store = store(Some(r#"{"account": "{{ user }}"}"#), &[]);
		assert_eq!(
			store.body_for(&payload()).unwrap(),
			r#"{"account": "svc"}"#
		);
	}

	#[test]
	fn text_payload_posts_verbatim_without_template() {
		let store = store(None, &[]);
		let body = store.body_for(&SecretPayload::Text("raw body".into())).unwrap();
		assert_eq!(body, "raw body");
	}

	#[test]
	fn success_codes_default_and_override() {
		let default_store = store(None, &[]);
		assert!(default_store.success(StatusCode::OK));
		assert!(default_store.success(StatusCode::NO_CONTENT));
		assert!(!default_store.success(StatusCode::IM_A_TEAPOT));

		let custom_store = store(None, &[418]);
		assert!(custom_store.success(StatusCode::IM_A_TEAPOT));
		assert!(!custom_store.success(StatusCode::OK));
	}
}
