// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! AWS Secrets Manager destination.
//!
//! Credentials come from the default provider chain, optionally assuming a
//! configured role. Writes create the secret on first sight and put a new
//! version afterwards; deletes are immediate rather than scheduled because
//! the source store remains the system of record.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::config::Region;

use shuttle_core::spec::AwsConfig;
use shuttle_core::transforms::SecretPayload;
use shuttle_core::{ResourceMeta, SecretData, StoreKind};

use crate::error::{Result, StoreError};
use crate::Store;

pub struct AwsStore {
	cfg: AwsConfig,
	client: Option<aws_sdk_secretsmanager::Client>,
}

impl AwsStore {
	pub fn new(cfg: AwsConfig) -> Self {
		Self { cfg, client: None }
	}

	fn client(&self) -> Result<&aws_sdk_secretsmanager::Client> {
		self.client
			.as_ref()
			.ok_or_else(|| StoreError::Config("aws client is not initialized".into()))
	}
}

#[async_trait]
impl Store for AwsStore {
	async fn init(&mut self) -> Result<()> {
		self.validate()?;
		let mut loader = aws_config::defaults(BehaviorVersion::latest());
		if let Some(region) = &self.cfg.region {
			loader = loader.region(Region::new(region.clone()));
		}
		let base = loader.load().await;
		let config = if let Some(role_arn) = &self.cfg.role_arn {
			let provider = aws_config::sts::AssumeRoleProvider::builder(role_arn)
				.session_name("shuttle-sync")
				.configure(&base)
				.build()
				.await;
			aws_sdk_secretsmanager::config::Builder::from(&base)
				.credentials_provider(provider)
				.build()
		} else {
			aws_sdk_secretsmanager::config::Builder::from(&base).build()
		};
		self.client = Some(aws_sdk_secretsmanager::Client::from_conf(config));
		Ok(())
	}

	async fn close(&mut self) -> Result<()> {
		self.client = None;
		Ok(())
	}

	fn validate(&self) -> Result<()> {
		if self.cfg.name.is_empty() {
			return Err(StoreError::Config("name is required".into()));
		}
		Ok(())
	}

	fn meta(&self) -> SecretData {
		let mut meta = SecretData::new();
		meta.insert("name".into(), self.cfg.name.clone().into());
		if let Some(region) = &self.cfg.region {
			meta.insert("region".into(), region.clone().into());
		}
		if let Some(role_arn) = &self.cfg.role_arn {
			meta.insert("roleArn".into(), role_arn.clone().into());
		}
		meta
	}

	fn kind(&self) -> StoreKind {
		StoreKind::Aws
	}

	fn path(&self) -> String {
		self.cfg.name.clone()
	}

	async fn get(&self, path: &str) -> Result<SecretData> {
		let output = self
			.client()?
			.get_secret_value()
			.secret_id(path)
			.send()
			.await
			.map_err(|e| {
				let service_error = e.into_service_error();
				if service_error.is_resource_not_found_exception() {
					StoreError::NotFound(path.to_string())
				} else {
					StoreError::Aws(service_error.to_string())
				}
			})?;
		let Some(secret_string) = output.secret_string() else {
			return Err(StoreError::Aws("secret has no string value".into()));
		};
		match serde_json::from_str::<SecretData>(secret_string) {
			Ok(data) => Ok(data),
			Err(_) => {
				let mut data = SecretData::new();
				data.insert("value".into(), secret_string.into());
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
		let create = self
			.client()?
			.create_secret()
			.name(path)
			.secret_string(&body)
			.send()
			.await;
		if let Err(error) = create {
			let service_error = error.into_service_error();
			if !service_error.is_resource_exists_exception() {
				return Err(StoreError::Aws(service_error.to_string()));
			}
			self.client()?
				.put_secret_value()
				.secret_id(path)
				.secret_string(&body)
				.send()
				.await
				.map_err(|e| StoreError::Aws(e.into_service_error().to_string()))?;
		}
		Ok(payload.as_structured().cloned().unwrap_or_default())
	}

	async fn delete(&self, path: &str) -> Result<()> {
		self.client()?
			.delete_secret()
			.secret_id(path)
			.force_delete_without_recovery(true)
			.send()
			.await
			.map_err(|e| {
				let service_error = e.into_service_error();
				if service_error.is_resource_not_found_exception() {
					StoreError::NotFound(path.to_string())
				} else {
					StoreError::Aws(service_error.to_string())
				}
			})?;
		Ok(())
	}

	async fn list(&self, path: &str) -> Result<Vec<String>> {
		let prefix = format!("{}/", path.trim_end_matches('/'));
		let mut names = Vec::new();
		let mut next_token: Option<String> = None;
		loop {
			let output = self
				.client()?
				.list_secrets()
				.set_next_token(next_token.clone())
				.send()
				.await
				.map_err(|e| StoreError::Aws(e.into_service_error().to_string()))?;
			for secret in output.secret_list() {
				let Some(name) = secret.name() else {
					continue;
				};
				if let Some(remainder) = name.strip_prefix(&prefix) {
					names.push(remainder.to_string());
				}
			}
			next_token = output.next_token().map(str::to_string);
			if next_token.is_none() {
				return Ok(names);
			}
		}
	}
}
