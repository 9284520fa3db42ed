// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server configuration.
//!
//! Layered: built-in defaults, then a TOML file, then `SHUTTLE_*`
//! environment variables. Validation runs once after loading; the one rule
//! that matters operationally is that the memory queue is only legal when
//! ingestion and processing share the process.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use shuttle_notify::NotifyDefaults;
use shuttle_queue::QueueKind;
use shuttle_store::StoreDefaults;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config file: {0}")]
	Io(#[from] std::io::Error),

	#[error("failed to parse config file: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("invalid value for {variable}: {value}")]
	Env { variable: String, value: String },

	#[error(
		"memory queue can only be used when ingestion and processing run in the same process"
	)]
	MemoryQueueTopology,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
	pub log: LogSettings,
	pub events: EventsSettings,
	pub operator: OperatorSettings,
	pub queue: QueueSettings,
	pub metrics: MetricsSettings,
	pub stores: StoreDefaults,
	pub notifications: NotifyDefaults,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogSettings {
	pub level: String,
	pub format: String,
	/// Log every accepted ingress event at info level.
	pub events: bool,
}

impl Default for LogSettings {
	fn default() -> Self {
		Self {
			level: "info".into(),
			format: "text".into(),
			events: false,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventsSettings {
	pub enabled: bool,
	pub port: u16,
	pub security: SecuritySettings,
	pub dedupe: Option<bool>,
}

impl Default for EventsSettings {
	fn default() -> Self {
		Self {
			enabled: false,
			port: 8080,
			security: SecuritySettings::default(),
			dedupe: None,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecuritySettings {
	/// Tri-state on purpose: unset means "not configured", which denies
	/// everything rather than silently allowing it.
	pub enabled: Option<bool>,
	pub token: Option<String>,
	pub tls: Option<TlsSettings>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TlsSettings {
	pub client_auth: Option<String>,
	pub cert: Option<String>,
	pub key: Option<String>,
	pub ca: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorSettings {
	pub enabled: bool,
	pub worker_pool_size: usize,
	pub num_subscriptions: usize,
}

impl OperatorSettings {
	pub fn worker_pool_size(&self) -> usize {
		if self.worker_pool_size == 0 {
			shuttle_sync::DEFAULT_WORKER_POOL_SIZE
		} else {
			self.worker_pool_size
		}
	}

	pub fn num_subscriptions(&self) -> usize {
		if self.num_subscriptions == 0 {
			shuttle_sync::DEFAULT_NUM_SUBSCRIPTIONS
		} else {
			self.num_subscriptions
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueSettings {
	pub kind: QueueKind,
	pub params: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsSettings {
	pub port: u16,
}

impl Default for MetricsSettings {
	fn default() -> Self {
		Self { port: 9090 }
	}
}

impl Settings {
	/// Loads defaults, the optional TOML file, and environment overrides,
	/// in that order.
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		let mut settings = match path {
			Some(path) if path.exists() => {
				let raw = std::fs::read_to_string(path)?;
				toml::from_str(&raw)?
			}
			Some(path) => {
				tracing::debug!(path = %path.display(), "config file not found, using defaults");
				Settings::default()
			}
			None => Settings::default(),
		};
		settings.apply_env()?;
		Ok(settings)
	}

	fn apply_env(&mut self) -> Result<(), ConfigError> {
		if let Ok(level) = std::env::var("SHUTTLE_LOG_LEVEL") {
			self.log.level = level;
		}
		if let Ok(port) = std::env::var("SHUTTLE_EVENTS_PORT") {
			self.events.port = parse_env("SHUTTLE_EVENTS_PORT", &port)?;
		}
		if let Ok(token) = std::env::var("SHUTTLE_EVENTS_TOKEN") {
			self.events.security.token = Some(token);
		}
		if let Ok(kind) = std::env::var("SHUTTLE_QUEUE_KIND") {
			self.queue.kind = kind.parse().map_err(|_| ConfigError::Env {
				variable: "SHUTTLE_QUEUE_KIND".into(),
				value: kind,
			})?;
		}
		if let Ok(port) = std::env::var("SHUTTLE_METRICS_PORT") {
			self.metrics.port = parse_env("SHUTTLE_METRICS_PORT", &port)?;
		}
		Ok(())
	}

	/// Startup validation, after CLI flags have been folded in.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.queue.kind == QueueKind::Memory
			&& !(self.operator.enabled && self.events.enabled)
		{
			return Err(ConfigError::MemoryQueueTopology);
		}
		Ok(())
	}

	pub fn dedupe(&self) -> bool {
		self.events.dedupe.unwrap_or(true)
	}
}

fn parse_env<T: std::str::FromStr>(variable: &str, value: &str) -> Result<T, ConfigError> {
	value.parse().map_err(|_| ConfigError::Env {
		variable: variable.to_string(),
		value: value.to_string(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn defaults_are_sane() {
		let settings = Settings::default();
		assert_eq!(settings.events.port, 8080);
		assert_eq!(settings.metrics.port, 9090);
		assert_eq!(settings.queue.kind, QueueKind::Memory);
		assert!(settings.dedupe());
		assert_eq!(settings.operator.worker_pool_size(), 10);
		assert_eq!(settings.operator.num_subscriptions(), 10);
	}

	#[test]
	fn memory_queue_requires_single_process() {
		// Ingestion without processing cannot share a memory queue.
		let mut settings = Settings::default();
		settings.events.enabled = true;
		settings.operator.enabled = false;
		assert!(matches!(
			settings.validate(),
			Err(ConfigError::MemoryQueueTopology)
		));

		settings.operator.enabled = true;
		assert!(settings.validate().is_ok());
	}

	#[test]
	fn broker_queue_allows_split_processes() {
		let mut settings = Settings::default();
		settings.queue.kind = QueueKind::Redis;
		settings.events.enabled = true;
		settings.operator.enabled = false;
		assert!(settings.validate().is_ok());
	}

	#[test]
	fn toml_file_overrides_defaults() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(
			file,
			r#"
[log]
level = "debug"

[events]
enabled = true
port = 9999

[events.security]
enabled = true
token = "hunter2"

[queue]
kind = "redis"

[queue.params]
host = "redis.internal"
port = 6379
"#
		)
		.unwrap();
		let settings = Settings::load(Some(file.path())).unwrap();
		assert_eq!(settings.log.level, "debug");
		assert!(settings.events.enabled);
		assert_eq!(settings.events.port, 9999);
		assert_eq!(settings.events.security.token.as_deref(), Some("hunter2"));
		assert_eq!(settings.queue.kind, QueueKind::Redis);
		assert_eq!(
			settings.queue.params.get("host").and_then(|v| v.as_str()),
			Some("redis.internal")
		);
	}

	#[test]
	fn missing_file_falls_back_to_defaults() {
		let settings = Settings::load(Some(Path::new("/nonexistent/shuttle.toml"))).unwrap();
		assert_eq!(settings.events.port, 8080);
	}
}
