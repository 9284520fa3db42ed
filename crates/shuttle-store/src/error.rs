// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Errors from store drivers.
#[derive(Debug, Error)]
pub enum StoreError {
	/// Invalid or incomplete driver configuration.
	#[error("store configuration error: {0}")]
	Config(String),

	#[error("operation not implemented for this store")]
	NotImplemented,

	#[error("http error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("api error: {status} {message}")]
	Api { status: u16, message: String },

	#[error("secret not found: {0}")]
	NotFound(String),

	#[error("environment {0} does not exist")]
	EnvironmentMissing(String),

	#[error("repo {0} does not exist")]
	RepoMissing(String),

	#[error("jwt error: {0}")]
	Jwt(String),

	#[error("encryption error: {0}")]
	Encryption(String),

	#[error("aws error: {0}")]
	Aws(String),

	#[error("gcp error: {0}")]
	Gcp(String),

	#[error("serialization error: {0}")]
	Serde(#[from] serde_json::Error),

	#[error("template error: {0}")]
	Template(#[from] minijinja::Error),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

impl StoreError {
	pub fn api(status: u16, message: impl Into<String>) -> Self {
		StoreError::Api {
			status,
			message: message.into(),
		}
	}
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
