// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Errors produced by the core data model and pipelines.
#[derive(Debug, Error)]
pub enum CoreError {
	/// A resource without a source descriptor cannot be indexed or synced.
	#[error("source is not defined")]
	MissingSource,

	/// The source address doubles as the tenant key and must not be empty.
	#[error("source address is empty")]
	EmptyTenant,

	#[error("no sync registered under {0}")]
	NotFound(String),

	#[error("template error: {0}")]
	Template(#[from] minijinja::Error),

	#[error("serialization error: {0}")]
	Serialize(#[from] serde_json::Error),
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
