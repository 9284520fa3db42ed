// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
	#[error(transparent)]
	Core(#[from] shuttle_core::CoreError),

	#[error(transparent)]
	Store(#[from] shuttle_store::StoreError),

	#[error(transparent)]
	Queue(#[from] shuttle_queue::QueueError),

	#[error("invalid source pattern: {0}")]
	Pattern(#[from] regex::Error),

	#[error("operation not defined")]
	OperationNotDefined,

	#[error("source path and destination path required")]
	PathsRequired,

	#[error("failed to create clients: {0}")]
	ClientSetup(String),

	/// Per-destination failures collected for one job; siblings are never
	/// poisoned by each other.
	#[error("errors: [{0}]")]
	Aggregate(String),
}

impl SyncError {
	pub fn aggregate(errors: Vec<String>) -> Self {
		SyncError::Aggregate(errors.join(", "))
	}
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
