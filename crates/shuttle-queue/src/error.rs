// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Errors from the queue abstraction and its backends.
#[derive(Debug, Error)]
pub enum QueueError {
	#[error("queue receive cancelled")]
	Cancelled,

	#[error("unknown queue kind: {0}")]
	UnknownKind(String),

	#[error("queue is not started")]
	NotStarted,

	#[error("invalid queue parameters: {0}")]
	Params(#[from] serde_json::Error),

	#[error("redis error: {0}")]
	Redis(#[from] redis::RedisError),

	#[error("nats error: {0}")]
	Nats(String),
}

pub type Result<T, E = QueueError> = std::result::Result<T, E>;
