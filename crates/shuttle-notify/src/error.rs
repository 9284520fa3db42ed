// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
	#[error("notification configuration error: {0}")]
	Config(String),

	#[error("http error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("webhook request failed with status {0}")]
	WebhookStatus(u16),

	#[error("smtp error: {0}")]
	Smtp(String),

	#[error("template error: {0}")]
	Template(#[from] minijinja::Error),

	#[error("failed to handle notifications: {0}")]
	Aggregate(String),
}

pub type Result<T, E = NotifyError> = std::result::Result<T, E>;
