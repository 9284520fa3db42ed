// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared handles threaded through the HTTP surfaces.

use std::sync::Arc;

use shuttle_core::SyncRegistry;
use shuttle_metrics::{Metrics, ServiceHealth};
use shuttle_queue::Queue;

use crate::config::Settings;

#[derive(Clone)]
pub struct AppState {
	pub settings: Arc<Settings>,
	pub queue: Arc<dyn Queue>,
	pub registry: Arc<SyncRegistry>,
	pub metrics: Arc<Metrics>,
	pub health: Arc<ServiceHealth>,
}

impl AppState {
	pub fn new(
		settings: Arc<Settings>,
		queue: Arc<dyn Queue>,
		registry: Arc<SyncRegistry>,
		metrics: Arc<Metrics>,
		health: Arc<ServiceHealth>,
	) -> Self {
		Self {
			settings,
			queue,
			registry,
			metrics,
			health,
		}
	}
}
