// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP surfaces and process wiring for the Shuttle secret-fanout
//! controller.

pub mod auth;
pub mod config;
pub mod health;
pub mod ingress;
pub mod state;

pub use config::{ConfigError, Settings};
pub use health::metrics_router;
pub use ingress::events_router;
pub use state::AppState;
