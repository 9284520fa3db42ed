// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core data model and pure logic for the Shuttle secret-fanout controller.
//!
//! This crate owns everything that does not perform I/O: the `SecretSync`
//! resource model, the change-event model, the in-memory sync registry,
//! the transform and filter pipelines, and the path/regex engine used to
//! route source paths onto destination paths.

pub mod error;
pub mod event;
pub mod filters;
pub mod hash;
pub mod paths;
pub mod registry;
pub mod spec;
pub mod transforms;

pub use error::CoreError;
pub use event::{AuditEntry, AuditEvent, Operation, SyncEvent, SYNC_MARKER_HEADER};
pub use registry::SyncRegistry;
pub use spec::{
	Destination, ResourceMeta, SecretSync, SecretSyncSpec, SecretSyncStatus, StoreKind,
};

/// Secret material as read from and written to stores: a flat JSON object.
pub type SecretData = serde_json::Map<String, serde_json::Value>;

/// Canonical registry key for a resource: `"{namespace}/{name}"`.
pub fn canonical_key(namespace: &str, name: &str) -> String {
	format!("{namespace}/{name}")
}

/// Splits a canonical key back into `(namespace, name)`.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
	let mut parts = key.splitn(2, '/');
	match (parts.next(), parts.next()) {
		(Some(ns), Some(name)) if !ns.is_empty() && !name.is_empty() => Some((ns, name)),
		_ => None,
	}
}
