// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Change-event model: raw audit records as received on the ingress, and the
//! normalized events that travel through the queue.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Request header set by our own store writes so the ingress can drop the
/// audit events they generate instead of looping them back through the queue.
pub const SYNC_MARKER_HEADER: &str = "x-shuttle-sync";

/// Source-store operations as they appear in audit records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
	Create,
	Update,
	Delete,
	Read,
	List,
	#[default]
	#[serde(other)]
	Unknown,
}

impl fmt::Display for Operation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Operation::Create => "create",
			Operation::Update => "update",
			Operation::Delete => "delete",
			Operation::Read => "read",
			Operation::List => "list",
			Operation::Unknown => "unknown",
		};
		f.write_str(name)
	}
}

impl std::str::FromStr for Operation {
	type Err = std::convert::Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(match s {
			"create" => Operation::Create,
			"update" => Operation::Update,
			"delete" => Operation::Delete,
			"read" => Operation::Read,
			"list" => Operation::List,
			_ => Operation::Unknown,
		})
	}
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuditNamespace {
	#[serde(default)]
	pub path: String,
}

/// The request portion of a source-store audit record. Only the fields the
/// ingress routes on are decoded; everything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuditRequest {
	#[serde(default)]
	pub id: String,
	#[serde(default)]
	pub operation: Operation,
	#[serde(default)]
	pub path: String,
	#[serde(default)]
	pub namespace: Option<AuditNamespace>,
	#[serde(default)]
	pub headers: HashMap<String, Vec<String>>,
}

/// One decoded line of the newline-delimited audit stream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuditEntry {
	#[serde(default)]
	pub request: Option<AuditRequest>,
}

/// An audit entry plus the HTTP context the ingress received it with.
#[derive(Debug, Clone, Default)]
pub struct AuditEvent {
	pub entry: AuditEntry,
	/// Tenant hint supplied by the emitting store, may be empty.
	pub tenant: String,
	pub remote_addr: String,
}

impl AuditEvent {
	/// True when the originating request carried our own write marker.
	pub fn self_produced(&self) -> bool {
		let Some(request) = &self.entry.request else {
			return false;
		};
		request
			.headers
			.get(SYNC_MARKER_HEADER)
			.map(|values| values.iter().any(|v| v == "true"))
			.unwrap_or(false)
	}
}

/// The normalized event that is published to the queue and fanned out into
/// sync jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
	#[serde(default)]
	pub id: String,
	#[serde(default)]
	pub event_id: String,
	/// Set only on manual triggers; pins the event to a single sync by key.
	#[serde(default)]
	pub sync_name: String,
	#[serde(default)]
	pub address: String,
	#[serde(default)]
	pub namespace: String,
	#[serde(default)]
	pub path: String,
	#[serde(default)]
	pub operation: Operation,
	#[serde(default)]
	pub manual: bool,
}

impl SyncEvent {
	/// Builds the queued event from a raw audit event and the resolved
	/// source address.
	pub fn from_audit(event: &AuditEvent, address: String) -> Self {
		let request = event.entry.request.clone().unwrap_or_default();
		SyncEvent {
			id: String::new(),
			event_id: request.id,
			sync_name: String::new(),
			address,
			namespace: request
				.namespace
				.map(|ns| ns.path)
				.unwrap_or_default(),
			path: request.path,
			operation: request.operation,
			manual: false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn operation_decodes_lowercase_and_unknowns() {
		let op: Operation = serde_json::from_str("\"update\"").unwrap();
		assert_eq!(op, Operation::Update);
		let op: Operation = serde_json::from_str("\"renew\"").unwrap();
		assert_eq!(op, Operation::Unknown);
	}

	#[test]
	fn audit_entry_decodes_partial_records() {
		let raw = r#"{"type":"response","request":{"id":"abc","operation":"create","path":"secret/data/foo","namespace":{"id":"n1","path":"team-a/"}}}"#;
		let entry: AuditEntry = serde_json::from_str(raw).unwrap();
		let request = entry.request.unwrap();
		assert_eq!(request.id, "abc");
		assert_eq!(request.operation, Operation::Create);
		assert_eq!(request.namespace.unwrap().path, "team-a/");
	}

	#[test]
	fn self_produced_detects_marker_header() {
		let mut event = AuditEvent::default();
		assert!(!event.self_produced());
		let mut request = AuditRequest::default();
		request
			.headers
			.insert(SYNC_MARKER_HEADER.into(), vec!["true".into()]);
		event.entry.request = Some(request);
		assert!(event.self_produced());
	}

	#[test]
	fn from_audit_copies_request_fields() {
		let entry: AuditEntry = serde_json::from_str(
			r#"{"request":{"id":"r1","operation":"delete","path":"secret/data/x","namespace":{"path":"team-b/"}}}"#,
		)
		.unwrap();
		let event = AuditEvent {
			entry,
			tenant: String::new(),
			remote_addr: "10.0.0.9".into(),
		};
		let sync_event = SyncEvent::from_audit(&event, "https://vault.example.com".into());
		assert_eq!(sync_event.event_id, "r1");
		assert_eq!(sync_event.operation, Operation::Delete);
		assert_eq!(sync_event.namespace, "team-b/");
		assert!(sync_event.id.is_empty());
		assert!(!sync_event.manual);
	}
}
