// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The event ingress: `POST /events` with newline-delimited JSON audit
//! records.
//!
//! Each record is decoded independently and processed on a detached task so
//! a slow sync never backs up the source store's audit pipeline. The
//! handler answers 202 once the batch is drained, 400 on the first decode
//! error, and 401 on auth failure.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use uuid::Uuid;

use shuttle_core::{AuditEvent, Operation, SyncEvent};
use shuttle_queue::Queue;

use crate::auth::{request_authorized, TOKEN_HEADER};
use crate::state::AppState;

/// Header naming the tenant (source store address) that emitted the event.
pub const TENANT_HEADER: &str = "X-Vault-Tenant";

pub fn events_router(state: AppState) -> Router {
	Router::new()
		.route("/events", post(handle_events))
		.with_state(state)
}

async fn handle_events(
	State(state): State<AppState>,
	ConnectInfo(addr): ConnectInfo<SocketAddr>,
	headers: HeaderMap,
	body: String,
) -> StatusCode {
	state.metrics.event_handler_requests.inc();
	let started = Instant::now();
	let status = process_batch(&state, &headers, addr, body).await;
	state
		.metrics
		.event_handler_duration
		.observe(started.elapsed().as_secs_f64());
	status
}

async fn process_batch(
	state: &AppState,
	headers: &HeaderMap,
	addr: SocketAddr,
	body: String,
) -> StatusCode {
	let caller_ip = headers
		.get("X-Forwarded-For")
		.and_then(|v| v.to_str().ok())
		.map(str::to_string)
		.unwrap_or_else(|| addr.ip().to_string());
	let tenant = headers
		.get(TENANT_HEADER)
		.and_then(|v| v.to_str().ok())
		.unwrap_or_default()
		.to_string();
	let token = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());

	if !request_authorized(&state.settings.events.security, token, false) {
		tracing::error!("invalid auth");
		return StatusCode::UNAUTHORIZED;
	}

	for line in body.lines() {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}
		let entry: shuttle_core::AuditEntry = match serde_json::from_str(line) {
			Ok(entry) => entry,
			Err(error) => {
				tracing::error!(%error, "error decoding event");
				state.metrics.event_handler_errors.inc();
				return StatusCode::BAD_REQUEST;
			}
		};
		if entry.request.is_none() {
			tracing::trace!("empty or invalid event");
			continue;
		}
		let event = AuditEvent {
			entry,
			tenant: tenant.clone(),
			remote_addr: caller_ip.clone(),
		};
		// Detached so the batch drains even while syncs are slow.
		let state = state.clone();
		tokio::spawn(async move {
			process_event(state, event).await;
		});
	}
	StatusCode::ACCEPTED
}

/// Filters, normalizes, and schedules one audit event.
async fn process_event(state: AppState, event: AuditEvent) {
	if should_filter_event(&state, &event) {
		tracing::trace!("filtering event");
		return;
	}
	let request = event.entry.request.as_ref().expect("filtered above");
	if state.settings.log.events {
		tracing::info!(
			event_id = %request.id,
			op = %request.operation,
			path = %request.path,
			"event accepted"
		);
	}
	let address = resolve_address(&state, &event);
	let sync_event = SyncEvent::from_audit(&event, address);
	schedule_sync(&state, sync_event).await;
}

/// The ingress drop rules: reads and unmonitored operations, replays
/// within the dedup window, and our own writes looping back.
fn should_filter_event(state: &AppState, event: &AuditEvent) -> bool {
	let Some(request) = &event.entry.request else {
		return true;
	};
	if request.operation == Operation::Read {
		return true;
	}
	if !matches!(
		request.operation,
		Operation::Create | Operation::Update | Operation::Delete
	) {
		return true;
	}
	if state.queue.event_seen(&request.id) {
		tracing::trace!(event_id = %request.id, "event already seen");
		return true;
	}
	state.queue.seen_event(&request.id);
	if event.self_produced() {
		tracing::debug!(event_id = %request.id, "skipping self-produced event");
		return true;
	}
	false
}

/// The source address for an event: the tenant hint when supplied,
/// otherwise the first registered source whose address matches the hint or
/// whose CIDR contains the caller.
fn resolve_address(state: &AppState, event: &AuditEvent) -> String {
	if !event.tenant.is_empty() {
		return event.tenant.clone();
	}
	let Ok(remote_ip) = event
		.remote_addr
		.split(':')
		.next()
		.unwrap_or(&event.remote_addr)
		.parse::<std::net::IpAddr>()
	else {
		return "unknown".to_string();
	};
	for sync in state.registry.all() {
		let Some(source) = &sync.spec.source else {
			continue;
		};
		let Some(cidr) = &source.cidr else {
			continue;
		};
		match cidr.parse::<ipnet::IpNet>() {
			Ok(net) if net.contains(&remote_ip) => {
				tracing::debug!(address = %source.address, "resolved address from source cidr");
				return source.address.clone();
			}
			Ok(_) => {}
			Err(error) => {
				tracing::debug!(%cidr, %error, "invalid source cidr");
			}
		}
	}
	"unknown".to_string()
}

async fn schedule_sync(state: &AppState, mut event: SyncEvent) {
	if event.id.is_empty() {
		event.id = Uuid::new_v4().to_string();
	}
	tracing::trace!(
		id = %event.id,
		event_id = %event.event_id,
		op = %event.operation,
		path = %event.path,
		"scheduling sync"
	);
	if let Err(error) = state.queue.publish(event).await {
		state.metrics.event_handler_errors.inc();
		tracing::error!(%error, "failed to enqueue event");
	}
}
