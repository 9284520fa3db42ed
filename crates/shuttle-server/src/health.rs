// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Health and metrics HTTP surface.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use shuttle_metrics::ServiceStatus;

use crate::state::AppState;

pub fn metrics_router(state: AppState) -> Router {
	Router::new()
		.route("/healthz", get(healthz))
		.route("/metrics", get(prometheus_metrics))
		.with_state(state)
}

/// GET /healthz - aggregated service health.
async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
	let report = state.health.report();
	let status = match report.status {
		ServiceStatus::Ok => StatusCode::OK,
		ServiceStatus::Warning | ServiceStatus::Critical => StatusCode::SERVICE_UNAVAILABLE,
	};
	(status, Json(report))
}

/// GET /metrics - Prometheus text exposition.
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
	(
		StatusCode::OK,
		[(
			axum::http::header::CONTENT_TYPE,
			"text/plain; version=0.0.4; charset=utf-8",
		)],
		state.metrics.encode(),
	)
}
