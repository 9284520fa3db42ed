// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Prometheus metrics and the process-wide service-health map.

use std::collections::HashMap;
use std::sync::Mutex;

use prometheus::{
	Counter, CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts,
	Registry, TextEncoder,
};
use serde::Serialize;

const SYNC_LABELS: &[&str] = &["namespace", "name"];

// Prometheus metrics - fields are registered with the registry but may not be
// read directly. The registry owns them and exposes them via encode().
#[allow(dead_code)]
pub struct Metrics {
	registry: Registry,

	pub active_syncs: GaugeVec,
	pub sync_duration: HistogramVec,
	pub sync_errors: CounterVec,
	pub syncs_total: CounterVec,
	pub sync_status: GaugeVec,

	pub event_handler_requests: Counter,
	pub event_handler_errors: Counter,
	pub event_handler_duration: Histogram,

	pub events_processed: Counter,
	pub event_processing_duration: Histogram,
	pub event_processing_errors: Counter,

	pub manual_sync_requests: CounterVec,
	pub manual_sync_errors: CounterVec,
	pub manual_sync_duration: HistogramVec,
}

impl Default for Metrics {
	fn default() -> Self {
		Self::new()
	}
}

impl Metrics {
	pub fn new() -> Self {
		let registry = Registry::new();

		let active_syncs = GaugeVec::new(
			Opts::new("shuttle_active_syncs", "The number of active syncs"),
			SYNC_LABELS,
		)
		.unwrap();
		registry.register(Box::new(active_syncs.clone())).unwrap();

		let sync_duration = HistogramVec::new(
			HistogramOpts::new("shuttle_sync_duration_seconds", "The duration of a sync")
				.buckets(prometheus::exponential_buckets(1.0, 2.0, 10).unwrap()),
			SYNC_LABELS,
		)
		.unwrap();
		registry.register(Box::new(sync_duration.clone())).unwrap();

		let sync_errors = CounterVec::new(
			Opts::new("shuttle_sync_errors_total", "The number of sync errors"),
			SYNC_LABELS,
		)
		.unwrap();
		registry.register(Box::new(sync_errors.clone())).unwrap();

		let syncs_total = CounterVec::new(
			Opts::new("shuttle_syncs_total", "The total number of syncs"),
			SYNC_LABELS,
		)
		.unwrap();
		registry.register(Box::new(syncs_total.clone())).unwrap();

		let sync_status = GaugeVec::new(
			Opts::new("shuttle_sync_status", "The status of the last sync, 1 ok 0 failed"),
			SYNC_LABELS,
		)
		.unwrap();
		registry.register(Box::new(sync_status.clone())).unwrap();

		let event_handler_requests = Counter::new(
			"shuttle_event_handler_requests_total",
			"The number of event handler requests",
		)
		.unwrap();
		registry
			.register(Box::new(event_handler_requests.clone()))
			.unwrap();

		let event_handler_errors = Counter::new(
			"shuttle_event_handler_errors_total",
			"The number of event handler errors",
		)
		.unwrap();
		registry
			.register(Box::new(event_handler_errors.clone()))
			.unwrap();

		let event_handler_duration = Histogram::with_opts(
			HistogramOpts::new(
				"shuttle_event_handler_request_duration_seconds",
				"The duration of an event handler request",
			)
			.buckets(prometheus::exponential_buckets(0.001, 2.0, 12).unwrap()),
		)
		.unwrap();
		registry
			.register(Box::new(event_handler_duration.clone()))
			.unwrap();

		let events_processed = Counter::new(
			"shuttle_events_processed_total",
			"The number of events processed",
		)
		.unwrap();
		registry
			.register(Box::new(events_processed.clone()))
			.unwrap();

		let event_processing_duration = Histogram::with_opts(
			HistogramOpts::new(
				"shuttle_event_processing_duration_seconds",
				"The duration of event processing",
			)
			.buckets(prometheus::exponential_buckets(1.0, 2.0, 10).unwrap()),
		)
		.unwrap();
		registry
			.register(Box::new(event_processing_duration.clone()))
			.unwrap();

		let event_processing_errors = Counter::new(
			"shuttle_event_processing_errors_total",
			"The number of event processing errors",
		)
		.unwrap();
		registry
			.register(Box::new(event_processing_errors.clone()))
			.unwrap();

		let manual_sync_requests = CounterVec::new(
			Opts::new(
				"shuttle_manual_sync_requests_total",
				"The number of manual sync requests",
			),
			SYNC_LABELS,
		)
		.unwrap();
		registry
			.register(Box::new(manual_sync_requests.clone()))
			.unwrap();

		let manual_sync_errors = CounterVec::new(
			Opts::new(
				"shuttle_manual_sync_errors_total",
				"The number of manual sync errors",
			),
			SYNC_LABELS,
		)
		.unwrap();
		registry
			.register(Box::new(manual_sync_errors.clone()))
			.unwrap();

		let manual_sync_duration = HistogramVec::new(
			HistogramOpts::new(
				"shuttle_manual_sync_duration_seconds",
				"The duration of a manual sync",
			)
			.buckets(prometheus::exponential_buckets(1.0, 2.0, 10).unwrap()),
			SYNC_LABELS,
		)
		.unwrap();
		registry
			.register(Box::new(manual_sync_duration.clone()))
			.unwrap();

		Metrics {
			registry,
			active_syncs,
			sync_duration,
			sync_errors,
			syncs_total,
			sync_status,
			event_handler_requests,
			event_handler_errors,
			event_handler_duration,
			events_processed,
			event_processing_duration,
			event_processing_errors,
			manual_sync_requests,
			manual_sync_errors,
			manual_sync_duration,
		}
	}

	/// Text exposition of every registered metric.
	pub fn encode(&self) -> String {
		let encoder = TextEncoder::new();
		let metric_families = self.registry.gather();
		let mut buffer = Vec::new();
		encoder.encode(&metric_families, &mut buffer).unwrap();
		String::from_utf8(buffer).unwrap()
	}
}

/// Health classification for one internal service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
	Ok,
	Warning,
	Critical,
}

/// Mutex-guarded map of service name to health, aggregated for `/healthz`.
#[derive(Debug, Default)]
pub struct ServiceHealth {
	services: Mutex<HashMap<String, ServiceStatus>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
	pub services: HashMap<String, ServiceStatus>,
	pub status: ServiceStatus,
}

impl ServiceHealth {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&self, name: &str, status: ServiceStatus) {
		let mut services = self.services.lock().expect("health mutex poisoned");
		services.insert(name.to_string(), status);
	}

	/// Worst status wins: any critical service makes the process critical,
	/// any warning degrades it.
	pub fn overall(&self) -> ServiceStatus {
		let services = self.services.lock().expect("health mutex poisoned");
		services
			.values()
			.copied()
			.max()
			.unwrap_or(ServiceStatus::Ok)
	}

	pub fn report(&self) -> HealthReport {
		let services = self.services.lock().expect("health mutex poisoned");
		let status = services
			.values()
			.copied()
			.max()
			.unwrap_or(ServiceStatus::Ok);
		HealthReport {
			services: services.clone(),
			status,
		}
	}
}
