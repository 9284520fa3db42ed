// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shuttle secret-fanout controller binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shuttle_core::SyncRegistry;
use shuttle_metrics::{Metrics, ServiceHealth, ServiceStatus};
use shuttle_notify::Notifier;
use shuttle_queue::Queue;
use shuttle_server::{events_router, metrics_router, AppState, Settings};
use shuttle_store::DriverFactory;
use shuttle_sync::{EventProcessor, MemoryEventSink, MemoryStatusSink, SyncExecutor};

/// Shuttle - continuous secret replication from a vault-like source into
/// heterogeneous destination stores.
#[derive(Parser, Debug)]
#[command(name = "shuttle-server", about = "Shuttle secret-fanout controller", version)]
struct Args {
	/// Path to the TOML configuration file.
	#[arg(long, default_value = "shuttle.toml")]
	config: PathBuf,

	/// Start the event processor regardless of configuration.
	#[arg(long)]
	operator: bool,

	/// Start the ingress server regardless of configuration.
	#[arg(long)]
	events: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	let mut settings = Settings::load(Some(&args.config))?;
	if args.operator {
		settings.operator.enabled = true;
	}
	if args.events {
		settings.events.enabled = true;
	}

	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| settings.log.level.clone().into());
	let registry = tracing_subscriber::registry().with(env_filter);
	if settings.log.format == "json" {
		registry
			.with(tracing_subscriber::fmt::layer().json())
			.init();
	} else {
		registry.with(tracing_subscriber::fmt::layer()).init();
	}

	settings.validate()?;
	if !settings.operator.enabled && !settings.events.enabled {
		anyhow::bail!("no servers started; enable the operator, the event server, or both");
	}

	tracing::info!(
		queue = %settings.queue.kind,
		operator = settings.operator.enabled,
		events = settings.events.enabled,
		"starting shuttle-server"
	);

	let health = Arc::new(ServiceHealth::new());
	let metrics = Arc::new(Metrics::new());
	let registry = Arc::new(SyncRegistry::new());
	let queue = shuttle_queue::init(
		settings.queue.kind,
		settings.queue.params.clone(),
		settings.dedupe(),
		Arc::clone(&health),
	)
	.await?;

	let settings = Arc::new(settings);
	let state = AppState::new(
		Arc::clone(&settings),
		Arc::clone(&queue),
		Arc::clone(&registry),
		Arc::clone(&metrics),
		Arc::clone(&health),
	);

	let cancel = CancellationToken::new();

	// Metrics and health are always served.
	{
		let state = state.clone();
		let cancel = cancel.clone();
		let port = settings.metrics.port;
		tokio::spawn(async move {
			if let Err(error) = serve(metrics_router(state), port, cancel).await {
				tracing::error!(%error, "metrics server failed");
			}
		});
	}

	let processor = if settings.operator.enabled {
		health.register("operator", ServiceStatus::Ok);
		let factory = Arc::new(DriverFactory::new(settings.stores.clone()));
		let executor = Arc::new(SyncExecutor::new(
			factory,
			Arc::clone(&registry),
			Arc::new(MemoryStatusSink::new()),
			Arc::new(MemoryEventSink::new()),
			Arc::new(Notifier::new(settings.notifications.clone())),
			Arc::clone(&metrics),
		));
		let processor = Arc::new(EventProcessor::new(Arc::clone(&queue), executor));
		{
			let processor = Arc::clone(&processor);
			let cancel = cancel.clone();
			let subscriptions = settings.operator.num_subscriptions();
			let workers = settings.operator.worker_pool_size();
			tokio::spawn(async move {
				if let Err(error) = processor.run(cancel, subscriptions, workers).await {
					tracing::error!(%error, "event processor failed");
				}
			});
		}
		Some(processor)
	} else {
		None
	};

	if settings.events.enabled {
		health.register("events", ServiceStatus::Ok);
		let state = state.clone();
		let cancel = cancel.clone();
		let port = settings.events.port;
		tracing::info!(port, "starting event server");
		tokio::spawn(async move {
			if let Err(error) = serve(events_router(state), port, cancel).await {
				tracing::error!(%error, "event server failed");
			}
		});
	}

	wait_for_shutdown().await;
	tracing::info!("shutting down");
	cancel.cancel();
	if let Some(processor) = processor {
		// Let in-flight jobs finish before the queue goes away.
		let drain_cancel = CancellationToken::new();
		processor.drain(&drain_cancel).await;
	}
	if let Err(error) = queue.stop().await {
		tracing::error!(%error, "failed to stop queue");
	}
	Ok(())
}

async fn serve(
	router: axum::Router,
	port: u16,
	cancel: CancellationToken,
) -> anyhow::Result<()> {
	let addr = SocketAddr::from(([0, 0, 0, 0], port));
	let listener = tokio::net::TcpListener::bind(addr).await?;
	tracing::debug!(%addr, "listening");
	let router = router.layer(tower_http::trace::TraceLayer::new_for_http());
	axum::serve(
		listener,
		router.into_make_service_with_connect_info::<SocketAddr>(),
	)
	.with_graceful_shutdown(async move { cancel.cancelled().await })
	.await?;
	Ok(())
}

async fn wait_for_shutdown() {
	let ctrl_c = async {
		tokio::signal::ctrl_c()
			.await
			.expect("failed to install ctrl-c handler");
	};
	#[cfg(unix)]
	let terminate = async {
		tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();
	tokio::select! {
		_ = ctrl_c => {}
		_ = terminate => {}
	}
}
