// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The sync executor: one queued event in, create/update/delete fanned out
//! across every destination of every matching sync.
//!
//! Store clients are built per job and closed on every exit path. Failures
//! on one destination never poison its siblings; they are collected and
//! reported as one aggregated job error.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::instrument;
use uuid::Uuid;

use shuttle_core::transforms::{self, SecretPayload};
use shuttle_core::{filters, Operation, SecretSync, SyncEvent, SyncRegistry};
use shuttle_metrics::Metrics;
use shuttle_notify::{NotificationMessage, Notifier};
use shuttle_store::{Store, StoreFactory};

use crate::active::ActiveSyncs;
use crate::error::{Result, SyncError};
use crate::jobs::{self, SyncJob};
use crate::sinks::{EventSeverity, EventSink, StatusSink, SyncStatus};

/// Upper bound on concurrent work within one fan-out.
pub(crate) const POOL_WORKERS: usize = 10;

/// Drives each future set with bounded parallelism and collects every
/// failure; task and result buffers are sized by the fan-out itself.
pub(crate) async fn run_pool<Fut>(tasks: Vec<Fut>, limit: usize) -> Result<()>
where
	Fut: std::future::Future<Output = Result<()>>,
{
	if tasks.is_empty() {
		return Ok(());
	}
	let limit = limit.min(tasks.len()).max(1);
	let errors: Vec<String> = stream::iter(tasks)
		.buffer_unordered(limit)
		.filter_map(|result| async move { result.err().map(|e| e.to_string()) })
		.collect()
		.await;
	if errors.is_empty() {
		Ok(())
	} else {
		Err(SyncError::aggregate(errors))
	}
}

/// Per-job store clients. Created fresh for every job so credentials and
/// connections never outlive the sync that needed them.
pub struct SyncClients {
	pub source: Box<dyn Store>,
	pub dest: Vec<Box<dyn Store>>,
}

impl SyncClients {
	/// Closes every client; runs on all exit paths of a job.
	pub async fn close(&mut self) {
		if let Err(error) = self.source.close().await {
			tracing::error!(%error, "failed to close source client");
		}
		for dest in &mut self.dest {
			if let Err(error) = dest.close().await {
				tracing::error!(kind = %dest.kind(), %error, "failed to close destination client");
			}
		}
	}
}

pub struct SyncExecutor {
	factory: Arc<dyn StoreFactory>,
	registry: Arc<SyncRegistry>,
	status: Arc<dyn StatusSink>,
	events: Arc<dyn EventSink>,
	notifier: Arc<Notifier>,
	metrics: Arc<Metrics>,
	active: Arc<ActiveSyncs>,
}

impl SyncExecutor {
	pub fn new(
		factory: Arc<dyn StoreFactory>,
		registry: Arc<SyncRegistry>,
		status: Arc<dyn StatusSink>,
		events: Arc<dyn EventSink>,
		notifier: Arc<Notifier>,
		metrics: Arc<Metrics>,
	) -> Self {
		Self {
			factory,
			registry,
			status,
			events,
			notifier,
			metrics,
			active: Arc::new(ActiveSyncs::new()),
		}
	}

	pub fn active(&self) -> Arc<ActiveSyncs> {
		Arc::clone(&self.active)
	}

	/// Entry point for one dequeued event.
	#[instrument(skip(self, event), fields(path = %event.path, op = %event.operation))]
	pub async fn sync(&self, mut event: SyncEvent) -> Result<()> {
		if event.id.is_empty() {
			event.id = Uuid::new_v4().to_string();
		}
		if event.manual {
			event.event_id = format!("manual-{}", event.id);
		}
		self.metrics.events_processed.inc();
		let started = Instant::now();
		self.active.track(&event.id);
		let result = self.run(&event).await;
		self.active.untrack(&event.id);
		self.metrics
			.event_processing_duration
			.observe(started.elapsed().as_secs_f64());
		if result.is_err() {
			self.metrics.event_processing_errors.inc();
		}
		if event.manual {
			if let Some((namespace, name)) = shuttle_core::split_key(&event.sync_name) {
				self.metrics
					.manual_sync_duration
					.with_label_values(&[namespace, name])
					.observe(started.elapsed().as_secs_f64());
			}
		}
		result
	}

	async fn run(&self, event: &SyncEvent) -> Result<()> {
		let jobs = jobs::build_sync_jobs(&self.registry, event);
		if jobs.is_empty() {
			tracing::trace!("no syncs need attention");
			return Ok(());
		}
		tracing::info!(
			affected = jobs.len(),
			event_id = %event.event_id,
			"syncing matching resources"
		);
		let tasks: Vec<_> = jobs.iter().map(|job| self.do_sync(job)).collect();
		run_pool(tasks, POOL_WORKERS).await?;
		tracing::info!(event_id = %event.event_id, "sync complete");
		Ok(())
	}

	/// Executes one job: build clients, dispatch by operation, close
	/// clients, report.
	pub async fn do_sync(&self, job: &SyncJob) -> Result<()> {
		let namespace = job.sync.metadata.namespace.clone();
		let name = job.sync.metadata.name.clone();
		let started = Instant::now();
		self.metrics
			.syncs_total
			.with_label_values(&[&namespace, &name])
			.inc();
		self.metrics
			.active_syncs
			.with_label_values(&[&namespace, &name])
			.inc();

		let mut clients = match self.build_clients(job).await {
			Ok(clients) => clients,
			Err(error) => return self.finish_error(job, error, started).await,
		};
		let result = match job.event.operation {
			Operation::Create | Operation::Update => self.sync_create(&clients, job).await,
			Operation::Delete => self.sync_delete(&clients, job).await,
			_ => Err(SyncError::OperationNotDefined),
		};
		clients.close().await;
		match result {
			Ok(()) => self.finish_success(job, started).await,
			Err(error) => self.finish_error(job, error, started).await,
		}
	}

	async fn build_clients(&self, job: &SyncJob) -> Result<SyncClients> {
		let Some(source_cfg) = &job.sync.spec.source else {
			return Err(SyncError::ClientSetup("source is not defined".into()));
		};
		if job.sync.spec.dest.is_empty() {
			return Err(SyncError::ClientSetup("no destinations configured".into()));
		}
		let mut source = self.factory.source(source_cfg)?;
		source.init().await?;
		let mut dest = Vec::with_capacity(job.sync.spec.dest.len());
		for descriptor in &job.sync.spec.dest {
			let mut store = match self.factory.destination(descriptor) {
				Ok(store) => store,
				Err(error) => {
					self.close_partial(source, dest).await;
					return Err(error.into());
				}
			};
			if let Err(error) = store.init().await {
				self.close_partial(source, dest).await;
				return Err(error.into());
			}
			dest.push(store);
		}
		Ok(SyncClients { source, dest })
	}

	async fn close_partial(&self, source: Box<dyn Store>, dest: Vec<Box<dyn Store>>) {
		let mut clients = SyncClients { source, dest };
		clients.close().await;
	}

	/// Reads, transforms, and writes one source path to one destination
	/// path.
	pub(crate) async fn create_one(
		&self,
		job: &SyncJob,
		source: &dyn Store,
		dest: &dyn Store,
		source_path: String,
		dest_path: String,
	) -> Result<()> {
		if source_path.is_empty() || dest_path.is_empty() {
			return Err(SyncError::PathsRequired);
		}
		if filters::should_filter(&job.sync.spec, &source_path) {
			tracing::debug!(%source_path, "path filtered");
			return Ok(());
		}
		let data = match source.get(&source_path).await {
			Ok(data) => data,
			Err(error) => {
				return self
					.record_path_failure(job, dest, &source_path, &dest_path, error.into())
					.await;
			}
		};
		let payload = match transforms::execute(job.sync.spec.transforms.as_ref(), data) {
			Ok(payload) => payload,
			Err(error) => {
				return self
					.record_path_failure(job, dest, &source_path, &dest_path, error.into())
					.await;
			}
		};
		if self.dry_run_gate(job, dest, &source_path, &dest_path).await {
			return Ok(());
		}
		if let Err(error) = self
			.write_payload(job, dest, &dest_path, &payload)
			.await
		{
			return self
				.record_path_failure(job, dest, &source_path, &dest_path, error)
				.await;
		}
		self.events
			.record(
				&job.sync.metadata.namespace,
				&job.sync.metadata.name,
				EventSeverity::Normal,
				&SyncStatus::Synced.to_string(),
				&format!("synced {source_path} to {}: {dest_path}", dest.kind()),
			)
			.await;
		Ok(())
	}

	async fn write_payload(
		&self,
		job: &SyncJob,
		dest: &dyn Store,
		dest_path: &str,
		payload: &SecretPayload,
	) -> Result<()> {
		dest.write(&job.sync.metadata, dest_path, payload).await?;
		Ok(())
	}

	/// When the sync is a dry run, records what would have happened and
	/// reports true so the caller skips the write.
	pub(crate) async fn dry_run_gate(
		&self,
		job: &SyncJob,
		dest: &dyn Store,
		source_path: &str,
		dest_path: &str,
	) -> bool {
		if !job.sync.spec.dry_run() {
			return false;
		}
		tracing::info!(%source_path, %dest_path, "dry run");
		if let Err(error) = self.status.set_status(&job.sync, SyncStatus::DryRun).await {
			tracing::error!(%error, "failed to set dry-run status");
		}
		self.events
			.record(
				&job.sync.metadata.namespace,
				&job.sync.metadata.name,
				EventSeverity::Normal,
				&SyncStatus::DryRun.to_string(),
				&format!(
					"dry run: synced {source_path} to {}: {dest_path}",
					dest.kind()
				),
			)
			.await;
		true
	}

	pub(crate) async fn record_path_failure(
		&self,
		job: &SyncJob,
		dest: &dyn Store,
		source_path: &str,
		dest_path: &str,
		error: SyncError,
	) -> Result<()> {
		tracing::error!(%source_path, %dest_path, %error, "failed to sync secret");
		self.events
			.record(
				&job.sync.metadata.namespace,
				&job.sync.metadata.name,
				EventSeverity::Warning,
				&SyncStatus::Failed.to_string(),
				&format!(
					"failed to sync {source_path} to {}: {dest_path} with error: {error}",
					dest.kind()
				),
			)
			.await;
		Err(error)
	}

	/// Literal source path: one CreateOne per destination.
	pub(crate) async fn single_sync(&self, clients: &SyncClients, job: &SyncJob) -> Result<()> {
		let source_path = clients.source.path();
		let tasks: Vec<_> = clients
			.dest
			.iter()
			.map(|dest| {
				self.create_one(
					job,
					clients.source.as_ref(),
					dest.as_ref(),
					source_path.clone(),
					dest.path(),
				)
			})
			.collect();
		run_pool(tasks, POOL_WORKERS).await
	}

	/// Literal source path delete: one destination delete each.
	pub(crate) async fn single_delete(&self, clients: &SyncClients, job: &SyncJob) -> Result<()> {
		let source_path = clients.source.path();
		let tasks: Vec<_> = clients
			.dest
			.iter()
			.map(|dest| {
				let source_path = source_path.clone();
				async move {
					if filters::should_filter(&job.sync.spec, &source_path) {
						return Ok(());
					}
					if self
						.dry_run_gate(job, dest.as_ref(), &source_path, &dest.path())
						.await
					{
						return Ok(());
					}
					dest.delete(&dest.path()).await.map_err(SyncError::from)
				}
			})
			.collect();
		run_pool(tasks, POOL_WORKERS).await
	}

	async fn finish_success(&self, job: &SyncJob, started: Instant) -> Result<()> {
		let namespace = &job.sync.metadata.namespace;
		let name = &job.sync.metadata.name;
		self.observe_job(namespace, name, started, true);
		if let Err(error) = self.status.set_status(&job.sync, SyncStatus::Synced).await {
			tracing::error!(%error, "failed to set sync status");
		}
		self.notify(&job.sync, shuttle_core::spec::NotifyEvent::Success, "sync success")
			.await;
		Ok(())
	}

	async fn finish_error(&self, job: &SyncJob, error: SyncError, started: Instant) -> Result<()> {
		let namespace = &job.sync.metadata.namespace;
		let name = &job.sync.metadata.name;
		tracing::error!(%namespace, %name, %error, "sync operation failed");
		self.observe_job(namespace, name, started, false);
		if let Err(sink_error) = self.status.set_status(&job.sync, SyncStatus::Failed).await {
			tracing::error!(error = %sink_error, "failed to set sync status");
		}
		self.notify(
			&job.sync,
			shuttle_core::spec::NotifyEvent::Failure,
			&format!("error syncing: {error}"),
		)
		.await;
		Err(error)
	}

	fn observe_job(&self, namespace: &str, name: &str, started: Instant, success: bool) {
		let labels = &[namespace, name];
		self.metrics
			.sync_duration
			.with_label_values(labels)
			.observe(started.elapsed().as_secs_f64());
		self.metrics.active_syncs.with_label_values(labels).dec();
		self.metrics
			.sync_status
			.with_label_values(labels)
			.set(if success { 1.0 } else { 0.0 });
		if !success {
			self.metrics.sync_errors.with_label_values(labels).inc();
		}
	}

	async fn notify(&self, sync: &SecretSync, event: shuttle_core::spec::NotifyEvent, message: &str) {
		let notification = NotificationMessage {
			event,
			message: message.to_string(),
			sync: sync.clone(),
		};
		if let Err(error) = self.notifier.trigger(&notification).await {
			tracing::error!(%error, "failed to deliver notifications");
		}
	}
}
