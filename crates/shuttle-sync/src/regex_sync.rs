// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Regex source paths: matching, enumeration, and destination rewriting.
//!
//! Event-driven syncs test the compiled pattern against the raw event path
//! and its stripped KV form. Manual syncs have no event path to test, so
//! the store is enumerated below the pattern's literal prefix and each leaf
//! is matched against the `^...$`-anchored pattern.

use regex::Regex;

use shuttle_core::paths::{is_regex, rewrite_destination, stripped_path};
use shuttle_store::{enumerate_below, Store};

use crate::error::{Result, SyncError};
use crate::executor::{run_pool, SyncClients, SyncExecutor, POOL_WORKERS};
use crate::jobs::SyncJob;

struct RewriteTask {
	dest_index: usize,
	source_path: String,
	rewrite_path: String,
}

impl SyncExecutor {
	pub(crate) async fn sync_create(&self, clients: &SyncClients, job: &SyncJob) -> Result<()> {
		let source_path = clients.source.path();
		if job.event.manual && is_regex(&source_path) {
			tracing::debug!("manual regex sync");
			self.manual_regex_sync(clients, job).await
		} else if is_regex(&source_path) {
			tracing::debug!("regex sync");
			self.regex_sync(clients, job).await
		} else {
			tracing::debug!("single sync");
			self.single_sync(clients, job).await
		}
	}

	pub(crate) async fn sync_delete(&self, clients: &SyncClients, job: &SyncJob) -> Result<()> {
		let source_path = clients.source.path();
		if job.event.manual && is_regex(&source_path) {
			tracing::debug!("manual regex delete");
			self.manual_regex_delete(clients, job).await
		} else if is_regex(&source_path) {
			tracing::debug!("regex delete");
			self.regex_delete(clients, job).await
		} else {
			tracing::debug!("single delete");
			self.single_delete(clients, job).await
		}
	}

	/// Tasks for an event-driven match.
	///
	/// The pattern is tested against the stripped KV form first and the raw
	/// event path second; captures for the destination rewrite come from
	/// whichever form matched, while the source read always uses the
	/// logical (stripped) path.
	fn event_rewrite_tasks(
		&self,
		clients: &SyncClients,
		job: &SyncJob,
	) -> Result<Option<Vec<RewriteTask>>> {
		let pattern = clients.source.path();
		let rx = Regex::new(&pattern)?;
		let raw = job.event.path.clone();
		let stripped = stripped_path(&raw);
		let matched = if rx.is_match(&stripped) {
			stripped.clone()
		} else if rx.is_match(&raw) {
			raw
		} else {
			tracing::debug!(%pattern, path = %job.event.path, "no regex match");
			return Ok(None);
		};
		let tasks = clients
			.dest
			.iter()
			.enumerate()
			.map(|(dest_index, dest)| RewriteTask {
				dest_index,
				source_path: stripped.clone(),
				rewrite_path: rewrite_destination(&pattern, &rx, &matched, &dest.path()),
			})
			.collect();
		Ok(Some(tasks))
	}

	/// Tasks for a manual sync: every enumerated leaf that the anchored
	/// pattern accepts, against every destination.
	async fn manual_rewrite_tasks(
		&self,
		clients: &SyncClients,
		_job: &SyncJob,
	) -> Result<Vec<RewriteTask>> {
		let pattern = clients.source.path();
		if pattern.is_empty() {
			return Err(SyncError::ClientSetup("source path is empty".into()));
		}
		let list = enumerate_below(clients.source.as_ref(), &pattern).await?;
		tracing::debug!(candidates = list.len(), "enumerated source paths");
		let strict = Regex::new(&format!("^{pattern}$"))?;
		let mut tasks = Vec::new();
		for (dest_index, dest) in clients.dest.iter().enumerate() {
			for path in &list {
				if !strict.is_match(path) {
					tracing::debug!(%path, "skipping non-matching path");
					continue;
				}
				tasks.push(RewriteTask {
					dest_index,
					source_path: path.clone(),
					rewrite_path: rewrite_destination(&pattern, &strict, path, &dest.path()),
				});
			}
		}
		Ok(tasks)
	}

	async fn run_create_tasks(
		&self,
		clients: &SyncClients,
		job: &SyncJob,
		tasks: Vec<RewriteTask>,
	) -> Result<()> {
		let futures: Vec<_> = tasks
			.into_iter()
			.map(|task| {
				self.create_one(
					job,
					clients.source.as_ref(),
					clients.dest[task.dest_index].as_ref(),
					task.source_path,
					task.rewrite_path,
				)
			})
			.collect();
		run_pool(futures, POOL_WORKERS).await
	}

	async fn run_delete_tasks(
		&self,
		clients: &SyncClients,
		job: &SyncJob,
		tasks: Vec<RewriteTask>,
	) -> Result<()> {
		let futures: Vec<_> = tasks
			.into_iter()
			.map(|task| async move {
				let dest = clients.dest[task.dest_index].as_ref();
				if shuttle_core::filters::should_filter(&job.sync.spec, &task.source_path) {
					return Ok(());
				}
				if self
					.dry_run_gate(job, dest, &task.source_path, &task.rewrite_path)
					.await
				{
					return Ok(());
				}
				match dest.delete(&task.rewrite_path).await {
					Ok(()) => Ok(()),
					Err(error) => {
						tracing::error!(
							path = %task.rewrite_path,
							%error,
							"delete job failed"
						);
						Err(SyncError::from(error))
					}
				}
			})
			.collect();
		run_pool(futures, POOL_WORKERS).await
	}

	async fn regex_sync(&self, clients: &SyncClients, job: &SyncJob) -> Result<()> {
		let Some(tasks) = self.event_rewrite_tasks(clients, job)? else {
			return Ok(());
		};
		self.run_create_tasks(clients, job, tasks).await
	}

	async fn manual_regex_sync(&self, clients: &SyncClients, job: &SyncJob) -> Result<()> {
		let tasks = self.manual_rewrite_tasks(clients, job).await?;
		self.run_create_tasks(clients, job, tasks).await
	}

	async fn regex_delete(&self, clients: &SyncClients, job: &SyncJob) -> Result<()> {
		let Some(tasks) = self.event_rewrite_tasks(clients, job)? else {
			return Ok(());
		};
		self.run_delete_tasks(clients, job, tasks).await
	}

	async fn manual_regex_delete(&self, clients: &SyncClients, job: &SyncJob) -> Result<()> {
		let tasks = self.manual_rewrite_tasks(clients, job).await?;
		self.run_delete_tasks(clients, job, tasks).await
	}
}
