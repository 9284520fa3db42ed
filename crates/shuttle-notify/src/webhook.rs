// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Webhook delivery.

use std::collections::BTreeMap;

use futures::future::join_all;
use serde::Deserialize;

use shuttle_core::spec::WebhookTarget;

use crate::error::{NotifyError, Result};
use crate::template::message_payload;
use crate::{event_matches, NotificationMessage};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookDefaults {
	pub url: Option<String>,
	pub method: Option<String>,
	pub headers: BTreeMap<String, String>,
	pub body: Option<String>,
}

/// Applies process-wide defaults to fields the target left unset.
fn merged(target: &WebhookTarget, defaults: Option<&WebhookDefaults>) -> WebhookTarget {
	let mut target = target.clone();
	let Some(defaults) = defaults else {
		return target;
	};
	if target.url.is_empty() {
		if let Some(url) = &defaults.url {
			target.url = url.clone();
		}
	}
	if target.method.is_none() {
		target.method = defaults.method.clone();
	}
	if target.headers.is_empty() {
		target.headers = defaults.headers.clone();
	}
	if target.body.is_none() {
		target.body = defaults.body.clone();
	}
	target
}

async fn trigger_webhook(
	client: &reqwest::Client,
	target: WebhookTarget,
	message: &NotificationMessage,
) -> Result<()> {
	if target.url.is_empty() {
		return Err(NotifyError::Config("webhook url is required".into()));
	}
	let method = target
		.method
		.as_deref()
		.unwrap_or("POST")
		.parse::<reqwest::Method>()
		.map_err(|_| NotifyError::Config("invalid webhook method".into()))?;
	let payload = if target.exclude_body {
		String::new()
	} else {
		message_payload(message, target.body.as_deref())
	};
	let mut request = client.request(method, &target.url).body(payload);
	for (name, value) in &target.headers {
		request = request.header(name, value);
	}
	let response = request.send().await?;
	let status = response.status();
	if !status.is_success() {
		return Err(NotifyError::WebhookStatus(status.as_u16()));
	}
	Ok(())
}

pub(crate) async fn handle_webhooks(
	client: &reqwest::Client,
	defaults: Option<&WebhookDefaults>,
	message: &NotificationMessage,
) -> Result<()> {
	let targets: Vec<WebhookTarget> = message
		.sync
		.spec
		.notifications
		.iter()
		.filter_map(|n| n.webhook.as_ref())
		.filter(|webhook| event_matches(&webhook.events, message.event))
		.map(|webhook| merged(webhook, defaults))
		.collect();
	if targets.is_empty() {
		return Ok(());
	}
	let results = join_all(
		targets
			.into_iter()
			.map(|target| trigger_webhook(client, target, message)),
	)
	.await;
	let errors: Vec<String> = results
		.into_iter()
		.filter_map(|r| r.err().map(|e| e.to_string()))
		.collect();
	if errors.is_empty() {
		Ok(())
	} else {
		Err(NotifyError::Aggregate(errors.join("; ")))
	}
}
