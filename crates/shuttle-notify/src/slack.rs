// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Slack delivery via incoming webhooks.

use serde::Deserialize;

use shuttle_core::spec::SlackTarget;

use crate::error::{NotifyError, Result};
use crate::template::message_payload;
use crate::{event_matches, NotificationMessage};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlackDefaults {
	pub url: Option<String>,
	pub message: Option<String>,
}

async fn trigger_slack(
	client: &reqwest::Client,
	target: &SlackTarget,
	defaults: Option<&SlackDefaults>,
	message: &NotificationMessage,
) -> Result<()> {
	let url = target
		.url
		.clone()
		.or_else(|| defaults.and_then(|d| d.url.clone()))
		.ok_or_else(|| NotifyError::Config("slack url is required".into()))?;
	let body = target
		.body
		.clone()
		.or_else(|| defaults.and_then(|d| d.message.clone()));
	let text = message_payload(message, body.as_deref());
	let response = client
		.post(&url)
		.json(&serde_json::json!({ "text": text }))
		.send()
		.await?;
	let status = response.status();
	if !status.is_success() {
		return Err(NotifyError::WebhookStatus(status.as_u16()));
	}
	Ok(())
}

pub(crate) async fn handle_slack(
	client: &reqwest::Client,
	defaults: Option<&SlackDefaults>,
	message: &NotificationMessage,
) -> Result<()> {
	let mut errors = Vec::new();
	for target in message
		.sync
		.spec
		.notifications
		.iter()
		.filter_map(|n| n.slack.as_ref())
		.filter(|slack| event_matches(&slack.events, message.event))
	{
		if let Err(error) = trigger_slack(client, target, defaults, message).await {
			errors.push(error.to_string());
		}
	}
	if errors.is_empty() {
		Ok(())
	} else {
		Err(NotifyError::Aggregate(errors.join("; ")))
	}
}
