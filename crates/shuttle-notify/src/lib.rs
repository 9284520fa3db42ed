// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Notification fan-out.
//!
//! The sync engine reports success or failure of a job through
//! [`Notifier::trigger`]; each configured target (webhook, email, slack)
//! fires only when its own events list names the message's event class.
//! Delivery failures are aggregated and logged but never fail the sync
//! that produced them - the caller decides what to do with the error.

pub mod email;
pub mod error;
pub mod slack;
pub mod template;
pub mod webhook;

use serde::{Deserialize, Serialize};

use shuttle_core::spec::NotifyEvent;
use shuttle_core::SecretSync;

pub use error::{NotifyError, Result};

/// One notification about one sync outcome.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationMessage {
	pub event: NotifyEvent,
	pub message: String,
	pub sync: SecretSync,
}

/// Process-wide fallback settings for each channel, merged under the
/// per-target configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotifyDefaults {
	pub webhook: Option<webhook::WebhookDefaults>,
	pub email: Option<email::EmailDefaults>,
	pub slack: Option<slack::SlackDefaults>,
}

/// True when a target subscribed to the message's event class.
/// Every channel consults its own events list, webhooks included.
pub(crate) fn event_matches(events: &[NotifyEvent], event: NotifyEvent) -> bool {
	events.contains(&event)
}

pub struct Notifier {
	defaults: NotifyDefaults,
	client: reqwest::Client,
}

impl Notifier {
	pub fn new(defaults: NotifyDefaults) -> Self {
		Self {
			defaults,
			client: reqwest::Client::new(),
		}
	}

	/// Fans the message out to every subscribed target concurrently.
	pub async fn trigger(&self, message: &NotificationMessage) -> Result<()> {
		if message.sync.spec.notifications.is_empty() {
			tracing::debug!("no notifications configured");
			return Ok(());
		}
		let (webhooks, slack, email) = tokio::join!(
			webhook::handle_webhooks(&self.client, self.defaults.webhook.as_ref(), message),
			slack::handle_slack(&self.client, self.defaults.slack.as_ref(), message),
			email::handle_email(self.defaults.email.as_ref(), message),
		);
		let mut errors = Vec::new();
		for (channel, result) in [
			("webhooks", webhooks),
			("slack", slack),
			("email", email),
		] {
			if let Err(error) = result {
				tracing::error!(channel, %error, "failed to handle notifications");
				errors.push(format!("{channel}: {error}"));
			}
		}
		if errors.is_empty() {
			Ok(())
		} else {
			Err(NotifyError::Aggregate(errors.join("; ")))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use shuttle_core::spec::{
		EmailTarget, NotificationTarget, SecretSyncSpec, SlackTarget, WebhookTarget,
	};

	fn message_with_targets(
		event: NotifyEvent,
		targets: Vec<NotificationTarget>,
	) -> NotificationMessage {
		NotificationMessage {
			event,
			message: "sync success".into(),
			sync: SecretSync {
				spec: SecretSyncSpec {
					notifications: targets,
					..Default::default()
				},
				..Default::default()
			},
		}
	}

	#[test]
	fn event_matching_is_exact() {
		assert!(event_matches(
			&[NotifyEvent::Success, NotifyEvent::Failure],
			NotifyEvent::Success
		));
		assert!(!event_matches(&[NotifyEvent::Failure], NotifyEvent::Success));
		assert!(!event_matches(&[], NotifyEvent::Success));
	}

	#[tokio::test]
	async fn no_targets_is_a_clean_no_op() {
		let notifier = Notifier::new(NotifyDefaults::default());
		let message = message_with_targets(NotifyEvent::Success, Vec::new());
		assert!(notifier.trigger(&message).await.is_ok());
	}

	#[tokio::test]
	async fn webhook_filters_on_its_own_events_list() {
		// A webhook subscribed only to failures must not fire on success,
		// regardless of what any sibling email target subscribes to.
		let notifier = Notifier::new(NotifyDefaults::default());
		let targets = vec![NotificationTarget {
			webhook: Some(WebhookTarget {
				events: vec![NotifyEvent::Failure],
				url: "http://127.0.0.1:1/unreachable".into(),
				..Default::default()
			}),
			email: Some(EmailTarget {
				events: vec![NotifyEvent::Success],
				..Default::default()
			}),
			..Default::default()
		}];
		// The webhook is skipped (event mismatch) and the email target is
		// invalid (no recipient), so the only error is the email one.
		let message = message_with_targets(NotifyEvent::Success, targets);
		let error = notifier.trigger(&message).await.unwrap_err();
		let text = error.to_string();
		assert!(text.contains("email"), "unexpected error: {text}");
		assert!(!text.contains("webhooks"), "webhook fired on wrong event: {text}");
	}

	#[tokio::test]
	async fn unsubscribed_targets_are_skipped_entirely() {
		let notifier = Notifier::new(NotifyDefaults::default());
		let targets = vec![NotificationTarget {
			webhook: Some(WebhookTarget {
				events: vec![NotifyEvent::Failure],
				url: "http://127.0.0.1:1/unreachable".into(),
				..Default::default()
			}),
			slack: Some(SlackTarget {
				events: vec![NotifyEvent::Failure],
				url: Some("http://127.0.0.1:1/unreachable".into()),
				..Default::default()
			}),
			..Default::default()
		}];
		let message = message_with_targets(NotifyEvent::Success, targets);
		assert!(notifier.trigger(&message).await.is_ok());
	}
}
