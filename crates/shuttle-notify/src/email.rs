// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Email delivery over SMTP.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;

use shuttle_core::spec::EmailTarget;

use crate::error::{NotifyError, Result};
use crate::template::{message_payload, render};
use crate::{event_matches, NotificationMessage};

const DEFAULT_SUBJECT: &str = "Shuttle Sync Notification";
const DEFAULT_FROM: &str = "no-reply@shuttle.local";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailDefaults {
	pub host: Option<String>,
	pub port: Option<u16>,
	pub username: Option<String>,
	pub password: Option<String>,
	pub from: Option<String>,
	pub to: Option<String>,
	pub subject: Option<String>,
	pub body: Option<String>,
	pub insecure_skip_verify: bool,
}

fn merged(target: &EmailTarget, defaults: Option<&EmailDefaults>) -> EmailTarget {
	let mut target = target.clone();
	let Some(defaults) = defaults else {
		return target;
	};
	if target.host.is_none() {
		target.host = defaults.host.clone();
	}
	if target.port.is_none() {
		target.port = defaults.port;
	}
	if target.username.is_none() {
		target.username = defaults.username.clone();
	}
	if target.password.is_none() {
		target.password = defaults.password.clone();
	}
	if target.from.is_none() {
		target.from = defaults.from.clone();
	}
	if target.to.is_empty() {
		if let Some(to) = &defaults.to {
			target.to = to.clone();
		}
	}
	if target.subject.is_none() {
		target.subject = defaults.subject.clone();
	}
	if target.body.is_none() {
		target.body = defaults.body.clone();
	}
	if defaults.insecure_skip_verify {
		target.insecure_skip_verify = true;
	}
	target
}

/// Builds the message for one target; split out so the assembly is
/// testable without a server.
fn build_email(target: &EmailTarget, message: &NotificationMessage) -> Result<Message> {
	if target.to.is_empty() {
		return Err(NotifyError::Config(
			"email notification is missing required 'to' field".into(),
		));
	}
	let from = target.from.as_deref().unwrap_or(DEFAULT_FROM);
	let subject_template = target.subject.as_deref().unwrap_or(DEFAULT_SUBJECT);
	let subject = render(subject_template, message)?;
	let body = message_payload(message, target.body.as_deref());
	Message::builder()
		.from(from
			.parse()
			.map_err(|_| NotifyError::Config(format!("invalid from address: {from}")))?)
		.to(target
			.to
			.parse()
			.map_err(|_| NotifyError::Config(format!("invalid to address: {}", target.to)))?)
		.subject(subject)
		.header(ContentType::TEXT_HTML)
		.body(body)
		.map_err(|e| NotifyError::Smtp(e.to_string()))
}

async fn send_email(target: EmailTarget, message: &NotificationMessage) -> Result<()> {
	let email = build_email(&target, message)?;
	let host = target
		.host
		.clone()
		.ok_or_else(|| NotifyError::Config("smtp host is required".into()))?;
	let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
		.map_err(|e| NotifyError::Smtp(e.to_string()))?;
	if let Some(port) = target.port {
		builder = builder.port(port);
	}
	if let (Some(username), Some(password)) = (&target.username, &target.password) {
		builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
	}
	if target.insecure_skip_verify {
		let params = TlsParameters::builder(host)
			.dangerous_accept_invalid_certs(true)
			.build()
			.map_err(|e| NotifyError::Smtp(e.to_string()))?;
		builder = builder.tls(Tls::Required(params));
	}
	let transport = builder.build();
	transport
		.send(email)
		.await
		.map_err(|e| NotifyError::Smtp(e.to_string()))?;
	Ok(())
}

pub(crate) async fn handle_email(
	defaults: Option<&EmailDefaults>,
	message: &NotificationMessage,
) -> Result<()> {
	let mut errors = Vec::new();
	for target in message
		.sync
		.spec
		.notifications
		.iter()
		.filter_map(|n| n.email.as_ref())
		.filter(|email| event_matches(&email.events, message.event))
	{
		if let Err(error) = send_email(merged(target, defaults), message).await {
			errors.push(error.to_string());
		}
	}
	if errors.is_empty() {
		Ok(())
	} else {
		Err(NotifyError::Aggregate(errors.join("; ")))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use shuttle_core::spec::NotifyEvent;
	use shuttle_core::SecretSync;

	fn message() -> NotificationMessage {
		NotificationMessage {
			event: NotifyEvent::Success,
			message: "sync success".into(),
			sync: SecretSync::default(),
		}
	}

	#[test]
	fn build_requires_recipient() {
		let target = EmailTarget::default();
		assert!(matches!(
			build_email(&target, &message()),
			Err(NotifyError::Config(_))
		));
	}

	#[test]
	fn build_uses_default_sender_and_subject() {
		let target = EmailTarget {
			to: "ops@example.com".into(),
			..Default::default()
		};
		let email = build_email(&target, &message()).unwrap();
		let headers = format!("{:?}", email.headers());
		assert!(headers.contains("no-reply@shuttle"));
		assert!(headers.contains(DEFAULT_SUBJECT));
	}

	#[test]
	fn subject_templates_render() {
		let target = EmailTarget {
			to: "ops@example.com".into(),
			subject: Some("sync {{ sync.metadata.name }}: {{ event }}".into()),
			..Default::default()
		};
		let mut msg = message();
		msg.sync.metadata.name = "db-creds".into();
		let email = build_email(&target, &msg).unwrap();
		let headers = format!("{:?}", email.headers());
		assert!(headers.contains("sync db-creds: success"));
	}

	#[test]
	fn merged_prefers_target_values() {
		let defaults = EmailDefaults {
			host: Some("smtp.example.com".into()),
			from: Some("default@example.com".into()),
			..Default::default()
		};
		let target = EmailTarget {
			to: "ops@example.com".into(),
			from: Some("mine@example.com".into()),
			..Default::default()
		};
		let out = merged(&target, Some(&defaults));
		assert_eq!(out.host.as_deref(), Some("smtp.example.com"));
		assert_eq!(out.from.as_deref(), Some("mine@example.com"));
	}
}
