// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rendering of notification bodies and subjects.

use minijinja::Environment;

use crate::error::Result;
use crate::NotificationMessage;

/// Renders a template string against the notification message.
pub fn render(template: &str, message: &NotificationMessage) -> Result<String> {
	let mut env = Environment::new();
	env.add_template("notification", template)?;
	let context = minijinja::value::Value::from_serialize(message);
	Ok(env.get_template("notification")?.render(context)?)
}

/// The payload for one delivery: a rendered custom body when configured,
/// otherwise the message serialized as JSON. A body that fails to render is
/// delivered with the error appended so the operator sees what went wrong
/// without digging through logs.
pub fn message_payload(message: &NotificationMessage, body: Option<&str>) -> String {
	match body.map(str::trim) {
		Some(body) if !body.is_empty() => match render(body, message) {
			Ok(rendered) => rendered,
			Err(error) => {
				tracing::warn!(%error, "failed to render custom notification body");
				format!("{body}\n\nError rendering custom body: {error}")
			}
		},
		_ => serde_json::to_string(message).unwrap_or_default(),
	}
}
