// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ingress authentication: pre-shared token or verified client TLS,
//! selected by configuration. Fail-closed: security left unconfigured
//! denies every request.

use crate::config::SecuritySettings;

/// Header carrying the pre-shared ingress token.
pub const TOKEN_HEADER: &str = "X-Shuttle-Token";

/// Decides whether one ingress request may proceed.
///
/// `peer_verified` reports whether the transport verified a client
/// certificate; when TLS terminates in front of this process it is false
/// and token auth is the only available mode.
pub fn request_authorized(
	security: &SecuritySettings,
	token: Option<&str>,
	peer_verified: bool,
) -> bool {
	match security.enabled {
		None => {
			tracing::warn!(
				"security not configured, denying all requests; set events.security.enabled = false to disable"
			);
			false
		}
		Some(false) => true,
		Some(true) => {
			let expected_token = security.token.as_deref().filter(|t| !t.is_empty());
			let client_auth = security
				.tls
				.as_ref()
				.and_then(|tls| tls.client_auth.as_deref());
			if expected_token.is_none() && client_auth.is_none() {
				tracing::warn!("security enabled but no token or client cert configured");
				return false;
			}
			if matches!(client_auth, Some("require") | Some("verify")) {
				return peer_verified;
			}
			match expected_token {
				Some(expected) => token == Some(expected),
				None => false,
			}
		}
	}
}
