// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Outbound throttling and retry policy for rate-limited APIs.
//!
//! The limiter spaces requests at a fixed minimum interval process-wide.
//! The retry policy prefers whatever the server tells us: `Retry-After` on a
//! secondary limit, the reset timestamp on an exhausted primary limit, and
//! exponential backoff when the response carries no guidance. Retries are
//! unbounded; the surrounding job's cancellation is the deadline.

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use reqwest::header::HeaderMap;
use reqwest::StatusCode;

const SECONDARY_LIMIT_DELAY: Duration = Duration::from_secs(120);
const RESET_BUFFER: Duration = Duration::from_secs(2);
const BASE_DELAY: Duration = Duration::from_secs(10);
const MAX_DELAY: Duration = Duration::from_secs(15 * 60);

/// Minimum-interval limiter shared by every client of one API family.
#[derive(Debug)]
pub struct RateLimiter {
	interval: Duration,
	next: Mutex<Instant>,
}

impl RateLimiter {
	pub fn new(interval: Duration) -> Self {
		Self {
			interval,
			next: Mutex::new(Instant::now()),
		}
	}

	/// Waits until this caller's slot. Slots are handed out under the lock
	/// so concurrent callers are serialized at the configured rate.
	pub async fn acquire(&self) {
		let wait = {
			let mut next = self.next.lock().expect("rate limiter mutex poisoned");
			let now = Instant::now();
			let at = (*next).max(now);
			*next = at + self.interval;
			at.saturating_duration_since(now)
		};
		if !wait.is_zero() {
			tokio::time::sleep(wait).await;
		}
	}
}

/// Retry on 429, 403 (abuse detection), and server errors.
pub fn should_retry(status: StatusCode) -> bool {
	status == StatusCode::TOO_MANY_REQUESTS
		|| status == StatusCode::FORBIDDEN
		|| status.is_server_error()
}

/// Delay before the next attempt, derived from the response.
pub fn retry_delay(status: StatusCode, headers: &HeaderMap, retry_count: u32) -> Duration {
	if status == StatusCode::FORBIDDEN {
		if let Some(seconds) = header_u64(headers, "Retry-After") {
			return Duration::from_secs(seconds);
		}
		return SECONDARY_LIMIT_DELAY;
	}
	if header_str(headers, "X-RateLimit-Remaining") == Some("0") {
		if let Some(reset) = header_u64(headers, "X-RateLimit-Reset") {
			let now = SystemTime::now()
				.duration_since(UNIX_EPOCH)
				.unwrap_or_default()
				.as_secs();
			if reset > now {
				return Duration::from_secs(reset - now) + RESET_BUFFER;
			}
		}
	}
	exponential_delay(retry_count)
}

fn exponential_delay(retry_count: u32) -> Duration {
	let factor = 2u32.saturating_pow(retry_count.min(10));
	(BASE_DELAY * factor).min(MAX_DELAY)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
	header_str(headers, name).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
	use super::*;
	use reqwest::header::HeaderValue;

	fn headers(pairs: &[(&'static str, String)]) -> HeaderMap {
		let mut map = HeaderMap::new();
		for (name, value) in pairs {
			map.insert(*name, HeaderValue::from_str(value).unwrap());
		}
		map
	}

	#[test]
	fn retries_on_rate_limit_and_server_errors() {
		assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
		assert!(should_retry(StatusCode::FORBIDDEN));
		assert!(should_retry(StatusCode::BAD_GATEWAY));
		assert!(!should_retry(StatusCode::NOT_FOUND));
		assert!(!should_retry(StatusCode::OK));
	}

	#[test]
	fn forbidden_honours_retry_after() {
		let delay = retry_delay(
			StatusCode::FORBIDDEN,
			&headers(&[("Retry-After", "33".into())]),
			0,
		);
		assert_eq!(delay, Duration::from_secs(33));
	}

	#[test]
	fn forbidden_without_guidance_waits_at_least_two_minutes() {
		let delay = retry_delay(StatusCode::FORBIDDEN, &HeaderMap::new(), 0);
		assert!(delay >= Duration::from_secs(120));
	}

	#[test]
	fn exhausted_primary_limit_waits_for_reset() {
		let reset = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.unwrap()
			.as_secs() + 30;
		let delay = retry_delay(
			StatusCode::TOO_MANY_REQUESTS,
			&headers(&[
				("X-RateLimit-Remaining", "0".into()),
				("X-RateLimit-Reset", reset.to_string()),
			]),
			0,
		);
		assert!(delay > Duration::from_secs(25));
		assert!(delay <= Duration::from_secs(35));
	}

	#[test]
	fn fallback_backoff_grows_and_caps() {
		assert_eq!(
			retry_delay(StatusCode::INTERNAL_SERVER_ERROR, &HeaderMap::new(), 0),
			Duration::from_secs(10)
		);
		assert_eq!(
			retry_delay(StatusCode::INTERNAL_SERVER_ERROR, &HeaderMap::new(), 2),
			Duration::from_secs(40)
		);
		assert_eq!(
			retry_delay(StatusCode::INTERNAL_SERVER_ERROR, &HeaderMap::new(), 20),
			MAX_DELAY
		);
	}

	#[tokio::test]
	async fn limiter_spaces_out_acquisitions() {
		let limiter = RateLimiter::new(Duration::from_millis(20));
		let start = Instant::now();
		limiter.acquire().await;
		limiter.acquire().await;
		limiter.acquire().await;
		assert!(start.elapsed() >= Duration::from_millis(40));
	}
}
