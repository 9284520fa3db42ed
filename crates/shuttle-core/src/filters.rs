// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-sync path filtering, consulted before a source path is read.
//!
//! Regex filters match the candidate string directly; path filters compare
//! literally against the configured path and its `data`/`metadata`
//! expansions. Exclusions win over inclusions, and a non-empty include list
//! drops everything it does not name.

use regex::Regex;

use crate::paths::data_metadata_paths;
use crate::spec::{FilterList, SecretSyncSpec};

/// True when `value` must be skipped for this sync.
pub fn should_filter(spec: &SecretSyncSpec, value: &str) -> bool {
	let Some(filters) = &spec.filters else {
		return false;
	};
	if let Some(regex) = &filters.regex {
		if filter_by_regex(regex, value) {
			return true;
		}
	}
	if let Some(path) = &filters.path {
		if filter_by_path(path, value) {
			return true;
		}
	}
	false
}

fn filter_by_regex(list: &FilterList, value: &str) -> bool {
	for pattern in &list.exclude {
		match Regex::new(pattern) {
			Ok(rx) if rx.is_match(value) => return true,
			Ok(_) => {}
			Err(error) => {
				tracing::error!(%pattern, %error, "invalid exclude filter regex");
			}
		}
	}
	if !list.include.is_empty() {
		for pattern in &list.include {
			match Regex::new(pattern) {
				Ok(rx) if rx.is_match(value) => return false,
				Ok(_) => {}
				Err(error) => {
					tracing::error!(%pattern, %error, "invalid include filter regex");
				}
			}
		}
		return true;
	}
	false
}

fn filter_by_path(list: &FilterList, value: &str) -> bool {
	for path in &list.exclude {
		if literal_path_matches(path, value) {
			return true;
		}
	}
	if !list.include.is_empty() {
		for path in &list.include {
			if literal_path_matches(path, value) {
				return false;
			}
		}
		return true;
	}
	false
}

fn literal_path_matches(config_path: &str, value: &str) -> bool {
	let (dp, mp) = data_metadata_paths(config_path);
	value == config_path || value == dp || value == mp
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::spec::Filters;

	fn spec_with(filters: Filters) -> SecretSyncSpec {
		SecretSyncSpec {
			filters: Some(filters),
			..Default::default()
		}
	}

	#[test]
	fn no_filters_keeps_everything() {
		let spec = SecretSyncSpec::default();
		assert!(!should_filter(&spec, "anything"));
	}

	#[test]
	fn regex_exclude_match_filters() {
		let spec = spec_with(Filters {
			regex: Some(FilterList {
				exclude: vec!["^exclude.*".into()],
				..Default::default()
			}),
			..Default::default()
		});
		assert!(should_filter(&spec, "excludeMe"));
		assert!(!should_filter(&spec, "keepMe"));
	}

	#[test]
	fn regex_include_miss_filters() {
		let spec = spec_with(Filters {
			regex: Some(FilterList {
				include: vec!["^include.*".into()],
				..Default::default()
			}),
			..Default::default()
		});
		assert!(!should_filter(&spec, "includeMe"));
		assert!(should_filter(&spec, "somethingElse"));
	}

	#[test]
	fn regex_exclude_beats_include() {
		let spec = spec_with(Filters {
			regex: Some(FilterList {
				include: vec![".*".into()],
				exclude: vec!["^secret/internal/.*".into()],
			}),
			..Default::default()
		});
		assert!(should_filter(&spec, "secret/internal/creds"));
		assert!(!should_filter(&spec, "secret/public/creds"));
	}

	#[test]
	fn path_filter_matches_data_and_metadata_forms() {
		let spec = spec_with(Filters {
			path: Some(FilterList {
				exclude: vec!["secret/foo".into()],
				..Default::default()
			}),
			..Default::default()
		});
		assert!(should_filter(&spec, "secret/foo"));
		assert!(should_filter(&spec, "secret/data/foo"));
		assert!(should_filter(&spec, "secret/metadata/foo"));
		assert!(!should_filter(&spec, "secret/bar"));
	}

	#[test]
	fn path_include_miss_filters() {
		let spec = spec_with(Filters {
			path: Some(FilterList {
				include: vec!["secret/foo".into()],
				..Default::default()
			}),
			..Default::default()
		});
		assert!(!should_filter(&spec, "secret/data/foo"));
		assert!(should_filter(&spec, "secret/data/other"));
	}
}
