// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Path classification, matching, and capture-group rewriting.
//!
//! Source paths on a `SecretSync` may be literal or regular expressions. A
//! string is treated as a regex only when it contains at least one regex
//! metacharacter AND compiles; everything else is compared literally. KV-v2
//! style paths additionally match with a `data` or `metadata` segment
//! inserted after the mount, since that is how the source store reports them
//! in audit records.

use once_cell::sync::Lazy;
use regex::Regex;

const REGEX_CHARS: &str = "[](){}+*?|";

static CAPTURE_GROUP: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"\([^?][^)]*\)").expect("capture group pattern"));

/// True when `path` should be treated as a regular expression.
pub fn is_regex(path: &str) -> bool {
	path.contains(|c| REGEX_CHARS.contains(c)) && Regex::new(path).is_ok()
}

/// True when the pattern contains at least one unnamed capturing group.
/// `(?...)` assertions and flags do not count.
pub fn has_capture_groups(pattern: &str) -> bool {
	CAPTURE_GROUP.is_match(pattern)
}

/// Longest leading run of literal `/`-separated components; the root under
/// which enumeration of a regex path begins.
pub fn highest_non_regex_prefix(path: &str) -> String {
	let mut prefix = String::new();
	for part in path.split('/') {
		if is_regex(part) {
			break;
		}
		if prefix.is_empty() {
			prefix.push_str(part);
		} else {
			prefix = join(&prefix, part);
		}
	}
	prefix
}

/// Removes a `data` or `metadata` segment at position 1, turning the audit
/// record form of a KV-v2 path back into its logical form.
pub fn stripped_path(path: &str) -> String {
	let parts: Vec<&str> = path.split('/').collect();
	if parts.len() < 2 {
		return path.to_string();
	}
	if parts[1] == "data" || parts[1] == "metadata" {
		let mut out = parts[0].to_string();
		for part in &parts[2..] {
			out = join(&out, part);
		}
		return out;
	}
	path.to_string()
}

/// Expands a logical path into its `data` and `metadata` forms.
pub fn data_metadata_paths(path: &str) -> (String, String) {
	(insert_segment(path, "data"), insert_segment(path, "metadata"))
}

fn insert_segment(path: &str, segment: &str) -> String {
	let parts: Vec<&str> = path.split('/').collect();
	if parts.len() < 2 {
		return path.to_string();
	}
	let mut out: Vec<&str> = Vec::with_capacity(parts.len() + 1);
	out.push(parts[0]);
	out.push(segment);
	out.extend(&parts[1..]);
	out.join("/")
}

/// Exact match, or `^...$`-anchored regex match when the config path is a
/// regex.
pub fn is_path_match(config_path: &str, event_path: &str) -> bool {
	if config_path == event_path {
		return true;
	}
	if !is_regex(config_path) {
		return false;
	}
	match Regex::new(&format!("^{config_path}$")) {
		Ok(rx) => rx.is_match(event_path),
		Err(error) => {
			tracing::error!(%config_path, %event_path, %error, "failed to compile path regex");
			false
		}
	}
}

/// Computes the destination path for one matched source path.
///
/// With unnamed capture groups in the source pattern, `$1`..`$9` in the
/// destination expression are substituted with the corresponding captures.
/// Without capture groups, the tail of the matched path past the literal
/// prefix is appended to the destination base.
pub fn rewrite_destination(
	source_pattern: &str,
	rx: &Regex,
	matched_path: &str,
	dest_expr: &str,
) -> String {
	if has_capture_groups(source_pattern) {
		if let Some(captures) = rx.captures(matched_path) {
			let mut rewritten = dest_expr.to_string();
			for i in 1..captures.len() {
				let capture = captures.get(i).map(|m| m.as_str()).unwrap_or_default();
				rewritten = rewritten.replace(&format!("${i}"), capture);
			}
			return rewritten;
		}
	}
	let prefix = highest_non_regex_prefix(source_pattern);
	let tail = matched_path.strip_prefix(prefix.as_str()).unwrap_or(matched_path);
	join(dest_expr, tail)
}

/// Joins two path fragments with a single `/`, tolerating stray slashes on
/// either side.
pub fn join(base: &str, tail: &str) -> String {
	let base = base.trim_end_matches('/');
	let tail = tail.trim_start_matches('/');
	match (base.is_empty(), tail.is_empty()) {
		(true, _) => tail.to_string(),
		(_, true) => base.to_string(),
		_ => format!("{base}/{tail}"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn regex_detection() {
		assert!(is_regex("secret/data/.*"));
		assert!(is_regex("secret/(data|other)/test"));
		assert!(is_regex("secret/[a-z]+/test"));
		assert!(!is_regex("secret/data/test"));
		// Contains metacharacters but does not compile.
		assert!(!is_regex("secret/(unclosed"));
	}

	#[test]
	fn regex_implies_metachar_and_compiles() {
		for p in ["secret/data/foo", "a/b/c", "plain"] {
			assert!(!is_regex(p), "{p} misclassified");
		}
		for p in ["secret/.*", "x/(a|b)", "n/\\d+/x{1,3}"] {
			assert!(is_regex(p), "{p} misclassified");
			assert!(p.contains(|c| "[](){}+*?|".contains(c)));
			assert!(Regex::new(p).is_ok());
		}
	}

	#[test]
	fn path_match_table() {
		let cases = [
			("secret/data/test", "secret/data/test", true),
			("secret/data/test", "secret/data/other", false),
			("secret/data/.*", "secret/data/test", true),
			("secret/.*/test", "secret/other/test", true),
			("secret/.*/test", "secret/other/notest", false),
			("secret/.*", "secret/test", true),
			("secret/.*", "secret/test/test", true),
			("secret/.*", "secret", false),
			("secret/.*test.*", "secret/a/b/test/c", true),
			("secret/.*test.*", "secret/a/b/c", false),
			("^secret/.*", "secret/test", true),
			("^secret/.*", "notsecret/test", false),
			("secret/[a-z]+/test", "secret/abc/test", true),
			("secret/[a-z]+/test", "secret/ABC/test", false),
			("secret/[a-z]+/test", "secret/abc123/test", false),
			("secret/\\d+/test", "secret/123/test", true),
			("secret/\\d+/test", "secret/abc/test", false),
			("secret/(data|other)/test", "secret/data/test", true),
			("secret/(data|other)/test", "secret/else/test", false),
			("secret/foo/[a-z]+", "secret/foo/bar", true),
			("secret/foo/[a-z]+", "secret/foo/bar/baz", false),
			("secret/foo/[a-z]+/baz", "secret/foo/bar/baz", true),
			("secret/foo/.*", "secret/foo/bar/baz/qux", true),
		];
		for (config, event, expected) in cases {
			assert_eq!(
				is_path_match(config, event),
				expected,
				"config={config} event={event}"
			);
		}
	}

	#[test]
	fn highest_prefix_table() {
		let cases = [
			("secret/data/test/.*", "secret/data/test"),
			("secret/data/.*", "secret/data"),
			("secret/.*/test", "secret"),
			("secret/data/test", "secret/data/test"),
			("secret/.*", "secret"),
			("secret/.*/.*/test", "secret"),
			("secret/[a-z]+/test", "secret"),
			("secret/\\d+/test", "secret"),
			("secret/(data|other)/test", "secret"),
		];
		for (path, expected) in cases {
			assert_eq!(highest_non_regex_prefix(path), expected, "path={path}");
		}
	}

	#[test]
	fn stripped_path_removes_data_and_metadata() {
		assert_eq!(stripped_path("secret/data/foo/bar"), "secret/foo/bar");
		assert_eq!(stripped_path("secret/metadata/foo"), "secret/foo");
		assert_eq!(stripped_path("secret/other/foo"), "secret/other/foo");
		assert_eq!(stripped_path("secret"), "secret");
	}

	#[test]
	fn data_metadata_expansion() {
		let (dp, mp) = data_metadata_paths("secret/foo/bar");
		assert_eq!(dp, "secret/data/foo/bar");
		assert_eq!(mp, "secret/metadata/foo/bar");
		let (dp, mp) = data_metadata_paths("secret");
		assert_eq!(dp, "secret");
		assert_eq!(mp, "secret");
	}

	#[test]
	fn capture_group_detection_ignores_assertions() {
		assert!(has_capture_groups("secret/(data|other)/(.*)"));
		assert!(!has_capture_groups("secret/data/test"));
		assert!(!has_capture_groups("(?i)secret/data"));
	}

	#[test]
	fn rewrite_with_captures() {
		let cases = [
			("secret/data/(.*)", "secret/data/test", "dest/$1", "dest/test"),
			(
				"secret/(data|other)/(.*)",
				"secret/data/test",
				"dest/$1/$2",
				"dest/data/test",
			),
			("secret/(.*)/test", "secret/data/test", "dest/$1", "dest/data"),
			(
				"secret/(data|other)/test/(.*)",
				"secret/data/test/abc",
				"dest/$1/$2",
				"dest/data/abc",
			),
			(
				"secret/(data|other)/(test|example)/(.*)",
				"secret/other/test/abc/def",
				"dest/$1/$2/$3",
				"dest/other/test/abc/def",
			),
			(
				"secret/(.*)",
				"secret/other/test/abc/def",
				"dest/$1",
				"dest/other/test/abc/def",
			),
			(
				"secret/foo/bar/(.*)/baz",
				"secret/foo/bar/other/baz",
				"dest/$1",
				"dest/other",
			),
		];
		for (pattern, matched, dest, expected) in cases {
			let rx = Regex::new(pattern).unwrap();
			assert_eq!(
				rewrite_destination(pattern, &rx, matched, dest),
				expected,
				"pattern={pattern} matched={matched}"
			);
		}
	}

	#[test]
	fn rewrite_without_captures_appends_tail() {
		let pattern = "secret/foo/bar/.*";
		let rx = Regex::new(pattern).unwrap();
		assert_eq!(
			rewrite_destination(pattern, &rx, "secret/foo/bar/x/y/z", "dest/hello/world"),
			"dest/hello/world/x/y/z"
		);
	}

	#[test]
	fn rewrite_with_capture_placeholder_appends_substitution() {
		// Capture-group rewrite on a deep tail keeps the whole capture.
		let pattern = "secret/foo/bar/(.*)";
		let rx = Regex::new(pattern).unwrap();
		assert_eq!(
			rewrite_destination(pattern, &rx, "secret/foo/bar/x/y/z", "dest/hello/world/$1"),
			"dest/hello/world/x/y/z"
		);
	}

	#[test]
	fn join_handles_stray_slashes() {
		assert_eq!(join("a/b/", "/c"), "a/b/c");
		assert_eq!(join("", "c"), "c");
		assert_eq!(join("a", ""), "a");
	}
}
