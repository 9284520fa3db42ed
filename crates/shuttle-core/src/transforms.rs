// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Field-level reshaping of secret payloads, applied in a fixed order before
//! a write: exclude, include, rename, then optional template rendering.
//!
//! Include and exclude entries are literal field names or regular
//! expressions, using the same regex-detection rule as source paths. A
//! template renders against the reshaped mapping; when its output parses as
//! a JSON object it stays structured, otherwise it is carried as text for
//! stores that accept raw payloads.

use minijinja::Environment;
use regex::Regex;
use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::paths::is_regex;
use crate::spec::Transforms;
use crate::SecretData;

/// A transformed secret on its way to a destination store.
#[derive(Debug, Clone, PartialEq)]
pub enum SecretPayload {
	Structured(SecretData),
	Text(String),
}

impl SecretPayload {
	pub fn as_structured(&self) -> Option<&SecretData> {
		match self {
			SecretPayload::Structured(data) => Some(data),
			SecretPayload::Text(_) => None,
		}
	}

	/// The payload as a string: JSON for structured data, verbatim for text.
	pub fn to_body(&self) -> Result<String> {
		match self {
			SecretPayload::Structured(data) => Ok(serde_json::to_string(data)?),
			SecretPayload::Text(text) => Ok(text.clone()),
		}
	}
}

/// Runs the full transform pipeline for one sync.
pub fn execute(transforms: Option<&Transforms>, data: SecretData) -> Result<SecretPayload> {
	let Some(transforms) = transforms else {
		return Ok(SecretPayload::Structured(data));
	};
	let data = apply_exclude(&transforms.exclude, data);
	let data = apply_include(&transforms.include, data);
	let data = apply_rename(transforms, data);
	match transforms.template.as_deref().map(str::trim) {
		Some(template) if !template.is_empty() => render_template(template, &data),
		_ => Ok(SecretPayload::Structured(data)),
	}
}

fn entry_matches(entry: &str, key: &str) -> bool {
	if is_regex(entry) {
		match Regex::new(entry) {
			Ok(rx) => rx.is_match(key),
			Err(_) => false,
		}
	} else {
		entry == key
	}
}

fn apply_exclude(exclude: &[String], data: SecretData) -> SecretData {
	if exclude.is_empty() {
		return data;
	}
	data.into_iter()
		.filter(|(key, _)| !exclude.iter().any(|e| entry_matches(e, key)))
		.collect()
}

fn apply_include(include: &[String], data: SecretData) -> SecretData {
	if include.is_empty() {
		return data;
	}
	data.into_iter()
		.filter(|(key, _)| include.iter().any(|e| entry_matches(e, key)))
		.collect()
}

fn apply_rename(transforms: &Transforms, data: SecretData) -> SecretData {
	if transforms.rename.is_empty() {
		return data;
	}
	let mut out = SecretData::new();
	for (key, value) in data {
		let mut new_key = key.clone();
		for rename in &transforms.rename {
			if rename.from == key {
				new_key = rename.to.clone();
			}
		}
		out.insert(new_key, value);
	}
	out
}

fn render_template(template: &str, data: &SecretData) -> Result<SecretPayload> {
	let mut env = Environment::new();
	env.add_template("transform", template)
		.map_err(CoreError::Template)?;
	let rendered = env
		.get_template("transform")
		.map_err(CoreError::Template)?
		.render(TemplateContext { data })?;
	match serde_json::from_str::<SecretData>(&rendered) {
		Ok(parsed) => Ok(SecretPayload::Structured(parsed)),
		Err(_) => Ok(SecretPayload::Text(rendered)),
	}
}

#[derive(Serialize)]
#[serde(transparent)]
struct TemplateContext<'a> {
	data: &'a SecretData,
}
