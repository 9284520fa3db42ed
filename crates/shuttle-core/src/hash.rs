// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Spec hashing. Two revisions with the same hash are equivalent for
//! scheduling purposes; the lifecycle handler uses this to decide whether a
//! control-plane notification warrants a fresh sync.

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::spec::SecretSyncSpec;

/// Hex-encoded SHA-256 over the canonical JSON serialization of the spec.
pub fn spec_hash(spec: &SecretSyncSpec) -> Result<String> {
	let canonical = serde_json::to_vec(spec)?;
	let mut hasher = Sha256::new();
	hasher.update(&canonical);
	Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::spec::{Destination, VaultConfig};

	#[test]
	fn identical_specs_hash_equal() {
		let a = SecretSyncSpec {
			source: Some(VaultConfig {
				address: "https://v1".into(),
				path: "secret/foo".into(),
				..Default::default()
			}),
			..Default::default()
		};
		let b = a.clone();
		assert_eq!(spec_hash(&a).unwrap(), spec_hash(&b).unwrap());
	}

	#[test]
	fn changed_spec_changes_hash() {
		let a = SecretSyncSpec {
			source: Some(VaultConfig {
				address: "https://v1".into(),
				path: "secret/foo".into(),
				..Default::default()
			}),
			..Default::default()
		};
		let mut b = a.clone();
		b.dest.push(Destination::Vault(VaultConfig {
			address: "https://v2".into(),
			path: "copy/foo".into(),
			..Default::default()
		}));
		assert_ne!(spec_hash(&a).unwrap(), spec_hash(&b).unwrap());
	}
}
