//! Versioned content hash used for deterministic identifiers.
//!
//! Output format: `<prefix><version>~<base64url(digest)>`, e.g. `r1~...`.

use base64::Engine;
use sha2::{Digest, Sha256};

pub enum Hasher {
	V1(Sha256),
}

impl Default for Hasher {
	fn default() -> Self {
		Self::new()
	}
}

impl Hasher {
	pub fn new() -> Self {
		Self::V1(Sha256::new())
	}

	pub fn update(&mut self, data: &[u8]) {
		match self {
			Self::V1(hasher) => hasher.update(data),
		}
	}

	pub fn finalize(self, prefix: &str) -> String {
		match self {
			Self::V1(hasher) => {
				prefix.to_string()
					+ "1~" + &base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
			}
		}
	}
}


// vim: ts=4
