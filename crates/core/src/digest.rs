// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Truncated content digests used for label values and claim names.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// First half of a SHA-256 over `value`, hex encoded.
///
/// 32 characters, safe for label values and object name suffixes.
pub fn short_digest(value: &str) -> String {
    let mut hex = format!("{:x}", Sha256::digest(value.as_bytes()));
    hex.truncate(32);
    hex
}

/// Digest of the compact JSON rendering of `value`.
///
/// Stable only for ordered collections; callers hash `BTreeMap`s, never
/// `HashMap`s.
pub fn json_digest<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_string(value)?;
    Ok(short_digest(&canonical))
}

#[cfg(test)]
#[path = "digest_tests.rs"]
mod tests;
