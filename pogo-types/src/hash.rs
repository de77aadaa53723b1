/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::PogoError;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// A SHA-256 digest identifying the content of a blob. Display/FromStr use
/// URL-safe base64 without padding, matching the on-disk object store layout
/// (`<root>/<hash[0..2]>/<hash[2..]>`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        ContentHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hashes a complete byte slice in one call. Prefer [`Hasher`] for
    /// streaming input.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(data);
        hasher.finish()
    }

    /// URL-safe base64 (no padding) encoding of the digest, used both for
    /// `Display` and for the object store's path scheme.
    pub fn to_b64(&self) -> String {
        B64.encode(self.0)
    }

    /// The first two base64 characters, i.e. the object store's shard
    /// directory name.
    pub fn shard(&self) -> String {
        self.to_b64()[..2].to_string()
    }

    /// The remainder of the base64 encoding after the shard prefix, i.e. the
    /// object store's file name within its shard directory.
    pub fn rest(&self) -> String {
        self.to_b64()[2..].to_string()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_b64())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_b64())
    }
}

impl FromStr for ContentHash {
    type Err = PogoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = B64
            .decode(s)
            .map_err(|e| PogoError::invalid_input(format!("malformed content hash: {e}")))?;
        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|_| PogoError::invalid_input("content hash must be 32 bytes"))?;
        Ok(ContentHash(bytes))
    }
}

/// Incremental SHA-256 hasher, used so the push pipeline can hash bytes as
/// they stream in rather than buffering the whole file.
#[derive(Default)]
pub struct Hasher(Sha256);

impl Hasher {
    pub fn new() -> Self {
        Hasher(Sha256::new())
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.0.update(chunk);
    }

    pub fn finish(self) -> ContentHash {
        ContentHash(self.0.finalize().into())
    }
}
