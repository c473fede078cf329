//! Content-addressed key derivation.
//!
//! Both key types are lowercase hex SHA-256 digests (64 chars), which also
//! makes them safe to use verbatim as file names.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::Error;
use crate::model::CollectionKey;

const DIGEST_HEX_LEN: usize = 64;

fn digest_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

fn check_digest(value: &str) -> Result<(), Error> {
    if value.len() == DIGEST_HEX_LEN && value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
        Ok(())
    } else {
        Err(Error::InvalidKey(value.to_string()))
    }
}

/// Storage key of one asset blob, derived from its source locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetKey(String);

impl AssetKey {
    /// Derive the key for a source locator. Stable for as long as the locator is.
    pub fn for_locator(locator: &str) -> Self {
        Self(digest_hex(locator.as_bytes()))
    }

    /// Parse a previously derived key (e.g. a file name read back from disk).
    pub fn parse(value: &str) -> Result<Self, Error> {
        check_digest(value)?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage-location key of one collection; a one-way hash of its [`CollectionKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(String);

impl CollectionId {
    pub fn for_key(key: &CollectionKey) -> Self {
        Self(digest_hex(key.as_str().as_bytes()))
    }

    pub fn parse(value: &str) -> Result<Self, Error> {
        check_digest(value)?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&CollectionKey> for CollectionId {
    fn from(key: &CollectionKey) -> Self {
        Self::for_key(key)
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
