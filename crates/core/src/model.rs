//! Collection data model shared by the sync engine and the viewer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::AssetKey;

/// Opaque external identifier of a remote collection.
///
/// Only ever hashed into a [`crate::store::CollectionId`] for storage; the raw
/// value is never written to disk and is redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionKey(String);

impl CollectionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CollectionKey").field(&"<redacted>").finish()
    }
}

impl From<&str> for CollectionKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// An item as seen by the remote source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub id: String,
    /// Canonical locator; the asset's content key is derived from it.
    pub source_locator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_variants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl AssetRef {
    pub fn new(id: impl Into<String>, source_locator: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_locator: source_locator.into(),
            derived_variants: Vec::new(),
            created_at: None,
            caption: None,
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Content key of this asset's blob.
    pub fn key(&self) -> AssetKey {
        AssetKey::for_locator(&self.source_locator)
    }
}

/// Collection-level metadata reported by the remote source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// The persisted metadata record for one collection.
///
/// Replaced wholesale on every successful resync. Item order mirrors the
/// remote listing and carries no presentation meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub meta: CollectionMeta,
    pub items: Vec<AssetRef>,
    pub last_synced: DateTime<Utc>,
}

/// What `fetch_snapshot` returns: a listing without local timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteListing {
    pub meta: CollectionMeta,
    pub items: Vec<AssetRef>,
}
