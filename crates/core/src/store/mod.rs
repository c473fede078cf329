//! Content-addressed storage for asset blobs and collection snapshots.
//!
//! Blobs are keyed by [`AssetKey`] and are write-once: a second `put` for an
//! existing key is a no-op. Snapshots are keyed by [`CollectionId`] and are
//! replaced wholesale with all-or-nothing writes. A snapshot that cannot be
//! parsed reads back as `None`, exactly like a missing one.
//!
//! Two backends are provided:
//!
//! - [`FsStore`]: the durable on-disk layout
//! - [`MemoryStore`]: an in-process store for tests and embedding

pub mod fs;
pub mod hash;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::Error;
use crate::model::CollectionSnapshot;

pub use fs::FsStore;
pub use hash::{AssetKey, CollectionId};
pub use memory::MemoryStore;

/// Aggregate counts reported by [`ContentStore::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub collections: usize,
    pub blobs: usize,
    pub blob_bytes: u64,
}

/// Result of removing one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemovedCollection {
    /// Blobs deleted because no surviving snapshot referenced them.
    pub orphaned_blobs: usize,
}

/// Durable key/value storage of blobs plus per-collection snapshots.
///
/// Storage errors propagate unchanged; nothing is retried inside a store.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `bytes` under `key` unless an entry already exists.
    async fn put(&self, key: &AssetKey, bytes: Bytes) -> Result<AssetKey, Error>;

    async fn exists(&self, key: &AssetKey) -> Result<bool, Error>;

    async fn get(&self, key: &AssetKey) -> Result<Option<Bytes>, Error>;

    /// Atomically replace the snapshot for `id` and mark it accessed.
    async fn save_snapshot(&self, id: &CollectionId, snapshot: &CollectionSnapshot) -> Result<(), Error>;

    /// Load the snapshot for `id`. Missing and unparseable both yield `None`.
    async fn load_snapshot(&self, id: &CollectionId) -> Result<Option<CollectionSnapshot>, Error>;

    /// Set the last-accessed marker of an existing collection. Unknown ids are ignored.
    async fn touch_at(&self, id: &CollectionId, at: DateTime<Utc>) -> Result<(), Error>;

    /// Collections whose last access is strictly before `cutoff`.
    async fn idle_collections(&self, cutoff: DateTime<Utc>) -> Result<Vec<CollectionId>, Error>;

    /// Delete a collection and the blobs only it referenced.
    async fn remove_collection(&self, id: &CollectionId) -> Result<RemovedCollection, Error>;

    async fn stats(&self) -> Result<StoreStats, Error>;

    /// Update the last-accessed marker only.
    async fn touch(&self, id: &CollectionId) -> Result<(), Error> {
        self.touch_at(id, Utc::now()).await
    }

    /// Delete every collection idle for longer than `max_idle`.
    ///
    /// Not coordinated with in-flight syncs; prefer
    /// [`crate::sync::SyncOrchestrator::evict_idle`] when syncs may be running.
    async fn evict_older_than(&self, max_idle: Duration) -> Result<usize, Error> {
        let cutoff = idle_cutoff(Utc::now(), max_idle);
        let idle = self.idle_collections(cutoff).await?;
        for id in &idle {
            self.remove_collection(id).await?;
        }
        Ok(idle.len())
    }
}

/// `now - max_idle`, saturating at the earliest representable instant.
pub(crate) fn idle_cutoff(now: DateTime<Utc>, max_idle: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(max_idle)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
