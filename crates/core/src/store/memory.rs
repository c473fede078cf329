//! In-memory store for tests and embedding.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{AssetKey, CollectionId, ContentStore, RemovedCollection, StoreStats};
use crate::Error;
use crate::model::CollectionSnapshot;

#[derive(Debug, Default)]
struct Inner {
    blobs: HashMap<AssetKey, Bytes>,
    snapshots: HashMap<CollectionId, CollectionSnapshot>,
    accessed: HashMap<CollectionId, DateTime<Utc>>,
}

/// A [`ContentStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    blob_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blob writes that actually stored bytes.
    pub fn blob_writes(&self) -> usize {
        self.blob_writes.load(Ordering::SeqCst)
    }

    /// Drop a blob while leaving snapshots untouched, simulating a lost file.
    pub async fn forget_blob(&self, key: &AssetKey) -> bool {
        self.inner.write().await.blobs.remove(key).is_some()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn put(&self, key: &AssetKey, bytes: Bytes) -> Result<AssetKey, Error> {
        let mut inner = self.inner.write().await;
        if !inner.blobs.contains_key(key) {
            inner.blobs.insert(key.clone(), bytes);
            self.blob_writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(key.clone())
    }

    async fn exists(&self, key: &AssetKey) -> Result<bool, Error> {
        Ok(self.inner.read().await.blobs.contains_key(key))
    }

    async fn get(&self, key: &AssetKey) -> Result<Option<Bytes>, Error> {
        Ok(self.inner.read().await.blobs.get(key).cloned())
    }

    async fn save_snapshot(&self, id: &CollectionId, snapshot: &CollectionSnapshot) -> Result<(), Error> {
        let mut inner = self.inner.write().await;
        inner.snapshots.insert(id.clone(), snapshot.clone());
        inner.accessed.insert(id.clone(), Utc::now());
        Ok(())
    }

    async fn load_snapshot(&self, id: &CollectionId) -> Result<Option<CollectionSnapshot>, Error> {
        Ok(self.inner.read().await.snapshots.get(id).cloned())
    }

    async fn touch_at(&self, id: &CollectionId, at: DateTime<Utc>) -> Result<(), Error> {
        let mut inner = self.inner.write().await;
        if inner.snapshots.contains_key(id) {
            inner.accessed.insert(id.clone(), at);
        }
        Ok(())
    }

    async fn idle_collections(&self, cutoff: DateTime<Utc>) -> Result<Vec<CollectionId>, Error> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .keys()
            .filter(|id| inner.accessed.get(*id).is_none_or(|at| *at < cutoff))
            .cloned()
            .collect())
    }

    async fn remove_collection(&self, id: &CollectionId) -> Result<RemovedCollection, Error> {
        let mut inner = self.inner.write().await;
        inner.accessed.remove(id);
        let Some(removed) = inner.snapshots.remove(id) else {
            return Ok(RemovedCollection::default());
        };

        let still_used: HashSet<AssetKey> = inner
            .snapshots
            .values()
            .flat_map(|s| s.items.iter().map(|item| item.key()))
            .collect();

        let mut orphaned_blobs = 0;
        for item in &removed.items {
            let key = item.key();
            if !still_used.contains(&key) && inner.blobs.remove(&key).is_some() {
                orphaned_blobs += 1;
            }
        }
        Ok(RemovedCollection { orphaned_blobs })
    }

    async fn stats(&self) -> Result<StoreStats, Error> {
        let inner = self.inner.read().await;
        Ok(StoreStats {
            collections: inner.snapshots.len(),
            blobs: inner.blobs.len(),
            blob_bytes: inner.blobs.values().map(|b| b.len() as u64).sum(),
        })
    }
}
