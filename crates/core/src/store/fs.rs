//! On-disk store.
//!
//! Layout under the root directory:
//!
//! ```text
//! assets/<AssetKey>
//! collections/<CollectionId>/snapshot.json
//! collections/<CollectionId>/accessed
//! ```
//!
//! Every write goes to a uniquely named temp file which is fsynced and then
//! renamed over the target, so readers see either the old or the new record.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

use super::{AssetKey, CollectionId, ContentStore, RemovedCollection, StoreStats};
use crate::Error;
use crate::model::CollectionSnapshot;

const ASSETS_DIR: &str = "assets";
const COLLECTIONS_DIR: &str = "collections";
const SNAPSHOT_FILE: &str = "snapshot.json";
const ACCESSED_FILE: &str = "accessed";

/// Filesystem-backed content store.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(ASSETS_DIR)).await?;
        fs::create_dir_all(root.join(COLLECTIONS_DIR)).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn asset_path(&self, key: &AssetKey) -> PathBuf {
        self.root.join(ASSETS_DIR).join(key.as_str())
    }

    fn collection_dir(&self, id: &CollectionId) -> PathBuf {
        self.root.join(COLLECTIONS_DIR).join(id.as_str())
    }

    async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, Error> {
        match fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn collection_ids(&self) -> Result<Vec<CollectionId>, Error> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(self.root.join(COLLECTIONS_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            match CollectionId::parse(&name.to_string_lossy()) {
                Ok(id) => ids.push(id),
                Err(_) => tracing::debug!("ignoring foreign entry in collections dir: {:?}", name),
            }
        }
        Ok(ids)
    }

    /// Last access of a collection: the marker if readable, else the snapshot's
    /// sync time, else the epoch so unreadable collections age out first.
    async fn last_access(&self, id: &CollectionId) -> Result<DateTime<Utc>, Error> {
        let dir = self.collection_dir(id);
        if let Some(raw) = Self::read_optional(&dir.join(ACCESSED_FILE)).await?
            && let Ok(at) = DateTime::parse_from_rfc3339(String::from_utf8_lossy(&raw).trim())
        {
            return Ok(at.with_timezone(&Utc));
        }
        Ok(self
            .load_snapshot(id)
            .await?
            .map(|s| s.last_synced)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
    }
}

/// Write `data` to `path` via temp file, fsync and rename.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), Error> {
    let temp_name = format!(".tmp.{}", Uuid::new_v4());
    let temp_path = path.with_file_name(
        path.file_name()
            .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
            .unwrap_or_else(|| temp_name.clone()),
    );
    {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
    }
    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl ContentStore for FsStore {
    #[instrument(skip(self, bytes), fields(backend = "fs", size = bytes.len()))]
    async fn put(&self, key: &AssetKey, bytes: Bytes) -> Result<AssetKey, Error> {
        let path = self.asset_path(key);
        // Same key means same content, so a lost race just repeats identical work.
        if fs::try_exists(&path).await? {
            return Ok(key.clone());
        }
        write_atomic(&path, &bytes).await?;
        Ok(key.clone())
    }

    async fn exists(&self, key: &AssetKey) -> Result<bool, Error> {
        Ok(fs::try_exists(self.asset_path(key)).await?)
    }

    async fn get(&self, key: &AssetKey) -> Result<Option<Bytes>, Error> {
        Ok(Self::read_optional(&self.asset_path(key)).await?.map(Bytes::from))
    }

    #[instrument(skip(self, snapshot), fields(backend = "fs", items = snapshot.items.len()))]
    async fn save_snapshot(&self, id: &CollectionId, snapshot: &CollectionSnapshot) -> Result<(), Error> {
        let dir = self.collection_dir(id);
        fs::create_dir_all(&dir).await?;
        let encoded = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&dir.join(SNAPSHOT_FILE), &encoded).await?;
        write_atomic(&dir.join(ACCESSED_FILE), Utc::now().to_rfc3339().as_bytes()).await
    }

    async fn load_snapshot(&self, id: &CollectionId) -> Result<Option<CollectionSnapshot>, Error> {
        let Some(raw) = Self::read_optional(&self.collection_dir(id).join(SNAPSHOT_FILE)).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&raw) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                tracing::warn!(collection = %id, error = %e, "unreadable snapshot treated as missing");
                Ok(None)
            }
        }
    }

    async fn touch_at(&self, id: &CollectionId, at: DateTime<Utc>) -> Result<(), Error> {
        let dir = self.collection_dir(id);
        if !fs::try_exists(&dir).await? {
            return Ok(());
        }
        write_atomic(&dir.join(ACCESSED_FILE), at.to_rfc3339().as_bytes()).await
    }

    async fn idle_collections(&self, cutoff: DateTime<Utc>) -> Result<Vec<CollectionId>, Error> {
        let mut idle = Vec::new();
        for id in self.collection_ids().await? {
            if self.last_access(&id).await? < cutoff {
                idle.push(id);
            }
        }
        Ok(idle)
    }

    #[instrument(skip(self), fields(backend = "fs"))]
    async fn remove_collection(&self, id: &CollectionId) -> Result<RemovedCollection, Error> {
        let referenced: Vec<AssetKey> = self
            .load_snapshot(id)
            .await?
            .map(|s| s.items.iter().map(|item| item.key()).collect())
            .unwrap_or_default();

        match fs::remove_dir_all(self.collection_dir(id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(RemovedCollection::default()),
            Err(e) => return Err(e.into()),
        }

        let mut still_used = HashSet::new();
        for other in self.collection_ids().await? {
            if let Some(snapshot) = self.load_snapshot(&other).await? {
                still_used.extend(snapshot.items.iter().map(|item| item.key()));
            }
        }

        let mut orphaned_blobs = 0;
        let mut seen = HashSet::new();
        for key in referenced {
            if still_used.contains(&key) || !seen.insert(key.clone()) {
                continue;
            }
            match fs::remove_file(self.asset_path(&key)).await {
                Ok(()) => orphaned_blobs += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(collection = %id, orphaned_blobs, "removed collection");
        Ok(RemovedCollection { orphaned_blobs })
    }

    async fn stats(&self) -> Result<StoreStats, Error> {
        let collections = self.collection_ids().await?.len();
        let mut blobs = 0;
        let mut blob_bytes = 0;
        let mut entries = fs::read_dir(self.root.join(ASSETS_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if AssetKey::parse(&name.to_string_lossy()).is_err() {
                continue;
            }
            blobs += 1;
            blob_bytes += entry.metadata().await?.len();
        }
        Ok(StoreStats { collections, blobs, blob_bytes })
    }
}
