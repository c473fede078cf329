//! Sync orchestration: staleness, remote fetch, delta, download, commit.
//!
//! One cycle per collection key runs at a time:
//!
//! ```text
//! EVALUATE -> FRESH (done)
//!          -> STALE/MISSING -> FETCH_REMOTE -> failure: FALLBACK
//!                                           -> success: RESOLVE_DELTA -> DOWNLOAD_LOOP -> COMMIT
//! ```
//!
//! Remote failures never surface as errors. A cycle ends with a fresh,
//! refreshed, stale-fallback or unavailable outcome. Only store failures
//! propagate as [`Error`].

mod download;
mod lock;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::Error;
use crate::delta;
use crate::model::{CollectionKey, CollectionSnapshot};
use crate::pages::{Page, paginate};
use crate::remote::{RemoteError, RemoteSource};
use crate::store::{CollectionId, ContentStore, idle_cutoff};

pub use download::{Backoff, DownloadPolicy, FailedDownload};
use download::Downloader;
use lock::KeyedLocks;

/// Timing and retry knobs of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Snapshots at least this old are refreshed before being served.
    pub stale_after: Duration,
    pub snapshot_timeout: Duration,
    pub download: DownloadPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(24 * 60 * 60),
            snapshot_timeout: Duration::from_secs(15),
            download: DownloadPolicy {
                max_attempts: 3,
                attempt_timeout: Duration::from_secs(10),
                backoff: Backoff { base: Duration::from_secs(1), throttle_step: Duration::from_secs(5) },
                pace: Duration::from_secs(1),
            },
        }
    }
}

/// Whether a cached snapshot may be served without a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// Classify a snapshot synced at `last_synced`.
///
/// An age equal to the threshold is already stale. Timestamps from the
/// future (clock skew) count as age zero.
pub fn evaluate(last_synced: DateTime<Utc>, now: DateTime<Utc>, stale_after: Duration) -> Freshness {
    let age = (now - last_synced).to_std().unwrap_or(Duration::ZERO);
    if age >= stale_after { Freshness::Stale } else { Freshness::Fresh }
}

/// How a sync request treats an existing fresh snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// Serve a fresh snapshot without contacting the remote.
    #[default]
    IfStale,
    /// Always fetch the remote listing.
    Force,
}

/// What one refresh cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub listed: usize,
    pub required: usize,
    pub downloaded: usize,
    pub duplicates: usize,
    pub failed: Vec<FailedDownload>,
}

/// Result of [`SyncOrchestrator::sync_with_cache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Served from the store; the remote was not contacted.
    Fresh(CollectionSnapshot),
    /// The remote listing was fetched and committed.
    Refreshed { snapshot: CollectionSnapshot, report: SyncReport },
    /// The remote failed; the previous snapshot is served unchanged.
    Stale { snapshot: CollectionSnapshot, error: RemoteError },
    /// The remote failed and nothing was cached.
    Unavailable { error: RemoteError },
}

impl SyncOutcome {
    pub fn snapshot(&self) -> Option<&CollectionSnapshot> {
        match self {
            SyncOutcome::Fresh(snapshot)
            | SyncOutcome::Refreshed { snapshot, .. }
            | SyncOutcome::Stale { snapshot, .. } => Some(snapshot),
            SyncOutcome::Unavailable { .. } => None,
        }
    }

    pub fn into_snapshot(self) -> Option<CollectionSnapshot> {
        match self {
            SyncOutcome::Fresh(snapshot)
            | SyncOutcome::Refreshed { snapshot, .. }
            | SyncOutcome::Stale { snapshot, .. } => Some(snapshot),
            SyncOutcome::Unavailable { .. } => None,
        }
    }

    /// True when the data came from the store rather than a fresh remote listing.
    pub fn from_cache(&self) -> bool {
        matches!(self, SyncOutcome::Fresh(_) | SyncOutcome::Stale { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Fresh(_) => "fresh",
            SyncOutcome::Refreshed { .. } => "refreshed",
            SyncOutcome::Stale { .. } => "stale",
            SyncOutcome::Unavailable { .. } => "unavailable",
        }
    }
}

/// Ties the store and remote source into the sync state machine.
pub struct SyncOrchestrator {
    store: Arc<dyn ContentStore>,
    remote: Arc<dyn RemoteSource>,
    config: SyncConfig,
    locks: KeyedLocks,
    /// Held shared from delta resolution to commit, exclusively by blob GC,
    /// which only sees blobs referenced by committed snapshots.
    blob_gc: RwLock<()>,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<dyn ContentStore>, remote: Arc<dyn RemoteSource>, config: SyncConfig) -> Self {
        Self { store, remote, config, locks: KeyedLocks::default(), blob_gc: RwLock::new(()) }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Serve the collection, refreshing it first if stale or missing.
    pub async fn sync_with_cache(&self, key: &CollectionKey) -> Result<SyncOutcome, Error> {
        self.sync_with(key, SyncMode::IfStale).await
    }

    /// Like [`Self::sync_with_cache`] with an explicit [`SyncMode`].
    ///
    /// Concurrent calls for the same key are serialized; a waiter usually
    /// finds the snapshot its predecessor just committed.
    #[tracing::instrument(skip(self, key), fields(collection = %CollectionId::for_key(key)))]
    pub async fn sync_with(&self, key: &CollectionKey, mode: SyncMode) -> Result<SyncOutcome, Error> {
        let id = CollectionId::for_key(key);
        let _guard = self.locks.acquire(&id).await;

        let cached = self.store.load_snapshot(&id).await?;

        if mode == SyncMode::IfStale
            && let Some(snapshot) = cached.as_ref()
            && evaluate(snapshot.last_synced, Utc::now(), self.config.stale_after) == Freshness::Fresh
        {
            self.store.touch(&id).await?;
            tracing::debug!("serving fresh snapshot");
            return Ok(SyncOutcome::Fresh(snapshot.clone()));
        }

        let listing =
            match tokio::time::timeout(self.config.snapshot_timeout, self.remote.fetch_snapshot(key)).await {
                Ok(Ok(listing)) => listing,
                Ok(Err(error)) => return self.fallback(&id, cached, error).await,
                Err(_) => return self.fallback(&id, cached, RemoteError::Timeout).await,
            };

        let _committing = self.blob_gc.read().await;
        let cached_items = cached.as_ref().map(|s| s.items.as_slice()).unwrap_or_default();
        let delta = delta::resolve(&listing.items, cached_items, self.store.as_ref()).await?;

        let downloader =
            Downloader { remote: self.remote.as_ref(), store: self.store.as_ref(), policy: self.config.download };
        let tally = downloader.run(&delta.downloads).await?;

        let snapshot = CollectionSnapshot { meta: listing.meta, items: listing.items, last_synced: Utc::now() };
        self.store.save_snapshot(&id, &snapshot).await?;

        let report = SyncReport {
            listed: snapshot.items.len(),
            required: delta.downloads.len(),
            downloaded: tally.downloaded,
            duplicates: delta.duplicates,
            failed: tally.failed,
        };
        tracing::info!(
            listed = report.listed,
            required = report.required,
            downloaded = report.downloaded,
            failed = report.failed.len(),
            "committed snapshot"
        );

        Ok(SyncOutcome::Refreshed { snapshot, report })
    }

    async fn fallback(
        &self, id: &CollectionId, cached: Option<CollectionSnapshot>, error: RemoteError,
    ) -> Result<SyncOutcome, Error> {
        match cached {
            Some(snapshot) => {
                tracing::warn!(%error, last_synced = %snapshot.last_synced, "remote fetch failed, serving stale snapshot");
                self.store.touch(id).await?;
                Ok(SyncOutcome::Stale { snapshot, error })
            }
            None => {
                tracing::warn!(%error, "remote fetch failed and nothing is cached");
                Ok(SyncOutcome::Unavailable { error })
            }
        }
    }

    /// One page of the collection, newest first. `None` when unavailable.
    pub async fn list_page(
        &self, key: &CollectionKey, page_index: usize, page_size: usize,
    ) -> Result<Option<Page>, Error> {
        let outcome = self.sync_with_cache(key).await?;
        match outcome.snapshot() {
            Some(snapshot) => Ok(Some(paginate(&snapshot.items, page_index, page_size)?)),
            None => Ok(None),
        }
    }

    /// True while a sync or eviction holds the collection.
    pub async fn is_busy(&self, key: &CollectionKey) -> bool {
        self.locks.is_held(&CollectionId::for_key(key)).await
    }

    /// Evict collections idle longer than `max_idle`, skipping any that are
    /// being synced right now. Returns the number evicted.
    ///
    /// Each removal waits for in-flight commits of other collections, since
    /// they may share blobs the removal would otherwise collect.
    #[tracing::instrument(skip(self))]
    pub async fn evict_idle(&self, max_idle: Duration) -> Result<usize, Error> {
        let cutoff = idle_cutoff(Utc::now(), max_idle);
        let mut evicted = 0;
        for id in self.store.idle_collections(cutoff).await? {
            let Some(_guard) = self.locks.try_acquire(&id).await else {
                tracing::debug!(collection = %id, "sync in flight, skipping eviction");
                continue;
            };
            let _exclusive = self.blob_gc.write().await;
            self.store.remove_collection(&id).await?;
            evicted += 1;
        }
        Ok(evicted)
    }
}
