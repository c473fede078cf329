// Scenario tests for the sync orchestrator against a scripted remote.

mod common;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::{FakeRemote, items, locator};
use glimmer_core::store::{RemovedCollection, StoreStats};
use glimmer_core::{
    AssetKey, CollectionId, CollectionKey, CollectionSnapshot, ContentStore, Error, MemoryStore, RemoteError,
    SyncConfig, SyncMode, SyncOrchestrator, SyncOutcome,
};
use std::sync::Arc;
use std::time::Duration;

fn orchestrator(store: &Arc<MemoryStore>, remote: &Arc<FakeRemote>) -> SyncOrchestrator {
    SyncOrchestrator::new(store.clone(), remote.clone(), SyncConfig::default())
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure_still_commits() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(FakeRemote::new());
    remote.set_listing("T1", items(10));
    remote.fail_locator(&locator(3));
    remote.fail_locator(&locator(7));
    let sync = orchestrator(&store, &remote);
    let key = CollectionKey::new("T1");

    let outcome = sync.sync_with_cache(&key).await.unwrap();

    let SyncOutcome::Refreshed { snapshot, report } = outcome else {
        panic!("expected a refresh, got {}", outcome.label());
    };
    assert_eq!(snapshot.items.len(), 10);
    assert_eq!(report.downloaded, 8);
    assert_eq!(report.failed.len(), 2);
    for n in 0..10 {
        let present = store.exists(&AssetKey::for_locator(&locator(n))).await.unwrap();
        assert_eq!(present, n != 3 && n != 7, "blob {n}");
    }
    let committed = store.load_snapshot(&CollectionId::for_key(&key)).await.unwrap().unwrap();
    assert_eq!(committed.items.len(), 10);

    remote.heal_all();
    remote.clear_blob_calls();
    let outcome = sync.sync_with(&key, SyncMode::Force).await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Refreshed { ref report, .. } if report.downloaded == 2));
    let mut refetched = remote.blob_calls();
    refetched.sort();
    assert_eq!(refetched, vec![locator(3), locator(7)]);
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_paging_and_fresh_reuse() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(FakeRemote::new());
    remote.set_listing("T1", items(25));
    let sync = orchestrator(&store, &remote);
    let key = CollectionKey::new("T1");

    let first = sync.sync_with_cache(&key).await.unwrap();
    assert!(!first.from_cache());

    let page0 = sync.list_page(&key, 0, 10).await.unwrap().unwrap();
    let expected: Vec<String> = (15..25).rev().map(|n| format!("photo-{n:02}")).collect();
    assert_eq!(page0.items.iter().map(|i| i.id.clone()).collect::<Vec<_>>(), expected);
    assert!(page0.has_more);

    let page2 = sync.list_page(&key, 2, 10).await.unwrap().unwrap();
    assert_eq!(page2.items.len(), 5);
    assert!(!page2.has_more);

    let calls_before = (remote.snapshot_calls(), remote.blob_calls().len());
    let second = sync.sync_with_cache(&key).await.unwrap();

    assert!(matches!(second, SyncOutcome::Fresh(_)));
    assert_eq!(second.snapshot(), first.snapshot());
    assert_eq!((remote.snapshot_calls(), remote.blob_calls().len()), calls_before);
    assert_eq!(calls_before, (1, 25));
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_falls_back_to_stale() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(FakeRemote::new());
    remote.set_listing("T1", items(3));
    let sync = orchestrator(&store, &remote);
    let key = CollectionKey::new("T1");
    let original = sync.sync_with_cache(&key).await.unwrap().into_snapshot().unwrap();

    remote.fail_snapshots(Some(RemoteError::Network("connection reset".into())));
    let outcome = sync.sync_with(&key, SyncMode::Force).await.unwrap();

    match outcome {
        SyncOutcome::Stale { snapshot, error } => {
            assert_eq!(snapshot, original);
            assert_eq!(error, RemoteError::Network("connection reset".into()));
        }
        other => panic!("expected stale fallback, got {}", other.label()),
    }
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_without_cache_is_unavailable() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(FakeRemote::new());
    remote.fail_snapshots(Some(RemoteError::RateLimited));
    let sync = orchestrator(&store, &remote);

    let outcome = sync.sync_with_cache(&CollectionKey::new("T1")).await.unwrap();

    assert_eq!(outcome, SyncOutcome::Unavailable { error: RemoteError::RateLimited });
    assert!(sync.list_page(&CollectionKey::new("T1"), 0, 10).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_slow_listing_times_out() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(FakeRemote::new());
    remote.set_listing("T1", items(1));
    remote.delay_snapshots(Duration::from_secs(60));
    let sync = orchestrator(&store, &remote);
    let start = tokio::time::Instant::now();

    let outcome = sync.sync_with_cache(&CollectionKey::new("T1")).await.unwrap();

    assert_eq!(outcome, SyncOutcome::Unavailable { error: RemoteError::Timeout });
    assert_eq!(start.elapsed(), Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_syncs_are_coalesced() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(FakeRemote::new());
    remote.set_listing("T1", items(5));
    let sync = orchestrator(&store, &remote);
    let key = CollectionKey::new("T1");

    let (a, b) = tokio::join!(sync.sync_with_cache(&key), sync.sync_with_cache(&key));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(remote.snapshot_calls(), 1);
    assert_eq!(remote.blob_calls().len(), 5);
    assert_eq!([a.from_cache(), b.from_cache()].iter().filter(|c| **c).count(), 1);
    assert_eq!(a.snapshot(), b.snapshot());
}

#[tokio::test(start_paused = true)]
async fn test_collections_share_blobs() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(FakeRemote::new());
    let shared = items(2);
    remote.set_listing("A", shared.clone());
    remote.set_listing("B", shared.clone());
    let sync = orchestrator(&store, &remote);

    sync.sync_with_cache(&CollectionKey::new("A")).await.unwrap();
    sync.sync_with_cache(&CollectionKey::new("B")).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.collections, 2);
    assert_eq!(stats.blobs, 2);
    assert_eq!(store.blob_writes(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stale_snapshot_triggers_refresh() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(FakeRemote::new());
    remote.set_listing("T1", items(2));
    let key = CollectionKey::new("T1");
    let id = CollectionId::for_key(&key);
    let old = CollectionSnapshot {
        meta: Default::default(),
        items: items(1),
        last_synced: Utc::now() - chrono::Duration::hours(24),
    };
    store.save_snapshot(&id, &old).await.unwrap();
    let sync = orchestrator(&store, &remote);

    let outcome = sync.sync_with_cache(&key).await.unwrap();

    let SyncOutcome::Refreshed { snapshot, report } = outcome else {
        panic!("expected refresh");
    };
    assert_eq!(snapshot.items.len(), 2);
    // item 0 was listed but its blob never landed; item 1 is new
    assert_eq!(report.required, 2);
}

#[tokio::test(start_paused = true)]
async fn test_evict_idle_collections() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(FakeRemote::new());
    remote.set_listing("old", items(2));
    remote.set_listing("new", items(1));
    let sync = orchestrator(&store, &remote);
    sync.sync_with_cache(&CollectionKey::new("old")).await.unwrap();
    sync.sync_with_cache(&CollectionKey::new("new")).await.unwrap();
    let old_id = CollectionId::for_key(&CollectionKey::new("old"));
    store.touch_at(&old_id, Utc::now() - chrono::Duration::days(31)).await.unwrap();

    let evicted = sync.evict_idle(Duration::from_secs(30 * 86_400)).await.unwrap();

    assert_eq!(evicted, 1);
    assert!(store.load_snapshot(&old_id).await.unwrap().is_none());
    assert!(store.exists(&AssetKey::for_locator(&locator(0))).await.unwrap());
    assert!(!store.exists(&AssetKey::for_locator(&locator(1))).await.unwrap());
    assert!(!sync.is_busy(&CollectionKey::new("old")).await);
}

#[tokio::test(start_paused = true)]
async fn test_eviction_waits_for_other_collection_commit() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(FakeRemote::new());
    remote.set_listing("old", items(1));
    remote.set_listing("new", items(2));
    let sync = orchestrator(&store, &remote);
    sync.sync_with_cache(&CollectionKey::new("old")).await.unwrap();
    let old_id = CollectionId::for_key(&CollectionKey::new("old"));
    store.touch_at(&old_id, Utc::now() - chrono::Duration::days(31)).await.unwrap();
    remote.delay_blobs(Duration::from_millis(500));

    // "new" finds the shared blob already stored, then is still downloading
    // its second item when eviction of "old" starts.
    let new_key = CollectionKey::new("new");
    let (synced, evicted) = tokio::join!(sync.sync_with_cache(&new_key), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        sync.evict_idle(Duration::from_secs(30 * 86_400)).await
    });

    assert!(matches!(synced.unwrap(), SyncOutcome::Refreshed { .. }));
    assert_eq!(evicted.unwrap(), 1);
    assert!(store.load_snapshot(&old_id).await.unwrap().is_none());
    assert!(store.exists(&AssetKey::for_locator(&locator(0))).await.unwrap());
    assert!(store.exists(&AssetKey::for_locator(&locator(1))).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_stale_fallback_counts_as_access() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(FakeRemote::new());
    remote.set_listing("T1", items(1));
    let sync = orchestrator(&store, &remote);
    let key = CollectionKey::new("T1");
    let id = CollectionId::for_key(&key);
    sync.sync_with_cache(&key).await.unwrap();
    store.touch_at(&id, Utc::now() - chrono::Duration::days(40)).await.unwrap();

    remote.fail_snapshots(Some(RemoteError::Unavailable));
    let outcome = sync.sync_with(&key, SyncMode::Force).await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Stale { .. }));

    assert_eq!(sync.evict_idle(Duration::from_secs(30 * 86_400)).await.unwrap(), 0);
    assert!(store.load_snapshot(&id).await.unwrap().is_some());
}

/// Memory store whose snapshot writes fail like a full disk.
struct DiskFull(MemoryStore);

#[async_trait]
impl ContentStore for DiskFull {
    async fn put(&self, key: &AssetKey, bytes: Bytes) -> Result<AssetKey, Error> {
        self.0.put(key, bytes).await
    }

    async fn exists(&self, key: &AssetKey) -> Result<bool, Error> {
        self.0.exists(key).await
    }

    async fn get(&self, key: &AssetKey) -> Result<Option<Bytes>, Error> {
        self.0.get(key).await
    }

    async fn save_snapshot(&self, _id: &CollectionId, _snapshot: &CollectionSnapshot) -> Result<(), Error> {
        Err(std::io::Error::new(std::io::ErrorKind::StorageFull, "no space left on device").into())
    }

    async fn load_snapshot(&self, id: &CollectionId) -> Result<Option<CollectionSnapshot>, Error> {
        self.0.load_snapshot(id).await
    }

    async fn touch_at(&self, id: &CollectionId, at: DateTime<Utc>) -> Result<(), Error> {
        self.0.touch_at(id, at).await
    }

    async fn idle_collections(&self, cutoff: DateTime<Utc>) -> Result<Vec<CollectionId>, Error> {
        self.0.idle_collections(cutoff).await
    }

    async fn remove_collection(&self, id: &CollectionId) -> Result<RemovedCollection, Error> {
        self.0.remove_collection(id).await
    }

    async fn stats(&self) -> Result<StoreStats, Error> {
        self.0.stats().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_propagates() {
    let store = Arc::new(DiskFull(MemoryStore::new()));
    let remote = Arc::new(FakeRemote::new());
    remote.set_listing("T1", items(1));
    let sync = SyncOrchestrator::new(store, remote, SyncConfig::default());

    let result = sync.sync_with_cache(&CollectionKey::new("T1")).await;

    assert!(matches!(result, Err(Error::Io(_))));
}
