// Shared fixtures for sync scenario tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use glimmer_core::{AssetRef, CollectionKey, CollectionMeta, RemoteError, RemoteListing, RemoteSource};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A remote source driven entirely by test state.
#[derive(Default)]
pub struct FakeRemote {
    listings: Mutex<HashMap<String, RemoteListing>>,
    snapshot_error: Mutex<Option<RemoteError>>,
    snapshot_delay: Mutex<Option<Duration>>,
    blob_delay: Mutex<Option<Duration>>,
    failing: Mutex<HashSet<String>>,
    snapshot_calls: AtomicUsize,
    blob_calls: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_listing(&self, key: &str, items: Vec<AssetRef>) {
        let meta = CollectionMeta { title: Some(format!("album {key}")), owner: None };
        self.listings.lock().unwrap().insert(key.to_string(), RemoteListing { meta, items });
    }

    pub fn fail_snapshots(&self, error: Option<RemoteError>) {
        *self.snapshot_error.lock().unwrap() = error;
    }

    pub fn delay_snapshots(&self, delay: Duration) {
        *self.snapshot_delay.lock().unwrap() = Some(delay);
    }

    pub fn delay_blobs(&self, delay: Duration) {
        *self.blob_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_locator(&self, locator: &str) {
        self.failing.lock().unwrap().insert(locator.to_string());
    }

    pub fn heal_all(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    pub fn blob_calls(&self) -> Vec<String> {
        self.blob_calls.lock().unwrap().clone()
    }

    pub fn clear_blob_calls(&self) {
        self.blob_calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn fetch_snapshot(&self, key: &CollectionKey) -> Result<RemoteListing, RemoteError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.snapshot_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.snapshot_error.lock().unwrap().clone() {
            return Err(error);
        }
        self.listings
            .lock()
            .unwrap()
            .get(key.as_str())
            .cloned()
            .ok_or(RemoteError::Http { status: 404 })
    }

    async fn fetch_blob(&self, locator: &str) -> Result<Bytes, RemoteError> {
        self.blob_calls.lock().unwrap().push(locator.to_string());
        let delay = *self.blob_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(locator) {
            return Err(RemoteError::Unavailable);
        }
        Ok(Bytes::from(format!("bytes of {locator}")))
    }
}

pub fn locator(n: usize) -> String {
    format!("https://cdn.example.com/photos/{n}.jpg")
}

/// `count` items, item `n` created `n` minutes after the epoch.
pub fn items(count: usize) -> Vec<AssetRef> {
    (0..count)
        .map(|n| {
            let created: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::minutes(n as i64);
            AssetRef::new(format!("photo-{n:02}"), locator(n)).with_created_at(created)
        })
        .collect()
}
