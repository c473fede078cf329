//! Where a view session gets its pages and asset bytes from.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use glimmer_core::{AssetKey, CollectionKey, ContentStore, Page, SyncOrchestrator};

use crate::loader::{AssetLoader, LoadError};

/// Errors that end a page pull.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("view session cancelled")]
    Cancelled,

    #[error("collection unavailable")]
    Unavailable,

    #[error("page source failed: {0}")]
    Source(String),
}

/// Supplies successive pages of a collection.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, key: &CollectionKey, page_index: usize, page_size: usize) -> Result<Page, ViewError>;
}

#[async_trait]
impl PageSource for SyncOrchestrator {
    async fn fetch_page(&self, key: &CollectionKey, page_index: usize, page_size: usize) -> Result<Page, ViewError> {
        match self.list_page(key, page_index, page_size).await {
            Ok(Some(page)) => Ok(page),
            Ok(None) => Err(ViewError::Unavailable),
            Err(e) => Err(ViewError::Source(e.to_string())),
        }
    }
}

/// Loads asset bytes straight from the content-addressed store.
pub struct StoreAssetLoader {
    store: Arc<dyn ContentStore>,
}

impl StoreAssetLoader {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AssetLoader for StoreAssetLoader {
    type Element = Bytes;

    async fn load(&self, locator: &str) -> Result<Bytes, LoadError> {
        let key = AssetKey::for_locator(locator);
        match self.store.get(&key).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(LoadError::NotFound(key.to_string())),
            Err(e) => Err(LoadError::Failed(e.to_string())),
        }
    }
}
