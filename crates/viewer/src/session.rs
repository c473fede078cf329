//! One viewing session over a growing, shuffled collection.
//!
//! A session owns the presentation order, the memory window and the
//! progressive loader, all tied to a single cancellation token. Closing the
//! session (or cancelling its token) stops page pulls and asset loads at once.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use glimmer_core::{AppConfig, AssetRef, CollectionKey};

use crate::loader::{AssetLoader, LoadEvent, ProgressiveLoader};
use crate::shuffle::{session_seed, shuffled};
use crate::source::{PageSource, ViewError};
use crate::window::{ClientViewState, WindowConfig, WindowController};

/// Tuning of a view session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewConfig {
    pub max_concurrent: usize,
    pub window: WindowConfig,
    pub page_size: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self { max_concurrent: 4, window: WindowConfig::default(), page_size: 50 }
    }
}

impl From<&AppConfig> for ViewConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent_loads,
            window: WindowConfig {
                back: config.window_back,
                forward: config.window_forward,
                margin: config.window_margin,
            },
            page_size: config.page_size,
        }
    }
}

/// Something the presentation layer should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// An element for `index` is now in memory.
    Shown { index: usize },
    /// The first load of `index` failed; it will be tried once more.
    Retrying { index: usize },
    /// `index` failed twice and is gone from the presented sequence.
    Removed { index: usize },
}

pub struct ViewSession<L: AssetLoader> {
    key: CollectionKey,
    config: ViewConfig,
    window: WindowController,
    state: ClientViewState<L::Element>,
    loader: ProgressiveLoader<L>,
    known_ids: HashSet<String>,
    failed_locators: HashSet<String>,
    cancel: CancellationToken,
    seed: u64,
    next_page: usize,
    exhausted: bool,
}

impl<L: AssetLoader> ViewSession<L> {
    pub fn new(key: CollectionKey, loader: Arc<L>, config: ViewConfig) -> Self {
        let cancel = CancellationToken::new();
        let seed = session_seed(&key, Utc::now());
        Self {
            loader: ProgressiveLoader::new(loader, config.max_concurrent, cancel.clone()),
            window: WindowController::new(config.window),
            state: ClientViewState::default(),
            known_ids: HashSet::new(),
            failed_locators: HashSet::new(),
            next_page: 0,
            exhausted: false,
            key,
            config,
            cancel,
            seed,
        }
    }

    /// Add items to the session and reshuffle the whole list with a new seed.
    ///
    /// Items whose id is already known are ignored. Loaded elements and
    /// permanent failures follow their locator into the new order. Returns
    /// the number of items added.
    pub fn extend(&mut self, items: impl IntoIterator<Item = AssetRef>) -> usize {
        let fresh: Vec<AssetRef> = items.into_iter().filter(|item| self.known_ids.insert(item.id.clone())).collect();
        if fresh.is_empty() {
            return 0;
        }
        let added = fresh.len();

        let mut all = std::mem::take(&mut self.state.ordered_items);
        let mut by_locator: HashMap<String, L::Element> = HashMap::new();
        for (index, element) in std::mem::take(&mut self.state.loaded_elements) {
            if let Some(item) = all.get(index) {
                by_locator.entry(item.source_locator.clone()).or_insert(element);
            }
        }
        all.extend(fresh);

        self.seed = session_seed(&self.key, Utc::now());
        self.state.ordered_items = shuffled(&all, self.seed);
        self.loader.reset();

        for (index, item) in self.state.ordered_items.iter().enumerate() {
            if self.failed_locators.contains(&item.source_locator) {
                self.loader.mark_failed(index);
            } else if let Some(element) = by_locator.remove(&item.source_locator) {
                self.state.loaded_elements.insert(index, element);
            }
        }

        tracing::debug!(added, total = self.state.ordered_items.len(), "reshuffled view");
        self.refresh_window();
        added
    }

    /// Move the viewing position and load what the new window needs.
    pub fn seek(&mut self, index: usize) {
        self.state.current_index = index;
        self.refresh_window();
    }

    fn refresh_window(&mut self) {
        let len = self.state.ordered_items.len();
        let requested = self.state.current_index;
        let change = self.window.advance(&mut self.state, requested);
        self.loader.cancel_outside(self.window.config().retained(self.state.current_index, len));

        for index in change.to_load {
            let locator = self.state.ordered_items[index].source_locator.clone();
            self.loader.enqueue(index, locator);
        }
    }

    /// Wait for the next load outcome worth reacting to.
    ///
    /// `None` once nothing is loading or the session is cancelled.
    pub async fn pump(&mut self) -> Option<ViewEvent> {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                event = self.loader.next_event() => event?,
            };

            match event {
                LoadEvent::Loaded { index, element } => {
                    if self.window.keeps(&self.state, index) {
                        self.state.loaded_elements.insert(index, element);
                        return Some(ViewEvent::Shown { index });
                    }
                }
                LoadEvent::Retrying { index, .. } => return Some(ViewEvent::Retrying { index }),
                LoadEvent::Dropped { index, error } => {
                    if let Some(item) = self.state.ordered_items.get(index) {
                        tracing::info!(item = %item.id, %error, "removing asset from view");
                        self.failed_locators.insert(item.source_locator.clone());
                    }
                    self.state.loaded_elements.remove(&index);
                    return Some(ViewEvent::Removed { index });
                }
                LoadEvent::Cancelled { .. } => {}
            }
        }
    }

    /// Drive loads until the loader goes idle. Returns the number of elements shown.
    pub async fn settle(&mut self) -> usize {
        let mut shown = 0;
        while let Some(event) = self.pump().await {
            if matches!(event, ViewEvent::Shown { .. }) {
                shown += 1;
            }
        }
        shown
    }

    /// Pull the next page from `source` and fold it into the session.
    ///
    /// Returns the number of new items; 0 once the collection is exhausted.
    pub async fn load_more<P: PageSource + ?Sized>(&mut self, source: &P) -> Result<usize, ViewError> {
        if self.exhausted {
            return Ok(0);
        }

        let page = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ViewError::Cancelled),
            page = source.fetch_page(&self.key, self.next_page, self.config.page_size) => page?,
        };

        self.next_page += 1;
        self.exhausted = !page.has_more;
        Ok(self.extend(page.items))
    }

    /// Cancel everything the session has outstanding and wait for it to stop.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        self.loader.shutdown().await;
    }

    /// Token that tears the session down when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn key(&self) -> &CollectionKey {
        &self.key
    }

    pub fn state(&self) -> &ClientViewState<L::Element> {
        &self.state
    }

    pub fn loader(&self) -> &ProgressiveLoader<L> {
        &self.loader
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_removed(&self, index: usize) -> bool {
        self.state
            .ordered_items
            .get(index)
            .is_some_and(|item| self.failed_locators.contains(&item.source_locator))
    }

    /// Items still part of the presented sequence, with their indices.
    pub fn presented(&self) -> impl Iterator<Item = (usize, &AssetRef)> {
        self.state
            .ordered_items
            .iter()
            .enumerate()
            .filter(|(_, item)| !self.failed_locators.contains(&item.source_locator))
    }
}
