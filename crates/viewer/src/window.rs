//! Sliding memory window around the current viewing position.
//!
//! Two nested ranges drive the window:
//!
//! - **resident**: `[current - back, current + forward]`, elements that must exist
//! - **retained**: resident widened by `margin` on both sides; anything
//!   loaded outside it is evicted
//!
//! The gap between the two keeps elements from churning while the index
//! moves back and forth by one.

use std::collections::BTreeMap;
use std::ops::Range;

use glimmer_core::AssetRef;

/// Window extents, in items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub back: usize,
    pub forward: usize,
    pub margin: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { back: 5, forward: 20, margin: 5 }
    }
}

impl WindowConfig {
    /// Indices that must be loaded around `current`, clamped to `len`.
    pub fn resident(&self, current: usize, len: usize) -> Range<usize> {
        span(current, self.back, self.forward, len)
    }

    /// Indices whose elements may stay in memory around `current`.
    pub fn retained(&self, current: usize, len: usize) -> Range<usize> {
        span(current, self.back.saturating_add(self.margin), self.forward.saturating_add(self.margin), len)
    }
}

fn span(current: usize, back: usize, forward: usize, len: usize) -> Range<usize> {
    let start = current.saturating_sub(back).min(len);
    let end = current.saturating_add(forward).saturating_add(1).min(len);
    start..end.max(start)
}

/// Presentation state of one viewing session.
#[derive(Debug)]
pub struct ClientViewState<E> {
    pub ordered_items: Vec<AssetRef>,
    pub current_index: usize,
    /// Resident range as of the last window refresh.
    pub window_start: usize,
    pub window_end: usize,
    pub loaded_elements: BTreeMap<usize, E>,
}

impl<E> Default for ClientViewState<E> {
    fn default() -> Self {
        Self {
            ordered_items: Vec::new(),
            current_index: 0,
            window_start: 0,
            window_end: 0,
            loaded_elements: BTreeMap::new(),
        }
    }
}

/// What a window refresh asks the loader to do.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct WindowChange {
    /// Resident indices without an element, in ascending order.
    pub to_load: Vec<usize>,
    /// Indices whose elements were dropped from memory.
    pub evicted: Vec<usize>,
}

/// Moves the window and evicts what falls outside it.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowController {
    config: WindowConfig,
}

impl WindowController {
    pub fn new(config: WindowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Set the viewing position to `current` (clamped to the list) and
    /// recompute the window.
    pub fn advance<E>(&self, state: &mut ClientViewState<E>, current: usize) -> WindowChange {
        let len = state.ordered_items.len();
        state.current_index = current.min(len.saturating_sub(1));

        let resident = self.config.resident(state.current_index, len);
        let retained = self.config.retained(state.current_index, len);
        state.window_start = resident.start;
        state.window_end = resident.end;

        let evicted: Vec<usize> =
            state.loaded_elements.keys().copied().filter(|index| !retained.contains(index)).collect();
        for index in &evicted {
            state.loaded_elements.remove(index);
        }

        let to_load = resident.filter(|index| !state.loaded_elements.contains_key(index)).collect();

        WindowChange { to_load, evicted }
    }

    /// Whether an element for `index` may be kept at the current position.
    pub fn keeps<E>(&self, state: &ClientViewState<E>, index: usize) -> bool {
        self.config.retained(state.current_index, state.ordered_items.len()).contains(&index)
    }
}
