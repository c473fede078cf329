//! Client-side presentation of a glimmer collection.
//!
//! This crate provides:
//! - A progressive loader with a fixed concurrency budget and one retry per asset
//! - Seeded shuffling of the presented order
//! - A sliding memory window with hysteresis
//! - View sessions tying the above to paging and a single cancellation token

pub mod loader;
pub mod session;
pub mod shuffle;
pub mod source;
pub mod window;

pub use loader::{AssetLoader, LoadError, LoadEvent, ProgressiveLoader};
pub use session::{ViewConfig, ViewEvent, ViewSession};
pub use shuffle::{permutation, session_seed, shuffled};
pub use source::{PageSource, StoreAssetLoader, ViewError};
pub use window::{ClientViewState, WindowChange, WindowConfig, WindowController};
