//! Core types and the synchronization engine for glimmer.
//!
//! This crate provides:
//! - Content-addressed store with filesystem and in-memory backends
//! - Delta resolution between remote listings and cached snapshots
//! - The sync orchestrator with per-collection coalescing
//! - Deterministic pagination
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod delta;
pub mod error;
pub mod model;
pub mod pages;
pub mod remote;
pub mod store;
pub mod sync;

pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use model::{AssetRef, CollectionKey, CollectionMeta, CollectionSnapshot, RemoteListing};
pub use pages::{Page, paginate};
pub use remote::{RemoteError, RemoteSource};
pub use store::{AssetKey, CollectionId, ContentStore, FsStore, MemoryStore};
pub use sync::{SyncConfig, SyncMode, SyncOrchestrator, SyncOutcome, SyncReport};
