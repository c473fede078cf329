//! The two capabilities the sync engine consumes from a remote source.

use async_trait::async_trait;
use bytes::Bytes;

use crate::model::{CollectionKey, RemoteListing};

/// Failures talking to the remote source.
///
/// These never leave the sync orchestrator; they are absorbed into
/// fallback/unavailable outcomes or "missing, retry next sync".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The call did not complete within its deadline.
    #[error("remote timeout")]
    Timeout,

    /// The source asked us to slow down (HTTP 429).
    #[error("rate limited")]
    RateLimited,

    /// The source is temporarily unavailable (HTTP 503).
    #[error("temporarily unavailable")]
    Unavailable,

    /// Any other non-success status.
    #[error("HTTP error: {status}")]
    Http { status: u16 },

    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// The locator is not something we are willing to fetch.
    #[error("invalid locator: {0}")]
    InvalidLocator(String),
}

impl RemoteError {
    /// Throttling signals get the extended backoff on top of the normal schedule.
    pub fn is_throttled(&self) -> bool {
        matches!(self, RemoteError::RateLimited | RemoteError::Unavailable)
    }
}

/// Remote access used by [`crate::sync::SyncOrchestrator`].
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch the full current listing of a collection.
    async fn fetch_snapshot(&self, key: &CollectionKey) -> Result<RemoteListing, RemoteError>;

    /// Fetch one asset's bytes. Callers own retry and backoff.
    async fn fetch_blob(&self, locator: &str) -> Result<Bytes, RemoteError>;
}
