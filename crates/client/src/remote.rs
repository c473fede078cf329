//! HTTP implementation of the remote collection source.
//!
//! - **Listing**: `GET {base_url}/collections/{key}` returning JSON
//!   (see [`crate::wire::ListingResponse`]).
//! - **Blobs**: `GET {locator}` after canonicalization.
//! - **Status mapping**: 429 is rate limiting, 503 is temporary
//!   unavailability, any other non-success is `Http { status }`.
//!
//! No retries happen here; the sync orchestrator owns retry and backoff.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use std::time::{Duration, Instant};
use url::Url;

use glimmer_core::{AppConfig, CollectionKey, RemoteError, RemoteListing, RemoteSource};

use crate::locator::canonicalize;
use crate::wire::ListingResponse;

/// Configuration for the HTTP remote.
#[derive(Debug, Clone)]
pub struct HttpRemoteConfig {
    /// Base URL of the collection service.
    pub base_url: String,

    /// User agent string (default: "glimmer/0.1")
    pub user_agent: String,

    /// Transport-level timeout for any single request (default: 30s).
    ///
    /// The orchestrator applies its own tighter deadlines on top.
    pub timeout: Duration,
}

impl Default for HttpRemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            user_agent: "glimmer/0.1".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&AppConfig> for HttpRemoteConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.remote_base_url.clone(),
            user_agent: config.user_agent.clone(),
            ..Default::default()
        }
    }
}

/// Map a response status onto the remote error taxonomy.
pub fn classify_status(status: StatusCode) -> Result<(), RemoteError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::TOO_MANY_REQUESTS => Err(RemoteError::RateLimited),
        StatusCode::SERVICE_UNAVAILABLE => Err(RemoteError::Unavailable),
        s => Err(RemoteError::Http { status: s.as_u16() }),
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() { RemoteError::Timeout } else { RemoteError::Network(err.to_string()) }
}

/// Remote source speaking to the collection service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    http: Client,
    base_url: Url,
    config: HttpRemoteConfig,
}

impl HttpRemote {
    /// Create a new remote with the given configuration.
    pub fn new(config: HttpRemoteConfig) -> Result<Self, RemoteError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| RemoteError::InvalidLocator(format!("base url {}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidLocator(format!("base url {} cannot be a base", config.base_url)));
        }

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| RemoteError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, base_url, config })
    }

    /// URL of the listing endpoint for `key`. The key is percent-encoded as one path segment.
    pub fn listing_url(&self, key: &CollectionKey) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("collections").push(key.as_str());
        }
        url
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &HttpRemoteConfig {
        &self.config
    }
}

#[async_trait]
impl RemoteSource for HttpRemote {
    async fn fetch_snapshot(&self, key: &CollectionKey) -> Result<RemoteListing, RemoteError> {
        let start = Instant::now();
        let response = self
            .http
            .get(self.listing_url(key))
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        classify_status(response.status())?;

        let bytes = response.bytes().await.map_err(transport_error)?;
        let raw: ListingResponse = serde_json::from_slice(&bytes).map_err(|e| RemoteError::Parse(e.to_string()))?;
        let listing = RemoteListing::from(raw);

        tracing::debug!("fetched listing with {} items in {:?}", listing.items.len(), start.elapsed());

        Ok(listing)
    }

    async fn fetch_blob(&self, locator: &str) -> Result<Bytes, RemoteError> {
        let start = Instant::now();
        let url = canonicalize(locator)?;

        let response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, "image/*,*/*;q=0.8")
            .send()
            .await
            .map_err(transport_error)?;

        classify_status(response.status())?;

        let bytes = response.bytes().await.map_err(transport_error)?;

        tracing::debug!("fetched {} in {:?} ({} bytes)", url, start.elapsed(), bytes.len());

        Ok(bytes)
    }
}
