//! Sequential download loop with bounded retry.
//!
//! Downloads run one at a time against a single external rate limit. Each
//! asset gets `max_attempts` tries with exponential backoff; throttling
//! responses add `throttle_step * attempt` on top. After every successful
//! download the loop pauses for `pace` before starting the next asset.
//! An asset that exhausts its tries is recorded and skipped.

use std::time::Duration;

use crate::Error;
use crate::model::AssetRef;
use crate::remote::{RemoteError, RemoteSource};
use crate::store::ContentStore;

/// Delay schedule between tries of one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub throttle_step: Duration,
}

impl Backoff {
    /// Delay after failed try number `attempt` (1-based).
    pub fn delay(&self, attempt: u32, throttled: bool) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let mut delay = self.base.saturating_mul(factor);
        if throttled {
            delay = delay.saturating_add(self.throttle_step.saturating_mul(attempt));
        }
        delay
    }
}

/// Per-cycle download policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff: Backoff,
    /// Pause after each successful download.
    pub pace: Duration,
}

/// One asset that could not be fetched this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDownload {
    pub locator: String,
    pub error: RemoteError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DownloadTally {
    pub downloaded: usize,
    pub failed: Vec<FailedDownload>,
}

pub(crate) struct Downloader<'a> {
    pub remote: &'a dyn RemoteSource,
    pub store: &'a dyn ContentStore,
    pub policy: DownloadPolicy,
}

impl Downloader<'_> {
    /// Download every item. Only store failures abort the loop.
    pub async fn run(&self, items: &[AssetRef]) -> Result<DownloadTally, Error> {
        let mut tally = DownloadTally::default();

        for (position, item) in items.iter().enumerate() {
            match self.fetch_with_retry(&item.source_locator).await {
                Ok(bytes) => {
                    let size = bytes.len();
                    self.store.put(&item.key(), bytes).await?;
                    tally.downloaded += 1;
                    tracing::debug!(id = %item.id, size, "downloaded asset");

                    if position + 1 < items.len() && !self.policy.pace.is_zero() {
                        tokio::time::sleep(self.policy.pace).await;
                    }
                }
                Err(error) => {
                    tracing::warn!(id = %item.id, %error, "asset download failed, will retry next sync");
                    tally.failed.push(FailedDownload { locator: item.source_locator.clone(), error });
                }
            }
        }

        Ok(tally)
    }

    async fn fetch_with_retry(&self, locator: &str) -> Result<bytes::Bytes, RemoteError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.policy.attempt_timeout, self.remote.fetch_blob(locator)).await {
                Ok(result) => result,
                Err(_) => Err(RemoteError::Timeout),
            };

            let error = match result {
                Ok(bytes) => return Ok(bytes),
                Err(error) => error,
            };

            if attempt >= max_attempts {
                return Err(error);
            }

            let delay = self.policy.backoff.delay(attempt, error.is_throttled());
            tracing::debug!(attempt, ?delay, %error, "retrying asset download");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
