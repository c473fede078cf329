//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (GLIMMER_*)
//! 2. TOML config file (if GLIMMER_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::sync::{Backoff, DownloadPolicy, SyncConfig};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (GLIMMER_*)
/// 2. TOML config file (if GLIMMER_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory of the content-addressed store.
    ///
    /// Set via GLIMMER_STORE_ROOT environment variable.
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,

    /// Base URL of the remote collection service.
    ///
    /// Set via GLIMMER_REMOTE_BASE_URL environment variable.
    #[serde(default = "default_remote_base_url")]
    pub remote_base_url: String,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via GLIMMER_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Snapshots this old (in seconds) are refreshed before being served.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Deadline for one remote listing fetch, in milliseconds.
    #[serde(default = "default_snapshot_timeout_ms")]
    pub snapshot_timeout_ms: u64,

    /// Deadline for one blob download attempt, in milliseconds.
    #[serde(default = "default_download_timeout_ms")]
    pub download_timeout_ms: u64,

    #[serde(default = "default_max_download_attempts")]
    pub max_download_attempts: u32,

    /// First retry delay; doubles with every attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Extra delay per attempt when the remote signals throttling.
    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,

    /// Pause after each successful download.
    #[serde(default = "default_inter_download_delay_ms")]
    pub inter_download_delay_ms: u64,

    /// Collections not accessed for this many days are evicted.
    #[serde(default = "default_evict_after_days")]
    pub evict_after_days: u64,

    /// Viewer: simultaneous asset loads.
    #[serde(default = "default_max_concurrent_loads")]
    pub max_concurrent_loads: usize,

    /// Viewer: elements kept behind the current position.
    #[serde(default = "default_window_back")]
    pub window_back: usize,

    /// Viewer: elements kept ahead of the current position.
    #[serde(default = "default_window_forward")]
    pub window_forward: usize,

    /// Viewer: extra slack before out-of-window elements are evicted.
    #[serde(default = "default_window_margin")]
    pub window_margin: usize,

    /// Items per listing page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_store_root() -> PathBuf {
    PathBuf::from("./glimmer-store")
}

fn default_remote_base_url() -> String {
    "http://127.0.0.1:8080".into()
}

fn default_user_agent() -> String {
    "glimmer/0.1".into()
}

fn default_stale_after_secs() -> u64 {
    24 * 60 * 60
}

fn default_snapshot_timeout_ms() -> u64 {
    15_000
}

fn default_download_timeout_ms() -> u64 {
    10_000
}

fn default_max_download_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_rate_limit_backoff_ms() -> u64 {
    5_000
}

fn default_inter_download_delay_ms() -> u64 {
    1_000
}

fn default_evict_after_days() -> u64 {
    30
}

fn default_max_concurrent_loads() -> usize {
    4
}

fn default_window_back() -> usize {
    5
}

fn default_window_forward() -> usize {
    20
}

fn default_window_margin() -> usize {
    5
}

fn default_page_size() -> usize {
    50
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_root: default_store_root(),
            remote_base_url: default_remote_base_url(),
            user_agent: default_user_agent(),
            stale_after_secs: default_stale_after_secs(),
            snapshot_timeout_ms: default_snapshot_timeout_ms(),
            download_timeout_ms: default_download_timeout_ms(),
            max_download_attempts: default_max_download_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            rate_limit_backoff_ms: default_rate_limit_backoff_ms(),
            inter_download_delay_ms: default_inter_download_delay_ms(),
            evict_after_days: default_evict_after_days(),
            max_concurrent_loads: default_max_concurrent_loads(),
            window_back: default_window_back(),
            window_forward: default_window_forward(),
            window_margin: default_window_margin(),
            page_size: default_page_size(),
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `GLIMMER_`
    /// 2. TOML file from `GLIMMER_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("GLIMMER_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("GLIMMER_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Remote listing deadline as Duration.
    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }

    /// Idle time after which a collection is evicted.
    pub fn evict_after(&self) -> Duration {
        Duration::from_secs(self.evict_after_days.saturating_mul(24 * 60 * 60))
    }

    /// Project the flat settings into the orchestrator's config.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            stale_after: Duration::from_secs(self.stale_after_secs),
            snapshot_timeout: self.snapshot_timeout(),
            download: DownloadPolicy {
                max_attempts: self.max_download_attempts,
                attempt_timeout: Duration::from_millis(self.download_timeout_ms),
                backoff: Backoff {
                    base: Duration::from_millis(self.backoff_base_ms),
                    throttle_step: Duration::from_millis(self.rate_limit_backoff_ms),
                },
                pace: Duration::from_millis(self.inter_download_delay_ms),
            },
        }
    }
}
