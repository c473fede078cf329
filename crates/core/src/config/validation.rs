//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn check_timeout(field: &str, value_ms: u64) -> Result<(), ConfigError> {
    if value_ms < 100 {
        return Err(invalid(field, "must be at least 100ms"));
    }
    if value_ms > 300_000 {
        return Err(invalid(field, "must not exceed 5 minutes (300000ms)"));
    }
    Ok(())
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - a timeout is below 100ms or above 5 minutes
    /// - `max_download_attempts`, `max_concurrent_loads` or `page_size` is 0
    /// - `user_agent` is empty
    /// - `remote_base_url` is not an absolute http(s) URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_timeout("snapshot_timeout_ms", self.snapshot_timeout_ms)?;
        check_timeout("download_timeout_ms", self.download_timeout_ms)?;

        if self.max_download_attempts == 0 {
            return Err(invalid("max_download_attempts", "must be greater than 0"));
        }
        if self.max_concurrent_loads == 0 {
            return Err(invalid("max_concurrent_loads", "must be greater than 0"));
        }
        if self.page_size == 0 {
            return Err(invalid("page_size", "must be greater than 0"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        match url::Url::parse(&self.remote_base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(_) => return Err(invalid("remote_base_url", "scheme must be http or https")),
            Err(e) => return Err(invalid("remote_base_url", &e.to_string())),
        }

        if self.stale_after_secs == 0 {
            tracing::warn!("stale_after_secs is 0; every request will contact the remote source");
        }

        Ok(())
    }
}
