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

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `virtual_path` does not start with `/`
    /// - `content_host` is set but is not an http(s) origin
    /// - either purge duration is 0
    /// - `fetch_timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `user_agent` is empty
    /// - `max_failed_attempts` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.virtual_path.starts_with('/') {
            return Err(ConfigError::Invalid { field: "virtual_path".into(), reason: "must start with '/'".into() });
        }

        if !self.content_host.is_empty()
            && !(self.content_host.starts_with("http://") || self.content_host.starts_with("https://"))
        {
            return Err(ConfigError::Invalid {
                field: "content_host".into(),
                reason: "must be empty or start with http:// or https://".into(),
            });
        }

        if self.purge_window_secs == 0 {
            return Err(ConfigError::Invalid { field: "purge_window_secs".into(), reason: "must be greater than 0".into() });
        }
        if self.purge_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "purge_interval_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.fetch_timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "fetch_timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.fetch_timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "fetch_timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.max_failed_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_failed_attempts".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.content_host.ends_with('/') {
            tracing::warn!(content_host = %self.content_host, "trailing '/' on content_host is ignored");
        }

        Ok(())
    }
}
