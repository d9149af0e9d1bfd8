//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (REDUCER_*)
//! 2. TOML config file (if REDUCER_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::url::{ResourceKind, UrlCodec};

mod validation;

pub use validation::ConfigError;

/// Which store persists produced artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Files in `cache_dir` only; lost with the machine.
    Local,
    /// SQLite at `db_path` with `cache_dir` as a purged read cache.
    Durable,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (REDUCER_*)
/// 2. TOML config file (if REDUCER_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scheme and host prepended to produced urls; empty for same-origin.
    ///
    /// Set via REDUCER_CONTENT_HOST environment variable.
    #[serde(default)]
    pub content_host: String,

    /// Path segment under which produced artifacts are served.
    ///
    /// Set via REDUCER_VIRTUAL_PATH environment variable.
    #[serde(default = "default_virtual_path")]
    pub virtual_path: String,

    /// Artifact store backend.
    ///
    /// Set via REDUCER_STORE environment variable (`local` or `durable`).
    #[serde(default = "default_store")]
    pub store: StoreBackend,

    /// Path to the SQLite database for the durable store.
    ///
    /// Set via REDUCER_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory for locally written artifacts.
    ///
    /// Set via REDUCER_CACHE_DIR environment variable.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Locally cached files not read for this many seconds are purged.
    ///
    /// Set via REDUCER_PURGE_WINDOW_SECS environment variable.
    #[serde(default = "default_purge_secs")]
    pub purge_window_secs: u64,

    /// Seconds between purge sweeps.
    ///
    /// Set via REDUCER_PURGE_INTERVAL_SECS environment variable.
    #[serde(default = "default_purge_secs")]
    pub purge_interval_secs: u64,

    /// Whether stylesheet links are reduced.
    #[serde(default = "default_true")]
    pub css_enabled: bool,

    /// Whether external scripts are reduced.
    #[serde(default = "default_true")]
    pub javascript_enabled: bool,

    /// User-Agent string used when fetching original resources.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for fetching one original resource, in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Maximum bytes accepted for one original resource.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Number of failed reductions kept for inspection.
    #[serde(default = "default_failure_history")]
    pub failure_history: usize,

    /// Consecutive failed reductions after which a bundle is put on hold.
    ///
    /// Set via REDUCER_MAX_FAILED_ATTEMPTS environment variable.
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,

    /// Seconds a bundle on hold is refused before it may be retried.
    ///
    /// Set via REDUCER_FAILURE_COOLDOWN_SECS environment variable.
    #[serde(default = "default_failure_cooldown_secs")]
    pub failure_cooldown_secs: u64,
}

fn default_virtual_path() -> String {
    "/reduced".into()
}

fn default_store() -> StoreBackend {
    StoreBackend::Durable
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./reducer.sqlite")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./reducer-cache")
}

fn default_purge_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    "reducer/0.1".into()
}

fn default_fetch_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_failure_history() -> usize {
    50
}

fn default_max_failed_attempts() -> u32 {
    3
}

fn default_failure_cooldown_secs() -> u64 {
    600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            content_host: String::new(),
            virtual_path: default_virtual_path(),
            store: default_store(),
            db_path: default_db_path(),
            cache_dir: default_cache_dir(),
            purge_window_secs: default_purge_secs(),
            purge_interval_secs: default_purge_secs(),
            css_enabled: true,
            javascript_enabled: true,
            user_agent: default_user_agent(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_bytes: default_max_bytes(),
            failure_history: default_failure_history(),
            max_failed_attempts: default_max_failed_attempts(),
            failure_cooldown_secs: default_failure_cooldown_secs(),
        }
    }
}

impl AppConfig {
    pub fn purge_window(&self) -> Duration {
        Duration::from_secs(self.purge_window_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_secs(self.failure_cooldown_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Resource kinds the response transformer should rewrite.
    pub fn enabled_kinds(&self) -> Vec<ResourceKind> {
        let mut kinds = Vec::new();
        if self.css_enabled {
            kinds.push(ResourceKind::Css);
        }
        if self.javascript_enabled {
            kinds.push(ResourceKind::JavaScript);
        }
        kinds
    }

    /// Url codec for this content host and virtual path.
    pub fn url_codec(&self) -> UrlCodec {
        UrlCodec::new(&self.content_host, &self.virtual_path)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `REDUCER_`
    /// 2. TOML file from `REDUCER_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("REDUCER_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("REDUCER_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.content_host, "");
        assert_eq!(config.virtual_path, "/reduced");
        assert_eq!(config.store, StoreBackend::Durable);
        assert_eq!(config.db_path, PathBuf::from("./reducer.sqlite"));
        assert_eq!(config.purge_window(), Duration::from_secs(300));
        assert_eq!(config.purge_interval(), Duration::from_secs(300));
        assert_eq!(config.fetch_timeout(), Duration::from_millis(20_000));
        assert_eq!(config.max_failed_attempts, 3);
        assert_eq!(config.failure_cooldown(), Duration::from_secs(600));
        assert_eq!(config.enabled_kinds(), vec![ResourceKind::Css, ResourceKind::JavaScript]);
    }

    #[test]
    fn test_enabled_kinds_respects_flags() {
        let config = AppConfig { javascript_enabled: false, ..Default::default() };
        assert_eq!(config.enabled_kinds(), vec![ResourceKind::Css]);
    }

    #[test]
    fn test_url_codec_from_config() {
        let config = AppConfig { content_host: "http://cdn.example.com".into(), ..Default::default() };
        let codec = config.url_codec();
        assert_eq!(codec.url_for_file_name("f.css"), "http://cdn.example.com/reduced/f.css");
    }

    #[test]
    fn test_load_from_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("REDUCER_STORE", "local");
            jail.set_env("REDUCER_PURGE_WINDOW_SECS", "60");
            jail.set_env("REDUCER_CONTENT_HOST", "http://cdn.example.com");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.store, StoreBackend::Local);
            assert_eq!(config.purge_window_secs, 60);
            assert_eq!(config.content_host, "http://cdn.example.com");
            Ok(())
        });
    }

    #[test]
    fn test_load_from_toml_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("reducer.toml", "virtual_path = \"/assets\"\ncss_enabled = false\n")?;
            jail.set_env("REDUCER_CONFIG_FILE", "reducer.toml");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.virtual_path, "/assets");
            assert!(!config.css_enabled);
            Ok(())
        });
    }
}
