//! HTTP fetch pipeline for original resources.
//!
//! ### URL Canonicalization
//! - Trim whitespace, ensure scheme (default: `https`)
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### Limits
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//! - Request timeout: 20s (configurable)

pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use reqwest::{Client, StatusCode, header};
use std::time::{Duration, Instant};

pub use url::{UrlError, canonicalize};

use reducer_core::{AppConfig, Error};

/// Source of original resource text for the reducing queue.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "reducer/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "reducer/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.fetch_timeout(),
            ..Self::default()
        }
    }
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The original URL requested
    pub url: Url,
    /// The final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Content-Type header
    pub content_type: Option<String>,
    /// Response body bytes
    pub bytes: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

/// HTTP fetch client with size and redirect limits.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Fetch(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Fetch a URL, returning raw bytes and metadata.
    pub async fn fetch(&self, url_str: &str) -> Result<FetchResponse, Error> {
        let start = Instant::now();
        let url = canonicalize(url_str).map_err(|e| Error::InvalidInput(e.to_string()))?;

        let response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, "text/css,application/javascript,*/*;q=0.1")
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("network error for {url}: {e}")))?;

        let status = response.status();

        if !status.is_success() {
            return Err(Error::Fetch(format!("{url} returned status {}", status.as_u16())));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::Fetch(format!("{url}: {len} bytes exceeds {}", self.config.max_bytes)));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Fetch(format!("failed to read {url}: {e}")))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::Fetch(format!("{url}: {} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!("fetched {} -> {} in {}ms ({} bytes)", url, final_url, fetch_ms, bytes.len());

        Ok(FetchResponse { url, final_url, status, content_type, bytes, fetch_ms })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl ResourceFetcher for FetchClient {
    async fn fetch_text(&self, url: &str) -> Result<String, Error> {
        let response = self.fetch(url).await?;
        Ok(String::from_utf8_lossy(&response.bytes).into_owned())
    }
}
