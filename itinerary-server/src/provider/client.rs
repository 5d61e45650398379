//! Schedule provider HTTP client.
//!
//! Provides async methods for fetching raw route payloads. Handles
//! optional API-key authentication and concurrency limiting; rate-limit
//! retries are the caller's concern (see `cache::RetryPolicy`).

use std::sync::Arc;

use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderValue};
use tokio::sync::Semaphore;
use tracing::debug;

use super::ScheduleProvider;
use super::error::ProviderError;

/// Default base URL for the schedule API.
const DEFAULT_BASE_URL: &str = "https://schedules.carrismetropolitana.pt/api";

/// Default maximum concurrent requests.
const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Configuration for the provider client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Optional API key, sent as `x-apikey`
    pub api_key: Option<String>,
    /// Base URL for the API
    pub base_url: String,
    /// Maximum concurrent requests
    pub max_concurrent: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Create a config pointing at the production API without credentials.
    pub fn new() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout_secs: 30,
        }
    }

    /// Set an API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set maximum concurrent requests.
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP client for the schedule provider.
///
/// Uses a semaphore to limit concurrent requests and avoid rate limiting.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: Url,
    semaphore: Arc<Semaphore>,
}

impl ProviderClient {
    /// Create a new provider client with the given configuration.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();

        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(key).map_err(|_| ProviderError::Other {
                status: 0,
                message: "Invalid API key format".to_string(),
            })?;
            headers.insert("x-apikey", value);
        }

        let base_url = Url::parse(&config.base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ProviderError::Other {
                status: 0,
                message: format!("Invalid base URL {:?}", config.base_url),
            })?;

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        })
    }

    fn summary_url(&self) -> Url {
        self.endpoint(&["routes", "summary"])
    }

    /// Route keys are free text; each one becomes a single encoded segment.
    fn detail_url(&self, route_key: &str) -> Url {
        self.endpoint(&["routes", "route_short_name", route_key])
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked to be a base URL in `new`, so the segments are editable
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GET a URL and return its body, mapping HTTP statuses to provider errors.
    async fn get_bytes(&self, url: Url) -> Result<Vec<u8>, ProviderError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ProviderError::Other {
                status: 0,
                message: "Semaphore closed".to_string(),
            })?;

        debug!(url = %url, "provider request");
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotAvailable);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Other {
                status: status.as_u16(),
                message: body.chars().take(500).collect(),
            });
        }

        let body = response.bytes().await?;

        // The provider answers unknown keys with an empty body or `null`
        if is_empty_payload(&body) {
            return Err(ProviderError::NotAvailable);
        }

        Ok(body.to_vec())
    }
}

impl ScheduleProvider for ProviderClient {
    async fn get_route_summary(&self) -> Result<Vec<u8>, ProviderError> {
        self.get_bytes(self.summary_url()).await
    }

    async fn get_route_detail(&self, route_key: &str) -> Result<Vec<u8>, ProviderError> {
        self.get_bytes(self.detail_url(route_key)).await
    }
}

fn is_empty_payload(body: &[u8]) -> bool {
    let trimmed = body.trim_ascii();
    trimmed.is_empty() || trimmed == b"null"
}
