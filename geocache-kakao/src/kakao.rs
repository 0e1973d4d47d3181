//! Kakao Local client implementation.
//!
//! Only the first document of a search is used; Kakao returns `x` (longitude)
//! and `y` (latitude) as decimal strings.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use geocache_core::constants::{DEFAULT_TIMEOUT_SECS, KAKAO_ADDRESS_SEARCH_URL, KAKAO_AUTH_SCHEME};
use geocache_core::error::{GeocacheError, LookupFailure, Result};
use geocache_core::traits::Geocoder;
use geocache_core::types::{Address, GeoPoint};

/// Kakao client configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct KakaoConfig {
    /// Address search endpoint
    pub endpoint: String,
    /// REST API key, sent as `Authorization: KakaoAK <key>`
    pub api_key: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl std::fmt::Debug for KakaoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KakaoConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl KakaoConfig {
    /// Creates config for the public endpoint with the given REST API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: KAKAO_ADDRESS_SEARCH_URL.into(),
            api_key: api_key.into(),
            timeout_ms: DEFAULT_TIMEOUT_SECS * 1000,
        }
    }

    /// Overrides the endpoint (proxies, mock servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Overrides the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Checks that the key is present and the endpoint is an http(s) URL.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(GeocacheError::ConfigError("Kakao API key not configured".into()));
        }

        let url = url::Url::parse(&self.endpoint).map_err(|e| {
            GeocacheError::ConfigError(format!("invalid endpoint '{}': {}", self.endpoint, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(GeocacheError::ConfigError(format!(
                "endpoint must be http(s), got '{}'",
                url.scheme()
            )));
        }

        if self.timeout_ms == 0 {
            return Err(GeocacheError::ConfigError("timeout must be positive".into()));
        }

        Ok(())
    }
}

/// Geocoder backed by the Kakao Local REST API.
pub struct KakaoGeocoder {
    config: KakaoConfig,
    http_client: reqwest::Client,
}

impl KakaoGeocoder {
    /// Creates a client after validating `config`.
    pub fn with_config(config: KakaoConfig) -> Result<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| GeocacheError::ConfigError(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http_client })
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &KakaoConfig {
        &self.config
    }

    fn classify(&self, err: reqwest::Error) -> LookupFailure {
        if err.is_timeout() {
            LookupFailure::Timeout {
                millis: self.config.timeout_ms,
            }
        } else if err.is_decode() {
            LookupFailure::Malformed(err.to_string())
        } else {
            LookupFailure::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl Geocoder for KakaoGeocoder {
    #[instrument(skip(self), fields(address = %address))]
    async fn geocode(&self, address: &Address) -> std::result::Result<Option<GeoPoint>, LookupFailure> {
        let response = self
            .http_client
            .get(&self.config.endpoint)
            .header(AUTHORIZATION, format!("{} {}", KAKAO_AUTH_SCHEME, self.config.api_key))
            .query(&[("query", address.as_str())])
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LookupFailure::RateLimited);
        }
        if !status.is_success() {
            return Err(LookupFailure::Status(status.as_u16()));
        }

        let body: SearchResponse = response.json().await.map_err(|e| self.classify(e))?;

        let Some(first) = body.documents.into_iter().next() else {
            debug!("No documents for address");
            return Ok(None);
        };

        let point = first.to_point()?;
        debug!(
            matched = first.address_name.as_deref().unwrap_or(""),
            lat = point.lat(),
            lon = point.lon(),
            "Geocoded address"
        );
        Ok(Some(point))
    }

    fn name(&self) -> &str {
        "kakao"
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    documents: Vec<SearchDocument>,
}

#[derive(Debug, Deserialize)]
struct SearchDocument {
    /// Longitude as a decimal string
    x: String,
    /// Latitude as a decimal string
    y: String,
    #[serde(default)]
    address_name: Option<String>,
}

impl SearchDocument {
    fn to_point(&self) -> std::result::Result<GeoPoint, LookupFailure> {
        let lon: f64 = self
            .x
            .trim()
            .parse()
            .map_err(|_| LookupFailure::Malformed(format!("x '{}' is not a number", self.x)))?;
        let lat: f64 = self
            .y
            .trim()
            .parse()
            .map_err(|_| LookupFailure::Malformed(format!("y '{}' is not a number", self.y)))?;
        GeoPoint::new(lat, lon).map_err(|e| LookupFailure::Malformed(e.to_string()))
    }
}
