//! Environment configuration for the `geocache` binary.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use geocache_batch::{BatchConfig, PersistMode};
use geocache_core::constants::{
    DEFAULT_CACHE_FILE, DEFAULT_MAX_WORKERS, DEFAULT_REQUEST_DELAY_MS, DEFAULT_TIMEOUT_SECS,
    KAKAO_ADDRESS_SEARCH_URL,
};
use geocache_core::types::{Coordinate, GeoPoint};
use geocache_kakao::KakaoConfig;
use geocache_resolver::ResolverConfig;
use geocache_store::CorruptPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub cache_file: PathBuf,
    pub max_workers: usize,
    pub delay_ms: u64,
    pub timeout_secs: u64,
    pub fallback: Coordinate,
    pub persist: PersistMode,
    pub on_corrupt: CorruptPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: KAKAO_ADDRESS_SEARCH_URL.into(),
            cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
            max_workers: DEFAULT_MAX_WORKERS,
            delay_ms: DEFAULT_REQUEST_DELAY_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            fallback: Coordinate::Unresolved,
            persist: PersistMode::default(),
            on_corrupt: CorruptPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            api_key: get("KAKAO_API_KEY"),
            endpoint: get("KAKAO_ENDPOINT").unwrap_or(defaults.endpoint),
            cache_file: get("GEOCACHE_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_file),
            max_workers: parse_var(get("GEOCACHE_MAX_WORKERS"), "GEOCACHE_MAX_WORKERS")?
                .unwrap_or(defaults.max_workers),
            delay_ms: parse_var(get("GEOCACHE_DELAY_MS"), "GEOCACHE_DELAY_MS")?
                .unwrap_or(defaults.delay_ms),
            timeout_secs: parse_var(get("GEOCACHE_TIMEOUT_SECS"), "GEOCACHE_TIMEOUT_SECS")?
                .unwrap_or(defaults.timeout_secs),
            fallback: match get("GEOCACHE_FALLBACK") {
                Some(raw) => parse_fallback(&raw).context("GEOCACHE_FALLBACK")?,
                None => defaults.fallback,
            },
            persist: match get("GEOCACHE_PERSIST") {
                Some(raw) => raw.parse().context("GEOCACHE_PERSIST")?,
                None => defaults.persist,
            },
            on_corrupt: match get("GEOCACHE_ON_CORRUPT") {
                Some(raw) => raw.parse().context("GEOCACHE_ON_CORRUPT")?,
                None => defaults.on_corrupt,
            },
        })
    }

    pub fn kakao(&self) -> Result<KakaoConfig> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("KAKAO_API_KEY is not set (use --api-key or the environment)"))?;

        Ok(KakaoConfig::new(api_key)
            .with_endpoint(self.endpoint.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs)))
    }

    pub fn resolver(&self) -> ResolverConfig {
        ResolverConfig::new()
            .fallback(self.fallback)
            .timeout(Duration::from_secs(self.timeout_secs))
    }

    pub fn batch(&self) -> BatchConfig {
        BatchConfig::new()
            .max_workers(self.max_workers)
            .per_request_delay(Duration::from_millis(self.delay_ms))
            .persist(self.persist)
    }
}

fn parse_var<T>(raw: Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|v| v.parse::<T>().map_err(|e| anyhow!("{}: invalid value '{}': {}", key, v, e)))
        .transpose()
}

/// Parses `none`, `korea-center`, or `lat,lon`.
pub fn parse_fallback(raw: &str) -> Result<Coordinate> {
    let value = raw.trim();
    match value.to_ascii_lowercase().as_str() {
        "none" | "null" | "unresolved" => return Ok(Coordinate::Unresolved),
        "korea-center" | "center" => return Ok(Coordinate::Resolved(GeoPoint::korea_center())),
        _ => {}
    }

    let (lat, lon) = value
        .split_once(',')
        .ok_or_else(|| anyhow!("expected 'none', 'korea-center', or 'lat,lon', got '{}'", value))?;
    let lat: f64 = lat.trim().parse().with_context(|| format!("latitude '{}'", lat.trim()))?;
    let lon: f64 = lon.trim().parse().with_context(|| format!("longitude '{}'", lon.trim()))?;

    Ok(Coordinate::resolved(lat, lon)?)
}
