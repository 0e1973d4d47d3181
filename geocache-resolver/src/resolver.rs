//! Cache-first resolver.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use geocache_cache::{CoordinateCache, InsertOutcome};
use geocache_core::constants::DEFAULT_TIMEOUT_SECS;
use geocache_core::error::LookupFailure;
use geocache_core::traits::Geocoder;
use geocache_core::types::{Address, Coordinate};

/// Resolver configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Stored and returned when no coordinate could be obtained
    pub fallback: Coordinate,
    /// Upper bound on a single remote lookup, in milliseconds
    pub timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fallback: Coordinate::Unresolved,
            timeout_ms: DEFAULT_TIMEOUT_SECS * 1000,
        }
    }
}

impl ResolverConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fallback coordinate.
    pub fn fallback(mut self, fallback: Coordinate) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sets the per-lookup timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Returns the per-lookup timeout as a `Duration`.
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Why the fallback coordinate was used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FallbackReason {
    /// The service answered with zero candidates.
    NoResults,
    /// The lookup failed.
    Failure(LookupFailure),
}

impl FallbackReason {
    /// Stable label for logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            FallbackReason::NoResults => "no_results",
            FallbackReason::Failure(failure) => failure.kind(),
        }
    }
}

/// Where a resolved coordinate came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// Served from the cache without a remote call.
    Cache,
    /// The remote service returned a candidate.
    Remote,
    /// The fallback was substituted.
    Fallback(FallbackReason),
}

/// Outcome of a single resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    /// The address that was resolved
    pub address: Address,
    /// The coordinate now cached for the address
    pub coordinate: Coordinate,
    /// How the coordinate was obtained
    pub source: Source,
}

/// Resolver counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    /// Lookups served from cache
    pub cache_hits: u64,
    /// Remote lookups that returned a candidate
    pub remote_successes: u64,
    /// Remote lookups that returned zero candidates
    pub no_results: u64,
    /// Failed remote lookups by failure kind
    pub failures: BTreeMap<String, u64>,
}

impl ResolverStats {
    /// Total remote calls made.
    pub fn remote_calls(&self) -> u64 {
        self.remote_successes + self.no_results + self.total_failures()
    }

    /// Total failed remote calls.
    pub fn total_failures(&self) -> u64 {
        self.failures.values().sum()
    }

    fn record(&mut self, source: &Source) {
        match source {
            Source::Cache => self.cache_hits += 1,
            Source::Remote => self.remote_successes += 1,
            Source::Fallback(FallbackReason::NoResults) => self.no_results += 1,
            Source::Fallback(FallbackReason::Failure(failure)) => {
                *self.failures.entry(failure.kind().to_string()).or_default() += 1;
            }
        }
    }
}

/// Resolves addresses through a cache, calling the geocoder only on misses.
pub struct Resolver {
    geocoder: Arc<dyn Geocoder>,
    config: ResolverConfig,
    stats: RwLock<ResolverStats>,
}

impl Resolver {
    /// Creates a resolver with default configuration.
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self::with_config(geocoder, ResolverConfig::default())
    }

    /// Creates a resolver with custom configuration.
    pub fn with_config(geocoder: Arc<dyn Geocoder>, config: ResolverConfig) -> Self {
        Self {
            geocoder,
            config,
            stats: RwLock::new(ResolverStats::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Returns a copy of the counters.
    pub fn stats(&self) -> ResolverStats {
        self.stats.read().clone()
    }

    /// Resolves an address, returning only the coordinate.
    pub async fn resolve(&self, address: &Address, cache: &CoordinateCache) -> Coordinate {
        self.resolve_detailed(address, cache).await.coordinate
    }

    /// Resolves an address and reports how the coordinate was obtained.
    #[instrument(skip(self, cache), fields(address = %address))]
    pub async fn resolve_detailed(&self, address: &Address, cache: &CoordinateCache) -> Resolution {
        if let Some(coordinate) = cache.get(address.as_str()) {
            debug!(coord = %coordinate, "Cache hit");
            return self.finish(address, coordinate, Source::Cache);
        }

        let (candidate, source) = match self.lookup(address).await {
            Ok(Some(point)) => (Coordinate::Resolved(point), Source::Remote),
            Ok(None) => {
                debug!(geocoder = self.geocoder.name(), "No candidates, using fallback");
                (self.config.fallback, Source::Fallback(FallbackReason::NoResults))
            }
            Err(failure) => {
                warn!(
                    geocoder = self.geocoder.name(),
                    kind = failure.kind(),
                    error = %failure,
                    "Lookup failed, using fallback"
                );
                (self.config.fallback, Source::Fallback(FallbackReason::Failure(failure)))
            }
        };

        match cache.insert_if_absent(address.clone(), candidate) {
            InsertOutcome::Inserted => self.finish(address, candidate, source),
            InsertOutcome::AlreadyPresent(existing) => {
                debug!(coord = %existing, "Another writer cached the address first");
                self.finish(address, existing, Source::Cache)
            }
        }
    }

    async fn lookup(&self, address: &Address) -> Result<Option<geocache_core::types::GeoPoint>, LookupFailure> {
        match tokio::time::timeout(self.config.timeout_duration(), self.geocoder.geocode(address)).await {
            Ok(result) => result,
            Err(_) => Err(LookupFailure::Timeout {
                millis: self.config.timeout_ms,
            }),
        }
    }

    fn finish(&self, address: &Address, coordinate: Coordinate, source: Source) -> Resolution {
        self.stats.write().record(&source);
        Resolution {
            address: address.clone(),
            coordinate,
            source,
        }
    }
}
