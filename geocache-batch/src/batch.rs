//! Bounded-concurrency batch resolution.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use geocache_cache::CacheHandle;
use geocache_core::constants::{DEFAULT_MAX_WORKERS, DEFAULT_PROGRESS_INTERVAL, DEFAULT_REQUEST_DELAY_MS};
use geocache_core::error::{GeocacheError, Result};
use geocache_core::traits::CacheStore;
use geocache_core::types::Address;
use geocache_resolver::{FallbackReason, Resolution, Resolver, Source};

use crate::progress::{BatchProgress, CancelHandle, ProgressCallback};

/// When the orchestrator writes the cache back to its store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistMode {
    /// Once, after every lookup has finished.
    #[default]
    EndOfBatch,
    /// After each completed lookup, and once more at the end if needed.
    EveryWrite,
}

impl FromStr for PersistMode {
    type Err = GeocacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batch" | "end-of-batch" | "end_of_batch" => Ok(PersistMode::EndOfBatch),
            "every-write" | "every_write" | "write" => Ok(PersistMode::EveryWrite),
            other => Err(GeocacheError::ConfigError(format!(
                "unknown persist mode '{}'",
                other
            ))),
        }
    }
}

/// Batch configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum lookups in flight
    pub max_workers: usize,
    /// Pause after each submission, in milliseconds
    pub per_request_delay_ms: u64,
    /// When to save
    pub persist: PersistMode,
    /// Completions between progress callbacks
    pub progress_interval: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            per_request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            persist: PersistMode::default(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl BatchConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker count. Zero is treated as one.
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    /// Sets the pause after each submission.
    pub fn per_request_delay(mut self, delay: Duration) -> Self {
        self.per_request_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Sets the persist mode.
    pub fn persist(mut self, mode: PersistMode) -> Self {
        self.persist = mode;
        self
    }

    /// Sets how often progress is reported. Zero is treated as one.
    pub fn progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    fn delay(&self) -> Duration {
        Duration::from_millis(self.per_request_delay_ms)
    }
}

/// Batch result summary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Distinct addresses requested
    pub requested: u64,
    /// Addresses already cached before the run
    pub already_cached: u64,
    /// Remote lookups performed
    pub fetched: u64,
    /// Lookups that produced a coordinate
    pub resolved: u64,
    /// Lookups that stored the fallback
    pub fallbacks: u64,
    /// Fallbacks by reason (`no_results` or a failure kind)
    pub fallback_reasons: BTreeMap<String, u64>,
    /// Addresses never submitted because the run was cancelled
    pub skipped: u64,
    /// Whether the run was cancelled
    pub cancelled: bool,
    /// Number of saves performed
    pub saves: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl BatchSummary {
    /// Lookup rate in lookups per second.
    pub fn rate(&self) -> f64 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        (self.fetched as f64 / self.duration_ms as f64) * 1000.0
    }

    /// Fallbacks caused by lookup failures (excludes empty results).
    pub fn failures(&self) -> u64 {
        self.fallback_reasons
            .iter()
            .filter(|(reason, _)| reason.as_str() != "no_results")
            .map(|(_, count)| count)
            .sum()
    }

    fn record(&mut self, resolution: &Resolution) {
        match &resolution.source {
            // Another writer cached it after filtering.
            Source::Cache => self.already_cached += 1,
            Source::Remote => {
                self.fetched += 1;
                self.resolved += 1;
            }
            Source::Fallback(reason) => {
                self.fetched += 1;
                self.fallbacks += 1;
                *self.fallback_reasons.entry(reason.kind().to_string()).or_default() += 1;
            }
        }
    }

    fn record_task_failure(&mut self) {
        self.fetched += 1;
        self.fallbacks += 1;
        *self.fallback_reasons.entry("task_failed".to_string()).or_default() += 1;
    }
}

/// Resolves many addresses concurrently and persists the cache.
pub struct BatchResolver {
    resolver: Arc<Resolver>,
    store: Arc<dyn CacheStore>,
    config: BatchConfig,
    cancel: CancelHandle,
}

impl BatchResolver {
    /// Creates a batch resolver with default configuration.
    pub fn new(resolver: Arc<Resolver>, store: Arc<dyn CacheStore>) -> Self {
        Self::with_config(resolver, store, BatchConfig::default())
    }

    /// Creates a batch resolver with custom configuration.
    pub fn with_config(resolver: Arc<Resolver>, store: Arc<dyn CacheStore>, config: BatchConfig) -> Self {
        Self {
            resolver,
            store,
            config,
            cancel: CancelHandle::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Returns a handle that stops this resolver's runs.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Resolves every address not already cached, then saves the cache.
    pub async fn resolve_batch(&self, addresses: &[Address], cache: &CacheHandle) -> Result<BatchSummary> {
        self.run(addresses, cache, None).await
    }

    /// Like [`resolve_batch`](Self::resolve_batch), reporting progress.
    pub async fn resolve_batch_with_progress(
        &self,
        addresses: &[Address],
        cache: &CacheHandle,
        progress_callback: ProgressCallback,
    ) -> Result<BatchSummary> {
        self.run(addresses, cache, Some(progress_callback)).await
    }

    async fn run(
        &self,
        addresses: &[Address],
        cache: &CacheHandle,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<BatchSummary> {
        let result = self.dispatch(addresses, cache, progress_callback).await;
        // A cancellation ends one run only.
        self.cancel.reset();
        result
    }

    #[instrument(skip_all, fields(requested = addresses.len(), workers = self.config.max_workers))]
    async fn dispatch(
        &self,
        addresses: &[Address],
        cache: &CacheHandle,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<BatchSummary> {
        let start = Instant::now();
        let mut summary = BatchSummary::default();

        let mut seen = HashSet::with_capacity(addresses.len());
        let unique: Vec<&Address> = addresses.iter().filter(|a| seen.insert(a.as_str())).collect();
        let pending = cache.missing(unique.iter().copied());

        summary.requested = unique.len() as u64;
        summary.already_cached = summary.requested - pending.len() as u64;

        if pending.is_empty() {
            info!(cached = summary.already_cached, "All addresses cached; nothing to fetch");
            summary.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(summary);
        }

        info!(
            pending = pending.len(),
            cached = summary.already_cached,
            "Starting batch"
        );

        let mut progress = BatchProgress::new(pending.len() as u64);
        let mut completed = 0u64;
        let mut reported = None;
        let mut report = |completed: u64, fallbacks: u64| {
            if reported == Some(completed) {
                return;
            }
            reported = Some(completed);
            if let Some(callback) = &progress_callback {
                progress.update(completed, fallbacks, start.elapsed().as_millis() as u64);
                callback(progress.clone());
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut tasks: JoinSet<Resolution> = JoinSet::new();
        let delay = self.config.delay();
        let total = pending.len();

        for (submitted, address) in pending.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                summary.cancelled = true;
                summary.skipped = (total - submitted) as u64;
                warn!(skipped = summary.skipped, "Batch cancelled; waiting for in-flight lookups");
                break;
            };

            let resolver = Arc::clone(&self.resolver);
            let task_cache = Arc::clone(cache);
            tasks.spawn(async move {
                let _permit = permit;
                resolver.resolve_detailed(&address, &task_cache).await
            });

            while let Some(joined) = tasks.try_join_next() {
                self.complete(joined, cache, &mut summary).await?;
                completed += 1;
                if completed % self.config.progress_interval == 0 {
                    report(completed, summary.fallbacks);
                }
            }

            if !delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.complete(joined, cache, &mut summary).await?;
            completed += 1;
            if completed % self.config.progress_interval == 0 {
                report(completed, summary.fallbacks);
            }
        }

        if cache.is_dirty() {
            self.persist(cache, &mut summary).await?;
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        report(completed, summary.fallbacks);

        info!(
            fetched = summary.fetched,
            resolved = summary.resolved,
            fallbacks = summary.fallbacks,
            skipped = summary.skipped,
            duration_ms = summary.duration_ms,
            rate = format!("{:.2}/s", summary.rate()),
            "Batch complete"
        );

        Ok(summary)
    }

    async fn complete(
        &self,
        joined: std::result::Result<Resolution, JoinError>,
        cache: &CacheHandle,
        summary: &mut BatchSummary,
    ) -> Result<()> {
        match joined {
            Ok(resolution) => {
                if let Source::Fallback(FallbackReason::Failure(failure)) = &resolution.source {
                    debug!(address = %resolution.address, kind = failure.kind(), "Stored fallback");
                }
                summary.record(&resolution);
            }
            Err(e) => {
                error!(error = %e, "Lookup task failed");
                summary.record_task_failure();
            }
        }

        if self.config.persist == PersistMode::EveryWrite && cache.is_dirty() {
            self.persist(cache, summary).await?;
        }
        Ok(())
    }

    async fn persist(&self, cache: &CacheHandle, summary: &mut BatchSummary) -> Result<()> {
        let observed = cache.pending_writes();
        let snapshot = cache.snapshot();

        if let Err(e) = self.store.save(&snapshot).await {
            error!(store = %self.store.describe(), error = %e, "Failed to save cache");
            return Err(e);
        }

        cache.mark_saved(observed);
        summary.saves += 1;
        debug!(entries = snapshot.len(), store = %self.store.describe(), "Saved cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use geocache_cache::CoordinateCache;
    use geocache_core::error::LookupFailure;
    use geocache_core::traits::Geocoder;
    use geocache_core::types::{Coordinate, GeoPoint};
    use geocache_store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Fixed {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Geocoder for Fixed {
        async fn geocode(&self, address: &Address) -> std::result::Result<Option<GeoPoint>, LookupFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if address.as_str().starts_with("없는") {
                return Ok(None);
            }
            Ok(Some(GeoPoint::new(35.0, 128.0).unwrap()))
        }
    }

    fn setup(config: BatchConfig) -> (Arc<Fixed>, Arc<MemoryStore>, BatchResolver) {
        let geocoder = Arc::new(Fixed { calls: AtomicUsize::new(0) });
        let store = Arc::new(MemoryStore::new());
        let resolver = Arc::new(Resolver::new(geocoder.clone()));
        let batch = BatchResolver::with_config(resolver, store.clone(), config);
        (geocoder, store, batch)
    }

    fn fast() -> BatchConfig {
        BatchConfig::new().max_workers(4).per_request_delay(Duration::ZERO)
    }

    fn addrs(raw: &[&str]) -> Vec<Address> {
        raw.iter().map(|s| Address::parse(s).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_fetches_missing_and_saves_once() {
        let (geocoder, store, batch) = setup(fast());
        let cache = CoordinateCache::new().into_handle();

        let summary = batch
            .resolve_batch(&addrs(&["경기도 수원시", "없는 주소", "강원도 원주시"]), &cache)
            .await
            .unwrap();

        assert_eq!(summary.requested, 3);
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.resolved, 2);
        assert_eq!(summary.fallbacks, 1);
        assert_eq!(summary.fallback_reasons.get("no_results"), Some(&1));
        assert_eq!(summary.failures(), 0);
        assert_eq!(summary.saves, 1);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.entries().len(), 3);
        assert!(!cache.is_dirty());
    }

    #[tokio::test]
    async fn test_duplicates_fetched_once() {
        let (geocoder, _store, batch) = setup(fast());
        let cache = CoordinateCache::new().into_handle();

        let summary = batch
            .resolve_batch(&addrs(&["경기도", "경기도", " 경기도 "]), &cache)
            .await
            .unwrap();

        assert_eq!(summary.requested, 1);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fully_cached_is_noop() {
        let (geocoder, store, batch) = setup(fast());
        let cache = CoordinateCache::from_entries(vec![
            (Address::parse("a").unwrap(), Coordinate::Unresolved),
            (Address::parse("b").unwrap(), Coordinate::resolved(1.0, 2.0).unwrap()),
        ])
        .into_handle();

        let summary = batch.resolve_batch(&addrs(&["a", "b"]), &cache).await.unwrap();

        assert_eq!(summary.already_cached, 2);
        assert_eq!(summary.fetched, 0);
        assert_eq!(summary.saves, 0);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_every_write_saves_per_completion() {
        let (_geocoder, store, batch) = setup(fast().persist(PersistMode::EveryWrite));
        let cache = CoordinateCache::new().into_handle();

        let summary = batch.resolve_batch(&addrs(&["a", "b", "c"]), &cache).await.unwrap();

        // Completions that land together share one save.
        assert!(summary.saves >= 1 && summary.saves <= 3);
        assert_eq!(store.save_count(), summary.saves);
        assert_eq!(store.entries().len(), 3);
        assert!(!cache.is_dirty());
    }

    #[tokio::test]
    async fn test_save_failure_surfaces() {
        let (_geocoder, store, batch) = setup(fast());
        store.fail_saves(true);
        let cache = CoordinateCache::new().into_handle();

        let err = tokio_test::assert_err!(batch.resolve_batch(&addrs(&["a"]), &cache).await);
        assert!(matches!(err, GeocacheError::Persistence { .. }));
        assert!(cache.is_dirty());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_progress_reports_final_state() {
        let (_geocoder, _store, batch) = setup(fast().progress_interval(2));
        let cache = CoordinateCache::new().into_handle();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        batch
            .resolve_batch_with_progress(
                &addrs(&["a", "b", "c", "d", "없는 곳"]),
                &cache,
                Box::new(move |p| sink.lock().unwrap().push(p)),
            )
            .await
            .unwrap();

        let reports = seen.lock().unwrap();
        let completed: Vec<u64> = reports.iter().map(|p| p.completed).collect();
        assert_eq!(completed, vec![2, 4, 5]);
        let last = reports.last().unwrap();
        assert_eq!(last.total, 5);
        assert_eq!(last.fallbacks, 1);
        assert!(last.is_complete());
    }

    #[tokio::test]
    async fn test_progress_counts_fallback_completions() {
        let (_geocoder, _store, batch) = setup(fast().max_workers(1).progress_interval(1));
        let cache = CoordinateCache::new().into_handle();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        batch
            .resolve_batch_with_progress(
                &addrs(&["없는 곳 1", "없는 곳 2", "a"]),
                &cache,
                Box::new(move |p| sink.lock().unwrap().push(p.completed)),
            )
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_delay_paces_submissions() {
        let (geocoder, _store, batch) = setup(
            BatchConfig::new()
                .max_workers(8)
                .per_request_delay(Duration::from_millis(100)),
        );
        let cache = CoordinateCache::new().into_handle();
        let started = Instant::now();

        let summary = batch
            .resolve_batch(&addrs(&["a", "b", "c", "d", "e"]), &cache)
            .await
            .unwrap();

        assert_eq!(summary.fetched, 5);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 5);
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_delay() {
        let (geocoder, store, batch) = setup(
            BatchConfig::new()
                .max_workers(8)
                .per_request_delay(Duration::from_secs(10)),
        );
        let cache = CoordinateCache::new().into_handle();
        let handle = batch.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        let summary = tokio::time::timeout(
            Duration::from_secs(2),
            batch.resolve_batch(&addrs(&["a", "b", "c"]), &cache),
        )
        .await
        .expect("cancel should end the delay early")
        .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_everything() {
        let (geocoder, store, batch) = setup(fast());
        batch.cancel_handle().cancel();
        let cache = CoordinateCache::new().into_handle();

        let summary = batch.resolve_batch(&addrs(&["a", "b"]), &cache).await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.fetched, 0);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_applies_to_one_run() {
        let (geocoder, _store, batch) = setup(fast());
        batch.cancel_handle().cancel();
        let cache = CoordinateCache::new().into_handle();

        let first = batch.resolve_batch(&addrs(&["a"]), &cache).await.unwrap();
        assert!(first.cancelled);
        assert_eq!(first.skipped, 1);

        let second = batch.resolve_batch(&addrs(&["b", "c"]), &cache).await.unwrap();
        assert!(!second.cancelled);
        assert_eq!(second.fetched, 2);
        assert_eq!(second.skipped, 0);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);
        assert!(!batch.cancel_handle().is_cancelled());
    }

    #[test]
    fn test_persist_mode_from_str() {
        assert_eq!("batch".parse::<PersistMode>().unwrap(), PersistMode::EndOfBatch);
        assert_eq!("every-write".parse::<PersistMode>().unwrap(), PersistMode::EveryWrite);
        assert!("sometimes".parse::<PersistMode>().is_err());
    }

    #[test]
    fn test_config_builders_clamp() {
        let config = BatchConfig::new().max_workers(0).progress_interval(0);
        assert_eq!(config.max_workers, 1);
        assert_eq!(config.progress_interval, 1);
        assert_eq!(BatchConfig::default().max_workers, 8);
        assert_eq!(BatchConfig::default().per_request_delay_ms, 100);
    }
}
