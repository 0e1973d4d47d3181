//! In-memory cache store.
//!
//! Used by tests and by `--dry-run`, where nothing should touch the disk.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use geocache_core::error::{GeocacheError, Result};
use geocache_core::traits::{CacheStore, LoadedCache};
use geocache_core::types::{Address, Coordinate};

/// In-memory store that records every save.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Address, Coordinate>>,
    saves: AtomicU64,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `entries`.
    pub fn with_entries(entries: BTreeMap<Address, Coordinate>) -> Self {
        Self {
            entries: RwLock::new(entries),
            ..Self::default()
        }
    }

    /// Makes every subsequent save fail with a persistence error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Returns a copy of the stored mapping.
    pub fn entries(&self) -> BTreeMap<Address, Coordinate> {
        self.entries.read().clone()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn load(&self) -> Result<LoadedCache> {
        Ok(LoadedCache {
            entries: self.entries.read().clone(),
            quarantined: Vec::new(),
        })
    }

    async fn save(&self, entries: &BTreeMap<Address, Coordinate>) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(GeocacheError::Persistence {
                path: "memory".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "simulated write failure"),
            });
        }
        *self.entries.write() = entries.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryStore::new();
        let mut entries = BTreeMap::new();
        entries.insert(Address::parse("강원도 원주시").unwrap(), Coordinate::Unresolved);

        store.save(&entries).await.unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load().await.unwrap().entries, entries);
    }

    #[test]
    fn test_simulated_failure() {
        let store = MemoryStore::new();
        store.fail_saves(true);
        let err = tokio_test::block_on(store.save(&BTreeMap::new())).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(store.save_count(), 0);

        store.fail_saves(false);
        tokio_test::assert_ok!(tokio_test::block_on(store.save(&BTreeMap::new())));
        assert_eq!(store.save_count(), 1);
    }
}
