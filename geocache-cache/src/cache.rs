//! Shared coordinate map with first-writer-wins inserts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};

use geocache_core::types::{Address, Coordinate};

/// Shared ownership of the run's cache.
pub type CacheHandle = Arc<CoordinateCache>;

/// What happened on [`CoordinateCache::insert_if_absent`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InsertOutcome {
    /// The address was new and now maps to the given coordinate.
    Inserted,
    /// The address was already cached; the stored value was kept.
    AlreadyPresent(Coordinate),
}

/// In-memory address → coordinate map.
///
/// Thread-safe without external locking. An entry, once written, is never
/// replaced by a different value; only explicit removal clears it.
#[derive(Debug, Default)]
pub struct CoordinateCache {
    entries: DashMap<Address, Coordinate>,
    /// Mutations not yet persisted
    pending_writes: AtomicU64,
}

impl CoordinateCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
            pending_writes: AtomicU64::new(0),
        }
    }

    /// Creates a cache pre-populated from persisted entries.
    ///
    /// Loaded entries count as already saved.
    pub fn from_entries(entries: impl IntoIterator<Item = (Address, Coordinate)>) -> Self {
        let entries = entries.into_iter();
        let cache = Self::with_capacity(entries.size_hint().0);
        for (address, coord) in entries {
            cache.entries.insert(address, coord);
        }
        cache
    }

    /// Wraps the cache in a shareable handle.
    pub fn into_handle(self) -> CacheHandle {
        Arc::new(self)
    }

    /// Gets the cached coordinate for an address.
    pub fn get(&self, address: &str) -> Option<Coordinate> {
        self.entries.get(address).map(|entry| *entry.value())
    }

    /// Returns true if the address has an entry (resolved or not).
    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }

    /// Stores `coord` unless the address is already cached.
    pub fn insert_if_absent(&self, address: Address, coord: Coordinate) -> InsertOutcome {
        match self.entries.entry(address) {
            Entry::Occupied(existing) => {
                let current = *existing.get();
                if current != coord {
                    warn!(
                        address = %existing.key(),
                        kept = %current,
                        ignored = %coord,
                        "Conflicting write for cached address ignored"
                    );
                }
                InsertOutcome::AlreadyPresent(current)
            }
            Entry::Vacant(slot) => {
                debug!(address = %slot.key(), coord = %coord, "Cached coordinate");
                slot.insert(coord);
                self.pending_writes.fetch_add(1, Ordering::SeqCst);
                InsertOutcome::Inserted
            }
        }
    }

    /// Removes an entry so the next lookup goes to the remote service.
    pub fn remove(&self, address: &str) -> Option<Coordinate> {
        let removed = self.entries.remove(address).map(|(_, coord)| coord);
        if removed.is_some() {
            self.pending_writes.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    /// Removes every unresolved entry, returning how many were dropped.
    pub fn prune_unresolved(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, coord| coord.is_resolved());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.pending_writes.fetch_add(removed as u64, Ordering::SeqCst);
        }
        removed
    }

    /// Returns the addresses from `addresses` that have no entry, in input order.
    pub fn missing<'a>(&self, addresses: impl IntoIterator<Item = &'a Address>) -> Vec<Address> {
        addresses
            .into_iter()
            .filter(|address| !self.contains(address.as_str()))
            .cloned()
            .collect()
    }

    /// Copies all entries into a sorted map for persistence.
    pub fn snapshot(&self) -> BTreeMap<Address, Coordinate> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mutations since the last [`mark_saved`](Self::mark_saved).
    pub fn pending_writes(&self) -> u64 {
        self.pending_writes.load(Ordering::SeqCst)
    }

    /// Returns true if there are unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.pending_writes() > 0
    }

    /// Records that `observed` pending writes reached durable storage.
    ///
    /// Pass the value of [`pending_writes`](Self::pending_writes) read before
    /// taking the snapshot, so writes racing with the save stay pending.
    pub fn mark_saved(&self, observed: u64) {
        let _ = self
            .pending_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(observed))
            });
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        let total = self.entries.len();
        let resolved = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_resolved())
            .count();
        CacheStats {
            total_entries: total,
            resolved_entries: resolved,
            unresolved_entries: total.saturating_sub(resolved),
        }
    }
}

/// Cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// All entries
    pub total_entries: usize,
    /// Entries with a located point
    pub resolved_entries: usize,
    /// Entries holding the unresolved sentinel
    pub unresolved_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn point(lat: f64, lon: f64) -> Coordinate {
        Coordinate::resolved(lat, lon).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let cache = CoordinateCache::new();
        let outcome = cache.insert_if_absent(addr("전라남도 해남군"), point(34.57, 126.59));
        assert_eq!(outcome, InsertOutcome::Inserted);
        assert_eq!(cache.get("전라남도 해남군"), Some(point(34.57, 126.59)));
        assert!(cache.contains("전라남도 해남군"));
    }

    #[test]
    fn test_first_writer_wins() {
        let cache = CoordinateCache::new();
        cache.insert_if_absent(addr("경상북도 포항시"), point(36.01, 129.34));

        let outcome = cache.insert_if_absent(addr("경상북도 포항시"), Coordinate::Unresolved);
        assert_eq!(outcome, InsertOutcome::AlreadyPresent(point(36.01, 129.34)));
        assert_eq!(cache.get("경상북도 포항시"), Some(point(36.01, 129.34)));
        assert_eq!(cache.pending_writes(), 1);
    }

    #[test]
    fn test_unresolved_entry_counts_as_cached() {
        let cache = CoordinateCache::new();
        cache.insert_if_absent(addr("어딘가"), Coordinate::Unresolved);
        assert!(cache.contains("어딘가"));
        assert_eq!(cache.get("어딘가"), Some(Coordinate::Unresolved));
    }

    #[test]
    fn test_missing_filters_cached() {
        let cache = CoordinateCache::from_entries(vec![(addr("a"), point(1.0, 1.0))]);
        let wanted = vec![addr("a"), addr("b"), addr("c")];
        assert_eq!(cache.missing(&wanted), vec![addr("b"), addr("c")]);
    }

    #[test]
    fn test_from_entries_is_clean() {
        let cache = CoordinateCache::from_entries(vec![
            (addr("a"), point(1.0, 1.0)),
            (addr("b"), Coordinate::Unresolved),
        ]);
        assert_eq!(cache.len(), 2);
        assert!(!cache.is_dirty());
    }

    #[test]
    fn test_prune_unresolved() {
        let cache = CoordinateCache::from_entries(vec![
            (addr("a"), point(1.0, 1.0)),
            (addr("b"), Coordinate::Unresolved),
            (addr("c"), Coordinate::Unresolved),
        ]);
        assert_eq!(cache.prune_unresolved(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.pending_writes(), 2);
    }

    #[test]
    fn test_remove() {
        let cache = CoordinateCache::from_entries(vec![(addr("a"), point(1.0, 1.0))]);
        assert_eq!(cache.remove("a"), Some(point(1.0, 1.0)));
        assert_eq!(cache.remove("a"), None);
        assert!(cache.is_empty());
        assert_eq!(cache.pending_writes(), 1);
    }

    #[test]
    fn test_mark_saved_keeps_racing_writes() {
        let cache = CoordinateCache::new();
        cache.insert_if_absent(addr("a"), point(1.0, 1.0));
        let observed = cache.pending_writes();
        cache.insert_if_absent(addr("b"), point(2.0, 2.0));
        cache.mark_saved(observed);
        assert_eq!(cache.pending_writes(), 1);
        assert!(cache.is_dirty());
    }

    #[test]
    fn test_snapshot_sorted() {
        let cache = CoordinateCache::new();
        cache.insert_if_absent(addr("c"), point(3.0, 3.0));
        cache.insert_if_absent(addr("a"), point(1.0, 1.0));
        cache.insert_if_absent(addr("b"), Coordinate::Unresolved);
        let keys: Vec<String> = cache.snapshot().into_keys().map(String::from).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_stats() {
        let cache = CoordinateCache::from_entries(vec![
            (addr("a"), point(1.0, 1.0)),
            (addr("b"), Coordinate::Unresolved),
        ]);
        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.resolved_entries, 1);
        assert_eq!(stats.unresolved_entries, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_disjoint_inserts() {
        let cache = CoordinateCache::new().into_handle();
        let mut handles = Vec::new();
        for i in 0..100u32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let address = Address::parse(&format!("주소 {}", i)).unwrap();
                cache.insert_if_absent(address, Coordinate::resolved(f64::from(i) / 10.0, 127.0).unwrap())
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), InsertOutcome::Inserted);
        }
        assert_eq!(cache.len(), 100);
        assert_eq!(cache.pending_writes(), 100);
    }
}
