//! Common traits for geocache.
//!
//! These traits define the seams between the resolver and its collaborators,
//! so the remote service and the persistence layer can be swapped in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{LookupFailure, Result};
use crate::types::{Address, Coordinate, GeoPoint};

// ═══════════════════════════════════════════════════════════════════════════════
// GEOCODER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// A remote geocoding service.
///
/// Implementations return the first candidate only. `Ok(None)` means the
/// service answered successfully with zero candidates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Looks up a single address.
    async fn geocode(&self, address: &Address) -> std::result::Result<Option<GeoPoint>, LookupFailure>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "geocoder"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CACHE STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// An entry that was present in the backing file but could not be used.
#[derive(Clone, Debug, PartialEq)]
pub struct QuarantinedEntry {
    /// Raw key as found in the file
    pub key: String,
    /// Why it was rejected
    pub reason: String,
}

/// Result of loading the backing file.
#[derive(Clone, Debug, Default)]
pub struct LoadedCache {
    /// Valid entries
    pub entries: BTreeMap<Address, Coordinate>,
    /// Entries skipped during validation
    pub quarantined: Vec<QuarantinedEntry>,
}

impl LoadedCache {
    /// Returns an empty load result (no backing file).
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Durable persistence for the address → coordinate mapping.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Reads the full mapping. A missing backing file yields an empty mapping.
    async fn load(&self) -> Result<LoadedCache>;

    /// Replaces the persisted mapping with `entries`.
    async fn save(&self, entries: &BTreeMap<Address, Coordinate>) -> Result<()>;

    /// Human-readable location of the store.
    fn describe(&self) -> String;
}
