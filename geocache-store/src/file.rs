//! File-based cache store.
//!
//! Keeps the mapping in a single human-readable JSON document so it can be
//! inspected and diffed by hand.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use geocache_core::constants::{CORRUPT_SUFFIX, TEMP_EXTENSION};
use geocache_core::error::{GeocacheError, Result};
use geocache_core::traits::{CacheStore, LoadedCache, QuarantinedEntry};
use geocache_core::types::{Address, Coordinate};

/// What to do when the backing file exists but cannot be parsed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorruptPolicy {
    /// Surface [`GeocacheError::CacheCorrupt`] to the caller.
    #[default]
    Abort,
    /// Set the file aside as `<name>.corrupt` (or `<name>.corrupt.N` if that
    /// is taken) and start from an empty cache.
    StartEmpty,
}

impl FromStr for CorruptPolicy {
    type Err = GeocacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(CorruptPolicy::Abort),
            "start-empty" | "start_empty" | "empty" => Ok(CorruptPolicy::StartEmpty),
            other => Err(GeocacheError::ConfigError(format!(
                "unknown corrupt-cache policy '{}'",
                other
            ))),
        }
    }
}

/// JSON file cache store.
///
/// # File Format
///
/// ```text
/// {
///   "전라남도 해남군": [34.5733, 126.5993],
///   "알 수 없는 주소": null
/// }
/// ```
///
/// Keys are sorted. Saves go through `<name>.tmp` followed by a rename, so a
/// crash mid-write leaves the previous file intact.
#[derive(Clone, Debug)]
pub struct FileStore {
    /// Path to the backing file
    path: PathBuf,
}

impl FileStore {
    /// Creates a store for the given path. Nothing is read until `load`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the temporary file used during saves.
    pub fn temp_path(&self) -> PathBuf {
        with_suffix(&self.path, TEMP_EXTENSION)
    }

    /// Path a corrupt file is moved to under [`CorruptPolicy::StartEmpty`].
    pub fn corrupt_path(&self) -> PathBuf {
        with_suffix(&self.path, CORRUPT_SUFFIX)
    }

    /// First of `<name>.corrupt`, `<name>.corrupt.1`, ... that does not exist.
    async fn vacant_corrupt_path(&self) -> Result<PathBuf> {
        let base = self.corrupt_path();
        let mut candidate = base.clone();
        let mut n = 0u32;
        loop {
            let taken = fs::try_exists(&candidate)
                .await
                .map_err(|source| GeocacheError::Persistence {
                    path: candidate.clone(),
                    source,
                })?;
            if !taken {
                return Ok(candidate);
            }
            n += 1;
            candidate = with_suffix(&base, &n.to_string());
        }
    }

    /// Loads the mapping, applying `policy` if the file is corrupt.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load_with_policy(&self, policy: CorruptPolicy) -> Result<LoadedCache> {
        match self.load().await {
            Err(GeocacheError::CacheCorrupt { reason, .. }) if policy == CorruptPolicy::StartEmpty => {
                let moved_to = self.vacant_corrupt_path().await?;
                fs::rename(&self.path, &moved_to)
                    .await
                    .map_err(|source| GeocacheError::Persistence {
                        path: moved_to.clone(),
                        source,
                    })?;
                warn!(
                    reason = %reason,
                    moved_to = %moved_to.display(),
                    "Cache file is corrupt; starting with an empty cache"
                );
                Ok(LoadedCache::empty())
            }
            other => other,
        }
    }

    /// Reads the raw document, or `None` if the file does not exist.
    async fn read_document(&self) -> Result<Option<String>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(GeocacheError::IoError(e)),
        };

        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| self.corrupt(format!("not valid UTF-8: {}", e)))
    }

    /// Validates a document into entries, quarantining unusable ones.
    fn parse_document(&self, text: &str) -> Result<LoadedCache> {
        let document: Value =
            serde_json::from_str(text).map_err(|e| self.corrupt(e.to_string()))?;

        let Value::Object(raw_entries) = document else {
            return Err(self.corrupt("expected a JSON object of address entries".into()));
        };

        let mut loaded = LoadedCache::empty();

        for (key, raw) in raw_entries {
            let address = match Address::parse(&key) {
                Ok(address) => address,
                Err(e) => {
                    loaded.quarantined.push(QuarantinedEntry { key, reason: e.to_string() });
                    continue;
                }
            };

            let coord = match Coordinate::from_json(&raw) {
                Ok(coord) => coord,
                Err(e) => {
                    loaded.quarantined.push(QuarantinedEntry { key, reason: e.to_string() });
                    continue;
                }
            };

            if loaded.entries.contains_key(&address) {
                loaded.quarantined.push(QuarantinedEntry {
                    key,
                    reason: format!("duplicate of normalized address '{}'", address),
                });
                continue;
            }

            loaded.entries.insert(address, coord);
        }

        Ok(loaded)
    }

    fn corrupt(&self, reason: String) -> GeocacheError {
        GeocacheError::CacheCorrupt {
            path: self.path.clone(),
            reason,
        }
    }

    fn persistence(&self, source: std::io::Error) -> GeocacheError {
        GeocacheError::Persistence {
            path: self.path.clone(),
            source,
        }
    }

    async fn write_atomically(&self, contents: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await
    }
}

#[async_trait]
impl CacheStore for FileStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<LoadedCache> {
        let Some(text) = self.read_document().await? else {
            info!("No cache file yet, starting empty");
            return Ok(LoadedCache::empty());
        };

        let loaded = self.parse_document(&text)?;

        for entry in &loaded.quarantined {
            warn!(key = %entry.key, reason = %entry.reason, "Quarantined malformed cache entry");
        }
        info!(
            count = loaded.entries.len(),
            quarantined = loaded.quarantined.len(),
            "Loaded coordinate cache"
        );

        Ok(loaded)
    }

    #[instrument(skip(self, entries), fields(path = %self.path.display(), count = entries.len()))]
    async fn save(&self, entries: &BTreeMap<Address, Coordinate>) -> Result<()> {
        let mut contents = serde_json::to_vec_pretty(entries)?;
        contents.push(b'\n');

        if let Err(e) = self.write_atomically(&contents).await {
            let _ = fs::remove_file(self.temp_path()).await;
            return Err(self.persistence(e));
        }

        debug!("Cache saved");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// `coord_cache.json` + `tmp` → `coord_cache.json.tmp`
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
