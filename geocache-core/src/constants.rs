//! Defaults for geocache.
//!
//! Values mirror what the Kakao-based plant dashboards settled on in practice.

use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// REMOTE LOOKUP
// ═══════════════════════════════════════════════════════════════════════════════

/// Kakao Local "search by address" endpoint.
pub const KAKAO_ADDRESS_SEARCH_URL: &str = "https://dapi.kakao.com/v2/local/search/address.json";

/// Authorization scheme prefix expected by the Kakao REST API.
pub const KAKAO_AUTH_SCHEME: &str = "KakaoAK";

/// Per-lookup timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Per-lookup timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(DEFAULT_TIMEOUT_SECS);

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH ORCHESTRATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Concurrent lookups in flight during a batch.
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Cooperative delay after each submitted lookup, in milliseconds.
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 100;

/// Progress is reported every this many completions.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 50;

// ═══════════════════════════════════════════════════════════════════════════════
// CACHE FILE
// ═══════════════════════════════════════════════════════════════════════════════

/// Default backing file name.
pub const DEFAULT_CACHE_FILE: &str = "coord_cache.json";

/// Extension used for the temporary file during atomic saves.
pub const TEMP_EXTENSION: &str = "tmp";

/// Suffix appended to a corrupt cache file when it is set aside.
pub const CORRUPT_SUFFIX: &str = "corrupt";

// ═══════════════════════════════════════════════════════════════════════════════
// COORDINATES
// ═══════════════════════════════════════════════════════════════════════════════

/// Geographic center of South Korea, used by several dashboards as the
/// fixed fallback when a lookup fails.
pub const KOREA_CENTER: (f64, f64) = (36.5, 127.8);
