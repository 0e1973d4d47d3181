//! Error types for geocache.
//!
//! [`GeocacheError`] covers everything a caller can observe. Remote lookup
//! problems are classified separately as [`LookupFailure`]; the resolver
//! always recovers from those by substituting the fallback coordinate.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using `GeocacheError`.
pub type Result<T> = std::result::Result<T, GeocacheError>;

/// Main error type for all geocache operations.
#[derive(Debug, Error)]
pub enum GeocacheError {
    // ═══════════════════════════════════════════════════════════════════════════
    // CACHE FILE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The backing file exists but is not a valid cache document.
    #[error("Cache file '{path}' is corrupt: {reason}")]
    CacheCorrupt {
        /// File that failed to parse
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Writing or renaming the backing file failed.
    #[error("Failed to persist cache to '{path}': {source}")]
    Persistence {
        /// File being written or renamed
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════════════
    // VALIDATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Address is empty or carries a placeholder region label.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Latitude/longitude outside the valid ranges or not finite.
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // SERIALIZATION / IO
    // ═══════════════════════════════════════════════════════════════════════════

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// File I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GeocacheError {
    /// Returns true if the error must stop a batch run.
    ///
    /// Only persistence failures are fatal: losing freshly resolved
    /// coordinates would force the same remote calls on every later run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GeocacheError::Persistence { .. } | GeocacheError::IoError(_)
        )
    }
}

/// Why a remote geocode lookup produced no coordinate.
///
/// An empty result set is not a failure; geocoders report it as `Ok(None)`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LookupFailure {
    /// Connection, DNS, or TLS failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// No response within the configured timeout.
    #[error("timed out after {millis}ms")]
    Timeout {
        /// Timeout that elapsed
        millis: u64,
    },

    /// The service answered with HTTP 429.
    #[error("rate limited by remote service")]
    RateLimited,

    /// The service answered with a non-success status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The body could not be decoded or held unusable values.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl LookupFailure {
    /// Stable label for logs and batch summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            LookupFailure::Transport(_) => "transport",
            LookupFailure::Timeout { .. } => "timeout",
            LookupFailure::RateLimited => "rate_limited",
            LookupFailure::Status(_) => "status",
            LookupFailure::Malformed(_) => "malformed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GeocacheError::CacheCorrupt {
            path: PathBuf::from("coord_cache.json"),
            reason: "expected an object".into(),
        };
        assert!(err.to_string().contains("coord_cache.json"));
        assert!(err.to_string().contains("expected an object"));
    }

    #[test]
    fn test_error_classification() {
        let persist = GeocacheError::Persistence {
            path: PathBuf::from("x.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(persist.is_fatal());
        assert!(!GeocacheError::InvalidAddress("".into()).is_fatal());
        assert!(!GeocacheError::InvalidCoordinate("nan".into()).is_fatal());
        assert!(GeocacheError::IoError(std::io::Error::new(std::io::ErrorKind::Other, "disk")).is_fatal());
    }

    #[test]
    fn test_lookup_failure_kinds() {
        assert_eq!(LookupFailure::Timeout { millis: 5000 }.kind(), "timeout");
        assert_eq!(LookupFailure::Status(500).kind(), "status");
        assert_eq!(LookupFailure::Malformed("x".into()).kind(), "malformed");
        assert!(LookupFailure::Timeout { millis: 5000 }
            .to_string()
            .contains("5000ms"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_result: std::result::Result<serde_json::Value, _> = serde_json::from_str("invalid");
        let result: Result<serde_json::Value> = json_result.map_err(GeocacheError::from);
        assert!(matches!(result, Err(GeocacheError::JsonError(_))));
    }
}
