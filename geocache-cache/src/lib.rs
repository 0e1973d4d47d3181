//! Concurrent address → coordinate map shared by resolver workers.
//!
//! One [`CoordinateCache`] lives for the whole run and is passed around as a
//! [`CacheHandle`]; there is no process-wide cache.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod cache;

pub use cache::{CacheHandle, CacheStats, CoordinateCache, InsertOutcome};
