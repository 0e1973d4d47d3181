//! # geocache Batch
//!
//! Resolves many addresses with a bounded number of concurrent lookups.
//!
//! ## Features
//!
//! - **Filtering**: Only addresses missing from the cache are looked up
//! - **Bounded Concurrency**: At most `max_workers` lookups in flight
//! - **Throttling**: A fixed pause after each submission
//! - **Progress Reporting**: Callbacks for UI progress updates
//! - **Cancellation**: Stop submitting and keep what was already fetched
//!
//! ## Example
//!
//! ```rust,ignore
//! use geocache_batch::{BatchConfig, BatchResolver};
//!
//! let batch = BatchResolver::with_config(resolver, store, BatchConfig::new().max_workers(8));
//! let summary = batch.resolve_batch(&addresses, &cache).await?;
//! println!("fetched {} ({} fallbacks)", summary.fetched, summary.fallbacks);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod batch;
mod progress;

pub use batch::{BatchConfig, BatchResolver, BatchSummary, PersistMode};
pub use progress::{BatchProgress, CancelHandle, ProgressCallback};
