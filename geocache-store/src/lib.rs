//! # geocache Store
//!
//! Durable storage for the address → coordinate mapping.
//!
//! This crate provides two backends:
//!
//! - **File**: Pretty-printed JSON document, saved atomically via rename
//! - **Memory**: In-process store for tests and dry runs
//!
//! ## Example
//!
//! ```rust,ignore
//! use geocache_store::{FileStore, CorruptPolicy};
//! use geocache_core::CacheStore;
//!
//! let store = FileStore::new("coord_cache.json");
//! let loaded = store.load_with_policy(CorruptPolicy::StartEmpty).await?;
//!
//! // ... resolve addresses ...
//!
//! store.save(&cache.snapshot()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod file;
mod memory;

pub use file::{CorruptPolicy, FileStore};
pub use memory::MemoryStore;

// Re-export the trait from core
pub use geocache_core::traits::{CacheStore, LoadedCache, QuarantinedEntry};
