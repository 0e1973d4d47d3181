//! # geocache Resolver
//!
//! Resolves one address at a time against a shared [`CoordinateCache`],
//! falling back to a configured coordinate when the remote service cannot
//! produce one.
//!
//! ## Lookup order
//!
//! 1. A cached entry (resolved or not) is returned as-is, with no remote call.
//! 2. Otherwise the [`Geocoder`] is called, bounded by the configured timeout.
//! 3. The first candidate is stored and returned. Zero candidates or any
//!    classified lookup failure store and return the fallback instead.
//!
//! Lookup failures never reach the caller.
//!
//! ## Example
//!
//! ```rust,ignore
//! use geocache_resolver::{Resolver, ResolverConfig};
//!
//! let resolver = Resolver::with_config(geocoder, ResolverConfig::default());
//! let coord = resolver.resolve(&address, &cache).await;
//! ```
//!
//! [`CoordinateCache`]: geocache_cache::CoordinateCache
//! [`Geocoder`]: geocache_core::traits::Geocoder

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod resolver;

pub use resolver::{FallbackReason, Resolution, Resolver, ResolverConfig, ResolverStats, Source};
