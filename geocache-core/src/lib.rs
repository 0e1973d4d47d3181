//! # geocache Core
//!
//! Core types, errors, and traits for the geocache address resolution cache.
//!
//! This crate provides the foundational building blocks used by all other geocache crates:
//!
//! - **Types**: Normalized addresses, validated geographic points, cached coordinates
//! - **Errors**: The error taxonomy, including classified lookup failures
//! - **Constants**: Defaults observed in the Kakao-based dashboards
//! - **Traits**: The geocoding collaborator and cache persistence seams
//!
//! ## Example
//!
//! ```rust
//! use geocache_core::{Address, Coordinate, GeoPoint};
//!
//! let address = Address::from_parts("전남", "해남군 화산면").unwrap();
//! assert_eq!(address.as_str(), "전라남도 해남군 화산면");
//!
//! let coord = Coordinate::Resolved(GeoPoint::new(34.57, 126.59).unwrap());
//! let json = serde_json::to_string(&coord).unwrap();
//! assert_eq!(json, "[34.57,126.59]");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::{GeocacheError, LookupFailure, Result};
pub use traits::*;
pub use types::*;
