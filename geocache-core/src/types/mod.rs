//! Domain types for geocache.
//!
//! - [`Address`]: Normalized lookup key built from region/sub-region columns
//! - [`GeoPoint`]: Validated latitude/longitude pair
//! - [`Coordinate`]: Cached outcome, resolved point or unresolved sentinel

mod address;
mod coordinate;

pub use address::*;
pub use coordinate::*;
