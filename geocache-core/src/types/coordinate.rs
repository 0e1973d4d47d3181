//! Coordinates as stored in the cache.
//!
//! On disk a coordinate is either a two-element `[latitude, longitude]`
//! array or `null` for an address that could not be resolved.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::KOREA_CENTER;
use crate::error::{GeocacheError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// GEO POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// A validated point on Earth.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct GeoPoint {
    /// Latitude in degrees, -90..=90
    lat: f64,
    /// Longitude in degrees, -180..=180
    lon: f64,
}

impl GeoPoint {
    /// Creates a point, rejecting non-finite or out-of-range values.
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(GeocacheError::InvalidCoordinate(format!(
                "non-finite value ({}, {})",
                lat, lon
            )));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(GeocacheError::InvalidCoordinate(format!(
                "latitude {} out of range",
                lat
            )));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(GeocacheError::InvalidCoordinate(format!(
                "longitude {} out of range",
                lon
            )));
        }
        Ok(Self { lat, lon })
    }

    /// Latitude in degrees.
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude in degrees.
    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// The fixed center-of-country point some dashboards fall back to.
    pub fn korea_center() -> Self {
        Self {
            lat: KOREA_CENTER.0,
            lon: KOREA_CENTER.1,
        }
    }
}

impl TryFrom<[f64; 2]> for GeoPoint {
    type Error = GeocacheError;

    fn try_from([lat, lon]: [f64; 2]) -> Result<Self> {
        GeoPoint::new(lat, lon)
    }
}

impl From<GeoPoint> for [f64; 2] {
    fn from(point: GeoPoint) -> Self {
        [point.lat, point.lon]
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lon)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COORDINATE
// ═══════════════════════════════════════════════════════════════════════════════

/// A cached geocoding outcome.
///
/// Serialized as `[lat, lon]` or `null`. Deserialization also accepts the
/// `[null, null]` form older cache files used for failed lookups.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Option<[f64; 2]>")]
pub enum Coordinate {
    /// The address was located.
    Resolved(GeoPoint),
    /// The lookup failed or returned nothing.
    Unresolved,
}

impl Coordinate {
    /// Creates a resolved coordinate from raw degrees.
    pub fn resolved(lat: f64, lon: f64) -> Result<Self> {
        GeoPoint::new(lat, lon).map(Coordinate::Resolved)
    }

    /// Returns true if this is a located point.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Coordinate::Resolved(_))
    }

    /// Returns the point, if resolved.
    pub fn point(&self) -> Option<GeoPoint> {
        match self {
            Coordinate::Resolved(p) => Some(*p),
            Coordinate::Unresolved => None,
        }
    }

    /// Decodes one cache-file value.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Coordinate::Unresolved),
            Value::Array(items) if items.len() == 2 => match (&items[0], &items[1]) {
                (Value::Null, Value::Null) => Ok(Coordinate::Unresolved),
                (lat, lon) => {
                    let lat = lat.as_f64().ok_or_else(|| {
                        GeocacheError::InvalidCoordinate(format!("latitude {} is not a number", lat))
                    })?;
                    let lon = lon.as_f64().ok_or_else(|| {
                        GeocacheError::InvalidCoordinate(format!("longitude {} is not a number", lon))
                    })?;
                    Coordinate::resolved(lat, lon)
                }
            },
            Value::Array(items) => Err(GeocacheError::InvalidCoordinate(format!(
                "expected 2 elements, got {}",
                items.len()
            ))),
            other => Err(GeocacheError::InvalidCoordinate(format!(
                "expected [lat, lon] or null, got {}",
                other
            ))),
        }
    }
}

impl TryFrom<Value> for Coordinate {
    type Error = GeocacheError;

    fn try_from(value: Value) -> Result<Self> {
        Coordinate::from_json(&value)
    }
}

impl From<Coordinate> for Option<[f64; 2]> {
    fn from(coord: Coordinate) -> Self {
        coord.point().map(<[f64; 2]>::from)
    }
}

impl From<GeoPoint> for Coordinate {
    fn from(point: GeoPoint) -> Self {
        Coordinate::Resolved(point)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coordinate::Resolved(p) => fmt::Display::fmt(p, f),
            Coordinate::Unresolved => f.write_str("unresolved"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_geopoint_validation() {
        assert!(GeoPoint::new(37.5665, 126.978).is_ok());
        assert!(GeoPoint::new(90.0, -180.0).is_ok());
        assert!(GeoPoint::new(90.1, 0.0).is_err());
        assert!(GeoPoint::new(0.0, 180.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_serialize_shapes() {
        let resolved = Coordinate::resolved(35.1796, 129.0756).unwrap();
        assert_eq!(serde_json::to_value(resolved).unwrap(), json!([35.1796, 129.0756]));
        assert_eq!(serde_json::to_value(Coordinate::Unresolved).unwrap(), json!(null));
    }

    #[test]
    fn test_from_json_accepts_legacy_null_pair() {
        assert_eq!(Coordinate::from_json(&json!([null, null])).unwrap(), Coordinate::Unresolved);
        assert_eq!(Coordinate::from_json(&json!(null)).unwrap(), Coordinate::Unresolved);
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        assert!(Coordinate::from_json(&json!([1.0])).is_err());
        assert!(Coordinate::from_json(&json!([1.0, 2.0, 3.0])).is_err());
        assert!(Coordinate::from_json(&json!(["37.5", "127.0"])).is_err());
        assert!(Coordinate::from_json(&json!([37.5, null])).is_err());
        assert!(Coordinate::from_json(&json!([137.5, 127.0])).is_err());
        assert!(Coordinate::from_json(&json!({"lat": 1.0})).is_err());
    }

    #[test]
    fn test_deserialize_through_serde() {
        let coord: Coordinate = serde_json::from_str("[36.5, 127.8]").unwrap();
        assert_eq!(coord, Coordinate::Resolved(GeoPoint::korea_center()));
        let none: Coordinate = serde_json::from_str("null").unwrap();
        assert!(!none.is_resolved());
    }

    #[test]
    fn test_display() {
        assert_eq!(Coordinate::Unresolved.to_string(), "unresolved");
        let c = Coordinate::resolved(36.5, 127.8).unwrap();
        assert_eq!(c.to_string(), "36.500000, 127.800000");
    }
}
