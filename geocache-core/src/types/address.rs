//! Normalized address keys.
//!
//! Plant listings spell the same province several ways ("전남", "전라남도",
//! "전남 " with stray whitespace) and often repeat the province inside the
//! sub-region column. [`Address::from_parts`] folds all of those into one
//! deterministic key so that the cache never stores the same place twice.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GeocacheError, Result};

/// Short and legacy province spellings mapped to the canonical name.
const PROVINCE_ALIASES: &[(&str, &str)] = &[
    ("전북특별자치도", "전라북도"),
    ("전북", "전라북도"),
    ("전남", "전라남도"),
    ("경북", "경상북도"),
    ("경남", "경상남도"),
    ("충북", "충청북도"),
    ("충남", "충청남도"),
    ("서울시", "서울특별시"),
    ("부산시", "부산광역시"),
    ("대구시", "대구광역시"),
    ("인천시", "인천광역시"),
    ("광주시", "광주광역시"),
    ("대전시", "대전광역시"),
    ("울산시", "울산광역시"),
    ("세종시", "세종특별자치시"),
    ("제주도", "제주특별자치도"),
    ("강원특별자치도", "강원도"),
];

/// Labels that spreadsheet exports use for "no value".
const PLACEHOLDER_LABELS: &[&str] = &["", "nan", "None", "알수없음"];

/// A normalized free-text address, the geocoding query and cache key.
///
/// Invariants: non-empty, no leading/trailing whitespace, inner whitespace
/// collapsed to single spaces, not a placeholder label.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parses an already-combined address string.
    pub fn parse(raw: &str) -> Result<Self> {
        let collapsed = collapse_whitespace(raw);
        if is_placeholder(&collapsed) {
            return Err(GeocacheError::InvalidAddress(format!(
                "'{}' is empty or a placeholder",
                raw.trim()
            )));
        }
        Ok(Self(collapsed))
    }

    /// Builds an address from a region and sub-region column.
    ///
    /// The region is compacted and mapped to its canonical spelling; a copy of
    /// the region at the start of the sub-region is dropped.
    ///
    /// # Example
    ///
    /// ```rust
    /// use geocache_core::Address;
    ///
    /// let a = Address::from_parts("전남", "전라남도  해남군").unwrap();
    /// let b = Address::from_parts(" 전라남도", "해남군").unwrap();
    /// assert_eq!(a, b);
    /// assert_eq!(a.as_str(), "전라남도 해남군");
    /// ```
    pub fn from_parts(region: &str, subregion: &str) -> Result<Self> {
        let region = normalize_region(region);
        if is_placeholder(&region) {
            return Err(GeocacheError::InvalidAddress(format!(
                "region '{}' is empty or a placeholder",
                region
            )));
        }

        let mut subregion = normalize_subregion(subregion);
        if is_placeholder(&subregion) {
            subregion.clear();
        }
        let subregion = strip_region_prefix(&region, &subregion);

        if subregion.is_empty() {
            Ok(Self(region))
        } else {
            Ok(Self(format!("{} {}", region, subregion)))
        }
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Address {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = GeocacheError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Compacts a region label and maps it to its canonical province name.
pub fn normalize_region(raw: &str) -> String {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    match PROVINCE_ALIASES.iter().find(|(alias, _)| *alias == compact) {
        Some((_, canonical)) => (*canonical).to_string(),
        None => compact,
    }
}

/// Trims a sub-region label and collapses inner whitespace.
pub fn normalize_subregion(raw: &str) -> String {
    collapse_whitespace(raw)
}

/// Returns true for labels that stand for a missing value.
pub fn is_placeholder(label: &str) -> bool {
    PLACEHOLDER_LABELS.contains(&label.trim())
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Every spelling that normalizes to `canonical`, longest first.
fn region_spellings(canonical: &str) -> Vec<&str> {
    let mut spellings: Vec<&str> = PROVINCE_ALIASES
        .iter()
        .filter(|(_, c)| *c == canonical)
        .map(|(alias, _)| *alias)
        .collect();
    spellings.push(canonical);
    spellings.sort_by_key(|s| std::cmp::Reverse(s.len()));
    spellings
}

fn strip_region_prefix(canonical: &str, subregion: &str) -> String {
    let spellings = region_spellings(canonical);
    let mut rest = subregion;

    'outer: loop {
        for spelling in &spellings {
            if let Some(tail) = rest.strip_prefix(spelling) {
                // Only whole words: "경기도청" is not "경기도" + "청".
                if tail.is_empty() || tail.starts_with(' ') {
                    rest = tail.trim_start();
                    continue 'outer;
                }
            }
        }
        break;
    }

    rest.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case("전남", "해남군", "전라남도 해남군" ; "short province")]
    #[test_case("전라남도", "전라남도 해남군", "전라남도 해남군" ; "repeated canonical prefix")]
    #[test_case("전북특별자치도", "전북 군산시", "전라북도 군산시" ; "alias prefix in subregion")]
    #[test_case(" 경기 도 ", "  수원시   팔달구 ", "경기도 수원시 팔달구" ; "whitespace everywhere")]
    #[test_case("세종시", "", "세종특별자치시" ; "region only")]
    #[test_case("경기도", "nan", "경기도" ; "placeholder subregion")]
    #[test_case("경기도", "경기도청", "경기도 경기도청" ; "prefix without word boundary kept")]
    fn test_from_parts(region: &str, subregion: &str, expected: &str) {
        let address = Address::from_parts(region, subregion).unwrap();
        assert_eq!(address.as_str(), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("nan" ; "nan")]
    #[test_case("None" ; "none")]
    #[test_case("알수없음" ; "unknown")]
    #[test_case("   " ; "blank")]
    fn test_placeholder_region_rejected(region: &str) {
        let result = Address::from_parts(region, "해남군");
        assert!(matches!(result, Err(GeocacheError::InvalidAddress(_))));
    }

    #[test]
    fn test_parse_collapses_whitespace() {
        let address = Address::parse("  서울특별시   강남구\t역삼동 ").unwrap();
        assert_eq!(address.as_str(), "서울특별시 강남구 역삼동");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(Address::parse("").is_err());
        assert!(Address::parse(" \n ").is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Address = serde_json::from_str("\"부산광역시  해운대구\"").unwrap();
        assert_eq!(ok.as_str(), "부산광역시 해운대구");
        assert!(serde_json::from_str::<Address>("\"  \"").is_err());
    }

    #[test]
    fn test_borrow_as_str_for_map_lookups() {
        let mut map = std::collections::HashMap::new();
        map.insert(Address::parse("제주특별자치도 서귀포시").unwrap(), 1);
        assert_eq!(map.get("제주특별자치도 서귀포시"), Some(&1));
    }

    proptest! {
        #[test]
        fn prop_from_parts_is_deterministic_and_idempotent(
            region in "(전남|전라남도|경북| 충남 |서울시|경기도)",
            subregion in "[ 가-힣a-z]{0,12}",
        ) {
            if let Ok(first) = Address::from_parts(&region, &subregion) {
                let second = Address::from_parts(&region, &subregion).unwrap();
                prop_assert_eq!(&first, &second);

                let reparsed = Address::parse(first.as_str()).unwrap();
                prop_assert_eq!(&first, &reparsed);
            }
        }
    }
}
