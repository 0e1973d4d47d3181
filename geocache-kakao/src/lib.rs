//! Kakao Local address search client.
//!
//! Implements [`geocache_core::Geocoder`] over
//! `GET /v2/local/search/address.json`, authenticated with a REST API key.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod kakao;

pub use kakao::{KakaoConfig, KakaoGeocoder};
