#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pure geographic helpers for the property geocoding pipeline.
//!
//! Nothing in this crate touches the network or the record store:
//!
//! - [`distance`]: haversine great-circle distance.
//! - [`region`]: administrative region name normalization and cache keys.
//! - [`capitals`]: static region → administrative capital fallback table.
//! - [`precision`]: address specificity classification and area
//!   extraction.

pub mod capitals;
pub mod distance;
pub mod precision;
pub mod region;

pub use distance::haversine_km;
pub use property_geo_geography_models::{Coordinate, CountryBounds, PrecisionLevel};
