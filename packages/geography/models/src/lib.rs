#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate and geographic extent types.
//!
//! These types are shared by the geocoder adapters, the record store and
//! the resolver. They carry no behaviour beyond simple comparisons; the
//! distance math lives in `property_geo_geography`.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A WGS84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinate {
    /// Out-of-range coordinate written alongside a `Failed` status.
    ///
    /// Stores that only have coordinate columns can still tell "tried and
    /// gave up" apart from "not yet tried" (null).
    pub const FAILED_SENTINEL: Self = Self {
        latitude: -999.0,
        longitude: -999.0,
    };

    /// Creates a coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns `true` if both components are within `epsilon` degrees of
    /// `other`.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        (self.latitude - other.latitude).abs() <= epsilon
            && (self.longitude - other.longitude).abs() <= epsilon
    }

    /// Returns `true` if this is the failure sentinel.
    #[must_use]
    pub fn is_failed_sentinel(&self) -> bool {
        self.approx_eq(&Self::FAILED_SENTINEL, f64::EPSILON)
    }

    /// Returns `true` if the latitude and longitude are on the globe.
    #[must_use]
    pub fn is_on_globe(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// A latitude/longitude box describing the country a pipeline serves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountryBounds {
    /// Southern latitude boundary.
    pub min_latitude: f64,
    /// Northern latitude boundary.
    pub max_latitude: f64,
    /// Western longitude boundary.
    pub min_longitude: f64,
    /// Eastern longitude boundary.
    pub max_longitude: f64,
}

impl CountryBounds {
    /// A box covering the whole globe.
    pub const WORLD: Self = Self {
        min_latitude: -90.0,
        max_latitude: 90.0,
        min_longitude: -180.0,
        max_longitude: 180.0,
    };

    /// Returns `true` if `coordinate` lies inside the box (inclusive).
    #[must_use]
    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&coordinate.latitude)
            && (self.min_longitude..=self.max_longitude).contains(&coordinate.longitude)
    }

    /// Returns `true` if min values do not exceed max values.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.min_latitude <= self.max_latitude && self.min_longitude <= self.max_longitude
    }
}

/// How specific an address string is.
///
/// Advisory only: it drives reporting and the improve-precision pass but
/// never keeps a record from being resolved.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PrecisionLevel {
    /// Street, unit, lot or block numbering is present.
    High,
    /// A township or area name is present.
    Medium,
    /// Empty, region-only, or otherwise vague.
    Low,
}
