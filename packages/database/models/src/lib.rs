#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Record types exchanged with the listing/transaction store.
//!
//! The pipeline only reads and writes the handful of fields defined here;
//! the rest of a listing or transaction row belongs to the marketplace and
//! is never touched.

use property_geo_geography_models::Coordinate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Where a record stands in the resolution lifecycle.
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
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ResolutionStatus {
    /// Not yet attempted; the coordinate is null.
    Pending,
    /// Coordinate present and accepted.
    Resolved,
    /// Every strategy was exhausted; the coordinate is the failure
    /// sentinel.
    Failed,
    /// Coordinate present but flagged by the audit job.
    Suspect,
}

impl ResolutionStatus {
    /// Returns `true` if a record in this status must carry a coordinate.
    #[must_use]
    pub const fn requires_coordinate(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Which record population a store table holds.
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
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RecordKind {
    /// Property listings.
    Listing,
    /// Historical sale/rent transactions.
    Transaction,
}

impl RecordKind {
    /// Returns the store table name for this population.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Listing => "listings",
            Self::Transaction => "transactions",
        }
    }
}

/// Direction in which a batch fetch walks the stable record key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FetchOrder {
    /// Ascending by id.
    #[default]
    #[strum(serialize = "asc", serialize = "ascending")]
    Ascending,
    /// Descending by id.
    #[strum(serialize = "desc", serialize = "descending")]
    Descending,
}

/// One listing or transaction row as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodableRecord {
    /// Stable identifier, also the pagination key.
    pub id: String,
    /// Free-text street/area description. May be empty.
    pub address_text: String,
    /// District or state the record claims to be in.
    pub region_hint: Option<String>,
    /// Current coordinate, if any.
    pub coordinate: Option<Coordinate>,
    /// Current lifecycle status.
    pub status: ResolutionStatus,
}

impl GeocodableRecord {
    /// Creates a new `Pending` record with no coordinate.
    #[must_use]
    pub fn pending(
        id: impl Into<String>,
        address_text: impl Into<String>,
        region_hint: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            address_text: address_text.into(),
            region_hint: region_hint.map(String::from),
            coordinate: None,
            status: ResolutionStatus::Pending,
        }
    }

    /// Returns the region hint if it is present and not blank.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.region_hint
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    /// Returns `true` if the coordinate/status pairing is consistent:
    /// the coordinate is null iff the status is `Pending`.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.coordinate.is_some() == self.status.requires_coordinate()
    }
}
