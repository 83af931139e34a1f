#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Record store access for the property geocoding pipeline.
//!
//! The listing/transaction store is an external collaborator; the
//! pipeline reaches it only through the narrow [`RecordStore`] contract:
//! fetch a page of records by status, and write one record's resolution.
//!
//! Two implementations are provided:
//!
//! - [`records_db::DuckDbStore`]: a `DuckDB` file with one table per
//!   [`RecordKind`] and a persisted region-center table.
//! - `memory::MemoryStore`: an in-process store for unit tests, built
//!   with the `test-utils` feature.

pub mod import;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod records_db;

use std::collections::BTreeMap;

use async_trait::async_trait;
use property_geo_database_models::{FetchOrder, GeocodableRecord, RecordKind, ResolutionStatus};
use property_geo_geography_models::Coordinate;

/// Errors that can occur during record store operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error (directory creation, import files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV import error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A write would break the coordinate/status invariant.
    #[error("Invariant violation for record {id}: {message}")]
    Invariant {
        /// Record being written.
        id: String,
        /// Description of the violation.
        message: String,
    },

    /// The record to update does not exist.
    #[error("Record not found: {id}")]
    NotFound {
        /// Record id.
        id: String,
    },

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Parameters for a single page fetch.
#[derive(Debug, Clone)]
pub struct BatchQuery {
    /// Status to filter on.
    pub status: ResolutionStatus,
    /// Maximum number of records to return.
    pub limit: usize,
    /// Direction along the id key.
    pub order: FetchOrder,
    /// Keyset cursor: only return ids strictly after this one in `order`.
    pub after: Option<String>,
}

impl BatchQuery {
    /// Creates a query for the first page of `status` records.
    #[must_use]
    pub const fn first_page(status: ResolutionStatus, limit: usize, order: FetchOrder) -> Self {
        Self {
            status,
            limit,
            order,
            after: None,
        }
    }
}

/// Narrow read/update contract over the listing/transaction store.
///
/// Implementations must make each [`update_resolution`] call a single
/// atomic write; the pipeline never groups updates into a transaction.
///
/// [`update_resolution`]: RecordStore::update_resolution
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns which record population this store serves.
    fn kind(&self) -> RecordKind;

    /// Fetches one page of records matching `query`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    async fn fetch_batch(&self, query: &BatchQuery) -> Result<Vec<GeocodableRecord>, DbError>;

    /// Writes a record's new status and coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Invariant`] if the pairing is inconsistent,
    /// [`DbError::NotFound`] if the id is unknown, or another
    /// [`DbError`] if the write fails.
    async fn update_resolution(
        &self,
        id: &str,
        status: ResolutionStatus,
        coordinate: Option<Coordinate>,
    ) -> Result<(), DbError>;

    /// Returns the number of records in each status.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    async fn count_by_status(&self) -> Result<BTreeMap<ResolutionStatus, u64>, DbError>;

    /// Returns region centers persisted by earlier runs, keyed by
    /// normalized region key. Stores without persistence return nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    async fn load_region_centers(&self) -> Result<BTreeMap<String, Coordinate>, DbError> {
        Ok(BTreeMap::new())
    }

    /// Persists a resolved region center. Stores without persistence
    /// ignore it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn save_region_center(
        &self,
        _region_key: &str,
        _region_name: &str,
        _coordinate: Coordinate,
        _provider: &str,
    ) -> Result<(), DbError> {
        Ok(())
    }
}

/// Checks that `coordinate` is null iff `status` is `Pending`.
///
/// # Errors
///
/// Returns [`DbError::Invariant`] if the pairing is inconsistent.
pub fn check_resolution(
    id: &str,
    status: ResolutionStatus,
    coordinate: Option<&Coordinate>,
) -> Result<(), DbError> {
    match (status.requires_coordinate(), coordinate) {
        (true, None) => Err(DbError::Invariant {
            id: id.to_string(),
            message: format!("status {status} requires a coordinate"),
        }),
        (false, Some(c)) => Err(DbError::Invariant {
            id: id.to_string(),
            message: format!("status {status} must not carry coordinate {c}"),
        }),
        _ => Ok(()),
    }
}
