//! In-process record store.
//!
//! Holds records in a `BTreeMap` keyed by id so fetch order matches the
//! `DuckDB` store. Writes to ids registered with [`MemoryStore::fail_writes_for`]
//! return an error, which lets callers exercise store-failure handling.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use property_geo_database_models::{FetchOrder, GeocodableRecord, RecordKind, ResolutionStatus};
use property_geo_geography_models::Coordinate;
use strum::IntoEnumIterator as _;

use crate::{BatchQuery, DbError, RecordStore, check_resolution};

#[derive(Default)]
struct Inner {
    records: BTreeMap<String, GeocodableRecord>,
    centers: BTreeMap<String, Coordinate>,
    failing_ids: BTreeSet<String>,
    writes: u64,
}

/// A [`RecordStore`] kept entirely in memory.
pub struct MemoryStore {
    kind: RecordKind,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates a store holding `records`.
    #[must_use]
    pub fn new(kind: RecordKind, records: impl IntoIterator<Item = GeocodableRecord>) -> Self {
        let records = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            kind,
            inner: Mutex::new(Inner {
                records,
                ..Inner::default()
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every subsequent write to `id` fail.
    pub fn fail_writes_for(&self, id: &str) {
        self.inner().failing_ids.insert(id.to_string());
    }

    /// Returns a copy of the record with `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<GeocodableRecord> {
        self.inner().records.get(id).cloned()
    }

    /// Returns a copy of every record, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<GeocodableRecord> {
        self.inner().records.values().cloned().collect()
    }

    /// Returns how many successful writes the store has accepted.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.inner().writes
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn kind(&self) -> RecordKind {
        self.kind
    }

    async fn fetch_batch(&self, query: &BatchQuery) -> Result<Vec<GeocodableRecord>, DbError> {
        let inner = self.inner();
        let matching = inner
            .records
            .values()
            .filter(|r| r.status == query.status);

        let page = match query.order {
            FetchOrder::Ascending => matching
                .filter(|r| query.after.as_ref().is_none_or(|a| r.id > *a))
                .take(query.limit)
                .cloned()
                .collect(),
            FetchOrder::Descending => matching
                .rev()
                .filter(|r| query.after.as_ref().is_none_or(|a| r.id < *a))
                .take(query.limit)
                .cloned()
                .collect(),
        };
        Ok(page)
    }

    async fn update_resolution(
        &self,
        id: &str,
        status: ResolutionStatus,
        coordinate: Option<Coordinate>,
    ) -> Result<(), DbError> {
        check_resolution(id, status, coordinate.as_ref())?;

        let mut inner = self.inner();
        if inner.failing_ids.contains(id) {
            return Err(DbError::Io(std::io::Error::other(format!(
                "simulated write failure for {id}"
            ))));
        }

        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| DbError::NotFound { id: id.to_string() })?;
        record.status = status;
        record.coordinate = coordinate;
        inner.writes += 1;
        Ok(())
    }

    async fn count_by_status(&self) -> Result<BTreeMap<ResolutionStatus, u64>, DbError> {
        let inner = self.inner();
        let mut counts: BTreeMap<ResolutionStatus, u64> =
            ResolutionStatus::iter().map(|s| (s, 0)).collect();
        for record in inner.records.values() {
            *counts.entry(record.status).or_default() += 1;
        }
        Ok(counts)
    }

    async fn load_region_centers(&self) -> Result<BTreeMap<String, Coordinate>, DbError> {
        Ok(self.inner().centers.clone())
    }

    async fn save_region_center(
        &self,
        region_key: &str,
        _region_name: &str,
        coordinate: Coordinate,
        _provider: &str,
    ) -> Result<(), DbError> {
        self.inner()
            .centers
            .entry(region_key.to_string())
            .or_insert(coordinate);
        Ok(())
    }
}
