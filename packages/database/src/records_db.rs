//! `DuckDB`-backed record store.
//!
//! One `DuckDB` file holds a `listings` table, a `transactions` table and
//! a `region_centers` table. Each [`DuckDbStore`] is bound to one record
//! population; several stores may share a file.
//!
//! `Failed` rows carry [`Coordinate::FAILED_SENTINEL`] in the coordinate
//! columns alongside the explicit `resolution_status`, so consumers that
//! only read coordinates still see "tried and gave up" as distinct from
//! null.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use duckdb::Connection;
use property_geo_database_models::{FetchOrder, GeocodableRecord, RecordKind, ResolutionStatus};
use property_geo_geography_models::Coordinate;
use strum::IntoEnumIterator as _;

use crate::{BatchQuery, DbError, RecordStore, check_resolution};

/// Number of rows per INSERT statement when seeding records.
const CHUNK_SIZE: usize = 1_000;

/// A record store backed by a `DuckDB` connection.
pub struct DuckDbStore {
    conn: Mutex<Connection>,
    kind: RecordKind,
}

impl DuckDbStore {
    /// Opens (or creates) the store file and ensures the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the directory, connection or schema creation
    /// fails.
    pub fn open(path: &Path, kind: RecordKind) -> Result<Self, DbError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn, kind)
    }

    /// Opens a transient in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_in_memory(kind: RecordKind) -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?, kind)
    }

    fn from_connection(conn: Connection, kind: RecordKind) -> Result<Self, DbError> {
        create_schema(&conn)?;
        log::debug!("Opened {} record store", kind.table_name());
        Ok(Self {
            conn: Mutex::new(conn),
            kind,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts records, skipping ids that already exist.
    ///
    /// Used to seed the store from an import file; the pipeline itself
    /// never creates records.
    ///
    /// Returns the number of rows inserted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a record is inconsistent or the insert fails.
    pub fn insert_records(&self, records: &[GeocodableRecord]) -> Result<u64, DbError> {
        for record in records {
            check_resolution(&record.id, record.status, record.coordinate.as_ref())?;
        }

        let conn = self.conn();
        let table = self.kind.table_name();
        let mut inserted = 0u64;

        for chunk in records.chunks(CHUNK_SIZE) {
            let mut stmt = conn.prepare(&format!(
                "INSERT INTO {table} (id, address_text, region_hint, latitude, longitude, resolution_status)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT (id) DO NOTHING"
            ))?;

            for record in chunk {
                let affected = stmt.execute(duckdb::params![
                    record.id,
                    record.address_text,
                    record.region_hint,
                    record.coordinate.map(|c| c.latitude),
                    record.coordinate.map(|c| c.longitude),
                    record.status.as_ref(),
                ])?;
                inserted += affected as u64;
            }
        }

        Ok(inserted)
    }
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    let mut sql = String::new();
    for kind in RecordKind::iter() {
        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                address_text TEXT NOT NULL DEFAULT '',
                region_hint TEXT,
                latitude DOUBLE,
                longitude DOUBLE,
                resolution_status TEXT NOT NULL DEFAULT 'PENDING',
                resolved_at TIMESTAMPTZ
            );
            ",
            table = kind.table_name()
        ));
    }
    sql.push_str(
        "CREATE TABLE IF NOT EXISTS region_centers (
            region_key TEXT PRIMARY KEY,
            region_name TEXT NOT NULL,
            provider TEXT NOT NULL,
            lat DOUBLE NOT NULL,
            lng DOUBLE NOT NULL,
            created_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
        );",
    );

    conn.execute_batch(&sql)?;
    Ok(())
}

fn row_to_record(row: &duckdb::Row<'_>) -> duckdb::Result<(GeocodableRecord, String)> {
    let id: String = row.get(0)?;
    let address_text: Option<String> = row.get(1)?;
    let region_hint: Option<String> = row.get(2)?;
    let lat: Option<f64> = row.get(3)?;
    let lng: Option<f64> = row.get(4)?;
    let status: String = row.get(5)?;

    let coordinate = match (lat, lng) {
        (Some(lat), Some(lng)) => Some(Coordinate::new(lat, lng)),
        _ => None,
    };

    Ok((
        GeocodableRecord {
            id,
            address_text: address_text.unwrap_or_default(),
            region_hint,
            coordinate,
            // Replaced by the parsed status below.
            status: ResolutionStatus::Pending,
        },
        status,
    ))
}

#[async_trait]
impl RecordStore for DuckDbStore {
    fn kind(&self) -> RecordKind {
        self.kind
    }

    async fn fetch_batch(&self, query: &BatchQuery) -> Result<Vec<GeocodableRecord>, DbError> {
        let table = self.kind.table_name();
        let (cmp, dir) = match query.order {
            FetchOrder::Ascending => (">", "ASC"),
            FetchOrder::Descending => ("<", "DESC"),
        };
        let cursor_clause = if query.after.is_some() {
            format!(" AND id {cmp} ?")
        } else {
            String::new()
        };
        let sql = format!(
            "SELECT id, address_text, region_hint, latitude, longitude, resolution_status
             FROM {table}
             WHERE resolution_status = ?{cursor_clause}
             ORDER BY id {dir}
             LIMIT {limit}",
            limit = query.limit
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let status = query.status.as_ref();

        let rows: Vec<(GeocodableRecord, String)> = match &query.after {
            Some(after) => stmt
                .query_map(duckdb::params![status, after], row_to_record)?
                .collect::<Result<_, _>>()?,
            None => stmt
                .query_map(duckdb::params![status], row_to_record)?
                .collect::<Result<_, _>>()?,
        };

        rows.into_iter()
            .map(|(mut record, status)| {
                record.status = status.parse().map_err(|_| DbError::Conversion {
                    message: format!("Unknown resolution_status '{status}' on {}", record.id),
                })?;
                Ok(record)
            })
            .collect()
    }

    async fn update_resolution(
        &self,
        id: &str,
        status: ResolutionStatus,
        coordinate: Option<Coordinate>,
    ) -> Result<(), DbError> {
        check_resolution(id, status, coordinate.as_ref())?;

        let table = self.kind.table_name();
        let affected = self.conn().execute(
            &format!(
                "UPDATE {table}
                 SET resolution_status = ?, latitude = ?, longitude = ?,
                     resolved_at = CURRENT_TIMESTAMP
                 WHERE id = ?"
            ),
            duckdb::params![
                status.as_ref(),
                coordinate.map(|c| c.latitude),
                coordinate.map(|c| c.longitude),
                id,
            ],
        )?;

        if affected == 0 {
            return Err(DbError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    async fn count_by_status(&self) -> Result<BTreeMap<ResolutionStatus, u64>, DbError> {
        let table = self.kind.table_name();
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT resolution_status, COUNT(*) FROM {table} GROUP BY resolution_status"
        ))?;

        let mut counts: BTreeMap<ResolutionStatus, u64> =
            ResolutionStatus::iter().map(|s| (s, 0)).collect();

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            match status.parse::<ResolutionStatus>() {
                Ok(s) => {
                    counts.insert(s, u64::try_from(count).unwrap_or(0));
                }
                Err(_) => log::warn!("Ignoring unknown resolution_status '{status}' in {table}"),
            }
        }

        Ok(counts)
    }

    async fn load_region_centers(&self) -> Result<BTreeMap<String, Coordinate>, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT region_key, lat, lng FROM region_centers")?;
        let mut rows = stmt.query([])?;

        let mut centers = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let lat: f64 = row.get(1)?;
            let lng: f64 = row.get(2)?;
            centers.insert(key, Coordinate::new(lat, lng));
        }
        Ok(centers)
    }

    async fn save_region_center(
        &self,
        region_key: &str,
        region_name: &str,
        coordinate: Coordinate,
        provider: &str,
    ) -> Result<(), DbError> {
        self.conn().execute(
            "INSERT INTO region_centers (region_key, region_name, provider, lat, lng)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (region_key) DO NOTHING",
            duckdb::params![
                region_key,
                region_name,
                provider,
                coordinate.latitude,
                coordinate.longitude
            ],
        )?;
        Ok(())
    }
}
