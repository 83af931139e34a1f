//! CSV seeding for the `DuckDB` store.
//!
//! Expects a header row with `id`, `address` and `region` columns (extra
//! columns are ignored). Every imported record starts `Pending`.

use std::io::Read;
use std::path::Path;

use property_geo_database_models::GeocodableRecord;
use serde::Deserialize;

use crate::DbError;
use crate::records_db::DuckDbStore;

#[derive(Debug, Deserialize)]
struct ImportRow {
    id: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    region: Option<String>,
}

/// Parses import rows from any reader.
///
/// Rows with a blank id are skipped with a warning.
///
/// # Errors
///
/// Returns [`DbError::Csv`] if the input is not valid CSV.
pub fn parse_records<R: Read>(reader: R) -> Result<Vec<GeocodableRecord>, DbError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut records = Vec::new();
    for (line, row) in csv_reader.deserialize::<ImportRow>().enumerate() {
        let row = row?;
        if row.id.is_empty() {
            log::warn!("Skipping import row {} with blank id", line + 2);
            continue;
        }
        let region = row.region.as_deref().filter(|r| !r.is_empty());
        records.push(GeocodableRecord::pending(row.id, row.address, region));
    }
    Ok(records)
}

/// Imports a CSV file into `store`, returning the number of new rows.
///
/// # Errors
///
/// Returns [`DbError`] if the file cannot be read or parsed, or the
/// insert fails.
pub fn import_csv(store: &DuckDbStore, path: &Path) -> Result<u64, DbError> {
    let file = std::fs::File::open(path)?;
    let records = parse_records(file)?;
    log::info!(
        "Importing {} record(s) from {}",
        records.len(),
        path.display()
    );
    store.insert_records(&records)
}
