//! Static region → administrative capital fallback table.
//!
//! The table is embedded from `data/capitals.toml` at compile time. It is
//! consulted only after every provider lookup for a record has failed, so
//! it favours coverage of commonly named regions over precision.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use property_geo_geography_models::Coordinate;
use serde::Deserialize;

use crate::region::region_key;

/// One entry of the capital fallback table.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionCapital {
    /// Canonical region name (state, federal territory or district).
    pub region: String,
    /// Name of the administrative capital.
    pub capital: String,
    /// Capital latitude.
    pub latitude: f64,
    /// Capital longitude.
    pub longitude: f64,
    /// Alternative spellings of the region name.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl RegionCapital {
    /// Returns the capital's coordinate.
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

#[derive(Deserialize)]
struct CapitalsFile {
    capital: Vec<RegionCapital>,
}

const CAPITALS_TOML: &str = include_str!("../data/capitals.toml");

/// Region key (and alias keys) → table entry.
static CAPITALS: LazyLock<BTreeMap<String, RegionCapital>> = LazyLock::new(|| {
    let file: CapitalsFile = toml::de::from_str(CAPITALS_TOML)
        .unwrap_or_else(|e| panic!("Failed to parse embedded capitals table: {e}"));

    let mut map = BTreeMap::new();
    for entry in file.capital {
        for alias in &entry.aliases {
            map.insert(region_key(alias), entry.clone());
        }
        map.insert(region_key(&entry.region), entry);
    }
    log::debug!("Loaded {} capital fallback keys", map.len());
    map
});

/// Looks up the fallback capital for a region hint.
///
/// The hint is normalized with [`region_key`], so `"Klang District"` and
/// `"klang"` find the same entry.
#[must_use]
pub fn capital_for(region: &str) -> Option<&'static RegionCapital> {
    let key = region_key(region);
    if key.is_empty() {
        return None;
    }
    CAPITALS.get(&key)
}

/// Returns every distinct table entry, ordered by region name.
#[must_use]
pub fn all_capitals() -> Vec<&'static RegionCapital> {
    let mut seen = std::collections::BTreeSet::new();
    let mut entries: Vec<&RegionCapital> = CAPITALS
        .values()
        .filter(|c| seen.insert(c.region.as_str()))
        .collect();
    entries.sort_by(|a, b| a.region.cmp(&b.region));
    entries
}
