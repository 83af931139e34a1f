//! Administrative region centers, resolved once per region.
//!
//! Region hints are normalized before lookup: `"Klang District"`,
//! `"Daerah Klang"` and `" klang "` all share the key `"klang"`. The first
//! request for a key queries the providers with the region's display name;
//! the answer, including a miss, is kept for the rest of the process so a
//! cache hit never costs a network call. Hits found by providers are also
//! written through to the record store so later runs can start warm.

use std::collections::BTreeMap;
use std::sync::Arc;

use property_geo_database::RecordStore;
use property_geo_geography::region::{display_name, region_key};
use property_geo_geography_models::{Coordinate, CountryBounds};

use crate::ResolveError;
use crate::pool::{AttemptOutcome, ProviderPool};

/// Memoized region name → center coordinate map.
pub struct AdministrativeCenterCache {
    pool: Arc<ProviderPool>,
    bounds: CountryBounds,
    store: Option<Arc<dyn RecordStore>>,
    entries: BTreeMap<String, Option<Coordinate>>,
    lookups: u64,
}

impl AdministrativeCenterCache {
    /// Creates an empty cache that resolves misses through `pool`.
    ///
    /// Provider answers outside `bounds` are treated as misses.
    #[must_use]
    pub const fn new(pool: Arc<ProviderPool>, bounds: CountryBounds) -> Self {
        Self {
            pool,
            bounds,
            store: None,
            entries: BTreeMap::new(),
            lookups: 0,
        }
    }

    /// Persists newly resolved centers to `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Loads centers persisted by earlier runs.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Store`] if the store read fails.
    pub async fn seed_from_store(&mut self) -> Result<usize, ResolveError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let persisted = store.load_region_centers().await?;
        let count = persisted.len();
        for (key, coordinate) in persisted {
            self.entries.entry(key).or_insert(Some(coordinate));
        }
        log::info!("Loaded {count} persisted region center(s)");
        Ok(count)
    }

    /// Returns the center of `region`, querying providers on first use.
    pub async fn center_of(&mut self, region: &str) -> Option<Coordinate> {
        let key = region_key(region);
        if key.is_empty() {
            return None;
        }
        if let Some(cached) = self.entries.get(&key) {
            return *cached;
        }

        let name = display_name(region);
        let resolved = self.lookup(&name).await;
        self.entries
            .insert(key.clone(), resolved.as_ref().map(|(c, _)| *c));

        let (coordinate, provider) = resolved?;
        if let Some(store) = &self.store
            && let Err(e) = store
                .save_region_center(&key, &name, coordinate, &provider)
                .await
        {
            log::warn!("Failed to persist center for region '{name}': {e}");
        }
        Some(coordinate)
    }

    /// Returns the cached entry for `region` without querying providers.
    ///
    /// `None` means never looked up; `Some(None)` is a remembered miss.
    #[must_use]
    pub fn peek(&self, region: &str) -> Option<Option<Coordinate>> {
        self.entries.get(&region_key(region)).copied()
    }

    /// Number of region lookups sent to providers so far.
    #[must_use]
    pub const fn lookups(&self) -> u64 {
        self.lookups
    }

    async fn lookup(&mut self, name: &str) -> Option<(Coordinate, String)> {
        self.lookups += 1;
        for provider in self.pool.providers() {
            let attempt = self.pool.query(provider.as_ref(), name).await;
            match attempt.outcome {
                AttemptOutcome::Found(c) if self.bounds.contains(&c) => {
                    log::debug!("Region '{name}' centered at {c} via {}", attempt.provider);
                    return Some((c, attempt.provider));
                }
                AttemptOutcome::Found(c) => {
                    log::warn!(
                        "{}: center for region '{name}' is outside the country: {c}",
                        attempt.provider
                    );
                }
                AttemptOutcome::NoMatch
                | AttemptOutcome::Degenerate(_)
                | AttemptOutcome::Error(_) => {}
            }
        }
        log::warn!("Could not resolve a center for region '{name}'");
        None
    }
}
