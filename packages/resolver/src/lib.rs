#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch address-to-coordinate resolution for property listings and
//! transactions.
//!
//! A run pulls pages of records from a [`RecordStore`] by status, walks
//! each through the [`StrategyChain`](strategy::StrategyChain)
//! (full address → extracted area → region center → paid last resort →
//! capital table),
//! validates the winner against the country bounds and the region's
//! administrative center, and writes the outcome back one record at a
//! time:
//!
//! - [`Pipeline::resolve`]: `Pending` first pass, `Failed` retry, or
//!   `Suspect` repair.
//! - [`Pipeline::audit`]: re-checks `Resolved` records against their
//!   region centers and flags outliers `Suspect`.
//! - [`Pipeline::improve`]: re-runs the address-level rungs for precise
//!   addresses and moves coordinates that were only region-level.

pub mod audit;
pub mod center_cache;
pub mod config;
pub mod improve;
pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod report;
pub mod strategy;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use property_geo_database::{DbError, RecordStore};
use thiserror::Error;

use crate::center_cache::AdministrativeCenterCache;
use crate::config::PipelineConfig;
use crate::pool::ProviderPool;
use crate::progress::{RunProgress, no_progress};
use crate::strategy::StrategyChain;
use crate::validate::Validator;

/// Errors that abort a run.
///
/// Per-record failures (provider errors, store write failures) never
/// surface here; they are logged and counted.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Invalid or unusable configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong.
        message: String,
    },

    /// The record store failed on a read.
    #[error(transparent)]
    Store(#[from] DbError),

    /// I/O error (config file, summary file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction failed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Everything a run needs: config, store, providers and the region
/// center cache.
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn RecordStore>,
    chain: StrategyChain,
    centers: AdministrativeCenterCache,
    progress: Arc<dyn RunProgress>,
}

impl Pipeline {
    /// Assembles a pipeline over `pool` and `store`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Config`] if the pool has no providers.
    pub fn new(
        config: PipelineConfig,
        pool: ProviderPool,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self, ResolveError> {
        if pool.is_empty() {
            return Err(ResolveError::Config {
                message: "no usable geocoding provider is configured".to_string(),
            });
        }

        let pool = Arc::new(pool);
        let centers = AdministrativeCenterCache::new(Arc::clone(&pool), config.country.bounds)
            .with_store(Arc::clone(&store));
        let validator = Validator::new(
            config.country.bounds,
            config.validation.max_region_distance_km,
        );
        let chain = StrategyChain::new(config.run.strategies.clone(), pool, validator);

        Ok(Self {
            config,
            store,
            chain,
            centers,
            progress: no_progress(),
        })
    }

    /// Reports record ticks and batch counters to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn RunProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Loads region centers persisted by earlier runs into the cache.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Store`] if the store read fails.
    pub async fn warm_centers(&mut self) -> Result<usize, ResolveError> {
        self.centers.seed_from_store().await
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the region center cache.
    #[must_use]
    pub const fn centers(&self) -> &AdministrativeCenterCache {
        &self.centers
    }
}
