//! Pipeline configuration.
//!
//! The default lives in `config/pipeline.toml` and is embedded at compile
//! time; `--config <path>` replaces it wholesale. Every loaded config is
//! checked by [`PipelineConfig::validate`] before any record is touched.

use std::path::Path;
use std::time::Duration;

use property_geo_geocoder::CountryContext;
use property_geo_geography_models::{Coordinate, CountryBounds};
use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::ResolveError;

const DEFAULT_PIPELINE_TOML: &str = include_str!("../config/pipeline.toml");

/// One rung of the resolution strategy chain.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyKind {
    /// Full address text plus region.
    FullAddress,
    /// Township/landmark segment of the address plus region.
    AreaExtract,
    /// Region name alone, via the administrative center cache.
    RegionCenter,
    /// The address, area and region queries again, sent only to
    /// providers held back as last resort.
    LastResort,
    /// Static region → capital table.
    CapitalFallback,
}

impl StrategyKind {
    /// Returns `true` for rungs that query with address text, as opposed
    /// to the region alone.
    #[must_use]
    pub const fn is_address_level(self) -> bool {
        matches!(self, Self::FullAddress | Self::AreaExtract)
    }
}

/// Country scoping for queries and the bounds check.
#[derive(Debug, Clone, Deserialize)]
pub struct CountryConfig {
    /// Name appended to every query.
    pub name: String,
    /// ISO 3166-1 alpha-2 code.
    pub code: String,
    /// Bounding box every accepted coordinate must fall in.
    pub bounds: CountryBounds,
}

/// A known whole-country centroid.
#[derive(Debug, Clone, Deserialize)]
pub struct DegenerateCentroid {
    /// Where the literal comes from, for logs.
    pub label: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl DegenerateCentroid {
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Degenerate-result filter settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DegenerateConfig {
    /// Per-axis tolerance in degrees.
    pub epsilon: f64,
    #[serde(default, rename = "centroid")]
    pub centroids: Vec<DegenerateCentroid>,
}

impl DegenerateConfig {
    /// Returns the centroid `coordinate` collapses onto, if any.
    #[must_use]
    pub fn matching(&self, coordinate: &Coordinate) -> Option<&DegenerateCentroid> {
        self.centroids
            .iter()
            .find(|c| c.coordinate().approx_eq(coordinate, self.epsilon))
    }
}

/// Region distance validation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Maximum distance from the region center before a coordinate is
    /// flagged.
    pub max_region_distance_km: f64,
    /// When set, a chain result must validate to be accepted.
    #[serde(default)]
    pub strict: bool,
}

/// Batch run settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Records fetched per page.
    pub batch_size: usize,
    /// Strategy rungs in the order they are tried.
    pub strategies: Vec<StrategyKind>,
    /// Minimum shift for the improve pass to overwrite a coordinate.
    pub improve_min_shift_km: f64,
}

/// Outbound HTTP settings shared by every provider.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    /// Base user agent; the contact from `contact_env` is appended.
    pub user_agent: String,
    /// Environment variable holding a contact address for the user agent.
    pub contact_env: String,
}

impl HttpConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the user agent, with the contact appended when present.
    #[must_use]
    pub fn user_agent_with(&self, contact: Option<&str>) -> String {
        match contact.map(str::trim).filter(|c| !c.is_empty()) {
            Some(contact) => format!("{} ({contact})", self.user_agent),
            None => self.user_agent.clone(),
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub country: CountryConfig,
    pub degenerate: DegenerateConfig,
    pub validation: ValidationConfig,
    pub run: RunConfig,
    pub http: HttpConfig,
}

impl PipelineConfig {
    /// Returns the embedded default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed.
    #[must_use]
    pub fn embedded() -> Self {
        toml::de::from_str(DEFAULT_PIPELINE_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse embedded pipeline config: {e}"))
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Io`] if the file cannot be read and
    /// [`ResolveError::Config`] if it does not parse or validate.
    pub fn from_path(path: &Path) -> Result<Self, ResolveError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::de::from_str(&text).map_err(|e| ResolveError::Config {
            message: format!("{}: {e}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, otherwise the embedded default, and
    /// validates it.
    ///
    /// # Errors
    ///
    /// See [`PipelineConfig::from_path`].
    pub fn load(path: Option<&Path>) -> Result<Self, ResolveError> {
        match path {
            Some(path) => Self::from_path(path),
            None => {
                let config = Self::embedded();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Config`] describing the first violation.
    pub fn validate(&self) -> Result<(), ResolveError> {
        let fail = |message: String| Err(ResolveError::Config { message });

        if self.country.name.trim().is_empty() {
            return fail("country.name must not be empty".to_string());
        }
        if self.country.code.trim().len() != 2 {
            return fail(format!(
                "country.code must be a two-letter ISO code, got '{}'",
                self.country.code
            ));
        }
        if !self.country.bounds.is_well_formed() {
            return fail(format!(
                "country.bounds are not ordered: {:?}",
                self.country.bounds
            ));
        }
        if self.degenerate.epsilon.is_nan() || self.degenerate.epsilon < 0.0 {
            return fail("degenerate.epsilon must be non-negative".to_string());
        }
        let threshold = self.validation.max_region_distance_km;
        if threshold.is_nan() || threshold <= 0.0 {
            return fail("validation.max_region_distance_km must be positive".to_string());
        }
        if self.run.batch_size == 0 {
            return fail("run.batch_size must be at least 1".to_string());
        }
        if self.run.strategies.is_empty() {
            return fail("run.strategies must list at least one rung".to_string());
        }
        for (i, strategy) in self.run.strategies.iter().enumerate() {
            if self.run.strategies[..i].contains(strategy) {
                return fail(format!("run.strategies lists '{strategy}' twice"));
            }
        }
        if self.run.improve_min_shift_km.is_nan() || self.run.improve_min_shift_km < 0.0 {
            return fail("run.improve_min_shift_km must be non-negative".to_string());
        }
        if self.http.timeout_secs == 0 {
            return fail("http.timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }

    /// Returns the country context handed to provider adapters.
    #[must_use]
    pub fn country_context(&self) -> CountryContext {
        CountryContext {
            name: self.country.name.clone(),
            code: self.country.code.to_lowercase(),
        }
    }
}
