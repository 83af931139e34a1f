//! Compile-time registry of geocoding service configurations.
//!
//! Each geocoding provider is defined in a TOML file under `services/`.
//! The registry embeds these at compile time and exposes them via
//! [`all_services`] and [`enabled_services`]. [`build_providers`] turns the
//! enabled entries into live [`GeocodeProvider`]s.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::{
    CountryContext, GeocodeProvider, google::GoogleProvider, nominatim::NominatimProvider,
};

/// A geocoding service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    /// Unique identifier (e.g., `"nominatim"`, `"google"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether this service is active in the geocoding pipeline.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Execution order; lower values run first.
    pub priority: u32,
    /// Only consulted after the free providers have been exhausted.
    #[serde(default)]
    pub last_resort: bool,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Nominatim / `OpenStreetMap` geocoder.
    Nominatim {
        /// API base URL (e.g., `"https://nominatim.openstreetmap.org/search"`).
        base_url: String,
        /// Minimum delay between requests in milliseconds.
        rate_limit_ms: u64,
    },
    /// Google Geocoding API.
    Google {
        /// API base URL.
        base_url: String,
        /// Minimum delay between requests in milliseconds.
        rate_limit_ms: u64,
        /// Environment variable holding the API key.
        api_key_env: String,
    },
}

const fn default_true() -> bool {
    true
}

impl GeocodingService {
    /// Returns the provider's base URL regardless of variant.
    #[must_use]
    pub fn base_url(&self) -> &str {
        match &self.provider {
            ProviderConfig::Nominatim { base_url, .. } | ProviderConfig::Google { base_url, .. } => {
                base_url
            }
        }
    }

    /// Returns the minimum delay between two requests to this service.
    #[must_use]
    pub const fn rate_limit(&self) -> Duration {
        match &self.provider {
            ProviderConfig::Nominatim { rate_limit_ms, .. }
            | ProviderConfig::Google { rate_limit_ms, .. } => Duration::from_millis(*rate_limit_ms),
        }
    }

    /// Returns the environment variable this service needs, if any.
    #[must_use]
    pub fn required_env(&self) -> Option<&str> {
        match &self.provider {
            ProviderConfig::Nominatim { .. } => None,
            ProviderConfig::Google { api_key_env, .. } => Some(api_key_env),
        }
    }
}

// ── Compile-time embedded TOML files ────────────────────────────────

const SERVICE_TOMLS: &[(&str, &str)] = &[
    ("nominatim", include_str!("../services/nominatim.toml")),
    ("google", include_str!("../services/google.toml")),
];

#[cfg(test)]
const EXPECTED_SERVICE_COUNT: usize = 2;

/// Returns all geocoding service configurations (enabled and disabled).
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_services() -> Vec<GeocodingService> {
    SERVICE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse geocoding service '{name}': {e}"))
        })
        .collect()
}

/// Returns only enabled services, sorted by priority (ascending).
#[must_use]
pub fn enabled_services() -> Vec<GeocodingService> {
    let mut services: Vec<GeocodingService> =
        all_services().into_iter().filter(|s| s.enabled).collect();
    services.sort_by_key(|s| s.priority);
    services
}

/// Instantiates providers for `services`, preserving their order.
///
/// `secret` resolves environment variable names to values. Services whose
/// secret is missing or blank are skipped with an info log.
#[must_use]
pub fn build_providers(
    services: &[GeocodingService],
    client: &reqwest::Client,
    country: &CountryContext,
    secret: impl Fn(&str) -> Option<String>,
) -> Vec<Arc<dyn GeocodeProvider>> {
    let mut providers: Vec<Arc<dyn GeocodeProvider>> = Vec::with_capacity(services.len());

    for svc in services {
        match &svc.provider {
            ProviderConfig::Nominatim { base_url, .. } => {
                providers.push(Arc::new(
                    NominatimProvider::new(
                        svc.id.clone(),
                        client.clone(),
                        base_url.clone(),
                        country.clone(),
                        svc.rate_limit(),
                    )
                    .with_last_resort(svc.last_resort),
                ));
            }
            ProviderConfig::Google {
                base_url,
                api_key_env,
                ..
            } => {
                let Some(key) = secret(api_key_env).filter(|k| !k.trim().is_empty()) else {
                    log::info!("Skipping {}: {api_key_env} is not set", svc.name);
                    continue;
                };
                providers.push(Arc::new(
                    GoogleProvider::new(
                        svc.id.clone(),
                        client.clone(),
                        base_url.clone(),
                        key,
                        country.clone(),
                        svc.rate_limit(),
                    )
                    .with_last_resort(svc.last_resort),
                ));
            }
        }
    }

    providers
}
