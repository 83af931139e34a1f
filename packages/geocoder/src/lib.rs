#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geocoding provider adapters for property listings and transactions.
//!
//! Converts free-text address queries to latitude/longitude coordinates
//! using providers configured via TOML files in `services/`:
//!
//! 1. **Nominatim / OpenStreetMap** (priority 1): free, strict 1 req/sec
//!    rate limit, requires a contact-identifying user agent.
//! 2. **Google Geocoding API** (priority 2): paid, generous quota, only
//!    active when its API key environment variable is set, and flagged
//!    [`GeocodeProvider::is_last_resort`].
//!
//! Every adapter implements [`GeocodeProvider`] and reports network
//! errors, non-2xx responses and malformed payloads as [`GeocodeError`];
//! an empty result set is `Ok(None)`. Callers decide how far an error
//! travels. Pacing between requests is also the caller's job; see
//! [`rate_limit::RateLimiter`].

pub mod google;
pub mod nominatim;
pub mod rate_limit;
pub mod service_registry;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use property_geo_geography_models::Coordinate;

/// A geocoding result with coordinates and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedAddress {
    /// Resolved WGS84 coordinate.
    pub coordinate: Coordinate,
    /// The matched/canonical address returned by the provider.
    pub matched_address: Option<String>,
}

/// The country every query is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryContext {
    /// Country name appended to free-text queries (e.g. `"Malaysia"`).
    pub name: String,
    /// ISO 3166-1 alpha-2 code passed as a provider filter (e.g. `"my"`).
    pub code: String,
}

impl CountryContext {
    /// Appends `", {name}"` to `query` unless it already ends with the
    /// country name.
    #[must_use]
    pub fn qualify(&self, query: &str) -> String {
        let query = query.trim().trim_end_matches(',').trim_end();
        if query.is_empty() {
            return self.name.clone();
        }
        if query.to_lowercase().ends_with(&self.name.to_lowercase()) {
            return query.to_string();
        }
        format!("{query}, {}", self.name)
    }
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed (connection, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success HTTP status.
    #[error("HTTP status {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
    },

    /// Provider answered 2xx but reported an error in the payload.
    #[error("Provider error {status}: {message}")]
    Provider {
        /// Provider-specific status string.
        status: String,
        /// Error message from the payload, if any.
        message: String,
    },

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,
}

/// A single external geocoding service.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    /// Stable identifier (e.g. `"nominatim"`), used as the rate limiter
    /// key and in diagnostics.
    fn id(&self) -> &str;

    /// Minimum delay between two requests to this provider.
    fn min_interval(&self) -> Duration;

    /// Whether callers should hold this provider back until the free
    /// providers have nothing left to offer (e.g. a metered API).
    fn is_last_resort(&self) -> bool {
        false
    }

    /// Geocodes a free-text query, surfacing failures as errors.
    ///
    /// Implementations append the country context to `query`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the request fails, the provider returns
    /// a non-success status, or the payload is malformed.
    async fn geocode(&self, query: &str) -> Result<Option<GeocodedAddress>, GeocodeError>;
}

/// Maps a non-success HTTP status to a [`GeocodeError`].
pub(crate) fn status_error(status: reqwest::StatusCode) -> GeocodeError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        GeocodeError::RateLimited
    } else {
        GeocodeError::Status {
            status: status.as_u16(),
        }
    }
}
