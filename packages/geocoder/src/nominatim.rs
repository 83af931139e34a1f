//! Nominatim / OpenStreetMap geocoder client.
//!
//! The free first choice for every query. The public instance enforces
//! **1 request per second** and requires a user agent that identifies the
//! caller; both are the caller's responsibility (see `rate_limit_ms` in
//! the service TOML and the client builder in the resolver).
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    Coordinate, CountryContext, GeocodeError, GeocodeProvider, GeocodedAddress, status_error,
};

/// Geocodes a free-form query using the Nominatim search endpoint.
///
/// The query is sent as-is; callers append country context.
///
/// # Errors
///
/// Returns [`GeocodeError`] if the HTTP request fails, the server returns
/// a non-success status, or the response cannot be parsed.
pub async fn geocode_freeform(
    client: &reqwest::Client,
    base_url: &str,
    country_code: &str,
    query: &str,
) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let resp = client
        .get(base_url)
        .query(&[
            ("q", query),
            ("format", "json"),
            ("limit", "1"),
            ("countrycodes", country_code),
        ])
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(status_error(resp.status()));
    }

    let body: serde_json::Value = resp.json().await?;
    parse_response(&body)
}

/// Parses Nominatim JSON response.
fn parse_response(body: &serde_json::Value) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let results = body.as_array().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    let Some(first) = results.first() else {
        return Ok(None);
    };

    let lat = first["lat"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing lat in Nominatim response".to_string(),
        })?;

    let lon = first["lon"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing lon in Nominatim response".to_string(),
        })?;

    let display_name = first["display_name"].as_str().map(String::from);

    Ok(Some(GeocodedAddress {
        coordinate: Coordinate::new(lat, lon),
        matched_address: display_name,
    }))
}

/// [`GeocodeProvider`] backed by a Nominatim instance.
pub struct NominatimProvider {
    id: String,
    client: reqwest::Client,
    base_url: String,
    country: CountryContext,
    min_interval: Duration,
    last_resort: bool,
}

impl NominatimProvider {
    /// Creates a provider for the instance at `base_url`.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        client: reqwest::Client,
        base_url: impl Into<String>,
        country: CountryContext,
        min_interval: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            client,
            base_url: base_url.into(),
            country,
            min_interval,
            last_resort: false,
        }
    }

    /// Marks the provider as one to hold back until free providers are
    /// exhausted.
    #[must_use]
    pub const fn with_last_resort(mut self, last_resort: bool) -> Self {
        self.last_resort = last_resort;
        self
    }
}

#[async_trait]
impl GeocodeProvider for NominatimProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn min_interval(&self) -> Duration {
        self.min_interval
    }

    fn is_last_resort(&self) -> bool {
        self.last_resort
    }

    async fn geocode(&self, query: &str) -> Result<Option<GeocodedAddress>, GeocodeError> {
        let query = self.country.qualify(query);
        geocode_freeform(&self.client, &self.base_url, &self.country.code, &query).await
    }
}
