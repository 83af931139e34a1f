//! Google Geocoding API client.
//!
//! Paid fallback behind Nominatim. Requires an API key; results are
//! biased to the configured country with the `region` parameter.
//!
//! See <https://developers.google.com/maps/documentation/geocoding/requests-geocoding>

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    Coordinate, CountryContext, GeocodeError, GeocodeProvider, GeocodedAddress, status_error,
};

/// Geocodes a single address with the Google Geocoding API.
///
/// The key travels in the query string, so transport errors are stripped
/// of their URL before they leave this function.
///
/// # Errors
///
/// Returns [`GeocodeError`] if the HTTP request fails, the server returns
/// a non-success status, or the payload reports an error status.
pub async fn geocode_address(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    country_code: &str,
    query: &str,
) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let resp = client
        .get(base_url)
        .query(&[("address", query), ("region", country_code), ("key", api_key)])
        .send()
        .await
        .map_err(redact)?;

    if !resp.status().is_success() {
        return Err(status_error(resp.status()));
    }

    let body: serde_json::Value = resp.json().await.map_err(redact)?;
    parse_response(&body)
}

fn redact(e: reqwest::Error) -> GeocodeError {
    GeocodeError::Http(e.without_url())
}

/// Parses a Google Geocoding JSON response.
///
/// `ZERO_RESULTS` is a clean miss. `OVER_QUERY_LIMIT` maps to
/// [`GeocodeError::RateLimited`]; every other non-`OK` status is a
/// [`GeocodeError::Provider`].
fn parse_response(body: &serde_json::Value) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let status = body["status"].as_str().ok_or_else(|| GeocodeError::Parse {
        message: "Missing status in Google response".to_string(),
    })?;

    match status {
        "OK" => {}
        "ZERO_RESULTS" => return Ok(None),
        "OVER_QUERY_LIMIT" => return Err(GeocodeError::RateLimited),
        other => {
            return Err(GeocodeError::Provider {
                status: other.to_string(),
                message: body["error_message"].as_str().unwrap_or("").to_string(),
            });
        }
    }

    let Some(first) = body["results"].as_array().and_then(|r| r.first()) else {
        return Ok(None);
    };

    let location = &first["geometry"]["location"];
    let (Some(lat), Some(lng)) = (location["lat"].as_f64(), location["lng"].as_f64()) else {
        return Err(GeocodeError::Parse {
            message: "Missing geometry.location in Google response".to_string(),
        });
    };

    Ok(Some(GeocodedAddress {
        coordinate: Coordinate::new(lat, lng),
        matched_address: first["formatted_address"].as_str().map(String::from),
    }))
}

/// [`GeocodeProvider`] backed by the Google Geocoding API.
pub struct GoogleProvider {
    id: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    country: CountryContext,
    min_interval: Duration,
    last_resort: bool,
}

impl GoogleProvider {
    /// Creates a provider that authenticates with `api_key`.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        country: CountryContext,
        min_interval: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
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
impl GeocodeProvider for GoogleProvider {
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
        geocode_address(
            &self.client,
            &self.base_url,
            &self.api_key,
            &self.country.code,
            &query,
        )
        .await
    }
}
