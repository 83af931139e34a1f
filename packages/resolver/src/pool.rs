//! Ordered provider set with pacing and degenerate-result filtering.
//!
//! [`ProviderPool::query`] is the boundary where provider failures stop:
//! every error, empty result and degenerate centroid comes back as an
//! [`AttemptOutcome`] rather than an `Err`.

use std::sync::Arc;
use std::time::Duration;

use property_geo_geocoder::{GeocodeError, GeocodeProvider, rate_limit::RateLimiter};
use property_geo_geography_models::Coordinate;

use crate::config::DegenerateConfig;

/// Cooling period after a provider reports it is rate limited.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);

/// What a single provider call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// A usable coordinate.
    Found(Coordinate),
    /// The provider had no match.
    NoMatch,
    /// The provider returned a known whole-country centroid.
    Degenerate(Coordinate),
    /// The call failed; the message is for diagnostics only.
    Error(String),
}

/// One provider call made while resolving a record.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionAttempt {
    pub query: String,
    pub provider: String,
    pub outcome: AttemptOutcome,
}

/// Providers in priority order, sharing one rate limiter.
///
/// Providers flagged [`GeocodeProvider::is_last_resort`] are kept apart
/// from [`ProviderPool::providers`] and only reachable through
/// [`ProviderPool::last_resort`].
pub struct ProviderPool {
    providers: Vec<Arc<dyn GeocodeProvider>>,
    limiter: RateLimiter,
    degenerate: DegenerateConfig,
    backoff: Duration,
}

impl ProviderPool {
    /// Creates a pool and registers each provider's pacing interval.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn GeocodeProvider>>, degenerate: DegenerateConfig) -> Self {
        let limiter = RateLimiter::new();
        for provider in &providers {
            limiter.register(provider.id(), provider.min_interval());
        }
        Self {
            providers,
            limiter,
            degenerate,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Overrides the cooling period applied after a rate-limit response.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Returns the provider ids in the order they are tried.
    #[must_use]
    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    /// Returns the free providers in the order they are tried.
    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn GeocodeProvider>> {
        self.providers.iter().filter(|p| !p.is_last_resort())
    }

    /// Returns the providers held back for the last-resort rung.
    pub fn last_resort(&self) -> impl Iterator<Item = &Arc<dyn GeocodeProvider>> {
        self.providers.iter().filter(|p| p.is_last_resort())
    }

    /// Returns `true` if `coordinate` is a known whole-country centroid.
    #[must_use]
    pub fn is_degenerate(&self, coordinate: &Coordinate) -> bool {
        self.degenerate.matching(coordinate).is_some()
    }

    /// Sends `query` to one provider after waiting for its slot.
    pub async fn query(&self, provider: &dyn GeocodeProvider, query: &str) -> ResolutionAttempt {
        self.limiter.acquire(provider.id()).await;

        let outcome = match provider.geocode(query).await {
            Ok(Some(geocoded)) => {
                let coordinate = geocoded.coordinate;
                if let Some(centroid) = self.degenerate.matching(&coordinate) {
                    log::debug!(
                        "{}: '{query}' collapsed to {} {coordinate}",
                        provider.id(),
                        centroid.label
                    );
                    AttemptOutcome::Degenerate(coordinate)
                } else if coordinate.is_on_globe() {
                    AttemptOutcome::Found(coordinate)
                } else {
                    log::warn!(
                        "{}: '{query}' returned impossible coordinate {coordinate}",
                        provider.id()
                    );
                    AttemptOutcome::Error(format!("impossible coordinate {coordinate}"))
                }
            }
            Ok(None) => AttemptOutcome::NoMatch,
            Err(GeocodeError::RateLimited) => {
                self.limiter.back_off(provider.id(), self.backoff);
                AttemptOutcome::Error(GeocodeError::RateLimited.to_string())
            }
            Err(e) => {
                log::warn!("{} error for '{query}': {e}", provider.id());
                AttemptOutcome::Error(e.to_string())
            }
        };

        ResolutionAttempt {
            query: query.to_string(),
            provider: provider.id().to_string(),
            outcome,
        }
    }
}
