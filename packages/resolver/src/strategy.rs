//! The ordered fallback chain that turns a record into a coordinate.
//!
//! Rungs, in the default order:
//! 1. [`StrategyKind::FullAddress`]: `"{address}, {region}"`
//! 2. [`StrategyKind::AreaExtract`]: `"{township segment}, {region}"`
//! 3. [`StrategyKind::RegionCenter`]: the region's administrative center
//! 4. [`StrategyKind::LastResort`]: rungs 1 to 3 again, against the paid
//!    providers only
//! 5. [`StrategyKind::CapitalFallback`]: the static capital table
//!
//! Address rungs try every free provider in priority order before moving
//! on. Providers flagged as last resort are never asked before the free
//! rungs have come up empty. The chain stops at the first accepted
//! candidate.

use std::sync::Arc;

use property_geo_database_models::GeocodableRecord;
use property_geo_geocoder::GeocodeProvider;
use property_geo_geography::capitals::capital_for;
use property_geo_geography::precision::extract_area;
use property_geo_geography::region::{display_name, same_region};
use property_geo_geography_models::Coordinate;

use crate::center_cache::AdministrativeCenterCache;
use crate::config::StrategyKind;
use crate::pool::{AttemptOutcome, ProviderPool, ResolutionAttempt};
use crate::validate::{Validation, Validator};

/// Source label for candidates taken from the region center cache.
pub const REGION_CENTER_SOURCE: &str = "region_center";
/// Source label for candidates taken from the capital table.
pub const CAPITAL_TABLE_SOURCE: &str = "capital_table";

/// How demanding the chain is about a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Any non-degenerate candidate inside the country is accepted;
    /// distance problems are reported on the [`Resolution`].
    Lenient,
    /// Only candidates that fully validate are accepted.
    Strict,
}

impl Acceptance {
    #[must_use]
    pub const fn from_strict(strict: bool) -> Self {
        if strict { Self::Strict } else { Self::Lenient }
    }
}

/// An accepted chain result.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub coordinate: Coordinate,
    /// The rung that produced it.
    pub strategy: StrategyKind,
    /// Provider id, or the static source the rung used.
    pub source: String,
    /// Validation verdict at acceptance time.
    pub validation: Validation,
}

/// Ordered list of rungs sharing one provider pool.
pub struct StrategyChain {
    strategies: Vec<StrategyKind>,
    pool: Arc<ProviderPool>,
    validator: Validator,
}

impl StrategyChain {
    #[must_use]
    pub const fn new(
        strategies: Vec<StrategyKind>,
        pool: Arc<ProviderPool>,
        validator: Validator,
    ) -> Self {
        Self {
            strategies,
            pool,
            validator,
        }
    }

    #[must_use]
    pub fn strategies(&self) -> &[StrategyKind] {
        &self.strategies
    }

    #[must_use]
    pub const fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Runs every configured rung.
    pub async fn resolve(
        &self,
        record: &GeocodableRecord,
        centers: &mut AdministrativeCenterCache,
        acceptance: Acceptance,
        attempts: &mut Vec<ResolutionAttempt>,
    ) -> Option<Resolution> {
        self.resolve_with(&self.strategies, record, centers, acceptance, attempts)
            .await
    }

    /// Runs only `rungs`, in the given order.
    pub async fn resolve_with(
        &self,
        rungs: &[StrategyKind],
        record: &GeocodableRecord,
        centers: &mut AdministrativeCenterCache,
        acceptance: Acceptance,
        attempts: &mut Vec<ResolutionAttempt>,
    ) -> Option<Resolution> {
        let region = record.region();

        for &strategy in rungs {
            let found = match strategy {
                StrategyKind::FullAddress | StrategyKind::AreaExtract => {
                    let query = if strategy == StrategyKind::FullAddress {
                        full_address_query(record)
                    } else {
                        area_query(record)
                    };
                    match query {
                        Some(query) => {
                            self.ask_providers(strategy, &query, region, centers, acceptance, attempts)
                                .await
                        }
                        None => None,
                    }
                }
                StrategyKind::RegionCenter => {
                    self.region_center(region, centers, acceptance).await
                }
                StrategyKind::LastResort => {
                    self.last_resort(record, centers, acceptance, attempts).await
                }
                StrategyKind::CapitalFallback => {
                    self.capital_fallback(record, centers, acceptance).await
                }
            };

            if let Some(resolution) = found {
                log::debug!(
                    "Record {} resolved by {} via {}: {}",
                    record.id,
                    resolution.strategy,
                    resolution.source,
                    resolution.coordinate
                );
                return Some(resolution);
            }
        }

        log::debug!("Record {}: all strategies exhausted", record.id);
        None
    }

    async fn region_center(
        &self,
        region: Option<&str>,
        centers: &mut AdministrativeCenterCache,
        acceptance: Acceptance,
    ) -> Option<Resolution> {
        let region = region?;
        let center = centers.center_of(region).await?;
        self.accept(
            StrategyKind::RegionCenter,
            center,
            REGION_CENTER_SOURCE,
            region,
            centers,
            acceptance,
        )
        .await
    }

    async fn capital_fallback(
        &self,
        record: &GeocodableRecord,
        centers: &mut AdministrativeCenterCache,
        acceptance: Acceptance,
    ) -> Option<Resolution> {
        let region = record.region()?;
        let capital = capital_for(region)?;
        log::debug!(
            "Record {}: falling back to {} for region '{region}'",
            record.id,
            capital.capital
        );
        self.accept(
            StrategyKind::CapitalFallback,
            capital.coordinate(),
            CAPITAL_TABLE_SOURCE,
            region,
            centers,
            acceptance,
        )
        .await
    }

    async fn last_resort(
        &self,
        record: &GeocodableRecord,
        centers: &mut AdministrativeCenterCache,
        acceptance: Acceptance,
        attempts: &mut Vec<ResolutionAttempt>,
    ) -> Option<Resolution> {
        if self.pool.last_resort().next().is_none() {
            return None;
        }
        let region = record.region();
        let mut queries: Vec<String> = Vec::with_capacity(3);
        let candidates = [
            full_address_query(record),
            area_query(record),
            region.map(display_name),
        ];
        for query in candidates.into_iter().flatten() {
            if !query.is_empty() && !queries.contains(&query) {
                queries.push(query);
            }
        }

        for query in &queries {
            let found = self
                .ask_providers(
                    StrategyKind::LastResort,
                    query,
                    region,
                    centers,
                    acceptance,
                    attempts,
                )
                .await;
            if found.is_some() {
                return found;
            }
        }
        None
    }

    /// Sends `query` to the providers `strategy` may use: the paid ones
    /// for [`StrategyKind::LastResort`], the free ones otherwise.
    async fn ask_providers(
        &self,
        strategy: StrategyKind,
        query: &str,
        region: Option<&str>,
        centers: &mut AdministrativeCenterCache,
        acceptance: Acceptance,
        attempts: &mut Vec<ResolutionAttempt>,
    ) -> Option<Resolution> {
        let providers: Vec<Arc<dyn GeocodeProvider>> = if strategy == StrategyKind::LastResort {
            self.pool.last_resort().cloned().collect()
        } else {
            self.pool.providers().cloned().collect()
        };
        for provider in &providers {
            let attempt = self.pool.query(provider.as_ref(), query).await;
            let found = match &attempt.outcome {
                AttemptOutcome::Found(c) => Some(*c),
                AttemptOutcome::NoMatch
                | AttemptOutcome::Degenerate(_)
                | AttemptOutcome::Error(_) => None,
            };
            let source = attempt.provider.clone();
            attempts.push(attempt);

            let Some(candidate) = found else {
                continue;
            };
            let verdict = self
                .verdict(candidate, region, centers, acceptance)
                .await;
            match verdict {
                Some(validation) => {
                    return Some(Resolution {
                        coordinate: candidate,
                        strategy,
                        source,
                        validation,
                    });
                }
                None => log::debug!("{source}: rejected {candidate} for '{query}'"),
            }
        }
        None
    }

    async fn accept(
        &self,
        strategy: StrategyKind,
        candidate: Coordinate,
        source: &str,
        region: &str,
        centers: &mut AdministrativeCenterCache,
        acceptance: Acceptance,
    ) -> Option<Resolution> {
        let validation = self
            .verdict(candidate, Some(region), centers, acceptance)
            .await?;
        Some(Resolution {
            coordinate: candidate,
            strategy,
            source: source.to_string(),
            validation,
        })
    }

    /// Returns the validation verdict if `acceptance` admits the
    /// candidate.
    async fn verdict(
        &self,
        candidate: Coordinate,
        region: Option<&str>,
        centers: &mut AdministrativeCenterCache,
        acceptance: Acceptance,
    ) -> Option<Validation> {
        if self.pool.is_degenerate(&candidate) {
            return None;
        }
        let validation = self.validator.validate(&candidate, region, centers).await;
        match (acceptance, validation) {
            (_, Validation::OutOfCountryBounds)
            | (Acceptance::Strict, Validation::TooFarFromRegion { .. }) => None,
            (_, validation) => Some(validation),
        }
    }
}

/// `"{address}, {region}"`, or `None` when the address is empty or only
/// names the region.
#[must_use]
pub fn full_address_query(record: &GeocodableRecord) -> Option<String> {
    let region = record.region();
    let address = record.address_text.trim();
    if region.is_some_and(|r| same_region(address, r)) {
        return None;
    }
    compose(address, region)
}

/// `"{area}, {region}"` for the township/landmark segment of the address,
/// or `None` when there is no such segment or the query would repeat
/// [`full_address_query`].
#[must_use]
pub fn area_query(record: &GeocodableRecord) -> Option<String> {
    let region = record.region();
    let area = extract_area(&record.address_text, region)?;
    let query = compose(&area, region)?;
    if full_address_query(record).as_deref() == Some(query.as_str()) {
        return None;
    }
    Some(query)
}

fn compose(text: &str, region: Option<&str>) -> Option<String> {
    let text = text.trim().trim_end_matches(',').trim_end();
    if text.is_empty() {
        return None;
    }
    match region {
        Some(region) if !text.split(',').any(|segment| same_region(segment, region)) => {
            Some(format!("{text}, {}", display_name(region)))
        }
        _ => Some(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::testing::{CallLog, ScriptedProvider};
    use std::time::Duration;

    use property_geo_geocoder::nominatim::NominatimProvider;

    struct Harness {
        chain: StrategyChain,
        centers: AdministrativeCenterCache,
    }

    fn harness(provider: ScriptedProvider) -> Harness {
        harness_over(vec![Arc::new(provider) as Arc<dyn GeocodeProvider>])
    }

    fn harness_over(providers: Vec<Arc<dyn GeocodeProvider>>) -> Harness {
        let config = PipelineConfig::embedded();
        let pool = Arc::new(ProviderPool::new(providers, config.degenerate.clone()));
        let validator = Validator::new(
            config.country.bounds,
            config.validation.max_region_distance_km,
        );
        Harness {
            chain: StrategyChain::new(config.run.strategies, Arc::clone(&pool), validator),
            centers: AdministrativeCenterCache::new(pool, config.country.bounds),
        }
    }

    impl Harness {
        async fn resolve(
            &mut self,
            record: &GeocodableRecord,
            acceptance: Acceptance,
        ) -> (Option<Resolution>, Vec<ResolutionAttempt>) {
            let mut attempts = Vec::new();
            let resolution = self
                .chain
                .resolve(record, &mut self.centers, acceptance, &mut attempts)
                .await;
            (resolution, attempts)
        }
    }

    #[test]
    fn composes_queries() {
        let record = GeocodableRecord::pending("L1", "No. 12, Jalan Aman", Some("Klang District"));
        assert_eq!(
            full_address_query(&record).as_deref(),
            Some("No. 12, Jalan Aman, Klang")
        );

        let mentions = GeocodableRecord::pending("L2", "Jalan Aman, Klang", Some("Klang"));
        assert_eq!(
            full_address_query(&mentions).as_deref(),
            Some("Jalan Aman, Klang")
        );

        let region_only = GeocodableRecord::pending("L3", "Klang", Some("Klang"));
        assert_eq!(full_address_query(&region_only), None);

        let area = GeocodableRecord::pending("L4", "Lot 5, Taman Desa", Some("Ipoh"));
        assert_eq!(area_query(&area).as_deref(), Some("Taman Desa, Ipoh"));
    }

    #[test]
    fn area_query_does_not_repeat_full_address() {
        let record = GeocodableRecord::pending("L5", "Taman Desa, Klang", Some("Klang"));
        assert_eq!(
            full_address_query(&record).as_deref(),
            Some("Taman Desa, Klang")
        );
        assert_eq!(area_query(&record), None);
    }

    #[tokio::test]
    async fn first_rung_wins_without_fallback() {
        let provider = ScriptedProvider::new("mock")
            .with("No. 12, Jalan Aman, Klang", 2.9999, 101.4)
            .with("Klang", 3.0449, 101.4456);
        let mut h = harness(provider);
        let record = GeocodableRecord::pending("L1", "No. 12, Jalan Aman", Some("Klang"));

        let (resolution, attempts) = h.resolve(&record, Acceptance::Lenient).await;
        let resolution = resolution.unwrap();

        assert_eq!(resolution.coordinate, Coordinate::new(2.9999, 101.4));
        assert_eq!(resolution.strategy, StrategyKind::FullAddress);
        assert_eq!(resolution.source, "mock");
        assert_eq!(resolution.validation, Validation::Valid);
        assert_eq!(attempts.len(), 1);
    }

    #[tokio::test]
    async fn degenerate_result_falls_through_to_region_center() {
        let provider = ScriptedProvider::new("mock")
            .with("No. 12, Jalan Aman, Klang", 4.569_375_4, 102.265_682_3)
            .with("Klang", 3.0449, 101.4456);
        let mut h = harness(provider);
        let record = GeocodableRecord::pending("L1", "No. 12, Jalan Aman", Some("Klang"));

        let (resolution, attempts) = h.resolve(&record, Acceptance::Lenient).await;
        let resolution = resolution.unwrap();

        assert!(matches!(attempts[0].outcome, AttemptOutcome::Degenerate(_)));
        assert_eq!(resolution.strategy, StrategyKind::RegionCenter);
        assert_eq!(resolution.coordinate, Coordinate::new(3.0449, 101.4456));
    }

    #[tokio::test]
    async fn empty_address_uses_region_center() {
        let provider = ScriptedProvider::new("mock").with("Ipoh", 4.5975, 101.0901);
        let mut h = harness(provider);
        let record = GeocodableRecord::pending("T1", "", Some("Ipoh"));

        let (resolution, attempts) = h.resolve(&record, Acceptance::Lenient).await;
        let resolution = resolution.unwrap();

        assert_eq!(resolution.strategy, StrategyKind::RegionCenter);
        assert_eq!(resolution.source, REGION_CENTER_SOURCE);
        assert_eq!(resolution.coordinate, Coordinate::new(4.5975, 101.0901));
        assert!(attempts.is_empty());
    }

    #[tokio::test]
    async fn capital_table_is_last_resort() {
        let mut h = harness(ScriptedProvider::new("mock"));
        let record = GeocodableRecord::pending("T2", "Somewhere", Some("Perak"));

        let (resolution, _) = h.resolve(&record, Acceptance::Lenient).await;
        let resolution = resolution.unwrap();

        assert_eq!(resolution.strategy, StrategyKind::CapitalFallback);
        assert_eq!(resolution.source, CAPITAL_TABLE_SOURCE);
        assert_eq!(resolution.coordinate, Coordinate::new(4.5975, 101.0901));
    }

    #[tokio::test]
    async fn unknown_region_exhausts_chain() {
        let mut h = harness(ScriptedProvider::new("mock"));
        let record = GeocodableRecord::pending("T3", "Lost Road 9", Some("Atlantis"));

        let (resolution, attempts) = h.resolve(&record, Acceptance::Lenient).await;

        assert_eq!(resolution, None);
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].query, "Lost Road 9, Atlantis");
    }

    #[tokio::test]
    async fn out_of_bounds_result_is_rejected() {
        let provider = ScriptedProvider::new("mock")
            .with("Khao San Road, Klang", 13.7589, 100.4974)
            .with("Klang", 3.0449, 101.4456);
        let mut h = harness(provider);
        let record = GeocodableRecord::pending("L5", "Khao San Road", Some("Klang"));

        let (resolution, _) = h.resolve(&record, Acceptance::Lenient).await;
        let resolution = resolution.unwrap();
        assert_eq!(resolution.strategy, StrategyKind::RegionCenter);
    }

    #[tokio::test]
    async fn lenient_accepts_far_result_but_strict_falls_through() {
        let provider = ScriptedProvider::new("mock")
            .with("Jalan Sultan, Klang", 5.4141, 100.3288)
            .with("Klang", 3.0449, 101.4456);
        let record = GeocodableRecord::pending("L6", "Jalan Sultan", Some("Klang"));

        let mut lenient = harness(provider);
        let (resolution, _) = lenient.resolve(&record, Acceptance::Lenient).await;
        let resolution = resolution.unwrap();
        assert_eq!(resolution.strategy, StrategyKind::FullAddress);
        assert!(matches!(
            resolution.validation,
            Validation::TooFarFromRegion { .. }
        ));

        let provider = ScriptedProvider::new("mock")
            .with("Jalan Sultan, Klang", 5.4141, 100.3288)
            .with("Klang", 3.0449, 101.4456);
        let mut strict = harness(provider);
        let (resolution, _) = strict.resolve(&record, Acceptance::Strict).await;
        let resolution = resolution.unwrap();
        assert_eq!(resolution.strategy, StrategyKind::RegionCenter);
        assert_eq!(resolution.validation, Validation::Valid);
    }

    #[tokio::test]
    async fn restricted_rungs_skip_region_fallbacks() {
        let provider = ScriptedProvider::new("mock").with("Ipoh", 4.5975, 101.0901);
        let mut h = harness(provider);
        let record = GeocodableRecord::pending("T1", "", Some("Ipoh"));

        let mut attempts = Vec::new();
        let resolution = h
            .chain
            .resolve_with(
                &[StrategyKind::FullAddress, StrategyKind::AreaExtract],
                &record,
                &mut h.centers,
                Acceptance::Lenient,
                &mut attempts,
            )
            .await;
        assert_eq!(resolution, None);
    }

    #[tokio::test]
    async fn paid_provider_is_not_asked_when_free_rungs_resolve() {
        let free = Arc::new(ScriptedProvider::new("nominatim").with("Klang", 3.0449, 101.4456));
        let paid = Arc::new(ScriptedProvider::new("google").last_resort());
        let paid_calls = CallLog::of(&paid);
        let mut h = harness_over(vec![free as Arc<dyn GeocodeProvider>, paid]);
        let record = GeocodableRecord::pending("L7", "Jalan Tiada, Taman Entah", Some("Klang"));

        let (resolution, attempts) = h.resolve(&record, Acceptance::Lenient).await;

        assert_eq!(resolution.unwrap().strategy, StrategyKind::RegionCenter);
        assert!(paid_calls.calls().is_empty());
        assert!(attempts.iter().all(|a| a.provider == "nominatim"));
    }

    #[tokio::test]
    async fn paid_provider_answers_after_free_rungs_fail() {
        let free = Arc::new(ScriptedProvider::new("nominatim"));
        let paid = Arc::new(
            ScriptedProvider::new("google")
                .last_resort()
                .with("No. 12, Jalan Aman, Klang", 3.0101, 101.4202),
        );
        let mut h = harness_over(vec![free as Arc<dyn GeocodeProvider>, paid]);
        let record = GeocodableRecord::pending("L8", "No. 12, Jalan Aman", Some("Klang"));

        let (resolution, attempts) = h.resolve(&record, Acceptance::Lenient).await;
        let resolution = resolution.unwrap();

        assert_eq!(resolution.strategy, StrategyKind::LastResort);
        assert_eq!(resolution.source, "google");
        assert_eq!(resolution.coordinate, Coordinate::new(3.0101, 101.4202));
        let order: Vec<&str> = attempts.iter().map(|a| a.provider.as_str()).collect();
        assert_eq!(order.last(), Some(&"google"));
        assert_eq!(order.iter().filter(|p| **p == "google").count(), 1);
    }

    #[tokio::test]
    async fn transport_error_falls_through_to_next_rung() {
        let provider = NominatimProvider::new(
            "nominatim",
            reqwest::Client::new(),
            "http://127.0.0.1:9/search",
            PipelineConfig::embedded().country_context(),
            Duration::ZERO,
        );
        let mut h = harness_over(vec![Arc::new(provider) as Arc<dyn GeocodeProvider>]);
        let record = GeocodableRecord::pending("T4", "No. 12, Jalan Aman", Some("Perak"));

        let (resolution, attempts) = h.resolve(&record, Acceptance::Lenient).await;
        let resolution = resolution.unwrap();

        assert!(!attempts.is_empty());
        assert!(
            attempts
                .iter()
                .all(|a| matches!(a.outcome, AttemptOutcome::Error(_)))
        );
        assert_eq!(resolution.strategy, StrategyKind::CapitalFallback);
        assert_eq!(resolution.coordinate, Coordinate::new(4.5975, 101.0901));
    }
}
