//! Precision upgrade for resolved records.
//!
//! Records resolved before their address could be geocoded often sit on
//! a region center or capital coordinate. For records whose address is
//! specific enough to expect a better answer, this pass re-runs only the
//! address-level rungs with strict acceptance and moves the coordinate
//! when the new one lands meaningfully elsewhere.

use property_geo_database_models::{FetchOrder, GeocodableRecord, ResolutionStatus};
use property_geo_geography::haversine_km;
use property_geo_geography::precision::classify;
use property_geo_geography_models::PrecisionLevel;

use crate::config::StrategyKind;
use crate::orchestrator::Pager;
use crate::report::RunSummary;
use crate::strategy::Acceptance;
use crate::{Pipeline, ResolveError};

impl Pipeline {
    /// Re-geocodes `Resolved` records with a `High` or `Medium` precision
    /// address.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Config`] if no address-level strategy is
    /// configured, or [`ResolveError::Store`] if a page read fails.
    pub async fn improve(
        &mut self,
        batch_size: usize,
        limit: Option<u64>,
    ) -> Result<RunSummary, ResolveError> {
        let rungs: Vec<StrategyKind> = self
            .chain
            .strategies()
            .iter()
            .copied()
            .filter(|s| s.is_address_level())
            .collect();
        if rungs.is_empty() {
            return Err(ResolveError::Config {
                message: "improve needs full_address or area_extract in run.strategies"
                    .to_string(),
            });
        }
        let min_shift_km = self.config.run.improve_min_shift_km;
        let mut summary = RunSummary::new("improve", self.store.kind());

        let total = self
            .store
            .count_by_status()
            .await?
            .get(&ResolutionStatus::Resolved)
            .copied()
            .unwrap_or(0);
        self.progress
            .start(limit.map_or(total, |limit| total.min(limit)));
        log::info!(
            "Improving resolved {} with {rungs:?} (min shift {min_shift_km:.2} km)",
            self.store.kind().table_name()
        );

        let mut pager = Pager::new(
            ResolutionStatus::Resolved,
            FetchOrder::Ascending,
            batch_size,
            limit,
        );
        loop {
            let page = pager.next(self).await?;
            if page.is_empty() {
                break;
            }
            summary.batches += 1;

            for record in &page {
                self.improve_record(record, &rungs, min_shift_km, &mut summary)
                    .await;
                self.progress.advance(1);
            }

            let tally = summary.tally();
            log::debug!("{tally}");
            self.progress.batch(&tally);
        }

        summary.finish();
        self.progress
            .finish(&format!("{} moved", summary.resolved));
        Ok(summary)
    }

    async fn improve_record(
        &mut self,
        record: &GeocodableRecord,
        rungs: &[StrategyKind],
        min_shift_km: f64,
        summary: &mut RunSummary,
    ) {
        summary.processed += 1;
        let precision = classify(&record.address_text, record.region());
        *summary.precision.entry(precision).or_default() += 1;

        if precision == PrecisionLevel::Low {
            summary.unchanged += 1;
            return;
        }
        let Some(current) = record.coordinate else {
            log::warn!("Record {} is Resolved without a coordinate", record.id);
            summary.unchanged += 1;
            return;
        };

        let mut attempts = Vec::new();
        let Some(resolution) = self
            .chain
            .resolve_with(
                rungs,
                record,
                &mut self.centers,
                Acceptance::Strict,
                &mut attempts,
            )
            .await
        else {
            summary.unchanged += 1;
            return;
        };

        let shift_km = haversine_km(&current, &resolution.coordinate);
        if shift_km <= min_shift_km {
            log::trace!("Record {} already within {shift_km:.3} km", record.id);
            summary.unchanged += 1;
            return;
        }

        log::debug!(
            "Record {} moves {shift_km:.2} km: {current} -> {}",
            record.id,
            resolution.coordinate
        );
        if self
            .write(
                record,
                ResolutionStatus::Resolved,
                Some(resolution.coordinate),
                summary,
            )
            .await
        {
            summary.resolved += 1;
            *summary.wins.entry(resolution.strategy).or_default() += 1;
        }
    }
}
