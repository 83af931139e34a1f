//! Batch resolution driver.
//!
//! Pages through records of one status by keyset cursor, resolves each
//! through the strategy chain and commits every outcome as its own write.
//! Nothing a single record does can abort the batch: provider failures
//! are already absorbed by the chain, and store write failures are logged
//! and counted while the record keeps its prior status.

use property_geo_database::BatchQuery;
use property_geo_database_models::{FetchOrder, GeocodableRecord, ResolutionStatus};
use property_geo_geography::precision::classify;
use property_geo_geography_models::Coordinate;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::config::PipelineConfig;
use crate::report::RunSummary;
use crate::strategy::Acceptance;
use crate::{Pipeline, ResolveError};

/// Which population a resolve run works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ResolveMode {
    /// First pass over never-attempted records.
    Pending,
    /// Retry of records every strategy previously failed on.
    Failed,
    /// Repair of records the audit flagged.
    Suspect,
}

impl ResolveMode {
    /// The status this mode fetches.
    #[must_use]
    pub const fn status(self) -> ResolutionStatus {
        match self {
            Self::Pending => ResolutionStatus::Pending,
            Self::Failed => ResolutionStatus::Failed,
            Self::Suspect => ResolutionStatus::Suspect,
        }
    }

    /// Repair runs always demand a fully validated replacement.
    #[must_use]
    pub const fn acceptance(self, strict: bool) -> Acceptance {
        match self {
            Self::Suspect => Acceptance::Strict,
            Self::Pending | Self::Failed => Acceptance::from_strict(strict),
        }
    }
}

/// Parameters for one resolve run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: ResolveMode,
    /// Records fetched per page.
    pub batch_size: usize,
    /// Stop after this many records.
    pub limit: Option<u64>,
    pub order: FetchOrder,
    /// Treat a result that fails validation as no result.
    pub strict: bool,
}

impl RunOptions {
    /// Options for `mode` with the config's defaults.
    #[must_use]
    pub fn from_config(config: &PipelineConfig, mode: ResolveMode) -> Self {
        Self {
            mode,
            batch_size: config.run.batch_size,
            limit: None,
            order: FetchOrder::default(),
            strict: config.validation.strict,
        }
    }
}

/// Keyset pager over one status.
pub(crate) struct Pager {
    status: ResolutionStatus,
    order: FetchOrder,
    batch_size: usize,
    remaining: Option<u64>,
    after: Option<String>,
}

impl Pager {
    pub(crate) const fn new(
        status: ResolutionStatus,
        order: FetchOrder,
        batch_size: usize,
        limit: Option<u64>,
    ) -> Self {
        Self {
            status,
            order,
            batch_size,
            remaining: limit,
            after: None,
        }
    }

    /// Fetches the next page; empty once the status or the limit is
    /// exhausted.
    pub(crate) async fn next(
        &mut self,
        pipeline: &Pipeline,
    ) -> Result<Vec<GeocodableRecord>, ResolveError> {
        let limit = match self.remaining {
            Some(0) => return Ok(Vec::new()),
            Some(remaining) => usize::try_from(remaining)
                .unwrap_or(usize::MAX)
                .min(self.batch_size),
            None => self.batch_size,
        };
        let query = BatchQuery {
            status: self.status,
            limit,
            order: self.order,
            after: self.after.clone(),
        };
        let page = pipeline.store.fetch_batch(&query).await?;

        if let Some(last) = page.last() {
            self.after = Some(last.id.clone());
        }
        if let Some(remaining) = &mut self.remaining {
            *remaining = remaining.saturating_sub(page.len() as u64);
        }
        Ok(page)
    }
}

impl Pipeline {
    /// Resolves every record in `options.mode`'s status.
    ///
    /// - `Pending`: a chain miss writes `Failed` with the sentinel.
    /// - `Failed`: a chain miss leaves the record untouched.
    /// - `Suspect`: only a validated result replaces the flagged
    ///   coordinate; a miss leaves the record `Suspect`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Store`] if a page read fails. Write
    /// failures are counted in the summary instead.
    pub async fn resolve(&mut self, options: &RunOptions) -> Result<RunSummary, ResolveError> {
        let status = options.mode.status();
        let acceptance = options.mode.acceptance(options.strict);
        let mut summary = RunSummary::new(format!("resolve {}", options.mode), self.store.kind());

        let total = self
            .store
            .count_by_status()
            .await?
            .get(&status)
            .copied()
            .unwrap_or(0);
        let total = options.limit.map_or(total, |limit| total.min(limit));
        self.progress.start(total);
        log::info!(
            "Resolving up to {total} {status} {} (batch size {}, {:?} order, {acceptance:?})",
            self.store.kind().table_name(),
            options.batch_size,
            options.order,
        );

        let mut pager = Pager::new(status, options.order, options.batch_size, options.limit);
        loop {
            let page = pager.next(self).await?;
            if page.is_empty() {
                break;
            }
            summary.batches += 1;

            for record in &page {
                self.resolve_record(record, options.mode, acceptance, &mut summary)
                    .await;
                self.progress.advance(1);
            }

            let tally = summary.tally();
            log::debug!("{tally}");
            self.progress.batch(&tally);
        }

        summary.finish();
        self.progress.finish(&format!(
            "{} resolved, {} failed",
            summary.resolved, summary.failed
        ));
        Ok(summary)
    }

    async fn resolve_record(
        &mut self,
        record: &GeocodableRecord,
        mode: ResolveMode,
        acceptance: Acceptance,
        summary: &mut RunSummary,
    ) {
        summary.processed += 1;
        *summary
            .precision
            .entry(classify(&record.address_text, record.region()))
            .or_default() += 1;

        let mut attempts = Vec::new();
        let resolution = self
            .chain
            .resolve(record, &mut self.centers, acceptance, &mut attempts)
            .await;
        log::trace!("Record {}: {} provider attempt(s)", record.id, attempts.len());

        match resolution {
            Some(resolution) => {
                if !resolution.validation.is_valid() {
                    log::warn!(
                        "Record {} resolved by {} to {} but is {}; keeping it for audit",
                        record.id,
                        resolution.strategy,
                        resolution.coordinate,
                        resolution.validation
                    );
                }
                if self
                    .write(record, ResolutionStatus::Resolved, Some(resolution.coordinate), summary)
                    .await
                {
                    summary.resolved += 1;
                    if !resolution.validation.is_valid() {
                        summary.flagged += 1;
                    }
                    *summary.wins.entry(resolution.strategy).or_default() += 1;
                }
            }
            None if mode == ResolveMode::Pending => {
                if self
                    .write(
                        record,
                        ResolutionStatus::Failed,
                        Some(Coordinate::FAILED_SENTINEL),
                        summary,
                    )
                    .await
                {
                    summary.failed += 1;
                }
            }
            None => {
                log::info!(
                    "Record {} still unresolved; leaving it {}",
                    record.id,
                    record.status
                );
                summary.unchanged += 1;
            }
        }
    }

    /// Commits one record update, returning whether it stuck.
    pub(crate) async fn write(
        &self,
        record: &GeocodableRecord,
        status: ResolutionStatus,
        coordinate: Option<Coordinate>,
        summary: &mut RunSummary,
    ) -> bool {
        match self
            .store
            .update_resolution(&record.id, status, coordinate)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                log::error!(
                    "Failed to write record {} as {status}: {e}; it stays {}",
                    record.id,
                    record.status
                );
                summary.write_errors += 1;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;
    use crate::testing::{RecordingProgress, ScriptedProvider, pipeline, pipeline_with};
    use std::sync::Arc;

    fn options(mode: ResolveMode) -> RunOptions {
        RunOptions::from_config(&PipelineConfig::embedded(), mode)
    }

    fn resolved(id: &str, address: &str, region: Option<&str>, at: Coordinate) -> GeocodableRecord {
        GeocodableRecord {
            status: ResolutionStatus::Resolved,
            coordinate: Some(at),
            ..GeocodableRecord::pending(id, address, region)
        }
    }

    #[tokio::test]
    async fn numbered_address_resolves_on_first_rung() {
        let provider = ScriptedProvider::new("mock")
            .with("No. 12, Jalan Aman, Klang", 2.9999, 101.4)
            .with("Klang", 3.0449, 101.4456);
        let (mut pipeline, store, calls) = pipeline(
            vec![GeocodableRecord::pending("L1", "No. 12, Jalan Aman", Some("Klang"))],
            provider,
        );

        let summary = pipeline.resolve(&options(ResolveMode::Pending)).await.unwrap();

        let record = store.get("L1").unwrap();
        assert_eq!(record.status, ResolutionStatus::Resolved);
        assert_eq!(record.coordinate, Some(Coordinate::new(2.9999, 101.4)));
        assert_eq!(summary.resolved, 1);
        assert_eq!(summary.wins.get(&StrategyKind::FullAddress), Some(&1));
        assert_eq!(calls.count("No. 12, Jalan Aman, Klang"), 1);
        assert_eq!(calls.count("Klang"), 1);
        assert_eq!(calls.calls().len(), 2);
    }

    #[tokio::test]
    async fn empty_address_resolves_to_region_center() {
        let provider = ScriptedProvider::new("mock").with("Ipoh", 4.5975, 101.0901);
        let (mut pipeline, store, _) =
            pipeline(vec![GeocodableRecord::pending("T1", "", Some("Ipoh"))], provider);

        let summary = pipeline.resolve(&options(ResolveMode::Pending)).await.unwrap();

        let record = store.get("T1").unwrap();
        assert_eq!(record.status, ResolutionStatus::Resolved);
        assert_eq!(record.coordinate, Some(Coordinate::new(4.5975, 101.0901)));
        assert_eq!(summary.wins.get(&StrategyKind::RegionCenter), Some(&1));
    }

    #[tokio::test]
    async fn exhausted_chain_marks_failed_with_sentinel() {
        let (mut pipeline, store, _) = pipeline(
            vec![GeocodableRecord::pending("T2", "Lost Road 9", Some("Atlantis"))],
            ScriptedProvider::new("mock"),
        );

        let summary = pipeline.resolve(&options(ResolveMode::Pending)).await.unwrap();

        let record = store.get("T2").unwrap();
        assert_eq!(record.status, ResolutionStatus::Failed);
        assert!(record.coordinate.unwrap().is_failed_sentinel());
        assert_eq!(summary.failed, 1);
        assert!(record.is_consistent());
    }

    #[tokio::test]
    async fn second_pending_run_changes_nothing() {
        let provider = ScriptedProvider::new("mock").with("Ipoh", 4.5975, 101.0901);
        let (mut pipeline, store, calls) = pipeline(
            vec![
                GeocodableRecord::pending("T1", "", Some("Ipoh")),
                GeocodableRecord::pending("T2", "Lost Road 9", Some("Atlantis")),
            ],
            provider,
        );

        pipeline.resolve(&options(ResolveMode::Pending)).await.unwrap();
        let after_first = store.snapshot();
        let writes = store.write_count();
        let queries = calls.calls().len();

        let summary = pipeline.resolve(&options(ResolveMode::Pending)).await.unwrap();

        assert_eq!(summary.processed, 0);
        assert_eq!(store.snapshot(), after_first);
        assert_eq!(store.write_count(), writes);
        assert_eq!(calls.calls().len(), queries);
    }

    #[tokio::test]
    async fn degenerate_result_is_never_persisted() {
        let provider = ScriptedProvider::new("mock")
            .with("Jalan Aman, Atlantis", 4.569_375_4, 102.265_682_3);
        let (mut pipeline, store, _) = pipeline(
            vec![GeocodableRecord::pending("L2", "Jalan Aman", Some("Atlantis"))],
            provider,
        );

        pipeline.resolve(&options(ResolveMode::Pending)).await.unwrap();

        let record = store.get("L2").unwrap();
        assert_eq!(record.status, ResolutionStatus::Failed);
    }

    #[tokio::test]
    async fn far_result_is_kept_and_flagged_in_lenient_mode() {
        let provider = ScriptedProvider::new("mock")
            .with("Jalan Sultan, Klang", 5.4141, 100.3288)
            .with("Klang", 3.0449, 101.4456);
        let (mut pipeline, store, _) = pipeline(
            vec![GeocodableRecord::pending("L3", "Jalan Sultan", Some("Klang"))],
            provider,
        );

        let summary = pipeline.resolve(&options(ResolveMode::Pending)).await.unwrap();

        let record = store.get("L3").unwrap();
        assert_eq!(record.status, ResolutionStatus::Resolved);
        assert_eq!(record.coordinate, Some(Coordinate::new(5.4141, 100.3288)));
        assert_eq!(summary.flagged, 1);
    }

    #[tokio::test]
    async fn strict_mode_rejects_far_result() {
        let provider = ScriptedProvider::new("mock")
            .with("Jalan Sultan, Klang", 5.4141, 100.3288)
            .with("Klang", 3.0449, 101.4456);
        let (mut pipeline, store, _) = pipeline(
            vec![GeocodableRecord::pending("L3", "Jalan Sultan", Some("Klang"))],
            provider,
        );
        let mut opts = options(ResolveMode::Pending);
        opts.strict = true;

        pipeline.resolve(&opts).await.unwrap();

        let record = store.get("L3").unwrap();
        assert_eq!(record.coordinate, Some(Coordinate::new(3.0449, 101.4456)));
    }

    #[tokio::test]
    async fn failed_retry_leaves_misses_alone() {
        let failed = GeocodableRecord {
            status: ResolutionStatus::Failed,
            coordinate: Some(Coordinate::FAILED_SENTINEL),
            ..GeocodableRecord::pending("T9", "Lost Road 9", Some("Atlantis"))
        };
        let (mut pipeline, store, _) = pipeline(vec![failed.clone()], ScriptedProvider::new("mock"));

        let summary = pipeline.resolve(&options(ResolveMode::Failed)).await.unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(store.get("T9").unwrap(), failed);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn failed_retry_resolves_when_provider_recovers() {
        let failed = GeocodableRecord {
            status: ResolutionStatus::Failed,
            coordinate: Some(Coordinate::FAILED_SENTINEL),
            ..GeocodableRecord::pending("T9", "", Some("Ipoh"))
        };
        let provider = ScriptedProvider::new("mock").with("Ipoh", 4.5975, 101.0901);
        let (mut pipeline, store, _) = pipeline(vec![failed], provider);

        pipeline.resolve(&options(ResolveMode::Failed)).await.unwrap();

        assert_eq!(
            store.get("T9").unwrap().status,
            ResolutionStatus::Resolved
        );
    }

    #[tokio::test]
    async fn suspect_repair_overwrites_with_validated_coordinate() {
        let suspect = GeocodableRecord {
            status: ResolutionStatus::Suspect,
            ..resolved("L7", "No. 3, Jalan Aman", Some("Klang"), Coordinate::new(5.4141, 100.3288))
        };
        let provider = ScriptedProvider::new("mock")
            .with("No. 3, Jalan Aman, Klang", 3.01, 101.42)
            .with("Klang", 3.0449, 101.4456);
        let (mut pipeline, store, _) = pipeline(vec![suspect], provider);

        let summary = pipeline.resolve(&options(ResolveMode::Suspect)).await.unwrap();

        let record = store.get("L7").unwrap();
        assert_eq!(record.status, ResolutionStatus::Resolved);
        assert_eq!(record.coordinate, Some(Coordinate::new(3.01, 101.42)));
        assert_eq!(summary.flagged, 0);
    }

    #[tokio::test]
    async fn suspect_repair_without_better_result_stays_suspect() {
        let suspect = GeocodableRecord {
            status: ResolutionStatus::Suspect,
            ..resolved("L8", "Lost Road 9", Some("Atlantis"), Coordinate::new(5.4141, 100.3288))
        };
        let (mut pipeline, store, _) = pipeline(vec![suspect.clone()], ScriptedProvider::new("mock"));

        pipeline.resolve(&options(ResolveMode::Suspect)).await.unwrap();

        assert_eq!(store.get("L8").unwrap(), suspect);
    }

    #[tokio::test]
    async fn write_failure_does_not_abort_batch() {
        let provider = ScriptedProvider::new("mock").with("Ipoh", 4.5975, 101.0901);
        let (mut pipeline, store, _) = pipeline(
            vec![
                GeocodableRecord::pending("T1", "", Some("Ipoh")),
                GeocodableRecord::pending("T2", "", Some("Ipoh")),
                GeocodableRecord::pending("T3", "", Some("Ipoh")),
            ],
            provider,
        );
        store.fail_writes_for("T2");

        let summary = pipeline.resolve(&options(ResolveMode::Pending)).await.unwrap();

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.resolved, 2);
        assert_eq!(summary.write_errors, 1);
        assert_eq!(store.get("T2").unwrap().status, ResolutionStatus::Pending);
        assert_eq!(store.get("T3").unwrap().status, ResolutionStatus::Resolved);
    }

    #[tokio::test]
    async fn pages_in_batches_and_reports_each() {
        let records = (1..=5)
            .map(|i| GeocodableRecord::pending(format!("T{i}"), "", Some("Ipoh")))
            .collect();
        let provider = ScriptedProvider::new("mock").with("Ipoh", 4.5975, 101.0901);
        let (pipeline, _, calls) = pipeline(records, provider);
        let progress = Arc::new(RecordingProgress::default());
        let mut pipeline = pipeline.with_progress(Arc::clone(&progress) as _);
        let mut opts = options(ResolveMode::Pending);
        opts.batch_size = 2;

        let summary = pipeline.resolve(&opts).await.unwrap();

        let tallies = progress.tallies();
        assert_eq!(progress.total(), Some(5));
        assert_eq!(progress.advanced(), 5);
        assert_eq!(tallies.len(), 3);
        assert_eq!(progress.finished().as_deref(), Some("5 resolved, 0 failed"));
        assert_eq!(tallies[2].success, 5);
        assert_eq!(summary.batches, 3);
        // The region center is looked up once for all five records.
        assert_eq!(calls.count("Ipoh"), 1);
    }

    #[tokio::test]
    async fn limit_and_descending_order_pick_the_tail() {
        let records = (1..=4)
            .map(|i| GeocodableRecord::pending(format!("T{i}"), "", Some("Ipoh")))
            .collect();
        let provider = ScriptedProvider::new("mock").with("Ipoh", 4.5975, 101.0901);
        let (mut pipeline, store, _) = pipeline(records, provider);
        let mut opts = options(ResolveMode::Pending);
        opts.limit = Some(2);
        opts.order = FetchOrder::Descending;

        let summary = pipeline.resolve(&opts).await.unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(store.get("T4").unwrap().status, ResolutionStatus::Resolved);
        assert_eq!(store.get("T3").unwrap().status, ResolutionStatus::Resolved);
        assert_eq!(store.get("T1").unwrap().status, ResolutionStatus::Pending);
    }

    #[tokio::test]
    async fn custom_strategy_order_is_respected() {
        let mut config = PipelineConfig::embedded();
        config.run.strategies = vec![StrategyKind::CapitalFallback];
        let provider = ScriptedProvider::new("mock").with("Ipoh", 4.5975, 101.0901);
        let (mut pipeline, store, _) = pipeline_with(
            config,
            vec![GeocodableRecord::pending("T1", "Taman Desa", Some("Perak"))],
            provider,
        );

        let summary = pipeline.resolve(&options(ResolveMode::Pending)).await.unwrap();

        assert_eq!(summary.wins.get(&StrategyKind::CapitalFallback), Some(&1));
        assert_eq!(
            store.get("T1").unwrap().coordinate,
            Some(Coordinate::new(4.5975, 101.0901))
        );
    }

    #[test]
    fn modes_parse_and_map_to_statuses() {
        assert_eq!("Suspect".parse::<ResolveMode>().unwrap(), ResolveMode::Suspect);
        assert_eq!(ResolveMode::Failed.status(), ResolutionStatus::Failed);
        assert_eq!(ResolveMode::Suspect.acceptance(false), Acceptance::Strict);
        assert_eq!(ResolveMode::Pending.acceptance(false), Acceptance::Lenient);
    }
}
