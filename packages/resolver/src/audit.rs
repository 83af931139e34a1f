//! Geographic consistency audit of resolved records.
//!
//! Reads every `Resolved` record, groups the ones with a region hint by
//! normalized region, resolves each region's center once, and re-marks
//! records farther than the threshold from their center as `Suspect`. The
//! coordinate is left in place; a later `resolve --mode suspect` run
//! replaces it if it can find a validated one.

use std::collections::BTreeMap;

use property_geo_database_models::{FetchOrder, GeocodableRecord, ResolutionStatus};
use property_geo_geography::haversine_km;
use property_geo_geography::region::region_key;

use crate::orchestrator::Pager;
use crate::report::{AuditReport, RegionAudit, RunSummary};
use crate::validate::Validation;
use crate::{Pipeline, ResolveError};

impl Pipeline {
    /// Audits `Resolved` records against their region centers.
    ///
    /// `threshold_km` overrides the configured distance threshold.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Store`] if a page read fails. Write
    /// failures are counted in the report instead.
    pub async fn audit(
        &mut self,
        threshold_km: Option<f64>,
        batch_size: usize,
    ) -> Result<AuditReport, ResolveError> {
        let validator = match threshold_km {
            Some(km) => self.chain.validator().with_threshold(km),
            None => *self.chain.validator(),
        };
        let mut report = AuditReport::new(self.store.kind(), validator.max_distance_km());

        let mut groups: BTreeMap<String, Vec<GeocodableRecord>> = BTreeMap::new();
        let mut pager = Pager::new(
            ResolutionStatus::Resolved,
            FetchOrder::Ascending,
            batch_size,
            None,
        );
        loop {
            let page = pager.next(self).await?;
            if page.is_empty() {
                break;
            }
            for record in page {
                report.scanned += 1;
                match record.region().map(region_key) {
                    Some(key) if !key.is_empty() => groups.entry(key).or_default().push(record),
                    _ => report.no_region += 1,
                }
            }
        }

        log::info!(
            "Auditing {} resolved record(s) across {} region(s) at {:.1} km",
            report.scanned,
            groups.len(),
            validator.max_distance_km()
        );
        self.progress.start(report.scanned - report.no_region);

        // Writes go through the shared helper, which counts into a run
        // summary; fold its error count into the report afterwards.
        let mut writes = RunSummary::new("audit", self.store.kind());

        for (key, records) in groups {
            let region = records
                .first()
                .and_then(GeocodableRecord::region)
                .unwrap_or(key.as_str())
                .to_string();
            let center = self.centers.center_of(&region).await;
            let mut entry = RegionAudit {
                region: region.clone(),
                center,
                records: records.len() as u64,
                suspect: 0,
                max_distance_km: 0.0,
            };

            let Some(center) = center else {
                log::warn!(
                    "Skipping {} record(s) in region '{region}': no center could be resolved",
                    records.len()
                );
                report.unverified += entry.records;
                self.progress.advance(entry.records);
                report.regions.insert(key, entry);
                continue;
            };

            for record in &records {
                self.progress.advance(1);
                let Some(coordinate) = record.coordinate else {
                    log::warn!("Record {} is Resolved without a coordinate", record.id);
                    report.unverified += 1;
                    continue;
                };
                entry.max_distance_km = entry
                    .max_distance_km
                    .max(haversine_km(&coordinate, &center));

                match validator.check(&coordinate, Some(&center)) {
                    Validation::Valid => report.healthy += 1,
                    verdict => {
                        log::warn!(
                            "Record {} at {coordinate} is {verdict} ('{region}'); marking suspect",
                            record.id
                        );
                        if self
                            .write(
                                record,
                                ResolutionStatus::Suspect,
                                Some(coordinate),
                                &mut writes,
                            )
                            .await
                        {
                            report.suspect += 1;
                            entry.suspect += 1;
                        }
                    }
                }
            }
            report.regions.insert(key, entry);
        }

        report.write_errors = writes.write_errors;
        report.finish();
        self.progress.finish(&format!(
            "{} healthy, {} suspect",
            report.healthy, report.suspect
        ));
        Ok(report)
    }
}
