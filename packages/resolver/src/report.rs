//! Run and audit reports.
//!
//! Both render as plain text. The CLI prints them to stdout and, with
//! `--summary <file>`, writes the same text to a file.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::path::Path;

use chrono::{DateTime, Utc};
use property_geo_database_models::RecordKind;
use property_geo_geography_models::{Coordinate, PrecisionLevel};

use crate::ResolveError;
use crate::config::StrategyKind;

/// Running counters reported after each batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchTally {
    /// 1-based batch number.
    pub batch: u64,
    pub processed: u64,
    pub success: u64,
    pub failed: u64,
}

impl fmt::Display for BatchTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch {}: processed={} success={} failed={}",
            self.batch, self.processed, self.success, self.failed
        )
    }
}

/// Outcome counts for a resolve or improve run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// What ran, e.g. `"resolve pending"`.
    pub label: String,
    pub kind: RecordKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Records pulled from the store.
    pub processed: u64,
    /// Records written `Resolved`.
    pub resolved: u64,
    /// Of `resolved`, how many did not fully validate.
    pub flagged: u64,
    /// Records written `Failed`.
    pub failed: u64,
    /// Records left exactly as they were.
    pub unchanged: u64,
    /// Store writes that failed; those records keep their prior status.
    pub write_errors: u64,
    /// Winning rung per resolved record.
    pub wins: BTreeMap<StrategyKind, u64>,
    /// Address precision of every processed record.
    pub precision: BTreeMap<PrecisionLevel, u64>,
    /// Batches fetched.
    pub batches: u64,
}

impl RunSummary {
    #[must_use]
    pub fn new(label: impl Into<String>, kind: RecordKind) -> Self {
        Self {
            label: label.into(),
            kind,
            started_at: Utc::now(),
            finished_at: None,
            processed: 0,
            resolved: 0,
            flagged: 0,
            failed: 0,
            unchanged: 0,
            write_errors: 0,
            wins: BTreeMap::new(),
            precision: BTreeMap::new(),
            batches: 0,
        }
    }

    /// Returns the running counters.
    #[must_use]
    pub const fn tally(&self) -> BatchTally {
        BatchTally {
            batch: self.batches,
            processed: self.processed,
            success: self.resolved,
            failed: self.failed + self.unchanged + self.write_errors,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Renders the summary as plain text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} ({})", self.label, self.kind.table_name());
        let _ = writeln!(out, "  started:      {}", self.started_at.to_rfc3339());
        if let Some(finished) = self.finished_at {
            let _ = writeln!(out, "  finished:     {}", finished.to_rfc3339());
        }
        let _ = writeln!(out, "  processed:    {}", self.processed);
        let _ = writeln!(out, "  resolved:     {}", self.resolved);
        let _ = writeln!(out, "    flagged:    {}", self.flagged);
        let _ = writeln!(out, "  failed:       {}", self.failed);
        let _ = writeln!(out, "  unchanged:    {}", self.unchanged);
        let _ = writeln!(out, "  write errors: {}", self.write_errors);

        if !self.wins.is_empty() {
            let _ = writeln!(out, "  wins by strategy:");
            for (strategy, count) in &self.wins {
                let _ = writeln!(out, "    {:<18} {count}", strategy.as_ref());
            }
        }
        if !self.precision.is_empty() {
            let _ = writeln!(out, "  address precision:");
            for (level, count) in &self.precision {
                let _ = writeln!(out, "    {:<18} {count}", level.as_ref());
            }
        }
        out
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Per-region audit breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionAudit {
    /// Region as written on the first record of the group.
    pub region: String,
    /// Resolved center, or `None` if the group went unverified.
    pub center: Option<Coordinate>,
    pub records: u64,
    pub suspect: u64,
    /// Largest distance from the center seen in the group.
    pub max_distance_km: f64,
}

/// Outcome counts for an audit run.
#[derive(Debug, Clone)]
pub struct AuditReport {
    pub kind: RecordKind,
    pub threshold_km: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// `Resolved` records read.
    pub scanned: u64,
    /// Within the threshold of their region center.
    pub healthy: u64,
    /// Re-marked `Suspect`.
    pub suspect: u64,
    /// In a region group whose center could not be resolved.
    pub unverified: u64,
    /// No region hint to check against.
    pub no_region: u64,
    pub write_errors: u64,
    /// Keyed by normalized region key.
    pub regions: BTreeMap<String, RegionAudit>,
}

impl AuditReport {
    #[must_use]
    pub fn new(kind: RecordKind, threshold_km: f64) -> Self {
        Self {
            kind,
            threshold_km,
            started_at: Utc::now(),
            finished_at: None,
            scanned: 0,
            healthy: 0,
            suspect: 0,
            unverified: 0,
            no_region: 0,
            write_errors: 0,
            regions: BTreeMap::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Renders the report as plain text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "audit ({}, threshold {:.1} km)",
            self.kind.table_name(),
            self.threshold_km
        );
        let _ = writeln!(out, "  started:      {}", self.started_at.to_rfc3339());
        if let Some(finished) = self.finished_at {
            let _ = writeln!(out, "  finished:     {}", finished.to_rfc3339());
        }
        let _ = writeln!(out, "  scanned:      {}", self.scanned);
        let _ = writeln!(out, "  healthy:      {}", self.healthy);
        let _ = writeln!(out, "  suspect:      {}", self.suspect);
        let _ = writeln!(out, "  unverified:   {}", self.unverified);
        let _ = writeln!(out, "  no region:    {}", self.no_region);
        let _ = writeln!(out, "  write errors: {}", self.write_errors);

        let flagged: Vec<&RegionAudit> = self
            .regions
            .values()
            .filter(|r| r.suspect > 0 || r.center.is_none())
            .collect();
        if !flagged.is_empty() {
            let _ = writeln!(out, "  regions needing attention:");
            for region in flagged {
                match region.center {
                    Some(_) => {
                        let _ = writeln!(
                            out,
                            "    {:<24} {}/{} suspect, max {:.1} km",
                            region.region, region.suspect, region.records, region.max_distance_km
                        );
                    }
                    None => {
                        let _ = writeln!(
                            out,
                            "    {:<24} {} unverified (no center)",
                            region.region, region.records
                        );
                    }
                }
            }
        }
        out
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Writes a rendered report to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`ResolveError::Io`] if the file cannot be written.
pub fn write_summary(path: &Path, text: &str) -> Result<(), ResolveError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    log::info!("Wrote summary to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_every_non_success_as_failed() {
        let mut summary = RunSummary::new("resolve failed", RecordKind::Listing);
        summary.batches = 2;
        summary.processed = 10;
        summary.resolved = 6;
        summary.failed = 1;
        summary.unchanged = 2;
        summary.write_errors = 1;
        assert_eq!(
            summary.tally().to_string(),
            "batch 2: processed=10 success=6 failed=4"
        );
    }

    #[test]
    fn run_summary_lists_wins_and_precision() {
        let mut summary = RunSummary::new("resolve pending", RecordKind::Transaction);
        summary.processed = 3;
        summary.resolved = 3;
        summary.wins.insert(StrategyKind::FullAddress, 2);
        summary.wins.insert(StrategyKind::RegionCenter, 1);
        summary.precision.insert(PrecisionLevel::High, 2);
        summary.precision.insert(PrecisionLevel::Low, 1);
        summary.finish();

        let text = summary.render();
        assert!(text.starts_with("resolve pending (transactions)"));
        assert!(text.contains("full_address"));
        assert!(text.contains("region_center"));
        assert!(text.contains("HIGH"));
        assert!(text.contains("finished:"));
    }

    #[test]
    fn audit_report_lists_problem_regions_only() {
        let mut report = AuditReport::new(RecordKind::Listing, 50.0);
        report.regions.insert(
            "klang".to_string(),
            RegionAudit {
                region: "Klang".to_string(),
                center: Some(Coordinate::new(3.0449, 101.4456)),
                records: 4,
                suspect: 1,
                max_distance_km: 80.2,
            },
        );
        report.regions.insert(
            "ipoh".to_string(),
            RegionAudit {
                region: "Ipoh".to_string(),
                center: Some(Coordinate::new(4.5975, 101.0901)),
                records: 2,
                suspect: 0,
                max_distance_km: 3.0,
            },
        );
        report.regions.insert(
            "atlantis".to_string(),
            RegionAudit {
                region: "Atlantis".to_string(),
                center: None,
                records: 1,
                suspect: 0,
                max_distance_km: 0.0,
            },
        );

        let text = report.render();
        assert!(text.contains("Klang"));
        assert!(text.contains("1/4 suspect"));
        assert!(text.contains("Atlantis"));
        assert!(!text.contains("Ipoh"));
    }

    #[test]
    fn writes_summary_file() {
        let dir = std::env::temp_dir().join(format!("property-geo-report-{}", std::process::id()));
        let path = dir.join("nested").join("summary.txt");
        write_summary(&path, "hello\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
