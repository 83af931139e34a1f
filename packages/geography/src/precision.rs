//! Address specificity classification.
//!
//! Listing and transaction addresses range from fully numbered street
//! addresses to a bare district name:
//! - Numbered: `"No. 12, Jalan Aman"`, `"Lot 5, Jalan Bukit 5"`
//! - Area-level: `"Taman Desa"`, `"Kg. Baru, Seksyen 7"`
//! - Region-only or empty: `"Klang"`, `""`
//!
//! [`classify`] scores that specificity without any ground truth, and
//! [`extract_area`] pulls out the township/landmark segment used by the
//! second rung of the strategy chain.

use regex::Regex;
use std::sync::LazyLock;

use property_geo_geography_models::PrecisionLevel;

use crate::region::same_region;

/// Unit, lot or block numbering (e.g. "No. 12", "Lot 5", "Blok A-3-2").
static UNIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:no\.?|lot|unit|blok|block|plot|pt)\s*[a-z]?-?\d").expect("valid regex")
});

/// Street-type words.
static STREET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:jalan|jln|lorong|lrg|persiaran|lebuhraya|lebuh|lingkaran|solok|road|street|avenue)\b",
    )
    .expect("valid regex")
});

/// Township, neighbourhood and landmark words.
static AREA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:taman|tmn|bandar|bdr|kampung|kampong|kg|desa|seksyen|section|pangsapuri|kondominium|condominium|residensi|residence|apartment|flat|bukit|plaza|menara|wisma|kompleks|pusat|ss\s?\d+|usj\s?\d+|pju\s?\d+)\b",
    )
    .expect("valid regex")
});

/// Minimum combined length of two or more non-region segments for an
/// address with no recognizable pattern to count as area-level.
pub const STRUCTURAL_MIN_LEN: usize = 30;

/// Classifies how specific `address` is.
///
/// - [`PrecisionLevel::High`]: unit/lot/block numbering, or a street
///   segment carrying a number.
/// - [`PrecisionLevel::Medium`]: a township/area word, an unnumbered
///   street, or at least two non-region segments totalling
///   [`STRUCTURAL_MIN_LEN`] characters.
/// - [`PrecisionLevel::Low`]: empty, the region name itself, or anything
///   weaker.
#[must_use]
pub fn classify(address: &str, region: Option<&str>) -> PrecisionLevel {
    let address = address.trim();
    if address.is_empty() {
        return PrecisionLevel::Low;
    }
    if region.is_some_and(|r| same_region(address, r)) {
        return PrecisionLevel::Low;
    }

    let segments = segments(address, region);

    if UNIT_RE.is_match(address) {
        return PrecisionLevel::High;
    }
    if segments
        .iter()
        .any(|s| STREET_RE.is_match(s) && s.chars().any(|c| c.is_ascii_digit()))
    {
        return PrecisionLevel::High;
    }

    if AREA_RE.is_match(address) || STREET_RE.is_match(address) {
        return PrecisionLevel::Medium;
    }

    let total_len: usize = segments.iter().map(|s| s.chars().count()).sum();
    if segments.len() >= 2 && total_len >= STRUCTURAL_MIN_LEN {
        return PrecisionLevel::Medium;
    }

    PrecisionLevel::Low
}

/// Extracts the first township or landmark segment from `address`.
///
/// Street segments are skipped so that `"Jalan Bukit 5"` does not yield
/// `"Bukit 5"`. Leading unit numbers inside the matching segment are
/// dropped: `"Lot 5 Taman Melawati"` yields `"Taman Melawati"`.
///
/// Returns `None` if no segment matches, or if the only match is the
/// whole address (querying it again would repeat the first rung).
#[must_use]
pub fn extract_area(address: &str, region: Option<&str>) -> Option<String> {
    let address = address.trim();

    let area = segments(address, region)
        .into_iter()
        .filter(|s| !STREET_RE.is_match(s))
        .find_map(|s| AREA_RE.find(s).map(|m| s[m.start()..].trim().to_string()))?;

    if area.is_empty() || area.eq_ignore_ascii_case(address) {
        return None;
    }

    Some(area)
}

/// Comma-separated, trimmed, non-empty segments that do not repeat the
/// region name.
fn segments<'a>(address: &'a str, region: Option<&str>) -> Vec<&'a str> {
    address
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| !region.is_some_and(|r| same_region(s, r)))
        .collect()
}
