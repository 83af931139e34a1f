//! Administrative region name normalization.
//!
//! Region hints arrive in many shapes for the same place:
//! - With a generic suffix: `"Klang District"`
//! - With a Malay prefix: `"Daerah Petaling"`
//! - Federal territory spellings: `"Wilayah Persekutuan Kuala Lumpur"`
//! - Inconsistent casing and spacing: `"  kuala   LUMPUR "`
//!
//! [`display_name`] strips the generic words but keeps the caller's
//! casing (it is what gets sent to a provider), while [`region_key`] also
//! case-folds it so all variants share one cache entry.

use regex::Regex;
use std::sync::LazyLock;

/// Generic words that precede the region's proper name.
static PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:daerah|mukim|bandaraya|wilayah\s+persekutuan|w\.\s*p\.|wp)\s+")
        .expect("valid regex")
});

/// Generic words that follow the region's proper name.
static SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:district|state|municipality|region|city)$").expect("valid regex")
});

/// Runs of whitespace.
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Returns the region's proper name with generic prefix/suffix words
/// removed and whitespace collapsed, preserving the original casing.
///
/// Returns an empty string for blank input.
#[must_use]
pub fn display_name(raw: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(raw.trim(), " ");
    let stripped = PREFIX_RE.replace(&collapsed, "");
    let stripped = SUFFIX_RE.replace(&stripped, "");
    let stripped = stripped.trim();

    // "District" alone would otherwise survive as the whole name; keep the
    // collapsed input if stripping removed everything.
    if stripped.is_empty() {
        collapsed.into_owned()
    } else {
        stripped.to_string()
    }
}

/// Returns the memoization key for a region: its [`display_name`]
/// lower-cased.
#[must_use]
pub fn region_key(raw: &str) -> String {
    display_name(raw).to_lowercase()
}

/// Returns `true` if `text` names the same region as `region`.
#[must_use]
pub fn same_region(text: &str, region: &str) -> bool {
    let key = region_key(region);
    !key.is_empty() && region_key(text) == key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_district_suffix() {
        assert_eq!(display_name("Klang District"), "Klang");
        assert_eq!(display_name("Hulu Langat district"), "Hulu Langat");
    }

    #[test]
    fn strips_malay_prefix() {
        assert_eq!(display_name("Daerah Petaling"), "Petaling");
        // "Negeri" is part of the state's proper name here.
        assert_eq!(display_name("Negeri Sembilan"), "Negeri Sembilan");
    }

    #[test]
    fn strips_federal_territory_prefix() {
        assert_eq!(
            display_name("Wilayah Persekutuan Kuala Lumpur"),
            "Kuala Lumpur"
        );
        assert_eq!(display_name("W.P. Putrajaya"), "Putrajaya");
    }

    #[test]
    fn preserves_casing_but_keys_fold_it() {
        assert_eq!(display_name("  kuala   LUMPUR "), "kuala LUMPUR");
        assert_eq!(region_key("  kuala   LUMPUR "), "kuala lumpur");
        assert_eq!(region_key("Kuala Lumpur"), region_key("KUALA LUMPUR"));
    }

    #[test]
    fn keeps_lone_generic_word() {
        assert_eq!(display_name("District"), "District");
    }

    #[test]
    fn blank_input_is_empty() {
        assert_eq!(display_name("   "), "");
        assert_eq!(region_key(""), "");
    }

    #[test]
    fn same_region_ignores_decoration() {
        assert!(same_region("klang", "Klang District"));
        assert!(!same_region("Klang", "Ipoh"));
        assert!(!same_region("", ""));
    }
}
