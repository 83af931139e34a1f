//! Geographic plausibility checks for resolved coordinates.

use property_geo_geography::haversine_km;
use property_geo_geography_models::{Coordinate, CountryBounds};

use crate::center_cache::AdministrativeCenterCache;

/// Outcome of validating a coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Validation {
    Valid,
    OutOfCountryBounds,
    TooFarFromRegion {
        /// Great-circle distance to the region center.
        distance_km: f64,
    },
}

impl Validation {
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl std::fmt::Display for Validation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => f.write_str("valid"),
            Self::OutOfCountryBounds => f.write_str("out of country bounds"),
            Self::TooFarFromRegion { distance_km } => {
                write!(f, "{distance_km:.1} km from region center")
            }
        }
    }
}

/// Checks `coordinate` against `bounds` first, then against `center`
/// when one is known.
#[must_use]
pub fn validate(
    coordinate: &Coordinate,
    bounds: &CountryBounds,
    center: Option<&Coordinate>,
    max_distance_km: f64,
) -> Validation {
    if !bounds.contains(coordinate) {
        return Validation::OutOfCountryBounds;
    }
    let Some(center) = center else {
        return Validation::Valid;
    };
    let distance_km = haversine_km(coordinate, center);
    if distance_km > max_distance_km {
        Validation::TooFarFromRegion { distance_km }
    } else {
        Validation::Valid
    }
}

/// [`validate`] bound to a country box and distance threshold.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    bounds: CountryBounds,
    max_distance_km: f64,
}

impl Validator {
    #[must_use]
    pub const fn new(bounds: CountryBounds, max_distance_km: f64) -> Self {
        Self {
            bounds,
            max_distance_km,
        }
    }

    /// Returns a copy with a different distance threshold.
    #[must_use]
    pub const fn with_threshold(self, max_distance_km: f64) -> Self {
        Self {
            max_distance_km,
            ..self
        }
    }

    #[must_use]
    pub const fn bounds(&self) -> &CountryBounds {
        &self.bounds
    }

    #[must_use]
    pub const fn max_distance_km(&self) -> f64 {
        self.max_distance_km
    }

    /// Validates against an already-known center.
    #[must_use]
    pub fn check(&self, coordinate: &Coordinate, center: Option<&Coordinate>) -> Validation {
        validate(coordinate, &self.bounds, center, self.max_distance_km)
    }

    /// Validates against the center of `region`, resolving it through
    /// `centers` if needed. A record without a region, or whose region
    /// has no resolvable center, only gets the bounds check.
    pub async fn validate(
        &self,
        coordinate: &Coordinate,
        region: Option<&str>,
        centers: &mut AdministrativeCenterCache,
    ) -> Validation {
        if !self.bounds.contains(coordinate) {
            return Validation::OutOfCountryBounds;
        }
        let center = match region {
            Some(region) => centers.center_of(region).await,
            None => None,
        };
        self.check(coordinate, center.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MALAYSIA: CountryBounds = CountryBounds {
        min_latitude: 0.8,
        max_latitude: 7.5,
        min_longitude: 99.5,
        max_longitude: 119.5,
    };

    #[test]
    fn one_degree_is_too_far_at_50_km() {
        let center = Coordinate::new(0.0, 0.0);
        let candidate = Coordinate::new(1.0, 0.0);
        match validate(&candidate, &CountryBounds::WORLD, Some(&center), 50.0) {
            Validation::TooFarFromRegion { distance_km } => {
                assert!((distance_km - 111.19).abs() < 0.1);
            }
            other => panic!("expected TooFarFromRegion, got {other:?}"),
        }
    }

    #[test]
    fn one_degree_is_valid_at_200_km() {
        let center = Coordinate::new(0.0, 0.0);
        let candidate = Coordinate::new(1.0, 0.0);
        assert_eq!(
            validate(&candidate, &CountryBounds::WORLD, Some(&center), 200.0),
            Validation::Valid
        );
    }

    #[test]
    fn bounds_are_checked_before_distance() {
        let singapore_strait = Coordinate::new(0.5, 104.0);
        assert_eq!(
            validate(&singapore_strait, &MALAYSIA, Some(&singapore_strait), 50.0),
            Validation::OutOfCountryBounds
        );
    }

    #[test]
    fn no_center_is_valid_within_bounds() {
        let ipoh = Coordinate::new(4.5975, 101.0901);
        assert_eq!(validate(&ipoh, &MALAYSIA, None, 50.0), Validation::Valid);
    }

    #[test]
    fn valid_implies_within_bounds() {
        let validator = Validator::new(MALAYSIA, 50.0);
        let samples = [
            Coordinate::new(3.1390, 101.6869),
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.35, 103.82),
            Coordinate::new(5.98, 116.07),
            Coordinate::new(-999.0, -999.0),
        ];
        for sample in &samples {
            if validator.check(sample, None).is_valid() {
                assert!(MALAYSIA.contains(sample), "{sample} valid but out of bounds");
            }
        }
    }

    #[test]
    fn threshold_can_be_overridden() {
        let validator = Validator::new(CountryBounds::WORLD, 50.0).with_threshold(200.0);
        let center = Coordinate::new(0.0, 0.0);
        assert!(
            validator
                .check(&Coordinate::new(1.0, 0.0), Some(&center))
                .is_valid()
        );
    }
}
