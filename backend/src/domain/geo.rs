//! Great-circle helpers over a spherical Earth.
//!
//! All inputs are degrees. NaN propagates; there are no other failure modes.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// True when both components are finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        distance_m(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }

    pub fn bearing_to(&self, other: &GeoPoint) -> f64 {
        bearing_deg(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

/// Haversine distance in meters.
///
/// # Examples
/// ```
/// use busfleet::domain::geo::distance_m;
///
/// let d = distance_m(40.0, -74.0, 40.003, -74.0);
/// assert!((d - 333.6).abs() < 1.0);
/// ```
pub fn distance_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial great-circle bearing in `[0, 360)`.
pub fn bearing_deg(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    normalise_deg(y.atan2(x).to_degrees())
}

/// Smallest angle between two headings, in `[0, 180]`.
pub fn heading_delta_deg(a: f64, b: f64) -> f64 {
    let diff = (normalise_deg(a) - normalise_deg(b)).abs();
    diff.min(360.0 - diff)
}

fn normalise_deg(value: f64) -> f64 {
    let wrapped = value.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn distance_of_point_to_itself_is_zero() {
        assert_eq!(distance_m(40.0, -74.0, 40.0, -74.0), 0.0);
    }

    #[rstest]
    #[case(40.0, -74.0, 40.003, -74.0, 333.6)]
    #[case(40.05, -74.0, 40.08, -74.0, 3335.8)]
    #[case(0.0, 0.0, 0.0, 1.0, 111_194.9)]
    fn distance_matches_reference(
        #[case] lat1: f64,
        #[case] lng1: f64,
        #[case] lat2: f64,
        #[case] lng2: f64,
        #[case] expected: f64,
    ) {
        let d = distance_m(lat1, lng1, lat2, lng2);
        assert!((d - expected).abs() < 1.0, "got {d}, expected {expected}");
    }

    #[rstest]
    #[case(0.0, 0.0, 1.0, 0.0, 0.0)]
    #[case(0.0, 0.0, 0.0, 1.0, 90.0)]
    #[case(1.0, 0.0, 0.0, 0.0, 180.0)]
    #[case(0.0, 1.0, 0.0, 0.0, 270.0)]
    fn bearing_cardinal_directions(
        #[case] lat1: f64,
        #[case] lng1: f64,
        #[case] lat2: f64,
        #[case] lng2: f64,
        #[case] expected: f64,
    ) {
        let b = bearing_deg(lat1, lng1, lat2, lng2);
        assert!((b - expected).abs() < 1e-6, "got {b}, expected {expected}");
        assert!((0.0..360.0).contains(&b));
    }

    #[rstest]
    #[case(10.0, 350.0, 20.0)]
    #[case(0.0, 180.0, 180.0)]
    #[case(-90.0, 90.0, 180.0)]
    #[case(720.0, 45.0, 45.0)]
    #[case(90.0, 90.0, 0.0)]
    fn heading_delta_wraps(#[case] a: f64, #[case] b: f64, #[case] expected: f64) {
        assert!((heading_delta_deg(a, b) - expected).abs() < 1e-9);
    }

    #[rstest]
    fn nan_propagates() {
        assert!(distance_m(f64::NAN, 0.0, 0.0, 0.0).is_nan());
        assert!(bearing_deg(0.0, 0.0, f64::NAN, 0.0).is_nan());
        assert!(heading_delta_deg(f64::NAN, 0.0).is_nan());
    }

    #[rstest]
    #[case(GeoPoint::new(91.0, 0.0), false)]
    #[case(GeoPoint::new(0.0, -181.0), false)]
    #[case(GeoPoint::new(f64::INFINITY, 0.0), false)]
    #[case(GeoPoint::new(-90.0, 180.0), true)]
    fn validity_bounds(#[case] point: GeoPoint, #[case] expected: bool) {
        assert_eq!(point.is_valid(), expected);
    }
}
