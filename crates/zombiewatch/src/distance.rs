//! Great-circle distance via the haversine formula.
//!
//! See [Wikipedia](https://en.wikipedia.org/wiki/Haversine_formula) for
//! more. **Distance is returned in meters.**

use crate::location::Coordinates;

/// Mean earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Surface distance in meters between two points on a sphere of radius
/// [`EARTH_RADIUS_METERS`].
///
/// Altitude is not taken into account.
#[must_use]
pub fn haversine(start: Coordinates, end: Coordinates) -> f64 {
    let lat1 = start.latitude.to_radians();
    let lat2 = end.latitude.to_radians();
    let d_lat = (end.latitude - start.latitude).to_radians();
    let d_lon = (end.longitude - start.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_haversine_distance_in_meters() {
        let start = Coordinates::new(48.864193, 2.350498);
        let end = Coordinates::new(48.863193, 2.351498);
        assert_close(haversine(start, end), 133.098_519_537_237_4);
    }

    #[test]
    fn test_haversine_same_point_is_zero() {
        let point = Coordinates::new(48.864193, 2.350498);
        assert!(haversine(point, point).abs() < f64::EPSILON);
    }

    #[test]
    fn test_haversine_is_symmetric() {
        let a = Coordinates::new(48.864193, 2.350498);
        let b = Coordinates::new(48.863921, 2.349211);
        assert_close(haversine(a, b), haversine(b, a));
    }

    #[test]
    fn test_haversine_short_hop() {
        let a = Coordinates::new(48.864193, 2.350498);
        let b = Coordinates::new(48.863921, 2.349211);
        let d = haversine(a, b);
        assert!((98.8..98.9).contains(&d), "got {d}");
    }

    #[test]
    fn test_haversine_quarter_meridian() {
        let equator = Coordinates::new(0.0, 0.0);
        let pole = Coordinates::new(90.0, 0.0);
        let expected = EARTH_RADIUS_METERS * std::f64::consts::FRAC_PI_2;
        assert!((haversine(equator, pole) - expected).abs() < 1e-3);
    }
}
