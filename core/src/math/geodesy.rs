//! WGS84 geodesic helpers over `geo`, with coordinates as (lat, lon) degrees.

use crate::math::angles::wrap_360;
use geo::{GeodesicBearing, GeodesicDestination, GeodesicDistance, Point};

fn point(lat: f64, lon: f64) -> Point<f64> {
    Point::new(lon, lat)
}

/// Geodesic inverse problem: `(distance_m, forward_azimuth_deg)` with the
/// azimuth in `[0, 360)`.
pub fn inverse(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> (f64, f64) {
    let from = point(lat1, lon1);
    let to = point(lat2, lon2);
    let distance = from.geodesic_distance(&to);
    let azimuth = wrap_360(from.geodesic_bearing(to));
    (distance, azimuth)
}

pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    point(lat1, lon1).geodesic_distance(&point(lat2, lon2))
}

pub fn azimuth(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    wrap_360(point(lat1, lon1).geodesic_bearing(point(lat2, lon2)))
}

/// Geodesic direct problem: the `(lat, lon)` reached from a point after
/// `distance_m` along `azimuth_deg`.
pub fn direct(lat: f64, lon: f64, azimuth_deg: f64, distance_m: f64) -> (f64, f64) {
    let reached = point(lat, lon).geodesic_destination(azimuth_deg, distance_m);
    (reached.y(), reached.x())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn due_north_azimuth_and_distance() {
        let (d, az) = inverse(50.0, 30.0, 50.001, 30.0);
        assert_abs_diff_eq!(az, 0.0, epsilon = 1e-6);
        // One millidegree of latitude at 50°N is about 111.2 m.
        assert!((d - 111.2).abs() < 0.5, "{}", d);
    }

    #[test]
    fn westward_azimuth_is_wrapped_positive() {
        let az = azimuth(50.0, 30.0, 50.0, 29.999);
        assert!((az - 270.0).abs() < 0.01, "{}", az);
    }

    #[test]
    fn direct_inverts_inverse() {
        let (d, az) = inverse(50.0, 30.0, 50.0004, 30.0007);
        let (lat, lon) = direct(50.0, 30.0, az, d);
        assert_abs_diff_eq!(lat, 50.0004, epsilon = 1e-9);
        assert_abs_diff_eq!(lon, 30.0007, epsilon = 1e-9);
    }

    #[test]
    fn zero_distance_returns_origin() {
        let (lat, lon) = direct(48.5, 11.25, 123.0, 0.0);
        assert_abs_diff_eq!(lat, 48.5, epsilon = 1e-12);
        assert_abs_diff_eq!(lon, 11.25, epsilon = 1e-12);
    }
}
