//! Great-circle distance helpers

use std::f64::consts::PI;

/// Mean Earth radius used for all distance calculations
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

fn to_radians(degrees: f64) -> f64 {
    degrees * PI / 180.0
}

/// Haversine distance in meters between two points given in decimal degrees.
///
/// Total for valid degree inputs; the intermediate term is clamped to 1.0 so
/// antipodal points cannot produce NaN through rounding.
pub fn distance_meters(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let d_lat = to_radians(lat_b - lat_a);
    let d_lon = to_radians(lon_b - lon_a);

    let h = (d_lat / 2.0).sin().powi(2)
        + to_radians(lat_a).cos() * to_radians(lat_b).cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// True when both values are finite and inside the WGS84 degree ranges
pub fn is_valid_coordinate(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_point_is_zero() {
        assert_eq!(distance_meters(28.6139, 77.209, 28.6139, 77.209), 0.0);
    }

    #[test]
    fn test_new_delhi_to_gurgaon() {
        // Connaught Place to Cyber City, roughly 21 km
        let d = distance_meters(28.6315, 77.2167, 28.4950, 77.0895);
        assert!(d > 19_000.0 && d < 21_500.0, "Expected ~20km, got {d}m");
    }

    #[test]
    fn test_symmetry() {
        let ab = distance_meters(44.9778, -93.2650, 44.9537, -93.0900);
        let ba = distance_meters(44.9537, -93.0900, 44.9778, -93.2650);
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn test_antipodal_points_are_finite() {
        let d = distance_meters(0.0, 0.0, 0.0, 180.0);
        assert!(d.is_finite());
        assert!((d - PI * EARTH_RADIUS_METERS).abs() < 1.0);
    }

    #[test]
    fn test_small_offset_in_meters() {
        // 0.001 degrees of latitude is ~111 m anywhere on the globe
        let d = distance_meters(28.6139, 77.209, 28.6149, 77.209);
        assert!((d - 111.19).abs() < 0.5, "got {d}");
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(is_valid_coordinate(28.6, 77.2));
        assert!(is_valid_coordinate(-90.0, 180.0));
        assert!(!is_valid_coordinate(90.1, 0.0));
        assert!(!is_valid_coordinate(0.0, -180.5));
        assert!(!is_valid_coordinate(f64::NAN, 0.0));
        assert!(!is_valid_coordinate(0.0, f64::INFINITY));
    }
}
