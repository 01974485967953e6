//! Great-circle distance helpers for geofencing.

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two coordinates.
///
/// Pure and total: every input pair yields a distance. Callers are expected
/// to treat `(0, 0)` as "location unknown" (see [`is_unknown`]) and skip
/// geofencing entirely rather than measure against it.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// The storage default `(0, 0)` stands for "no location supplied", not a real
/// point in the Gulf of Guinea.
pub fn is_unknown(lat: f64, lon: f64) -> bool {
    lat == 0.0 && lon == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_points_are_zero_meters() {
        assert_eq!(distance_meters(18.52, 73.86, 18.52, 73.86), 0.0);
        assert_eq!(distance_meters(-25.75, 28.23, -25.75, 28.23), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let ab = distance_meters(18.52, 73.86, 18.53, 73.87);
        let ba = distance_meters(18.53, 73.87, 18.52, 73.86);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn pretoria_to_johannesburg_is_roughly_55km() {
        // Pretoria (-25.7479, 28.2293) to Johannesburg (-26.2041, 28.0473)
        let d = distance_meters(-25.7479, 28.2293, -26.2041, 28.0473);
        assert!(d > 50_000.0 && d < 60_000.0, "got {d}");
    }

    #[test]
    fn hundred_meter_scale_is_resolved() {
        // ~0.001 degrees of latitude is ~111 m
        let d = distance_meters(18.52, 73.86, 18.521, 73.86);
        assert!(d > 100.0 && d < 125.0, "got {d}");
    }

    #[test]
    fn origin_is_unknown() {
        assert!(is_unknown(0.0, 0.0));
        assert!(!is_unknown(18.52, 73.86));
        assert!(!is_unknown(0.0, 73.86));
    }
}
