//! Great-circle math on a spherical Earth

use crate::domain::types::LatLng;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two points in meters
pub fn distance_m(from: LatLng, to: LatLng) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let d_phi = (to.lat - from.lat).to_radians();
    let d_lambda = (to.lng - from.lng).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial bearing (forward azimuth) from `from` to `to`, in [0, 360) degrees
pub fn bearing_deg(from: LatLng, to: LatLng) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let d_lambda = (to.lng - from.lng).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Point reached by travelling `distance_m` from `origin` along `bearing_deg`
pub fn destination_point(origin: LatLng, bearing_deg: f64, distance_m: f64) -> LatLng {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let phi1 = origin.lat.to_radians();
    let lambda1 = origin.lng.to_radians();

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

    LatLng::new(phi2.to_degrees(), ((lambda2.to_degrees() + 540.0) % 360.0) - 180.0)
}

/// Human-friendly distance: whole meters below 100 m, else kilometers with one decimal
pub fn format_distance(distance_m: f64) -> String {
    if distance_m < 100.0 {
        format!("{} m", distance_m.round() as i64)
    } else {
        format!("{:.1} km", distance_m / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_one_degree_longitude_at_equator() {
        let d = distance_m(LatLng::new(0.0, 0.0), LatLng::new(0.0, 1.0));
        assert!((d - 111_195.0).abs() < 1.0, "got {d}");
    }

    #[test]
    fn test_distance_zero() {
        let p = LatLng::new(47.16, 27.6);
        assert_eq!(distance_m(p, p), 0.0);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = LatLng::new(0.0, 0.0);
        assert!((bearing_deg(origin, LatLng::new(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((bearing_deg(origin, LatLng::new(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((bearing_deg(origin, LatLng::new(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((bearing_deg(origin, LatLng::new(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_destination_point_inverts_distance_and_bearing() {
        let origin = LatLng::new(47.16, 27.6);
        let p = destination_point(origin, 45.0, 300.0);
        assert!((distance_m(origin, p) - 300.0).abs() < 0.01);
        assert!((bearing_deg(origin, p) - 45.0).abs() < 0.01);
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(42.4), "42 m");
        assert_eq!(format_distance(99.4), "99 m");
        assert_eq!(format_distance(120.0), "0.1 km");
        assert_eq!(format_distance(1550.0), "1.6 km");
    }
}
