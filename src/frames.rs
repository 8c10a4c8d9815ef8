//! Minimal ECEF / ENU frame support (WGS84)
use nalgebra::{Matrix3, Vector3};

/// WGS84 semi major axis (m)
const WGS84_A_M: f64 = 6_378_137.0;

/// WGS84 first eccentricity squared
const WGS84_E2: f64 = 6.694_379_990_141_317E-3;

/// Converts ECEF coordinates (m) to geodetic (latitude, longitude) in radians.
/// Iterative resolution of the latitude, sub millimeter after 5 rounds.
pub fn ecef2geodetic_rad(ecef_m: &Vector3<f64>) -> (f64, f64) {
    let (x, y, z) = (ecef_m[0], ecef_m[1], ecef_m[2]);
    let lon = y.atan2(x);
    let p = (x * x + y * y).sqrt();

    let mut lat = z.atan2(p * (1.0 - WGS84_E2));
    for _ in 0..5 {
        let sin_lat = lat.sin();
        let n = WGS84_A_M / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        lat = (z + WGS84_E2 * n * sin_lat).atan2(p);
    }
    (lat, lon)
}

/// Returns the ECEF to ENU rotation matrix at given reference point.
pub fn ecef2enu_rotation(reference_ecef_m: &Vector3<f64>) -> Matrix3<f64> {
    let (lat, lon) = ecef2geodetic_rad(reference_ecef_m);
    let (sin_lat, cos_lat) = (lat.sin(), lat.cos());
    let (sin_lon, cos_lon) = (lon.sin(), lon.cos());
    Matrix3::new(
        -sin_lon,
        cos_lon,
        0.0,
        -sin_lat * cos_lon,
        -sin_lat * sin_lon,
        cos_lat,
        cos_lat * cos_lon,
        cos_lat * sin_lon,
        sin_lat,
    )
}

/// Expresses `ecef_m` as East, North, Up coordinates (m)
/// relative to `reference_ecef_m`.
pub fn ecef2enu(ecef_m: &Vector3<f64>, reference_ecef_m: &Vector3<f64>) -> Vector3<f64> {
    ecef2enu_rotation(reference_ecef_m) * (ecef_m - reference_ecef_m)
}

#[cfg(test)]
mod test {
    use super::{ecef2enu, ecef2geodetic_rad};
    use nalgebra::Vector3;

    #[test]
    fn geodetic_equator() {
        let (lat, lon) = ecef2geodetic_rad(&Vector3::new(6_378_137.0, 0.0, 0.0));
        assert!(lat.abs() < 1E-9);
        assert!(lon.abs() < 1E-9);
    }

    #[test]
    fn geodetic_meridian_90() {
        let (_, lon) = ecef2geodetic_rad(&Vector3::new(0.0, 6_378_137.0, 0.0));
        assert!((lon - std::f64::consts::FRAC_PI_2).abs() < 1E-9);
    }

    #[test]
    fn enu_up_at_equator() {
        let reference = Vector3::new(6_378_137.0, 0.0, 0.0);
        let above = Vector3::new(6_378_237.0, 0.0, 0.0);
        let enu = ecef2enu(&above, &reference);
        assert!(enu[0].abs() < 1E-6);
        assert!(enu[1].abs() < 1E-6);
        assert!((enu[2] - 100.0).abs() < 1E-6);
    }

    #[test]
    fn enu_east_at_equator() {
        let reference = Vector3::new(6_378_137.0, 0.0, 0.0);
        let east = Vector3::new(6_378_137.0, 50.0, 0.0);
        let enu = ecef2enu(&east, &reference);
        assert!((enu[0] - 50.0).abs() < 1E-6);
        assert!(enu[1].abs() < 1E-3);
    }
}
