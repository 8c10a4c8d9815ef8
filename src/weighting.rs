//! Elevation dependent measurement weighting
use nalgebra::Vector3;

use crate::{
    error::Error,
    frames::ecef2enu,
    prelude::SV,
};

/// Below this line of sight norm (m), satellite and receiver
/// are considered coincident.
const MIN_LOS_NORM_M: f64 = 1.0;

/// sin(elevation) floor: keeps the scaled variance finite and positive
/// for satellites at or below the horizon.
const MIN_SIN_ELEVATION: f64 = 1.0E-2;

/// Line of sight elevation (degrees) of `sat_ecef_m` seen from
/// `nominal_ecef_m`. [Error::DegenerateGeometry] when both coincide.
pub fn elevation_deg(
    sv: SV,
    sat_ecef_m: &Vector3<f64>,
    nominal_ecef_m: &Vector3<f64>,
) -> Result<f64, Error> {
    let enu = ecef2enu(sat_ecef_m, nominal_ecef_m);
    let norm = enu.norm();
    if norm < MIN_LOS_NORM_M {
        return Err(Error::DegenerateGeometry(sv));
    }
    Ok((enu[2] / norm).asin().to_degrees())
}

/// Scales `base_variance_m2` by the line of sight geometry: low
/// elevation signals are penalized with a larger variance
/// (multipath, atmospheric risk). Pure, always strictly positive.
pub fn elevation_scaled_variance(
    sv: SV,
    sat_ecef_m: &Vector3<f64>,
    nominal_ecef_m: &Vector3<f64>,
    base_variance_m2: f64,
) -> Result<f64, Error> {
    if !base_variance_m2.is_finite() || base_variance_m2 <= 0.0 {
        return Err(Error::InvalidVariance);
    }
    let elev_deg = elevation_deg(sv, sat_ecef_m, nominal_ecef_m)?;
    let sin_elev = elev_deg.to_radians().sin().max(MIN_SIN_ELEVATION);
    Ok(base_variance_m2 / (sin_elev * sin_elev))
}

/// Black & Eisner troposphere obliquity mapping, used as the
/// troposphere column of the measurement model.
pub fn tropo_map(elevation_deg: f64) -> f64 {
    let sin_elev = elevation_deg.to_radians().sin();
    1.001 / (0.002001 + sin_elev * sin_elev).sqrt()
}
