use log::LevelFilter;
use std::sync::Once;

use nalgebra::Vector3;

use crate::{
    frames::ecef2enu_rotation,
    prelude::{
        Constellation, EpochBatch, Epoch, Error, Estimate, GraphExport, IncrementalEstimator,
        NavKey, NavState, NewValue, Observation, SV,
    },
};

mod estimator;

static INIT: Once = Once::new();

pub fn init_logger() {
    INIT.call_once(|| {
        env_logger::builder()
            .is_test(true)
            .filter_level(LevelFilter::Debug)
            .init();
    });
}

/// Nominal test position: on the equator, prime meridian (WGS84)
pub fn nominal_ecef() -> Vector3<f64> {
    Vector3::new(6_378_137.0, 0.0, 0.0)
}

pub fn gps(prn: u8) -> SV {
    SV::new(Constellation::GPS, prn)
}

/// Places a satellite at given elevation/azimuth (degrees) and range
/// (m) from the nominal position.
pub fn sat_at(nominal: &Vector3<f64>, elev_deg: f64, azim_deg: f64, range_m: f64) -> Vector3<f64> {
    let (elev, azim) = (elev_deg.to_radians(), azim_deg.to_radians());
    let enu = Vector3::new(
        elev.cos() * azim.sin(),
        elev.cos() * azim.cos(),
        elev.sin(),
    ) * range_m;
    nominal + ecef2enu_rotation(nominal).transpose() * enu
}

/// Synthesizes one noise free [Observation] for a receiver whose true
/// position is nominal − `dx_true`, with clock and troposphere at
/// zero and a constant phase ambiguity `amb_m` on the arc.
pub fn synthetic_obs(
    epoch_key: u32,
    sv: SV,
    sat_ecef_m: Vector3<f64>,
    nominal: &Vector3<f64>,
    dx_true: &Vector3<f64>,
    amb_m: f64,
    phase_break: i32,
) -> Observation {
    let los = sat_ecef_m - nominal;
    let rho = los.norm();
    let unit = los / rho;
    let pseudorange_m = rho + unit.dot(dx_true);
    Observation {
        epoch_key,
        t: Epoch::from_gpst_seconds(epoch_key as f64 * 30.0),
        sv,
        sat_ecef_m,
        geometric_range_m: rho,
        pseudorange_m,
        phase_m: pseudorange_m + amb_m,
        phase_break,
    }
}

/// Eight satellite constellation with varied geometry
pub fn constellation(nominal: &Vector3<f64>) -> Vec<(SV, Vector3<f64>)> {
    [
        (1, 80.0, 10.0),
        (2, 60.0, 90.0),
        (3, 55.0, 180.0),
        (4, 45.0, 270.0),
        (5, 40.0, 45.0),
        (6, 35.0, 135.0),
        (7, 30.0, 225.0),
        (8, 25.0, 315.0),
    ]
    .iter()
    .map(|(prn, elev, azim)| (gps(*prn), sat_at(nominal, *elev, *azim, 22.0E6)))
    .collect()
}

/// Recording stand in for an external incremental backend: stores
/// batch sizes verbatim (no dedup) and answers zero states for every
/// navigation key it has seen.
#[derive(Default)]
pub struct StubEstimator {
    pub updates: usize,
    pub batches: Vec<EpochBatch>,
    pub stored_values: usize,
    pub stored_factors: usize,
    nav_keys: Vec<NavKey>,
}

impl IncrementalEstimator for StubEstimator {
    fn update(&mut self, batch: EpochBatch) -> Result<(), Error> {
        self.updates += 1;
        self.stored_values += batch.values.len();
        self.stored_factors += batch.factors.len();
        for value in &batch.values {
            if let NewValue::Nav(key, _) = value {
                self.nav_keys.push(*key);
            }
        }
        self.batches.push(batch);
        Ok(())
    }

    fn estimate(&self) -> Estimate {
        let mut estimate = Estimate::default();
        for key in &self.nav_keys {
            estimate.nav.insert(*key, NavState::zero());
        }
        estimate
    }

    fn export(&self) -> GraphExport {
        GraphExport::default()
    }
}

/// Backend that always refuses to converge
pub struct DivergingEstimator {}

impl IncrementalEstimator for DivergingEstimator {
    fn update(&mut self, _: EpochBatch) -> Result<(), Error> {
        Err(Error::SolverDivergence(0))
    }

    fn estimate(&self) -> Estimate {
        Estimate::default()
    }
}
