//! Batch relinearization estimator
use std::collections::HashMap;

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::{
    batch::{EpochBatch, NewValue},
    cfg::Config,
    error::Error,
    estimator::{Estimate, GraphExport, IncrementalEstimator},
    prelude::{BiasKey, Key, NavKey},
    state::{Factor, NavState, NAV_STATE_DIM},
    weighting::tropo_map,
};

/// One scalar measurement row: sparse Jacobian coefficients over the
/// flattened variable vector, residual, weight.
struct Row {
    coeffs: Vec<(usize, f64)>,
    residual: f64,
    weight: f64,
}

/// [GaussNewton] implements [IncrementalEstimator] by keeping every
/// factor ever submitted in an append only arena and relinearizing the
/// whole graph at each update: a weighted least squares solve over the
/// normal equations. Simple, exact for this nearly linear model, and a
/// drop in stand in for a true incremental backend.
pub struct GaussNewton {
    /// Relinearization rounds limit
    max_iter: usize,
    /// Convergence threshold on the correction norm (m)
    convergence_m: f64,
    /// Factor arena, append only
    factors: Vec<Factor>,
    /// Navigation keys, creation order
    nav_keys: Vec<NavKey>,
    /// Bias keys, creation order
    bias_keys: Vec<BiasKey>,
    /// Current navigation estimates
    nav_values: HashMap<NavKey, NavState>,
    /// Current bias estimates (m)
    bias_values: HashMap<BiasKey, f64>,
    /// Most recent navigation key, for diagnostics
    latest: Option<NavKey>,
}

impl GaussNewton {
    /// Builds a new [GaussNewton] estimator
    pub fn new(cfg: &Config) -> Self {
        Self {
            max_iter: cfg.estimator.max_iter.max(1),
            convergence_m: cfg.estimator.convergence_m,
            factors: Vec::with_capacity(1024),
            nav_keys: Vec::with_capacity(64),
            bias_keys: Vec::with_capacity(64),
            nav_values: HashMap::with_capacity(64),
            bias_values: HashMap::with_capacity(64),
            latest: None,
        }
    }

    /// Total number of factors absorbed so far
    pub fn graph_size(&self) -> usize {
        self.factors.len()
    }

    fn latest_epoch(&self) -> u32 {
        self.latest.map(|key| key.0).unwrap_or(0)
    }

    fn nav_offset(&self, key: &NavKey) -> Result<usize, Error> {
        self.nav_keys
            .iter()
            .position(|k| k == key)
            .map(|i| i * NAV_STATE_DIM)
            .ok_or(Error::UnknownVariable(Key::Nav(*key)))
    }

    fn bias_offset(&self, key: &BiasKey) -> Result<usize, Error> {
        self.bias_keys
            .iter()
            .position(|k| k == key)
            .map(|i| self.nav_keys.len() * NAV_STATE_DIM + i)
            .ok_or(Error::UnknownVariable(Key::Bias(*key)))
    }

    /// Flattens current values into one estimation vector
    fn flatten(&self) -> DVector<f64> {
        let dim = self.nav_keys.len() * NAV_STATE_DIM + self.bias_keys.len();
        let mut x = DVector::zeros(dim);
        for (i, key) in self.nav_keys.iter().enumerate() {
            if let Some(state) = self.nav_values.get(key) {
                let vector = state.vector();
                for j in 0..NAV_STATE_DIM {
                    x[i * NAV_STATE_DIM + j] = vector[j];
                }
            }
        }
        let base = self.nav_keys.len() * NAV_STATE_DIM;
        for (i, key) in self.bias_keys.iter().enumerate() {
            if let Some(bias) = self.bias_values.get(key) {
                x[base + i] = *bias;
            }
        }
        x
    }

    /// Writes the estimation vector back into the per key values
    fn unflatten(&mut self, x: &DVector<f64>) {
        for (i, key) in self.nav_keys.iter().enumerate() {
            let mut vector = nalgebra::Vector5::zeros();
            for j in 0..NAV_STATE_DIM {
                vector[j] = x[i * NAV_STATE_DIM + j];
            }
            self.nav_values.insert(*key, NavState::from_vector(vector));
        }
        let base = self.nav_keys.len() * NAV_STATE_DIM;
        for (i, key) in self.bias_keys.iter().enumerate() {
            self.bias_values.insert(*key, x[base + i]);
        }
    }

    /// Scalar measurement rows of one factor, linearized at `x`
    fn rows(&self, factor: &Factor, x: &DVector<f64>) -> Result<Vec<Row>, Error> {
        match factor {
            Factor::NavPrior { key, prior, noise } => {
                let base = self.nav_offset(key)?;
                let prior = prior.vector();
                let variances = noise.variances();
                Ok((0..NAV_STATE_DIM)
                    .map(|i| Row {
                        coeffs: vec![(base + i, 1.0)],
                        residual: prior[i] - x[base + i],
                        weight: 1.0 / variances[i],
                    })
                    .collect())
            },
            Factor::BiasPrior {
                key,
                prior_m,
                noise,
            } => {
                let index = self.bias_offset(key)?;
                Ok(vec![Row {
                    coeffs: vec![(index, 1.0)],
                    residual: prior_m - x[index],
                    weight: 1.0 / noise.variance(),
                }])
            },
            Factor::NavTransition {
                from,
                to,
                delta,
                noise,
            } => {
                let from = self.nav_offset(from)?;
                let to = self.nav_offset(to)?;
                let delta = delta.vector();
                let variances = noise.variances();
                Ok((0..NAV_STATE_DIM)
                    .map(|i| Row {
                        coeffs: vec![(from + i, -1.0), (to + i, 1.0)],
                        residual: delta[i] - (x[to + i] - x[from + i]),
                        weight: 1.0 / variances[i],
                    })
                    .collect())
            },
            Factor::Pseudorange {
                key,
                sv,
                residual_m,
                sat_ecef_m,
                nominal_ecef_m,
                variance_m2,
            } => {
                let base = self.nav_offset(key)?;
                let row = measurement_row(
                    base,
                    None,
                    *residual_m,
                    sat_ecef_m,
                    nominal_ecef_m,
                    *variance_m2,
                    x,
                )
                .ok_or(Error::DegenerateGeometry(*sv))?;
                Ok(vec![row])
            },
            Factor::Phase {
                key,
                bias,
                sv,
                residual_m,
                sat_ecef_m,
                nominal_ecef_m,
                variance_m2,
            } => {
                let base = self.nav_offset(key)?;
                let bias_index = self.bias_offset(bias)?;
                let row = measurement_row(
                    base,
                    Some(bias_index),
                    *residual_m,
                    sat_ecef_m,
                    nominal_ecef_m,
                    *variance_m2,
                    x,
                )
                .ok_or(Error::DegenerateGeometry(*sv))?;
                Ok(vec![row])
            },
        }
    }

    /// Full batch solve over the normal equations
    fn solve(&mut self) -> Result<(), Error> {
        let dim = self.nav_keys.len() * NAV_STATE_DIM + self.bias_keys.len();
        if dim == 0 {
            return Ok(());
        }

        let mut x = self.flatten();

        for iteration in 0..self.max_iter {
            let mut ata = DMatrix::<f64>::zeros(dim, dim);
            let mut atb = DVector::<f64>::zeros(dim);

            for factor in &self.factors {
                for row in self.rows(factor, &x)? {
                    for (i, ci) in &row.coeffs {
                        for (j, cj) in &row.coeffs {
                            ata[(*i, *j)] += row.weight * ci * cj;
                        }
                        atb[*i] += row.weight * ci * row.residual;
                    }
                }
            }

            let dx = ata
                .cholesky()
                .map(|chol| chol.solve(&atb))
                .ok_or(Error::SolverDivergence(self.latest_epoch()))?;

            if dx.iter().any(|value| !value.is_finite()) {
                return Err(Error::SolverDivergence(self.latest_epoch()));
            }

            let correction = dx.norm();
            x += dx;

            if correction < self.convergence_m {
                debug!(
                    "converged after {} round(s), {} factors",
                    iteration + 1,
                    self.factors.len()
                );
                self.unflatten(&x);
                return Ok(());
            }
        }

        Err(Error::SolverDivergence(self.latest_epoch()))
    }
}

/// Measurement model row shared by pseudorange and phase factors:
/// unit line of sight over the position offsets, troposphere
/// obliquity, unity clock column, optional unity bias column.
fn measurement_row(
    base: usize,
    bias_index: Option<usize>,
    residual_m: f64,
    sat_ecef_m: &nalgebra::Vector3<f64>,
    nominal_ecef_m: &nalgebra::Vector3<f64>,
    variance_m2: f64,
    x: &DVector<f64>,
) -> Option<Row> {
    let los = sat_ecef_m - nominal_ecef_m;
    let norm = los.norm();
    if norm < 1.0 {
        return None;
    }
    let unit = los / norm;

    let enu = crate::frames::ecef2enu(sat_ecef_m, nominal_ecef_m);
    let elevation_deg = (enu[2] / norm).asin().to_degrees();

    let mut coeffs = Vec::with_capacity(6);
    for i in 0..3 {
        coeffs.push((base + i, unit[i]));
    }
    coeffs.push((base + 3, tropo_map(elevation_deg)));
    coeffs.push((base + 4, 1.0));
    if let Some(index) = bias_index {
        coeffs.push((index, 1.0));
    }

    let predicted: f64 = coeffs.iter().map(|(i, c)| c * x[*i]).sum();

    Some(Row {
        coeffs,
        residual: residual_m - predicted,
        weight: 1.0 / variance_m2,
    })
}

impl IncrementalEstimator for GaussNewton {
    fn update(&mut self, batch: EpochBatch) -> Result<(), Error> {
        for value in batch.values {
            match value {
                NewValue::Nav(key, seed) => {
                    if !self.nav_values.contains_key(&key) {
                        self.nav_keys.push(key);
                    }
                    self.nav_values.insert(key, seed);
                    self.latest = Some(key);
                },
                NewValue::Bias(key, seed) => {
                    if !self.bias_values.contains_key(&key) {
                        self.bias_keys.push(key);
                    }
                    self.bias_values.insert(key, seed);
                },
            }
        }

        for factor in batch.factors {
            for key in factor.keys() {
                match key {
                    Key::Nav(nav) => {
                        self.nav_offset(&nav)?;
                    },
                    Key::Bias(bias) => {
                        self.bias_offset(&bias)?;
                    },
                }
            }
            self.factors.push(factor);
        }

        self.solve()
    }

    fn estimate(&self) -> Estimate {
        Estimate {
            nav: self.nav_values.clone(),
            bias: self.bias_values.clone(),
        }
    }

    fn export(&self) -> GraphExport {
        let mut variables = Vec::with_capacity(self.nav_keys.len() + self.bias_keys.len());
        variables.extend(self.nav_keys.iter().map(|key| Key::Nav(*key)));
        variables.extend(self.bias_keys.iter().map(|key| Key::Bias(*key)));
        GraphExport {
            variables,
            factors: self
                .factors
                .iter()
                .map(|factor| (factor.label(), factor.keys()))
                .collect(),
        }
    }
}
