//! Estimator configuration
#[cfg(feature = "serde")]
use serde::Deserialize;

fn default_print_ecef() -> bool {
    true
}

fn default_print_enu() -> bool {
    false
}

fn default_print_amb() -> bool {
    false
}

fn default_prior_sigmas() -> [f64; 5] {
    [3.0, 3.0, 3.0, 1.0E3, 1.0E-1]
}

fn default_process_sigmas() -> [f64; 5] {
    [1.0, 1.0, 1.0, 10.0, 1.0E-3]
}

fn default_bias_prior_sigma() -> f64 {
    1.0
}

fn default_pseudorange_variance() -> f64 {
    2.5 * 2.5
}

fn default_phase_variance() -> f64 {
    0.25 * 0.25
}

fn default_max_iter() -> usize {
    10
}

fn default_convergence_m() -> f64 {
    1.0E-4
}

/// Estimation backend options
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct EstimatorOpts {
    /// Maximal number of relinearization rounds per epoch before
    /// the run is declared diverging.
    #[cfg_attr(feature = "serde", serde(default = "default_max_iter"))]
    pub max_iter: usize,
    /// Correction norm (m) under which the estimate is converged.
    #[cfg_attr(feature = "serde", serde(default = "default_convergence_m"))]
    pub convergence_m: f64,
}

impl Default for EstimatorOpts {
    fn default() -> Self {
        Self {
            max_iter: default_max_iter(),
            convergence_m: default_convergence_m(),
        }
    }
}

/// [Config] gathers the run parametrization: the nominal reference
/// position, output channels and the noise models. Numeric defaults
/// are suited to single frequency GPS pseudorange + phase processing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct Config {
    /// Nominal receiver position, ECEF (m). Navigation states are
    /// offsets from this point; it also anchors ENU reporting.
    #[cfg_attr(feature = "serde", serde(rename = "nominalECEF"))]
    pub nominal_ecef_m: (f64, f64, f64),

    /// Emit resolved ECEF positions
    #[cfg_attr(
        feature = "serde",
        serde(rename = "printECEF", default = "default_print_ecef")
    )]
    pub print_ecef: bool,

    /// Emit ENU converted positions
    #[cfg_attr(
        feature = "serde",
        serde(rename = "printENU", default = "default_print_enu")
    )]
    pub print_enu: bool,

    /// Emit per satellite ambiguity values
    #[cfg_attr(
        feature = "serde",
        serde(rename = "printAmb", default = "default_print_amb")
    )]
    pub print_amb: bool,

    /// Observation source locator. Consumed by the (external)
    /// parsing layer, carried here so one [Config] describes a run.
    #[cfg_attr(feature = "serde", serde(rename = "dataFile", default))]
    pub data_file: Option<String>,

    /// Initial navigation state prior sigmas
    /// (dx, dy, dz, tropo, clock), meters.
    #[cfg_attr(feature = "serde", serde(default = "default_prior_sigmas"))]
    pub prior_sigmas: [f64; 5],

    /// Epoch to epoch random walk process sigmas, meters.
    #[cfg_attr(feature = "serde", serde(default = "default_process_sigmas"))]
    pub process_sigmas: [f64; 5],

    /// Prior sigma on a fresh phase bias state (m)
    #[cfg_attr(feature = "serde", serde(default = "default_bias_prior_sigma"))]
    pub bias_prior_sigma: f64,

    /// Pseudorange base variance (m²), before elevation scaling
    #[cfg_attr(feature = "serde", serde(default = "default_pseudorange_variance"))]
    pub pseudorange_variance_m2: f64,

    /// Carrier phase base variance (m²), before elevation scaling
    #[cfg_attr(feature = "serde", serde(default = "default_phase_variance"))]
    pub phase_variance_m2: f64,

    /// Estimation backend options
    #[cfg_attr(feature = "serde", serde(default))]
    pub estimator: EstimatorOpts,
}

impl Config {
    /// Returns [Config] for static receiver processing at given
    /// nominal ECEF position (m). Customize from there as you will.
    pub fn static_ppp(nominal_ecef_m: (f64, f64, f64)) -> Self {
        Self {
            nominal_ecef_m,
            data_file: None,
            print_ecef: default_print_ecef(),
            print_enu: default_print_enu(),
            print_amb: default_print_amb(),
            prior_sigmas: default_prior_sigmas(),
            process_sigmas: default_process_sigmas(),
            bias_prior_sigma: default_bias_prior_sigma(),
            pseudorange_variance_m2: default_pseudorange_variance(),
            phase_variance_m2: default_phase_variance(),
            estimator: EstimatorOpts::default(),
        }
    }
}
