//! Per epoch accumulation of new variables and factors
use log::warn;
use nalgebra::Vector3;

use crate::{
    arc::{ArcEvent, ArcTracker},
    cfg::Config,
    error::Error,
    prelude::{BiasKey, Epoch, NavKey, SV},
    state::{BiasNoise, Factor, NavNoise, NavState},
    weighting::elevation_scaled_variance,
};

/// One parsed observation record. Producing these from raw GNSS files
/// is the job of the (external) parsing layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Epoch key, monotonically non decreasing across the stream
    pub epoch_key: u32,
    /// Sampling [Epoch]
    pub t: Epoch,
    /// [SV] identity
    pub sv: SV,
    /// Broadcast/precise satellite position, ECEF (m)
    pub sat_ecef_m: Vector3<f64>,
    /// Geometric range estimate from the nominal position (m)
    pub geometric_range_m: f64,
    /// Pseudorange measurement (m)
    pub pseudorange_m: f64,
    /// Carrier phase measurement (m)
    pub phase_m: f64,
    /// Phase break marker: any change signals a cycle slip
    pub phase_break: i32,
}

/// New (variable, initial value) pair, scoped to one [EpochBatch]
#[derive(Debug, Clone, PartialEq)]
pub enum NewValue {
    Nav(NavKey, NavState),
    Bias(BiasKey, f64),
}

/// [EpochBatch] is the transient set of new variables and factors
/// accumulated between two epoch boundaries, consumed whole by the
/// estimator and then discarded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpochBatch {
    /// New variables with their initial values
    pub values: Vec<NewValue>,
    /// New factors, in construction order
    pub factors: Vec<Factor>,
}

impl EpochBatch {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.factors.is_empty()
    }
}

/// Outcome of one [BatchBuilder::ingest]
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Both measurement factors were appended.
    Accepted {
        /// True when this observation opened a new phase arc
        new_arc: bool,
    },
    /// Observation dropped (logged, run continues). Guaranteed to have
    /// left the arc records and the pending batch untouched.
    Rejected(Error),
}

/// [BatchBuilder] turns the observation stream into [EpochBatch]es:
/// new navigation and bias states, their priors, and one pseudorange
/// plus one phase factor per accepted observation.
pub struct BatchBuilder {
    /// Nominal receiver position, ECEF (m)
    nominal_ecef_m: Vector3<f64>,
    /// Initial navigation prior noise
    prior_noise: NavNoise,
    /// Fresh bias prior noise
    bias_noise: BiasNoise,
    /// Pseudorange base variance (m²)
    pseudorange_variance_m2: f64,
    /// Phase base variance (m²)
    phase_variance_m2: f64,
    /// True until the very first observation is ingested
    first_ob: bool,
    /// Epoch currently accumulating
    current_key: Option<NavKey>,
    /// Pending batch
    batch: EpochBatch,
    /// Satellites (and their arcs) observed this epoch, for reporting
    active: Vec<(SV, BiasKey)>,
}

impl BatchBuilder {
    /// Builds a new [BatchBuilder]. Fails on an invalid noise
    /// parametrization, which would compromise the very first
    /// navigation prior: fatal at startup.
    pub fn new(cfg: &Config) -> Result<Self, Error> {
        let (x, y, z) = cfg.nominal_ecef_m;
        Ok(Self {
            nominal_ecef_m: Vector3::new(x, y, z),
            prior_noise: NavNoise::from_sigmas(cfg.prior_sigmas.into())?,
            bias_noise: BiasNoise::from_sigma(cfg.bias_prior_sigma)?,
            pseudorange_variance_m2: cfg.pseudorange_variance_m2,
            phase_variance_m2: cfg.phase_variance_m2,
            first_ob: true,
            current_key: None,
            batch: EpochBatch::default(),
            active: Vec::with_capacity(16),
        })
    }

    /// Epoch currently accumulating, if any
    pub fn current_key(&self) -> Option<NavKey> {
        self.current_key
    }

    /// Opens a new epoch: creates its navigation state, seeded with
    /// the best known estimate (forward propagation improves solver
    /// convergence over zero seeding).
    pub fn begin_epoch(&mut self, key: NavKey, seed: NavState) {
        self.current_key = Some(key);
        self.batch.values.push(NewValue::Nav(key, seed));
    }

    /// Appends a transition factor to the pending batch.
    pub fn push_factor(&mut self, factor: Factor) {
        self.batch.factors.push(factor);
    }

    /// Hands the pending [EpochBatch] over, leaving an empty one.
    pub fn take_batch(&mut self) -> EpochBatch {
        std::mem::take(&mut self.batch)
    }

    /// Satellites and arcs observed during the current epoch
    pub fn active(&self) -> &[(SV, BiasKey)] {
        &self.active
    }

    /// Resets the per epoch satellite accumulator
    pub fn clear_active(&mut self) {
        self.active.clear();
    }

    /// Consumes one observation: validates it, updates the arc
    /// tracking and appends the resulting variables and factors to
    /// the pending batch. Per observation errors are returned as
    /// [IngestOutcome::Rejected] and never unwind the run.
    pub fn ingest(&mut self, tracker: &mut ArcTracker, obs: &Observation) -> IngestOutcome {
        // full validation happens before any state mutation:
        // a rejected observation must not refresh an arc marker
        if let Err(error) = self.validate(obs) {
            warn!("{}({}): rejected: {}", obs.t, obs.sv, error);
            return IngestOutcome::Rejected(error);
        }

        let pseudorange_var = match elevation_scaled_variance(
            obs.sv,
            &obs.sat_ecef_m,
            &self.nominal_ecef_m,
            self.pseudorange_variance_m2,
        ) {
            Ok(variance) => variance,
            Err(error) => {
                warn!("{}({}): rejected: {}", obs.t, obs.sv, error);
                return IngestOutcome::Rejected(error);
            },
        };

        let phase_var = match elevation_scaled_variance(
            obs.sv,
            &obs.sat_ecef_m,
            &self.nominal_ecef_m,
            self.phase_variance_m2,
        ) {
            Ok(variance) => variance,
            Err(error) => {
                warn!("{}({}): rejected: {}", obs.t, obs.sv, error);
                return IngestOutcome::Rejected(error);
            },
        };

        // only once per run: initial state + prior, zero seeded
        if self.first_ob {
            let key = NavKey(obs.epoch_key);
            self.begin_epoch(key, NavState::zero());
            self.batch
                .factors
                .push(Factor::nav_prior(key, NavState::zero(), self.prior_noise));
            self.first_ob = false;
        }

        let key = match self.current_key {
            Some(key) => key,
            None => {
                // begin_epoch() not called after last boundary: internal
                // misuse, reject rather than fabricate an identity
                return IngestOutcome::Rejected(Error::UnresolvedEpoch(obs.epoch_key));
            },
        };

        let event = tracker.observe(obs.sv, obs.phase_break);
        let new_arc = matches!(event, ArcEvent::NewArc(_));
        let bias = event.bias();

        if new_arc {
            // ambiguity seeded at phase minus range
            let prior_m = obs.phase_m - obs.pseudorange_m;
            self.batch.values.push(NewValue::Bias(bias, prior_m));
            match Factor::bias_prior(bias, prior_m, self.bias_noise) {
                Ok(factor) => self.batch.factors.push(factor),
                Err(error) => return IngestOutcome::Rejected(error),
            }
        }

        let pseudorange = Factor::pseudorange(
            key,
            obs.sv,
            obs.pseudorange_m - obs.geometric_range_m,
            obs.sat_ecef_m,
            self.nominal_ecef_m,
            pseudorange_var,
        );

        let phase = Factor::phase(
            key,
            bias,
            obs.sv,
            obs.phase_m - obs.geometric_range_m,
            obs.sat_ecef_m,
            self.nominal_ecef_m,
            phase_var,
        );

        match (pseudorange, phase) {
            (Ok(pr), Ok(ph)) => {
                self.batch.factors.push(pr);
                self.batch.factors.push(ph);
                self.active.push((obs.sv, bias));
                IngestOutcome::Accepted { new_arc }
            },
            (Err(error), _) | (_, Err(error)) => {
                warn!("{}({}): rejected: {}", obs.t, obs.sv, error);
                IngestOutcome::Rejected(error)
            },
        }
    }

    fn validate(&self, obs: &Observation) -> Result<(), Error> {
        if obs.sat_ecef_m.iter().any(|value| !value.is_finite()) {
            return Err(Error::NonFinitePosition(obs.sv));
        }
        if !obs.geometric_range_m.is_finite()
            || !obs.pseudorange_m.is_finite()
            || !obs.phase_m.is_finite()
        {
            return Err(Error::NonFiniteMeasurement(obs.sv));
        }
        Ok(())
    }
}
