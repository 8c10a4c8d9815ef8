//! Incremental update loop
use itertools::Itertools;
use log::{error, info, warn};
use nalgebra::Vector3;

use crate::{
    arc::ArcTracker,
    batch::{BatchBuilder, IngestOutcome, Observation},
    cfg::Config,
    error::Error,
    estimator::{GraphExport, IncrementalEstimator},
    frames::ecef2enu,
    prelude::{Epoch, NavKey},
    solutions::EpochSolution,
    state::{Factor, NavNoise, NavState},
};

/// [Solver] drives the incremental estimation: it tracks phase arcs,
/// accumulates one [crate::batch::EpochBatch] per epoch, submits it to
/// the [IncrementalEstimator] at each boundary and carries the
/// retrieved estimate forward as the next epoch's initial guess.
///
/// The observation stream is processed strictly in arrival order:
/// epoch boundaries and cycle slip decisions are order dependent.
pub struct Solver<E: IncrementalEstimator> {
    /// Solver parametrization
    pub cfg: Config,
    /// Nominal receiver position, ECEF (m)
    nominal_ecef_m: Vector3<f64>,
    /// Epoch to epoch random walk noise
    process_noise: NavNoise,
    /// Phase arc tracking
    tracker: ArcTracker,
    /// Batch accumulation
    builder: BatchBuilder,
    /// Estimation backend
    estimator: E,
    /// Previously closed epoch, if any
    prev_key: Option<NavKey>,
    /// Best known state, seeds the next epoch
    prior_state: NavState,
    /// Timestamp of the most recent observation
    last_t: Option<Epoch>,
}

impl<E: IncrementalEstimator> Solver<E> {
    /// Builds a new [Solver] around given estimation backend.
    /// Fails on invalid noise parametrization: without a valid
    /// navigation prior no graph can ever be anchored.
    pub fn new(cfg: &Config, estimator: E) -> Result<Self, Error> {
        let (x, y, z) = cfg.nominal_ecef_m;
        Ok(Self {
            cfg: cfg.clone(),
            nominal_ecef_m: Vector3::new(x, y, z),
            process_noise: NavNoise::from_sigmas(cfg.process_sigmas.into())?,
            tracker: ArcTracker::new(),
            builder: BatchBuilder::new(cfg)?,
            estimator,
            prev_key: None,
            prior_state: NavState::zero(),
            last_t: None,
        })
    }

    /// Runs the whole observation stream through [Self::process],
    /// one observation of lookahead for boundary detection, then
    /// flushes the trailing epoch. An empty stream is reported and
    /// yields empty output.
    pub fn run<I>(&mut self, observations: I) -> Result<Vec<EpochSolution>, Error>
    where
        I: IntoIterator<Item = Observation>,
    {
        let mut solutions = Vec::new();
        let mut stream = observations.into_iter().peekable();

        while let Some(obs) = stream.next() {
            let next_key = stream.peek().map(|next| next.epoch_key);
            if let Some(solution) = self.process(obs, next_key)? {
                solutions.push(solution);
            }
        }

        match self.flush() {
            Ok(Some(solution)) => solutions.push(solution),
            Ok(None) => {},
            Err(Error::StreamExhaustedEarly) => {
                warn!("stream exhausted before first epoch boundary: no estimate produced");
            },
            Err(error) => return Err(error),
        }

        Ok(solutions)
    }

    /// Processes one observation. `next_key` is the epoch key of the
    /// following observation, when known: a key change closes the
    /// current epoch and returns its [EpochSolution]. The trailing
    /// epoch (no lookahead left) requires an explicit [Self::flush].
    pub fn process(
        &mut self,
        obs: Observation,
        next_key: Option<u32>,
    ) -> Result<Option<EpochSolution>, Error> {
        self.last_t = Some(obs.t);
        let t = obs.t;

        if let IngestOutcome::Rejected(rejection) = self.builder.ingest(&mut self.tracker, &obs) {
            if !rejection.is_observation_rejection() {
                return Err(rejection);
            }
        }

        match (self.builder.current_key(), next_key) {
            (Some(current), Some(next)) if next != current.0 => {
                self.close_epoch(t, Some(next))
            },
            _ => Ok(None),
        }
    }

    /// Explicitly closes the trailing epoch. Required once the stream
    /// is exhausted: the last epoch never sees a boundary through
    /// lookahead. [Error::StreamExhaustedEarly] when no epoch was
    /// ever opened.
    pub fn flush(&mut self) -> Result<Option<EpochSolution>, Error> {
        if self.builder.current_key().is_none() {
            return Err(Error::StreamExhaustedEarly);
        }
        let t = self.last_t.unwrap_or_default();
        self.close_epoch(t, None)
    }

    /// Structural snapshot of the estimation graph (debug artifact)
    pub fn export_graph(&self) -> GraphExport {
        self.estimator.export()
    }

    /// Read access to the estimation backend
    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    fn close_epoch(
        &mut self,
        t: Epoch,
        next_key: Option<u32>,
    ) -> Result<Option<EpochSolution>, Error> {
        let current = match self.builder.current_key() {
            Some(current) => current,
            None => return Ok(None),
        };

        // random walk transition, from the second epoch onward
        if let Some(prev) = self.prev_key {
            self.builder.push_factor(Factor::nav_transition(
                prev,
                current,
                NavState::zero(),
                self.process_noise,
            ));
        }

        let batch = self.builder.take_batch();

        if let Err(divergence) = self.estimator.update(batch) {
            error!(
                "{}: {} - last good estimate: {}",
                t, divergence, self.prior_state
            );
            return Err(divergence);
        }

        let estimate = self.estimator.estimate();

        let state = estimate
            .nav_state(&current)
            .copied()
            .ok_or(Error::UnresolvedEpoch(current.0))?;

        self.prior_state = state;
        self.prev_key = Some(current);

        let ecef_m = self.nominal_ecef_m - state.position_offset_m();

        let enu_m = if self.cfg.print_enu {
            Some(ecef2enu(&ecef_m, &self.nominal_ecef_m))
        } else {
            None
        };

        let ambiguities = self
            .builder
            .active()
            .iter()
            .unique()
            .filter_map(|(sv, bias)| estimate.bias_m(bias).map(|value| (*sv, value)))
            .collect::<Vec<_>>();

        self.builder.clear_active();

        if let Some(next) = next_key {
            if next > current.0 {
                self.builder.begin_epoch(NavKey(next), self.prior_state);
            } else {
                warn!(
                    "{}: out of order epoch key {} after {}, not opened",
                    t, next, current
                );
            }
        }

        info!("{}: epoch {} closed: {}", t, current, state);

        Ok(Some(EpochSolution {
            t,
            epoch_key: current.0,
            ecef_m,
            enu_m,
            ambiguities,
        }))
    }
}
