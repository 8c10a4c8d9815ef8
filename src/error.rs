use thiserror::Error;

use crate::prelude::{Key, SV};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Satellite or nominal coordinates carry NaN or infinite components.
    /// The observation is rejected without touching the arc records.
    #[error("non finite position vector for {0}")]
    NonFinitePosition(SV),

    /// Pseudorange, phase or geometric range is NaN or infinite.
    #[error("non finite measurement for {0}")]
    NonFiniteMeasurement(SV),

    /// Noise model construction requires strictly positive finite sigmas.
    #[error("invalid noise model: sigmas must be positive")]
    InvalidNoise,

    /// Measurement weighting requires a strictly positive base variance.
    #[error("invalid base variance")]
    InvalidVariance,

    /// Satellite and receiver positions coincide: no line of sight,
    /// no elevation angle. Both factors of this observation are skipped.
    #[error("degenerate geometry for {0}")]
    DegenerateGeometry(SV),

    /// The estimator failed to converge on the submitted graph.
    /// Fatal: the run terminates after reporting the last good estimate.
    #[error("solver diverged at epoch {0}")]
    SolverDivergence(u32),

    /// A factor references a variable the estimator has never been given.
    #[error("factor references unknown variable {0}")]
    UnknownVariable(Key),

    /// The observation stream ended before a single epoch completed:
    /// no estimate was ever produced.
    #[error("stream exhausted before first epoch boundary")]
    StreamExhaustedEarly,

    /// Estimate retrieval for an epoch that was never submitted.
    #[error("no state resolved for epoch {0}")]
    UnresolvedEpoch(u32),
}

impl Error {
    /// True for per-observation conditions that are logged and skipped
    /// without unwinding the processing loop.
    pub fn is_observation_rejection(&self) -> bool {
        matches!(
            self,
            Self::NonFinitePosition(_)
                | Self::NonFiniteMeasurement(_)
                | Self::DegenerateGeometry(_)
        )
    }
}
