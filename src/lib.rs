#![doc = include_str!("../README.md")]
#![cfg_attr(docrs, feature(doc_cfg))]

extern crate gnss_rs as gnss;

mod arc;
mod batch;
mod cfg;
mod error;
mod estimator;
mod frames;
mod solutions;
mod solver;
mod state;
mod weighting;

#[cfg(test)]
mod tests;

// prelude
pub mod prelude {
    pub use crate::arc::{ArcEvent, ArcRecord, ArcTracker};
    pub use crate::batch::{BatchBuilder, EpochBatch, IngestOutcome, NewValue, Observation};
    pub use crate::cfg::{Config, EstimatorOpts};
    pub use crate::error::Error;
    pub use crate::estimator::{Estimate, GaussNewton, GraphExport, IncrementalEstimator};
    pub use crate::solutions::{EpochSolution, Reporter};
    pub use crate::solver::Solver;
    pub use crate::state::{
        BiasKey, BiasNoise, Factor, Key, NavKey, NavNoise, NavState, BIAS_STATE_DIM,
        NAV_STATE_DIM,
    };
    pub use crate::weighting::{elevation_deg, elevation_scaled_variance, tropo_map};
    // re-export
    pub use gnss::prelude::{Constellation, SV};
    pub use hifitime::{Duration, Epoch, TimeScale};
    pub use nalgebra::Vector3;
}

// pub export
pub use error::Error;
