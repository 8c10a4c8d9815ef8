//! Incremental estimation boundary
use std::collections::HashMap;

use crate::{
    batch::EpochBatch,
    error::Error,
    prelude::{BiasKey, Key, NavKey},
    state::NavState,
};

mod gauss_newton;
pub use gauss_newton::GaussNewton;

/// Current best estimate over all variables submitted so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Estimate {
    /// Navigation states per epoch key
    pub nav: HashMap<NavKey, NavState>,
    /// Phase bias value (m) per bias key
    pub bias: HashMap<BiasKey, f64>,
}

impl Estimate {
    pub fn nav_state(&self, key: &NavKey) -> Option<&NavState> {
        self.nav.get(key)
    }

    pub fn bias_m(&self, key: &BiasKey) -> Option<f64> {
        self.bias.get(key).copied()
    }
}

/// Structural snapshot of the factor graph, a debugging artifact
/// produced once at run end.
#[derive(Debug, Clone, Default)]
pub struct GraphExport {
    /// All variables, in creation order
    pub variables: Vec<Key>,
    /// One (kind, constrained variables) entry per factor,
    /// in submission order
    pub factors: Vec<(&'static str, Vec<Key>)>,
}

impl std::fmt::Display for GraphExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "graph: {} variables, {} factors",
            self.variables.len(),
            self.factors.len()
        )?;
        for (label, keys) in &self.factors {
            let keys = keys
                .iter()
                .map(|key| key.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "  {}({})", label, keys)?;
        }
        Ok(())
    }
}

/// [IncrementalEstimator] abstracts the nonlinear estimation backend
/// behind its single capability: absorb new variables and constraints,
/// publish a refined estimate. [GaussNewton] is the built in drop-in;
/// an iSAM style incremental solver plugs in behind the same seam.
///
/// Calls are blocking and atomic: an [IncrementalEstimator::update]
/// fully applies the batch before returning, and no ingestion runs
/// concurrently with it. There is no rollback: a failed update is
/// fatal to the run.
pub trait IncrementalEstimator {
    /// Absorbs one [EpochBatch]: new (variable, initial value) pairs
    /// and the factors constraining them. [Error::SolverDivergence]
    /// is fatal and propagates.
    fn update(&mut self, batch: EpochBatch) -> Result<(), Error>;

    /// Current best [Estimate] over all variables submitted so far.
    fn estimate(&self) -> Estimate;

    /// Structural [GraphExport], when the backend supports it.
    fn export(&self) -> GraphExport {
        GraphExport::default()
    }
}
