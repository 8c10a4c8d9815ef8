//! Per epoch solutions and reporting
use nalgebra::Vector3;

use crate::{
    cfg::Config,
    prelude::{Epoch, SV},
};

/// [EpochSolution] is the estimate retrieved at one epoch boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSolution {
    /// Sampling [Epoch] of the closing observation
    pub t: Epoch,
    /// Epoch key
    pub epoch_key: u32,
    /// Resolved receiver position, ECEF (m): nominal minus offset
    pub ecef_m: Vector3<f64>,
    /// Resolved position as East, North, Up offset from the
    /// nominal position (m), when ENU reporting is enabled
    pub enu_m: Option<Vector3<f64>>,
    /// Ambiguity value (m) per satellite active this epoch
    pub ambiguities: Vec<(SV, f64)>,
}

/// [Reporter] renders [EpochSolution]s on the channels the
/// configuration enables. Line formats:
/// `xyz <t> <x> <y> <z>`, `enu <t> <e> <n> <u>`,
/// `gps <t> <amb> <amb> ...`.
#[derive(Debug, Clone)]
pub struct Reporter {
    print_ecef: bool,
    print_enu: bool,
    print_amb: bool,
}

impl Reporter {
    pub fn new(cfg: &Config) -> Self {
        Self {
            print_ecef: cfg.print_ecef,
            print_enu: cfg.print_enu,
            print_amb: cfg.print_amb,
        }
    }

    /// Formats one [EpochSolution], one line per enabled channel.
    pub fn format(&self, solution: &EpochSolution) -> String {
        let mut out = String::with_capacity(128);
        if self.print_ecef {
            out.push_str(&format!(
                "xyz {} {:.4} {:.4} {:.4}\n",
                solution.t, solution.ecef_m[0], solution.ecef_m[1], solution.ecef_m[2],
            ));
        }
        if self.print_enu {
            if let Some(enu) = solution.enu_m {
                out.push_str(&format!(
                    "enu {} {:.4} {:.4} {:.4}\n",
                    solution.t, enu[0], enu[1], enu[2],
                ));
            }
        }
        if self.print_amb && !solution.ambiguities.is_empty() {
            out.push_str(&format!("gps {}", solution.t));
            for (_, ambiguity) in &solution.ambiguities {
                out.push_str(&format!(" {:.4}", ambiguity));
            }
            out.push('\n');
        }
        out
    }
}
