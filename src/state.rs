//! State model: variable keys, state vectors, noise models, factors
use nalgebra::{Vector3, Vector5};

use crate::{error::Error, prelude::SV};

/// Navigation state dimension: (dx, dy, dz, tropo, clock)
pub const NAV_STATE_DIM: usize = 5;

/// Phase bias state dimension
pub const BIAS_STATE_DIM: usize = 1;

/// [NavKey] identifies one navigation state, one per processed epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NavKey(pub u32);

impl std::fmt::Display for NavKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// [BiasKey] identifies one phase bias state, one per (satellite, arc).
/// Allocation is globally unique and monotonically increasing:
/// a retired key is never reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BiasKey(pub u64);

impl std::fmt::Display for BiasKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Mixed variable reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Nav(NavKey),
    Bias(BiasKey),
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nav(key) => write!(f, "{}", key),
            Self::Bias(key) => write!(f, "{}", key),
        }
    }
}

/// [NavState] is the 5 dimensional navigation state: position offset
/// from the nominal ECEF position (m), troposphere delay (m) and
/// receiver clock bias (m). Immutable value: the estimator publishes
/// refined copies, it never mutates one in place.
///
/// Sign convention (position): resolved ECEF = nominal − offset.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct NavState {
    inner: Vector5<f64>,
}

impl NavState {
    /// All zeros [NavState], the initial guess of a fresh epoch.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_vector(inner: Vector5<f64>) -> Self {
        Self { inner }
    }

    pub fn vector(&self) -> Vector5<f64> {
        self.inner
    }

    /// Position offset from the nominal position (m)
    pub fn position_offset_m(&self) -> Vector3<f64> {
        Vector3::new(self.inner[0], self.inner[1], self.inner[2])
    }

    /// Troposphere delay (m)
    pub fn tropo_delay_m(&self) -> f64 {
        self.inner[3]
    }

    /// Receiver clock bias (m)
    pub fn clock_bias_m(&self) -> f64 {
        self.inner[4]
    }
}

impl std::fmt::Display for NavState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "dx=({:.3}, {:.3}, {:.3})m tropo={:.3}m clock={:.3}m",
            self.inner[0], self.inner[1], self.inner[2], self.inner[3], self.inner[4],
        )
    }
}

/// Diagonal noise model over the navigation state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavNoise {
    variances: Vector5<f64>,
}

impl NavNoise {
    /// Builds [NavNoise] from standard deviations, one per component.
    /// [Error::InvalidNoise] unless all are finite and strictly positive.
    pub fn from_sigmas(sigmas: Vector5<f64>) -> Result<Self, Error> {
        if sigmas.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(Error::InvalidNoise);
        }
        Ok(Self {
            variances: sigmas.component_mul(&sigmas),
        })
    }

    /// Per-component variances (diagonal of the covariance)
    pub fn variances(&self) -> Vector5<f64> {
        self.variances
    }
}

/// Scalar noise model over a phase bias state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiasNoise {
    variance: f64,
}

impl BiasNoise {
    pub fn from_sigma(sigma: f64) -> Result<Self, Error> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(Error::InvalidNoise);
        }
        Ok(Self {
            variance: sigma * sigma,
        })
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }
}

fn finite_vector3(sv: SV, vec: &Vector3<f64>) -> Result<(), Error> {
    if vec.iter().any(|value| !value.is_finite()) {
        return Err(Error::NonFinitePosition(sv));
    }
    Ok(())
}

/// [Factor] is one constraint of the estimation graph. Factors are
/// write once: appended to an [crate::batch::EpochBatch], submitted,
/// never re-read nor mutated by this crate afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Factor {
    /// Prior constraint on a navigation state
    NavPrior {
        key: NavKey,
        prior: NavState,
        noise: NavNoise,
    },
    /// Prior constraint on a phase bias state
    BiasPrior {
        key: BiasKey,
        prior_m: f64,
        noise: BiasNoise,
    },
    /// Random walk transition between two consecutive navigation states
    NavTransition {
        from: NavKey,
        to: NavKey,
        delta: NavState,
        noise: NavNoise,
    },
    /// Pseudorange measurement constraint
    Pseudorange {
        key: NavKey,
        sv: SV,
        residual_m: f64,
        sat_ecef_m: Vector3<f64>,
        nominal_ecef_m: Vector3<f64>,
        variance_m2: f64,
    },
    /// Carrier phase measurement constraint, tied to the satellite's
    /// currently active ambiguity
    Phase {
        key: NavKey,
        bias: BiasKey,
        sv: SV,
        residual_m: f64,
        sat_ecef_m: Vector3<f64>,
        nominal_ecef_m: Vector3<f64>,
        variance_m2: f64,
    },
}

impl Factor {
    pub fn nav_prior(key: NavKey, prior: NavState, noise: NavNoise) -> Self {
        Self::NavPrior { key, prior, noise }
    }

    pub fn bias_prior(key: BiasKey, prior_m: f64, noise: BiasNoise) -> Result<Self, Error> {
        if !prior_m.is_finite() {
            return Err(Error::InvalidNoise);
        }
        Ok(Self::BiasPrior {
            key,
            prior_m,
            noise,
        })
    }

    pub fn nav_transition(from: NavKey, to: NavKey, delta: NavState, noise: NavNoise) -> Self {
        Self::NavTransition {
            from,
            to,
            delta,
            noise,
        }
    }

    /// Builds a pseudorange measurement [Factor].
    /// Validates finite geometry and positive variance.
    pub fn pseudorange(
        key: NavKey,
        sv: SV,
        residual_m: f64,
        sat_ecef_m: Vector3<f64>,
        nominal_ecef_m: Vector3<f64>,
        variance_m2: f64,
    ) -> Result<Self, Error> {
        finite_vector3(sv, &sat_ecef_m)?;
        finite_vector3(sv, &nominal_ecef_m)?;
        if !residual_m.is_finite() {
            return Err(Error::NonFiniteMeasurement(sv));
        }
        if !variance_m2.is_finite() || variance_m2 <= 0.0 {
            return Err(Error::InvalidVariance);
        }
        Ok(Self::Pseudorange {
            key,
            sv,
            residual_m,
            sat_ecef_m,
            nominal_ecef_m,
            variance_m2,
        })
    }

    /// Builds a carrier phase measurement [Factor].
    /// Validates finite geometry and positive variance.
    pub fn phase(
        key: NavKey,
        bias: BiasKey,
        sv: SV,
        residual_m: f64,
        sat_ecef_m: Vector3<f64>,
        nominal_ecef_m: Vector3<f64>,
        variance_m2: f64,
    ) -> Result<Self, Error> {
        finite_vector3(sv, &sat_ecef_m)?;
        finite_vector3(sv, &nominal_ecef_m)?;
        if !residual_m.is_finite() {
            return Err(Error::NonFiniteMeasurement(sv));
        }
        if !variance_m2.is_finite() || variance_m2 <= 0.0 {
            return Err(Error::InvalidVariance);
        }
        Ok(Self::Phase {
            key,
            bias,
            sv,
            residual_m,
            sat_ecef_m,
            nominal_ecef_m,
            variance_m2,
        })
    }

    /// Variables this [Factor] constrains
    pub fn keys(&self) -> Vec<Key> {
        match self {
            Self::NavPrior { key, .. } => vec![Key::Nav(*key)],
            Self::BiasPrior { key, .. } => vec![Key::Bias(*key)],
            Self::NavTransition { from, to, .. } => vec![Key::Nav(*from), Key::Nav(*to)],
            Self::Pseudorange { key, .. } => vec![Key::Nav(*key)],
            Self::Phase { key, bias, .. } => vec![Key::Nav(*key), Key::Bias(*bias)],
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::NavPrior { .. } => "nav-prior",
            Self::BiasPrior { .. } => "bias-prior",
            Self::NavTransition { .. } => "transition",
            Self::Pseudorange { .. } => "pseudorange",
            Self::Phase { .. } => "phase",
        }
    }
}

#[cfg(test)]
mod test {
    use super::{BiasNoise, Factor, NavKey, NavNoise};
    use crate::prelude::SV;
    use nalgebra::{Vector3, Vector5};

    #[test]
    fn noise_model_validation() {
        assert!(NavNoise::from_sigmas(Vector5::new(3.0, 3.0, 3.0, 1E3, 1E-1)).is_ok());
        assert!(NavNoise::from_sigmas(Vector5::new(3.0, 0.0, 3.0, 1E3, 1E-1)).is_err());
        assert!(NavNoise::from_sigmas(Vector5::new(3.0, -1.0, 3.0, 1E3, 1E-1)).is_err());
        assert!(BiasNoise::from_sigma(1.0).is_ok());
        assert!(BiasNoise::from_sigma(f64::NAN).is_err());
    }

    #[test]
    fn pseudorange_factor_validation() {
        let nominal = Vector3::new(6_378_137.0, 0.0, 0.0);
        let sat = nominal * 4.0;
        assert!(
            Factor::pseudorange(NavKey(0), SV::default(), 1.0, sat, nominal, 6.25).is_ok()
        );
        assert!(Factor::pseudorange(
            NavKey(0),
            SV::default(),
            1.0,
            Vector3::new(f64::NAN, 0.0, 0.0),
            nominal,
            6.25
        )
        .is_err());
        assert!(
            Factor::pseudorange(NavKey(0), SV::default(), f64::INFINITY, sat, nominal, 6.25)
                .is_err()
        );
        assert!(Factor::pseudorange(NavKey(0), SV::default(), 1.0, sat, nominal, 0.0).is_err());
    }
}
