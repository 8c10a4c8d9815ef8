use nalgebra::{Vector3, Vector5};

use crate::{
    prelude::{
        BiasKey, BiasNoise, Config, EpochBatch, Error, Factor, GaussNewton,
        IncrementalEstimator, Key, NavKey, NavNoise, NavState,
    },
    tests::{gps, init_logger, nominal_ecef, sat_at},
};

fn test_cfg() -> Config {
    let nominal = nominal_ecef();
    Config::static_ppp((nominal[0], nominal[1], nominal[2]))
}

#[test]
fn prior_only_graph_resolves_to_prior() {
    init_logger();
    let key = NavKey(0);
    let noise = NavNoise::from_sigmas(Vector5::new(3.0, 3.0, 3.0, 1E3, 1E-1)).unwrap();
    let prior = NavState::from_vector(Vector5::new(1.0, -2.0, 3.0, 0.5, 0.1));

    let mut estimator = GaussNewton::new(&test_cfg());
    estimator
        .update(EpochBatch {
            values: vec![crate::prelude::NewValue::Nav(key, NavState::zero())],
            factors: vec![Factor::nav_prior(key, prior, noise)],
        })
        .unwrap();

    let estimate = estimator.estimate();
    let resolved = estimate.nav_state(&key).unwrap();
    assert!((resolved.vector() - prior.vector()).norm() < 1E-6);
}

#[test]
fn bias_prior_resolves() {
    let key = NavKey(0);
    let bias = BiasKey(0);
    let nav_noise = NavNoise::from_sigmas(Vector5::new(1.0, 1.0, 1.0, 1.0, 1.0)).unwrap();
    let bias_noise = BiasNoise::from_sigma(1.0).unwrap();

    let mut estimator = GaussNewton::new(&test_cfg());
    estimator
        .update(EpochBatch {
            values: vec![
                crate::prelude::NewValue::Nav(key, NavState::zero()),
                crate::prelude::NewValue::Bias(bias, 0.0),
            ],
            factors: vec![
                Factor::nav_prior(key, NavState::zero(), nav_noise),
                Factor::bias_prior(bias, 12.5, bias_noise).unwrap(),
            ],
        })
        .unwrap();

    let estimate = estimator.estimate();
    assert!((estimate.bias_m(&bias).unwrap() - 12.5).abs() < 1E-6);
}

#[test]
fn factor_on_unknown_variable_is_rejected() {
    let noise = NavNoise::from_sigmas(Vector5::new(1.0, 1.0, 1.0, 1.0, 1.0)).unwrap();
    let mut estimator = GaussNewton::new(&test_cfg());
    let orphan = NavKey(42);
    let result = estimator.update(EpochBatch {
        values: vec![],
        factors: vec![Factor::nav_prior(orphan, NavState::zero(), noise)],
    });
    assert_eq!(result, Err(Error::UnknownVariable(Key::Nav(orphan))));
}

#[test]
fn pseudorange_factors_recover_position_offset() {
    init_logger();
    let nominal = nominal_ecef();
    let dx_true = Vector3::new(1.5, -2.0, 3.0);

    let mut cfg = test_cfg();
    cfg.pseudorange_variance_m2 = 1E-4;

    let key = NavKey(0);
    let noise = NavNoise::from_sigmas(cfg.prior_sigmas.into()).unwrap();

    let mut factors = vec![Factor::nav_prior(key, NavState::zero(), noise)];
    for (prn, elev, azim) in [
        (1, 80.0, 10.0),
        (2, 60.0, 95.0),
        (3, 55.0, 170.0),
        (4, 45.0, 265.0),
        (5, 40.0, 40.0),
        (6, 35.0, 140.0),
        (7, 30.0, 220.0),
        (8, 25.0, 320.0),
    ] {
        let sat = sat_at(&nominal, elev, azim, 22.0E6);
        let los = sat - nominal;
        let residual = (los / los.norm()).dot(&dx_true);
        factors.push(
            Factor::pseudorange(key, gps(prn), residual, sat, nominal, 1E-4).unwrap(),
        );
    }

    let mut estimator = GaussNewton::new(&cfg);
    estimator
        .update(EpochBatch {
            values: vec![crate::prelude::NewValue::Nav(key, NavState::zero())],
            factors,
        })
        .unwrap();

    let estimate = estimator.estimate();
    let resolved = estimate.nav_state(&key).unwrap();
    let err = (resolved.position_offset_m() - dx_true).norm();
    assert!(err < 1E-2, "position offset error: {} m", err);
}

#[test]
fn export_reflects_graph_structure() {
    let key = NavKey(0);
    let noise = NavNoise::from_sigmas(Vector5::new(1.0, 1.0, 1.0, 1.0, 1.0)).unwrap();
    let nominal = nominal_ecef();
    let sat = sat_at(&nominal, 50.0, 50.0, 22.0E6);

    let mut estimator = GaussNewton::new(&test_cfg());
    estimator
        .update(EpochBatch {
            values: vec![crate::prelude::NewValue::Nav(key, NavState::zero())],
            factors: vec![
                Factor::nav_prior(key, NavState::zero(), noise),
                Factor::pseudorange(key, gps(1), 0.0, sat, nominal, 1.0).unwrap(),
            ],
        })
        .unwrap();

    let export = estimator.export();
    assert_eq!(export.variables, vec![Key::Nav(key)]);
    assert_eq!(export.factors.len(), 2);
    assert_eq!(export.factors[0].0, "nav-prior");
    assert_eq!(export.factors[1].0, "pseudorange");

    let rendered = export.to_string();
    assert!(rendered.contains("1 variables, 2 factors"));
    assert!(rendered.contains("pseudorange(x0)"));
}
