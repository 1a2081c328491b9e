// Ignore this lint otherwise many warnings are generated for common mathematical notation
#![allow(non_snake_case)]

use std::thread;
use std::time::{Duration, Instant};

use estimator::{MheConfig, MheHandler, MheProblem};

use dynamics_model::{DynamicsModel, SimpleDrone};
use lm_solver::SolverConfig;
use prelude::nalgebra::Vector4;
use prelude::*;

fn test_config(h: usize) -> MheConfig {
    MheConfig {
        h,
        dt: 0.02,
        C_o: vec![1.0; 4],
        C_s: vec![1.0; 4],
        C_p: vec![0.01; 4],
        p_prior: None,
        p_lb: None,
        p_ub: None,
        obs_loss_s: 0.0,
        state_loss_s: 0.0,
        track_p_prior: true,
        solver: SolverConfig::default(),
    }
}

fn wait_for_ts(mhe: &MheHandler<SimpleDrone>, ts: i64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while mhe.solution_ts() < ts {
        assert!(
            Instant::now() < deadline,
            "estimator never reached ts {}",
            ts
        );
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn uninformative_data_converges_to_the_priors() {
    // zero observations and inputs for ten requests: the only active pull on
    // the parameters is the prior, and the states settle on zero
    let config = test_config(10);
    let mut problem = MheProblem::new(SimpleDrone, &config);
    let p_prior = problem.param_prior();

    let zero_o = [Vector4::zeros()];
    let zero_u = [Vector4::zeros()];
    for _ in 0..10 {
        let last_p = problem.params();
        problem.advance(1, &zero_o, &zero_u, &last_p);
        problem.solve();
    }

    assert!(problem.latest_state().norm() < 1e-6);
    assert!((problem.params() - p_prior).norm() < 1e-6);
}

#[test]
fn recovers_state_and_parameters_from_a_clean_trajectory() {
    let config = test_config(10);
    let dt = config.dt;
    let model = SimpleDrone;
    let p_true = Vector4::new(1.5, 0.8, 1.2, 0.1);

    let mut problem = MheProblem::new(model.clone(), &config);

    // inputs exciting every channel
    let input = |t: i64| {
        let w = 0.15 * t as float;
        Vector4::new(
            0.4 * w.sin(),
            0.5 * w.cos(),
            0.3 * (w * 0.7).sin(),
            0.6 * (w * 1.3).cos(),
        )
    };

    let mut s_true = Vector4::zeros();
    for t in 0..80 {
        let u = input(t);
        // an observation pairs with the input that produced it: the plant is
        // stepped with the same discretisation the estimator assumes, then
        // observed
        s_true = model.step(dt, &s_true, &u, &p_true);

        let o = [s_true.clone()];
        let uu = [u.clone()];
        let last_p = problem.params();
        problem.advance(1, &o, &uu, &last_p);
        problem.solve();
    }

    let p_est = problem.params();
    assert!(
        (p_est - p_true).abs().max() < 5e-3,
        "parameters not recovered: {:?}",
        problem.params().iter().collect::<Vec<_>>()
    );
}

#[test]
fn desync_resynchronises_without_corrupting_the_window() {
    let config = test_config(6);
    let mut mhe = MheHandler::new(SimpleDrone, &config);
    mhe.start();

    let o = Vector4::new(0.1, 0.0, 0.0, 0.0);
    let u = Vector4::zeros();

    mhe.post_request(0, &o, &u);
    wait_for_ts(&mhe, 0);
    let (_, s_before, _) = mhe.get_estimate();

    // jump the timestep by 3 while posting a single sample: the handler
    // must not crash, must fast-forward, and must keep the last solution
    mhe.post_request(3, &o, &u);
    wait_for_ts(&mhe, 3);
    let (ts, s_after, p_after) = mhe.get_estimate();
    assert_eq!(ts, 3);
    assert_eq!(s_after, s_before);
    assert!(p_after.iter().all(|e| e.is_finite()));

    // the next well-formed request solves normally
    mhe.post_request(4, &o, &u);
    wait_for_ts(&mhe, 4);
    let (ts, s_final, _) = mhe.get_estimate();
    assert_eq!(ts, 4);
    assert!(s_final.iter().all(|e| e.is_finite()));

    mhe.end();
}

#[test]
fn non_finite_observations_skip_the_cycle() {
    let config = test_config(6);
    let mut mhe = MheHandler::new(SimpleDrone, &config);
    mhe.start();

    let good = Vector4::new(0.2, -0.1, 0.3, 0.0);
    let u = Vector4::zeros();

    mhe.post_request(0, &good, &u);
    wait_for_ts(&mhe, 0);
    let (_, s_before, _) = mhe.get_estimate();

    let bad = Vector4::new(float::NAN, 0.0, 0.0, 0.0);
    mhe.post_request(1, &bad, &u);
    wait_for_ts(&mhe, 1);
    let (ts, s_after, _) = mhe.get_estimate();
    assert_eq!(ts, 1);
    // the stale solution stays published, nothing went non-finite
    assert_eq!(s_after, s_before);

    mhe.post_request(2, &good, &u);
    wait_for_ts(&mhe, 2);
    let (_, s_final, _) = mhe.get_estimate();
    assert!(s_final.iter().all(|e| e.is_finite()));

    mhe.end();
}

#[test]
fn solution_timestep_never_exceeds_the_request_timestep() {
    let config = test_config(6);
    let mut mhe = MheHandler::new(SimpleDrone, &config);
    mhe.start();

    let u = Vector4::zeros();
    let mut posted = -1;
    for t in 0..30 {
        let o = Vector4::new(0.01 * t as float, 0.0, 0.0, 0.0);
        mhe.post_request(t, &o, &u);
        posted = t;
        assert!(mhe.solution_ts() <= posted);
    }
    wait_for_ts(&mhe, posted);
    assert_eq!(mhe.solution_ts(), posted);

    mhe.end();
}

#[test]
fn restart_cycles_reset_the_window() {
    let config = test_config(6);
    let mut mhe = MheHandler::new(SimpleDrone, &config);

    let o = Vector4::new(0.5, 0.5, 0.5, 0.0);
    let u = Vector4::zeros();

    mhe.start();
    for t in 0..8 {
        mhe.post_request(t, &o, &u);
    }
    wait_for_ts(&mhe, 7);
    mhe.end();

    mhe.reset();
    let seed = Vector4::new(2.0, 2.0, 2.0, 0.1);
    mhe.set_params(&seed);
    let (ts, s, p) = mhe.get_estimate();
    assert_eq!(ts, -1);
    assert_eq!(s, Vector4::zeros());
    assert_eq!(p, seed);

    // a second trial runs from scratch
    mhe.start();
    mhe.post_request(0, &o, &u);
    wait_for_ts(&mhe, 0);
    mhe.end();
}
