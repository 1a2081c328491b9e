// Ignore this lint otherwise many warnings are generated for common mathematical notation
#![allow(non_snake_case)]

//! Closed-loop simulation: a fixed-rate control loop drives the simulated
//! plant through the asynchronous estimation and control handlers, exactly
//! as the real-time path does against the motion-capture feed.

use std::collections::VecDeque;
use std::env;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use controller::{MpcConfig, MpcHandler};
use dynamics_model::{DriftDrone, DynamicsModel, InertiaDrone, SimpleDrone};
use estimator::{MheConfig, MheHandler};
use prelude::*;

mod config;
mod logger;
mod sim_model;

use config::SimConfig;
use logger::Logger;
use sim_model::SimModel;

fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let sim_path = args.next().unwrap_or_else(|| "simulator.toml".to_string());
    let config = SimConfig::load(&sim_path);

    match config.model.as_str() {
        "simple" => run::<SimpleDrone>(&config),
        "drift" => run::<DriftDrone>(&config),
        "inertia" => run::<InertiaDrone>(&config),
        other => panic!("unknown model '{}'", other),
    }
}

fn run<M: DynamicsModel>(config: &SimConfig)
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
    Owned<float, M::NS>: Send,
    Owned<float, M::NI>: Send,
    Owned<float, M::NO>: Send,
    Owned<float, M::NP>: Send,
{
    let model = M::new();
    info!("simulating model '{}'", M::name());

    let mhe_config = MheConfig::load(&config.mhe_config);
    let mpc_config = MpcConfig::load(&config.mpc_config);
    if mhe_config.dt != config.dt || mpc_config.dt != config.dt {
        warn!(
            "timestep mismatch: sim {} mhe {} mpc {}",
            config.dt, mhe_config.dt, mpc_config.dt
        );
    }
    let u_delay = mpc_config.u_delay;

    let mut sim = SimModel::new(model.clone(), config);
    let mut mhe = MheHandler::new(model.clone(), &mhe_config);
    let mut mpc = MpcHandler::new(model.clone(), &mpc_config);

    let dt_duration = Duration::from_secs_f64(config.dt);

    for sim_i in 0..config.N_sim {
        let mut logger = match &config.log_dir {
            Some(dir) => Logger::create(&format!("{}/{:02}.log", dir, sim_i + 1)),
            None => Logger::disabled(),
        };

        // random target in the observed subspace, velocities at rest
        let mut target = Vector::<M::NS>::zeros();
        for i in 0..M::NO::USIZE {
            target[i] = config.target_dist * (2.0 * rand::random::<float>() - 1.0);
        }

        // the controller starts from a perturbed guess of the true
        // parameters and has to recover them through the estimator
        let mut mpc_p = &sim.params + sim.random_params_disturbance() * config.p_disturbance;
        for i in 0..M::NP::USIZE {
            mpc_p[i] = min(max(mpc_p[i], sim.p_lb[i]), sim.p_ub[i]);
        }

        mhe.reset();
        mpc.reset();
        mpc.start();
        mhe.set_params(&mpc_p);
        mhe.start();

        let mut obs = sim.reset();
        let mut u_buffer: VecDeque<Vector<M::NI>> = VecDeque::new();

        logger.record("delay", 0, [sim.u_delay() as float]);
        logger.record("params", 0, sim.params.iter().cloned());
        logger.record("target", 0, target.iter().cloned());

        let mut reached = false;
        for t in 0..config.T_max {
            let step_start = Instant::now();

            let (_est_ts, s_est, p_est) = mhe.get_estimate();
            let input = mpc.u_vector(t);

            logger.record("pos", t, obs.iter().cloned());
            logger.record("input", t, input.iter().cloned());
            logger.record("est", t, s_est.iter().cloned());
            logger.record("param", t, p_est.iter().cloned());

            u_buffer.push_back(input.clone());
            while u_buffer.len() > u_delay + 1 {
                u_buffer.pop_front();
            }

            // compensate actuation delay by rolling the estimate through the
            // in-flight inputs before asking for a plan
            let s_pred = model.predict_state(&s_est, u_buffer.iter().cloned(), &p_est, config.dt);
            mpc.post_request(t + 1, &s_pred, u_buffer.back().unwrap(), &target, &p_est);
            mhe.post_request(t, &obs, u_buffer.front().unwrap());

            obs = sim.step(&input);

            let max_diff = (&sim.state - &target).abs().max();
            if max_diff <= config.target_threshold {
                info!("trial {}: target reached at ts {}", sim_i + 1, t);
                reached = true;
                break;
            }

            if config.real_time {
                let step_elapsed = step_start.elapsed();
                match dt_duration.checked_sub(step_elapsed) {
                    Some(remaining) => thread::sleep(remaining),
                    None => debug!(
                        "step missed deadline, took {:.1} ms",
                        step_elapsed.as_secs_f64() * 1e3
                    ),
                }
            }
        }

        mhe.end();
        mpc.end();

        let (_, _, p_final) = mhe.get_estimate();
        if !reached {
            info!("trial {}: timed out after {} steps", sim_i + 1, config.T_max);
        }
        info!("start params: {:?}", mpc_p.iter().collect::<Vec<_>>());
        info!("true params:  {:?}", sim.params.iter().collect::<Vec<_>>());
        info!("mhe params:   {:?}", p_final.iter().collect::<Vec<_>>());

        logger.close();
    }
}
