// Ignore this lint otherwise many warnings are generated for common mathematical notation
#![allow(non_snake_case)]

//! Model-predictive control: a short-horizon control sequence driving the
//! predicted state toward a target, solved asynchronously from the real-time
//! loop.

mod config;
pub use config::MpcConfig;

mod mpc;
pub use mpc::{clamp_target, MpcProblem};

mod mpc_handler;
pub use mpc_handler::{plan_action, MpcHandler, MpcPlan, MpcRequest, MpcRequestData};
