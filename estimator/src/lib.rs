// Ignore this lint otherwise many warnings are generated for common mathematical notation
#![allow(non_snake_case)]

//! Moving-horizon estimation of vehicle state and dynamics parameters from
//! delayed, noisy position observations.

mod config;
pub use config::MheConfig;

mod horizon;
pub use horizon::HorizonBuffer;

mod mhe;
pub use mhe::MheProblem;

mod mhe_handler;
pub use mhe_handler::{MheEstimate, MheHandler, MheRequest};
