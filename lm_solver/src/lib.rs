// Ignore this lint otherwise many warnings are generated for common mathematical notation
#![allow(non_snake_case)]

//! Dense nonlinear least-squares solving for the sliding-horizon problems.
//!
//! The estimation and control problems only expose residual blocks and
//! variable bounds; everything about the minimisation itself is contained
//! here.

use log::warn;
use serde::Deserialize;

use prelude::*;

mod lm;
pub use lm::{LmSolver, SolverOptions, SolverSummary, Termination};

mod loss;
pub use loss::Loss;

/// A fixed-topology least-squares problem: residuals and their jacobian are
/// written into caller-owned storage of a size that never changes after the
/// problem is built.
pub trait LeastSquaresProblem {
    fn num_residuals(&self) -> usize;

    fn num_variables(&self) -> usize;

    /// Evaluates residuals and the residual jacobian at `x`. `residuals` has
    /// `num_residuals` rows, `jacobian` is `num_residuals x num_variables`
    /// and arrives zeroed.
    fn evaluate(&self, x: &DVector<float>, residuals: &mut DVector<float>, jacobian: &mut DMatrix<float>);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinearSolverKind {
    Cholesky,
    Qr,
}

/// Solver budgets and strategy, deserialised from the `[solver]` table of a
/// problem config.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_iter: u32,
    pub tol: float,
    /// Wall-clock budget in seconds; zero means unlimited.
    pub max_time: float,
    /// Accepted for config compatibility; the dense solver is single
    /// threaded.
    pub threads: u32,
    /// Log every iteration at debug level.
    pub stdout: bool,
    /// "cholesky" or "qr".
    pub linear_solver: String,
}

impl Default for SolverConfig {
    fn default() -> SolverConfig {
        SolverConfig {
            max_iter: 50,
            tol: 1e-8,
            max_time: 0.0,
            threads: 1,
            stdout: false,
            linear_solver: "cholesky".to_string(),
        }
    }
}

impl SolverConfig {
    pub fn to_options(&self) -> SolverOptions {
        if self.threads > 1 {
            warn!("solver_threads = {} requested but the dense solver is single threaded", self.threads);
        }

        let linear_solver = match self.linear_solver.as_str() {
            "cholesky" => LinearSolverKind::Cholesky,
            "qr" => LinearSolverKind::Qr,
            other => panic!("unknown linear solver '{}', expected 'cholesky' or 'qr'", other),
        };

        SolverOptions {
            max_iterations: self.max_iter,
            function_tolerance: self.tol,
            max_solve_time: if self.max_time > 0.0 {
                Some(self.max_time)
            } else {
                None
            },
            linear_solver,
            verbose: self.stdout,
        }
    }
}
