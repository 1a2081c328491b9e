use std::time::Instant;

use log::debug;

use prelude::*;

use crate::{LeastSquaresProblem, LinearSolverKind};

const INITIAL_DAMPING: float = 1e-4;
const DAMPING_DECREASE: float = 3.0;
const DAMPING_INCREASE: float = 10.0;
const MAX_DAMPING: float = 1e12;
const MIN_DIAGONAL: float = 1e-12;
const GRADIENT_TOLERANCE: float = 1e-12;

#[derive(Clone, Copy, Debug)]
pub struct SolverOptions {
    pub max_iterations: u32,
    pub function_tolerance: float,
    /// Wall-clock budget in seconds.
    pub max_solve_time: Option<float>,
    pub linear_solver: LinearSolverKind,
    pub verbose: bool,
}

impl Default for SolverOptions {
    fn default() -> SolverOptions {
        SolverOptions {
            max_iterations: 50,
            function_tolerance: 1e-8,
            max_solve_time: None,
            linear_solver: LinearSolverKind::Cholesky,
            verbose: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    Converged,
    MaxIterations,
    TimeBudget,
    Stalled,
    NumericalFailure,
}

#[derive(Clone, Copy, Debug)]
pub struct SolverSummary {
    pub iterations: u32,
    pub initial_cost: float,
    pub final_cost: float,
    pub termination: Termination,
    pub solve_time: float,
}

/// Levenberg-Marquardt over a dense `LeastSquaresProblem`, with optional box
/// constraints applied by projecting every candidate step.
///
/// Budget exhaustion is not an error: the best iterate found so far is left
/// in `x` and reported in the summary.
pub struct LmSolver {
    pub options: SolverOptions,
}

impl LmSolver {
    pub fn new(options: SolverOptions) -> LmSolver {
        LmSolver { options }
    }

    pub fn solve<P: LeastSquaresProblem>(
        &self,
        problem: &P,
        x: &mut DVector<float>,
        bounds: Option<(&DVector<float>, &DVector<float>)>,
    ) -> SolverSummary {
        let start = Instant::now();

        let nr = problem.num_residuals();
        let nv = problem.num_variables();
        assert_eq!(x.len(), nv, "variable vector length mismatch");

        if let Some((lb, ub)) = bounds {
            assert_eq!(lb.len(), nv, "lower bound length mismatch");
            assert_eq!(ub.len(), nv, "upper bound length mismatch");
            project(x, lb, ub);
        }

        let mut r = DVector::<float>::zeros(nr);
        let mut J = DMatrix::<float>::zeros(nr, nv);
        let mut r_new = DVector::<float>::zeros(nr);
        let mut J_new = DMatrix::<float>::zeros(nr, nv);

        problem.evaluate(x, &mut r, &mut J);
        let mut cost = 0.5 * r.norm_squared();
        let initial_cost = cost;

        if !cost.is_finite() {
            return SolverSummary {
                iterations: 0,
                initial_cost,
                final_cost: cost,
                termination: Termination::NumericalFailure,
                solve_time: start.elapsed().as_secs_f64(),
            };
        }

        let mut lambda = INITIAL_DAMPING;
        let mut iterations = 0;
        let mut termination = Termination::MaxIterations;

        while iterations < self.options.max_iterations {
            iterations += 1;

            if (J.transpose() * &r).amax() < GRADIENT_TOLERANCE {
                termination = Termination::Converged;
                break;
            }

            let step = match self.compute_step(&r, &J, lambda) {
                Some(step) => step,
                None => {
                    // singular system, retry with heavier damping
                    lambda *= DAMPING_INCREASE;
                    if lambda > MAX_DAMPING {
                        termination = Termination::Stalled;
                        break;
                    }
                    continue;
                }
            };

            let mut x_new = &*x + &step;
            if let Some((lb, ub)) = bounds {
                project(&mut x_new, lb, ub);
            }

            J_new.fill(0.0);
            problem.evaluate(&x_new, &mut r_new, &mut J_new);
            let cost_new = 0.5 * r_new.norm_squared();

            if cost_new.is_finite() && cost_new < cost {
                let relative_decrease = (cost - cost_new) / max(cost, float::MIN_POSITIVE);
                x.copy_from(&x_new);
                r.copy_from(&r_new);
                J.copy_from(&J_new);
                cost = cost_new;
                lambda = max(lambda / DAMPING_DECREASE, 1e-12);

                if self.options.verbose {
                    debug!(
                        "iter {:2}: cost {:.6e} (step accepted, lambda {:.1e})",
                        iterations, cost, lambda
                    );
                }

                if relative_decrease < self.options.function_tolerance {
                    termination = Termination::Converged;
                    break;
                }
            } else {
                lambda *= DAMPING_INCREASE;
                if self.options.verbose {
                    debug!(
                        "iter {:2}: cost {:.6e} (step rejected, lambda {:.1e})",
                        iterations, cost, lambda
                    );
                }
                if lambda > MAX_DAMPING {
                    termination = Termination::Stalled;
                    break;
                }
            }

            if let Some(budget) = self.options.max_solve_time {
                if start.elapsed().as_secs_f64() > budget {
                    termination = Termination::TimeBudget;
                    break;
                }
            }
        }

        SolverSummary {
            iterations,
            initial_cost,
            final_cost: cost,
            termination,
            solve_time: start.elapsed().as_secs_f64(),
        }
    }

    fn compute_step(
        &self,
        r: &DVector<float>,
        J: &DMatrix<float>,
        lambda: float,
    ) -> Option<DVector<float>> {
        // (J^T J + lambda diag(J^T J)) step = -J^T r
        let mut H = J.transpose() * J;
        let g = J.transpose() * r;
        for i in 0..H.nrows() {
            let d = max(H[(i, i)], MIN_DIAGONAL);
            H[(i, i)] = d + lambda * d;
        }

        match self.options.linear_solver {
            LinearSolverKind::Cholesky => H.cholesky().map(|chol| chol.solve(&(-g))),
            LinearSolverKind::Qr => H.col_piv_qr().solve(&(-g)),
        }
    }
}

fn project(x: &mut DVector<float>, lb: &DVector<float>, ub: &DVector<float>) {
    for i in 0..x.len() {
        x[i] = min(max(x[i], lb[i]), ub[i]);
    }
}
