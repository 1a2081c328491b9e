use log::{debug, warn};

use dynamics_model::DynamicsModel;
use handler::{Handler, Outcome};
use prelude::*;

use crate::{MpcConfig, MpcProblem};

/// One control request. Unlike the estimator, only the latest request
/// matters: a newer one fully replaces anything still pending.
pub struct MpcRequest<M: DynamicsModel>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    pub data: Option<MpcRequestData<M>>,
}

pub struct MpcRequestData<M: DynamicsModel>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    /// Predicted state at the timestep the plan will start from.
    pub s0: Vector<M::NS>,
    /// Last applied action, anchoring the smoothness cost.
    pub u_prev: Vector<M::NI>,
    pub target: Vector<M::NS>,
    /// Current parameter estimate.
    pub p: Vector<M::NP>,
}

impl<M: DynamicsModel> Default for MpcRequest<M>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    fn default() -> MpcRequest<M> {
        MpcRequest { data: None }
    }
}

/// Published control sequence.
#[derive(Clone)]
pub struct MpcPlan<M: DynamicsModel>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    pub u: Vec<Vector<M::NI>>,
}

/// Non-blocking front end of the controller.
pub struct MpcHandler<M: DynamicsModel>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    inner: Handler<MpcRequest<M>, MpcPlan<M>, MpcProblem<M>>,
    h: usize,
    lag_tau: float,
    u_delay: usize,
}

impl<M: DynamicsModel> MpcHandler<M>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
    Owned<float, M::NS>: Send,
    Owned<float, M::NI>: Send,
    Owned<float, M::NO>: Send,
    Owned<float, M::NP>: Send,
{
    pub fn new(model: M, config: &MpcConfig) -> MpcHandler<M> {
        let problem = MpcProblem::new(model, config);
        MpcHandler {
            h: config.h,
            lag_tau: config.lag_tau,
            u_delay: config.u_delay,
            inner: Handler::new(problem, MpcPlan { u: Vec::new() }),
        }
    }

    /// Spawns the control worker. A no-op when already running.
    pub fn start(&mut self) {
        self.inner.start(move |problem, ts, rqst, sol_ts, _last| {
            let data = match rqst.data {
                Some(data) => data,
                None => {
                    warn!("empty mpc request at ts {}", ts);
                    return Outcome::Skipped;
                }
            };
            if !finite(&data) {
                warn!("non-finite mpc request at ts {}, skipping cycle", ts);
                return Outcome::Skipped;
            }

            let gap = (ts - sol_ts) as usize;
            problem.shift_u(gap);
            problem.set_request(data.s0, data.u_prev, data.target, data.p);
            let summary = problem.solve();
            debug!(
                "mpc ts {} solved in {:.2} ms: {} iterations, cost {:.3e} -> {:.3e} ({:?})",
                ts,
                summary.solve_time * 1e3,
                summary.iterations,
                summary.initial_cost,
                summary.final_cost,
                summary.termination
            );

            Outcome::Solved(MpcPlan {
                u: problem.u_seq().to_vec(),
            })
        });
    }

    /// Stops the worker; already-stopped handlers ignore the call.
    pub fn end(&mut self) {
        self.inner.end();
    }

    /// Clears the plan and both timestep counters. Only valid while stopped.
    pub fn reset(&mut self) {
        self.inner.reset();
        if let Some(problem) = self.inner.problem_mut() {
            problem.zero();
        }
        self.inner.set_solution(MpcPlan { u: Vec::new() });
    }

    /// Replaces the pending request with this tick's data.
    pub fn post_request(
        &self,
        ts: i64,
        s0: &Vector<M::NS>,
        u_prev: &Vector<M::NI>,
        target: &Vector<M::NS>,
        p: &Vector<M::NP>,
    ) {
        self.inner.post_request(ts, |rqst| {
            rqst.data = Some(MpcRequestData {
                s0: s0.clone(),
                u_prev: u_prev.clone(),
                target: target.clone(),
                p: p.clone(),
            });
        });
    }

    /// The action to apply at timestep `ts`, compensating for solution lag:
    /// the plan is indexed by how far `ts` has run ahead of the solve, and
    /// attenuated so a stale open-loop plan is not applied at full
    /// authority.
    pub fn u_vector(&self, ts: i64) -> Vector<M::NI> {
        let (sol_ts, plan) = self.inner.solution();
        plan_action(&plan.u, sol_ts, ts, self.lag_tau)
    }

    pub fn u_delay(&self) -> usize {
        self.u_delay
    }

    pub fn h(&self) -> usize {
        self.h
    }

    pub fn solution_ts(&self) -> i64 {
        self.inner.solution_ts()
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }
}

/// Lag-compensated plan lookup: `idx = ts - sol_ts` selects the planned
/// action, clamped to the first action when the solution is ahead and to the
/// last when the horizon is exhausted, with `exp(-idx / tau)` attenuation
/// for `idx > 0`.
pub fn plan_action<D: DimName>(
    plan: &[Vector<D>],
    sol_ts: i64,
    ts: i64,
    lag_tau: float,
) -> Vector<D>
where
    DefaultAllocator: Allocator<D>,
{
    if plan.is_empty() {
        return Vector::<D>::zeros();
    }

    let idx = ts - sol_ts;
    let clamped = min(max(idx, 0) as usize, plan.len() - 1);
    let attenuation = if idx <= 0 || lag_tau <= 0.0 {
        1.0
    } else {
        (-(idx as float) / lag_tau).exp()
    };

    &plan[clamped] * attenuation
}

fn finite<M: DynamicsModel>(data: &MpcRequestData<M>) -> bool
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    data.s0.iter().all(|e| e.is_finite())
        && data.u_prev.iter().all(|e| e.is_finite())
        && data.target.iter().all(|e| e.is_finite())
        && data.p.iter().all(|e| e.is_finite())
}
