use log::{debug, warn};

use dynamics_model::DynamicsModel;
use handler::{Handler, Outcome};
use prelude::*;

use crate::{MheConfig, MheProblem};

/// Samples accumulated between solves. A burst of ticks while the worker is
/// busy must all reach the window, so the payload is a list rather than a
/// single slot.
pub struct MheRequest<M: DynamicsModel>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    pub o: Vec<Vector<M::NO>>,
    pub u: Vec<Vector<M::NI>>,
}

impl<M: DynamicsModel> Default for MheRequest<M>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    fn default() -> MheRequest<M> {
        MheRequest {
            o: Vec::new(),
            u: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct MheEstimate<M: DynamicsModel>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    pub s: Vector<M::NS>,
    pub p: Vector<M::NP>,
}

/// Non-blocking front end of the estimator: the control loop posts one
/// observation/input pair per tick and reads whatever estimate is currently
/// published.
pub struct MheHandler<M: DynamicsModel>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    inner: Handler<MheRequest<M>, MheEstimate<M>, MheProblem<M>>,
    h: usize,
}

impl<M: DynamicsModel> MheHandler<M>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
    Owned<float, M::NS>: Send,
    Owned<float, M::NI>: Send,
    Owned<float, M::NO>: Send,
    Owned<float, M::NP>: Send,
{
    pub fn new(model: M, config: &MheConfig) -> MheHandler<M> {
        let problem = MheProblem::new(model, config);
        let initial = MheEstimate {
            s: Vector::<M::NS>::zeros(),
            p: problem.params(),
        };
        MheHandler {
            h: config.h,
            inner: Handler::new(problem, initial),
        }
    }

    /// Spawns the estimation worker. A no-op when already running.
    pub fn start(&mut self) {
        let h = self.h as i64;
        self.inner.start(move |problem, ts, rqst, sol_ts, last| {
            let gap = ts - sol_ts;
            let buffered = rqst.o.len();

            if gap != buffered as i64 || rqst.u.len() != buffered {
                // a tick was skipped or duplicated; resynchronise instead of
                // corrupting the window
                warn!(
                    "mhe stream desync at ts {}: gap {} with {} buffered samples",
                    ts, gap, buffered
                );
                return Outcome::Skipped;
            }
            if gap > h - 1 {
                warn!("mhe gap {} exceeds the horizon at ts {}, resynchronising", gap, ts);
                return Outcome::Skipped;
            }
            if !finite(&rqst) {
                warn!("non-finite samples in mhe request at ts {}, skipping cycle", ts);
                return Outcome::Skipped;
            }

            problem.advance(gap as usize, &rqst.o, &rqst.u, &last.p);
            let summary = problem.solve();
            debug!(
                "mhe ts {} solved in {:.2} ms: {} iterations, cost {:.3e} -> {:.3e} ({:?})",
                ts,
                summary.solve_time * 1e3,
                summary.iterations,
                summary.initial_cost,
                summary.final_cost,
                summary.termination
            );

            Outcome::Solved(MheEstimate {
                s: problem.latest_state(),
                p: problem.params(),
            })
        });
    }

    /// Stops the worker; already-stopped handlers ignore the call.
    pub fn end(&mut self) {
        self.inner.end();
    }

    /// Clears the window, both timestep counters and the published estimate.
    /// Only valid while stopped.
    pub fn reset(&mut self) {
        self.inner.reset();
        let initial = self.inner.problem_mut().map(|problem| {
            problem.zero();
            MheEstimate {
                s: Vector::<M::NS>::zeros(),
                p: problem.params(),
            }
        });
        if let Some(initial) = initial {
            self.inner.set_solution(initial);
        }
    }

    /// Appends this tick's observation and (delay-compensated) input to the
    /// pending request.
    pub fn post_request(&self, ts: i64, o: &Vector<M::NO>, u: &Vector<M::NI>) {
        self.inner.post_request(ts, |rqst| {
            rqst.o.push(o.clone());
            rqst.u.push(u.clone());
        });
    }

    /// Latest published `(timestep, state, params)`.
    pub fn get_estimate(&self) -> (i64, Vector<M::NS>, Vector<M::NP>) {
        let (ts, est) = self.inner.solution();
        (ts, est.s, est.p)
    }

    /// Seeds the published parameter estimate, typically before `start` so
    /// the first prior re-anchoring picks it up.
    pub fn set_params(&self, p: &Vector<M::NP>) {
        let (_, mut est) = self.inner.solution();
        est.p = p.clone();
        self.inner.set_solution(est);
    }

    pub fn solution_ts(&self) -> i64 {
        self.inner.solution_ts()
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }
}

fn finite<M: DynamicsModel>(rqst: &MheRequest<M>) -> bool
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    rqst.o.iter().all(|o| o.iter().all(|e| e.is_finite()))
        && rqst.u.iter().all(|u| u.iter().all(|e| e.is_finite()))
}
