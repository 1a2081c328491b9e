use dynamics_model::DynamicsModel;
use lm_solver::{LeastSquaresProblem, LmSolver, SolverSummary};
use prelude::*;

use crate::MpcConfig;

/// Model-predictive control problem.
///
/// The only free variables are the `h` box-bounded control vectors; the
/// predicted trajectory is recomputed by rolling the dynamics forward from
/// the shared `(s0, target, p)` request on every evaluation, so the tracking
/// residual at horizon index `t` couples all control variables up to `t`.
/// The request is overwritten before each solve, never rebuilt.
pub struct MpcProblem<M: DynamicsModel>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    model: M,
    h: usize,
    dt: float,
    C_u: Vector<M::NI>,
    C_s: Vector<M::NS>,
    C_s_end: Vector<M::NS>,
    u_smooth: bool,
    max_target_distance: float,
    s0: Vector<M::NS>,
    target: Vector<M::NS>,
    p: Vector<M::NP>,
    u_prev: Vector<M::NI>,
    u_seq: Vec<Vector<M::NI>>,
    solver: LmSolver,
    lb: DVector<float>,
    ub: DVector<float>,
}

impl<M: DynamicsModel> MpcProblem<M>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    pub fn new(model: M, config: &MpcConfig) -> MpcProblem<M> {
        let h = config.h;
        assert!(h >= 1, "horizon must be at least 1");
        let ni = M::NI::USIZE;

        let C_u = weight_vector::<M::NI>(&config.C_u, "C_u");
        let C_s = weight_vector::<M::NS>(&config.C_s, "C_s");
        let C_s_end = weight_vector::<M::NS>(&config.C_s_end, "C_s_end");

        // intersect the model input bounds with any configured override
        let (mut u_min, mut u_max) = model.input_bounds();
        if let Some(v) = &config.u_lb {
            let ext = weight_vector::<M::NI>(v, "u_lb");
            u_min = u_min.zip_map(&ext, max);
        }
        if let Some(v) = &config.u_ub {
            let ext = weight_vector::<M::NI>(v, "u_ub");
            u_max = u_max.zip_map(&ext, min);
        }

        let mut lb = DVector::zeros(h * ni);
        let mut ub = DVector::zeros(h * ni);
        for t in 0..h {
            for i in 0..ni {
                lb[t * ni + i] = u_min[i];
                ub[t * ni + i] = u_max[i];
            }
        }

        MpcProblem {
            model,
            h,
            dt: config.dt,
            C_u,
            C_s,
            C_s_end,
            u_smooth: config.u_smooth,
            max_target_distance: config.max_target_distance,
            s0: Vector::<M::NS>::zeros(),
            target: Vector::<M::NS>::zeros(),
            p: Vector::<M::NP>::zeros(),
            u_prev: Vector::<M::NI>::zeros(),
            u_seq: vec![Vector::<M::NI>::zeros(); h],
            solver: LmSolver::new(config.solver.to_options()),
            lb,
            ub,
        }
    }

    pub fn h(&self) -> usize {
        self.h
    }

    /// Resets the warm-start sequence and the pending request data.
    pub fn zero(&mut self) {
        for u in &mut self.u_seq {
            u.fill(0.0);
        }
        self.s0.fill(0.0);
        self.target.fill(0.0);
        self.p.fill(0.0);
        self.u_prev.fill(0.0);
    }

    /// Warm start across solve boundaries: drop the first `k` planned
    /// actions (they correspond to timesteps that have already passed) and
    /// repeat the final action in the freed tail slots.
    pub fn shift_u(&mut self, k: usize) {
        if k == 0 {
            return;
        }
        let k = min(k, self.h);
        let last = self.u_seq[self.h - 1].clone();
        for t in 0..(self.h - k) {
            self.u_seq[t] = self.u_seq[t + k].clone();
        }
        for t in (self.h - k)..self.h {
            self.u_seq[t] = last.clone();
        }
    }

    /// Overwrites the shared request triple. The target is projected onto
    /// the `max_target_distance` sphere around `s0` so a single open-loop
    /// plan can never be asked to cover an arbitrarily long leg.
    pub fn set_request(
        &mut self,
        s0: Vector<M::NS>,
        u_prev: Vector<M::NI>,
        target: Vector<M::NS>,
        p: Vector<M::NP>,
    ) {
        self.target = clamp_target(&s0, &target, self.max_target_distance);
        self.s0 = s0;
        self.u_prev = u_prev;
        self.p = p;
    }

    pub fn solve(&mut self) -> SolverSummary {
        let mut x = self.pack();
        let summary = self.solver.solve(self, &mut x, Some((&self.lb, &self.ub)));
        self.unpack(&x);
        summary
    }

    pub fn u_seq(&self) -> &[Vector<M::NI>] {
        &self.u_seq
    }

    /// Rolls the dynamics forward through the current plan; the predicted
    /// terminal state of the last solve.
    pub fn predicted_terminal(&self) -> Vector<M::NS> {
        let mut x = self.s0.clone();
        for u in &self.u_seq {
            x = self.model.step(self.dt, &x, u, &self.p);
        }
        x
    }

    fn pack(&self) -> DVector<float> {
        let ni = M::NI::USIZE;
        let mut x = DVector::zeros(self.h * ni);
        for t in 0..self.h {
            for i in 0..ni {
                x[t * ni + i] = self.u_seq[t][i];
            }
        }
        x
    }

    fn unpack(&mut self, x: &DVector<float>) {
        let ni = M::NI::USIZE;
        for t in 0..self.h {
            for i in 0..ni {
                self.u_seq[t][i] = x[t * ni + i];
            }
        }
    }

    fn input_at(&self, x: &DVector<float>, t: usize) -> Vector<M::NI> {
        let ni = M::NI::USIZE;
        let mut u = Vector::<M::NI>::zeros();
        for i in 0..ni {
            u[i] = x[t * ni + i];
        }
        u
    }
}

impl<M: DynamicsModel> LeastSquaresProblem for MpcProblem<M>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    fn num_residuals(&self) -> usize {
        self.h * (M::NI::USIZE + M::NS::USIZE)
    }

    fn num_variables(&self) -> usize {
        self.h * M::NI::USIZE
    }

    fn evaluate(
        &self,
        x: &DVector<float>,
        residuals: &mut DVector<float>,
        jacobian: &mut DMatrix<float>,
    ) {
        let ni = M::NI::USIZE;
        let ns = M::NS::USIZE;
        let h = self.h;
        let dt = self.dt;

        // action cost: magnitude, or smoothness anchored against the
        // previously applied action
        for t in 0..h {
            let u_t = self.input_at(x, t);
            let row0 = t * ni;
            if self.u_smooth {
                let u_ref = if t == 0 {
                    self.u_prev.clone()
                } else {
                    self.input_at(x, t - 1)
                };
                for i in 0..ni {
                    residuals[row0 + i] = self.C_u[i] * (u_t[i] - u_ref[i]);
                    jacobian[(row0 + i, t * ni + i)] = self.C_u[i];
                    if t >= 1 {
                        jacobian[(row0 + i, (t - 1) * ni + i)] = -self.C_u[i];
                    }
                }
            } else {
                for i in 0..ni {
                    residuals[row0 + i] = self.C_u[i] * u_t[i];
                    jacobian[(row0 + i, t * ni + i)] = self.C_u[i];
                }
            }
        }

        // tracking cost via full forward rollout from s0; sens[j] carries
        // d x_{t+1} / d u_j across the steps
        let mut xs = self.s0.clone();
        let mut sens: Vec<Matrix<M::NS, M::NI>> = Vec::with_capacity(h);
        for t in 0..h {
            let u_t = self.input_at(x, t);
            let (A, B) = self.model.linearise(&xs, &u_t, &self.p);

            for S in sens.iter_mut() {
                *S = &*S + (&A * &*S) * dt;
            }
            sens.push(B * dt);

            xs = self.model.step(dt, &xs, &u_t, &self.p);

            let C = if t == h - 1 { &self.C_s_end } else { &self.C_s };
            let row0 = h * ni + t * ns;
            for i in 0..ns {
                residuals[row0 + i] = C[i] * (xs[i] - self.target[i]);
            }
            for (j, S) in sens.iter().enumerate() {
                for i in 0..ns {
                    for k in 0..ni {
                        jacobian[(row0 + i, j * ni + k)] = C[i] * S[(i, k)];
                    }
                }
            }
        }
    }
}

/// Projects `target` onto the sphere of radius `max_distance` around `s0`;
/// targets inside the sphere (or a non-positive radius) pass through
/// unchanged.
pub fn clamp_target<D: DimName>(
    s0: &Vector<D>,
    target: &Vector<D>,
    max_distance: float,
) -> Vector<D>
where
    DefaultAllocator: Allocator<D>,
{
    if max_distance <= 0.0 {
        return target.clone();
    }
    let diff = target - s0;
    let distance = diff.norm();
    if distance <= max_distance {
        target.clone()
    } else {
        s0 + diff * (max_distance / distance)
    }
}

fn weight_vector<D: DimName>(values: &[float], name: &str) -> Vector<D>
where
    DefaultAllocator: Allocator<D>,
{
    assert_eq!(
        values.len(),
        D::USIZE,
        "{} has {} entries, model expects {}",
        name,
        values.len(),
        D::USIZE
    );
    Vector::<D>::from_column_slice(values)
}
