use dynamics_model::DynamicsModel;
use lm_solver::{LeastSquaresProblem, LmSolver, Loss, SolverSummary};
use prelude::*;

use crate::{HorizonBuffer, MheConfig};

/// Moving-horizon estimation problem.
///
/// Free variables are the states `s_1..s_h` and one shared parameter vector;
/// slot 0 acts as a constant anchor carrying the information that left the
/// window. The problem topology is fixed at build time: per horizon step one
/// observation residual and one dynamics residual (the step 0 dynamics
/// residual anchors `s_1` against the constant `s_0`), plus one parameter
/// prior block. Validity weights keep the same topology correct while the
/// window is still filling.
///
/// Dynamics discretisation is the backward delta form
/// `(s_t - s_{t+1}) / dt + f(s_t, u_t, p)`, and warm starts integrate the
/// same `f` forward with explicit Euler steps.
pub struct MheProblem<M: DynamicsModel>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    model: M,
    h: usize,
    dt: float,
    C_o: Vector<M::NO>,
    C_s: Vector<M::NS>,
    C_p: Vector<M::NP>,
    p_prior: Vector<M::NP>,
    p_est: Vector<M::NP>,
    track_p_prior: bool,
    obs_loss: Loss,
    state_loss: Loss,
    pub buffer: HorizonBuffer<M>,
    solver: LmSolver,
    lb: DVector<float>,
    ub: DVector<float>,
}

impl<M: DynamicsModel> MheProblem<M>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    pub fn new(model: M, config: &MheConfig) -> MheProblem<M> {
        let h = config.h;
        let ns = M::NS::USIZE;
        let np = M::NP::USIZE;

        let C_o = weight_vector::<M::NO>(&config.C_o, "C_o");
        let C_s = weight_vector::<M::NS>(&config.C_s, "C_s");
        let C_p = weight_vector::<M::NP>(&config.C_p, "C_p");

        let (model_lb, model_ub) = model.param_bounds();
        let p_lb = match &config.p_lb {
            Some(v) => weight_vector::<M::NP>(v, "p_lb"),
            None => model_lb,
        };
        let p_ub = match &config.p_ub {
            Some(v) => weight_vector::<M::NP>(v, "p_ub"),
            None => model_ub,
        };

        let p_prior = match &config.p_prior {
            Some(v) => weight_vector::<M::NP>(v, "p_prior"),
            None => (&p_lb + &p_ub) / 2.0,
        };

        let n_vars = h * ns + np;
        let mut lb = DVector::from_element(n_vars, NEG_INFINITY);
        let mut ub = DVector::from_element(n_vars, INFINITY);
        for i in 0..np {
            lb[h * ns + i] = p_lb[i];
            ub[h * ns + i] = p_ub[i];
        }

        MheProblem {
            model,
            h,
            dt: config.dt,
            C_o,
            C_s,
            C_p,
            p_est: p_prior.clone(),
            p_prior,
            track_p_prior: config.track_p_prior,
            obs_loss: Loss::tukey_or_trivial(config.obs_loss_s),
            state_loss: Loss::huber_or_trivial(config.state_loss_s),
            buffer: HorizonBuffer::new(h),
            solver: LmSolver::new(config.solver.to_options()),
            lb,
            ub,
        }
    }

    pub fn h(&self) -> usize {
        self.h
    }

    pub fn dt(&self) -> float {
        self.dt
    }

    /// Resets the window and the parameter estimate to the prior.
    pub fn zero(&mut self) {
        self.buffer.zero();
        self.p_est = self.p_prior.clone();
    }

    /// Shifts the window by `gap`, copies the new samples into the freed
    /// tail slots, re-anchors the parameter prior and warm-starts the new
    /// state slots. `gap` must not exceed `h - 1`.
    pub fn advance(
        &mut self,
        gap: usize,
        o: &[Vector<M::NO>],
        u: &[Vector<M::NI>],
        last_p: &Vector<M::NP>,
    ) {
        assert!(gap >= 1 && gap <= self.h - 1, "invalid horizon shift {}", gap);
        assert_eq!(o.len(), gap, "observation count does not match the shift");
        assert_eq!(u.len(), gap, "input count does not match the shift");

        self.buffer.shift(gap);
        for t in 0..gap {
            let slot = self.h - gap + t;
            self.buffer.o[slot] = o[t].clone();
            self.buffer.u[slot] = u[t].clone();
            self.buffer.w[slot] = 1.0;
        }

        if self.track_p_prior {
            self.p_prior = last_p.clone();
        }

        self.buffer.warm_start(&self.model, gap, self.dt, &self.p_prior);
    }

    /// Re-solves the whole window from the current warm-started guess.
    pub fn solve(&mut self) -> SolverSummary {
        let mut x = self.pack();
        let summary = self.solver.solve(self, &mut x, Some((&self.lb, &self.ub)));
        self.unpack(&x);
        summary
    }

    /// Latest state estimate, i.e. the newest slot of the window.
    pub fn latest_state(&self) -> Vector<M::NS> {
        self.buffer.s[self.h].clone()
    }

    pub fn params(&self) -> Vector<M::NP> {
        self.p_est.clone()
    }

    pub fn param_prior(&self) -> Vector<M::NP> {
        self.p_prior.clone()
    }

    fn pack(&self) -> DVector<float> {
        let ns = M::NS::USIZE;
        let np = M::NP::USIZE;
        let mut x = DVector::zeros(self.h * ns + np);
        for t in 1..=self.h {
            for i in 0..ns {
                x[(t - 1) * ns + i] = self.buffer.s[t][i];
            }
        }
        for i in 0..np {
            x[self.h * ns + i] = self.p_est[i];
        }
        x
    }

    fn unpack(&mut self, x: &DVector<float>) {
        let ns = M::NS::USIZE;
        let np = M::NP::USIZE;
        for t in 1..=self.h {
            for i in 0..ns {
                self.buffer.s[t][i] = x[(t - 1) * ns + i];
            }
        }
        for i in 0..np {
            self.p_est[i] = x[self.h * ns + i];
        }
    }

    fn state_at(&self, x: &DVector<float>, t: usize) -> Vector<M::NS> {
        if t == 0 {
            return self.buffer.s[0].clone();
        }
        let ns = M::NS::USIZE;
        let mut s = Vector::<M::NS>::zeros();
        for i in 0..ns {
            s[i] = x[(t - 1) * ns + i];
        }
        s
    }

    fn params_at(&self, x: &DVector<float>) -> Vector<M::NP> {
        let np = M::NP::USIZE;
        let off = self.h * M::NS::USIZE;
        let mut p = Vector::<M::NP>::zeros();
        for i in 0..np {
            p[i] = x[off + i];
        }
        p
    }
}

impl<M: DynamicsModel> LeastSquaresProblem for MheProblem<M>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    fn num_residuals(&self) -> usize {
        self.h * (M::NO::USIZE + M::NS::USIZE) + M::NP::USIZE
    }

    fn num_variables(&self) -> usize {
        self.h * M::NS::USIZE + M::NP::USIZE
    }

    fn evaluate(
        &self,
        x: &DVector<float>,
        residuals: &mut DVector<float>,
        jacobian: &mut DMatrix<float>,
    ) {
        let ns = M::NS::USIZE;
        let no = M::NO::USIZE;
        let np = M::NP::USIZE;
        let h = self.h;
        let dt = self.dt;
        let p_off = h * ns;

        let p = self.params_at(x);
        let G = self.model.output_matrix();

        // observation residuals: w_t * C_o (g(s_{t+1}) - o_t)
        for t in 0..h {
            let s_next = self.state_at(x, t + 1);
            let y = self.model.output_equation(&s_next);
            let w = self.buffer.w[t];
            let row0 = t * no;
            let col0 = t * ns;

            for i in 0..no {
                residuals[row0 + i] = w * self.C_o[i] * (y[i] - self.buffer.o[t][i]);
                for j in 0..ns {
                    jacobian[(row0 + i, col0 + j)] = w * self.C_o[i] * G[(i, j)];
                }
            }

            let block_norm = residuals.rows(row0, no).norm();
            let lw = self.obs_loss.weight(block_norm);
            if lw != 1.0 {
                for i in 0..no {
                    residuals[row0 + i] *= lw;
                    for j in 0..ns {
                        jacobian[(row0 + i, col0 + j)] *= lw;
                    }
                }
            }
        }

        // dynamics residuals: w_t * C_s ((s_t - s_{t+1}) / dt + f(s_t, u_t, p));
        // step 0 anchors s_1 against the constant slot 0
        for t in 0..h {
            let s_t = self.state_at(x, t);
            let s_next = self.state_at(x, t + 1);
            let u_t = &self.buffer.u[t];
            let f = self.model.state_equation(&s_t, u_t, &p);
            let (A, _) = self.model.linearise(&s_t, u_t, &p);
            let P = self.model.linearise_parameters(&s_t, u_t, &p);
            let w = self.buffer.w[t];
            let row0 = h * no + t * ns;

            for i in 0..ns {
                residuals[row0 + i] = w * self.C_s[i] * ((s_t[i] - s_next[i]) / dt + f[i]);

                // wrt s_t (free for t >= 1)
                if t >= 1 {
                    let col0 = (t - 1) * ns;
                    for j in 0..ns {
                        let mut d = A[(i, j)];
                        if i == j {
                            d += 1.0 / dt;
                        }
                        jacobian[(row0 + i, col0 + j)] = w * self.C_s[i] * d;
                    }
                }

                // wrt s_{t+1}
                jacobian[(row0 + i, t * ns + i)] = -w * self.C_s[i] / dt;

                // wrt p
                for j in 0..np {
                    jacobian[(row0 + i, p_off + j)] = w * self.C_s[i] * P[(i, j)];
                }
            }

            let block_norm = residuals.rows(row0, ns).norm();
            let lw = self.state_loss.weight(block_norm);
            if lw != 1.0 {
                for i in 0..ns {
                    residuals[row0 + i] *= lw;
                    for col in 0..(h * ns + np) {
                        jacobian[(row0 + i, col)] *= lw;
                    }
                }
            }
        }

        // parameter prior: C_p (p - p_prior)
        let row0 = h * (no + ns);
        for i in 0..np {
            residuals[row0 + i] = self.C_p[i] * (p[i] - self.p_prior[i]);
            jacobian[(row0 + i, p_off + i)] = self.C_p[i];
        }
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
