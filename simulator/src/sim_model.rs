use std::collections::VecDeque;

use dynamics_model::DynamicsModel;
use prelude::*;

use crate::config::SimConfig;

/// Simulated plant: integrates the true dynamics under actuation delay,
/// process/observation noise and occasional observation dropout.
pub struct SimModel<M: DynamicsModel>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    model: M,
    pub state: Vector<M::NS>,
    pub params: Vector<M::NP>,
    pub p_lb: Vector<M::NP>,
    pub p_ub: Vector<M::NP>,
    s_noise_sd: Vector<M::NS>,
    o_noise_sd: Vector<M::NO>,
    o_miss_prob: float,
    u_delay: usize,
    u_delay_max_diff: usize,
    effective_delay: usize,
    dt: float,
    u_buffer: VecDeque<Vector<M::NI>>,
}

impl<M: DynamicsModel> SimModel<M>
where
    DefaultAllocator: ModelDims<M::NS, M::NI, M::NO, M::NP>,
{
    pub fn new(model: M, config: &SimConfig) -> SimModel<M> {
        let (p_lb, p_ub) = model.param_bounds();

        let s_noise_sd = optional_vector::<M::NS>(&config.s_noise_sd, "s_noise_sd");
        let o_noise_sd = optional_vector::<M::NO>(&config.o_noise_sd, "o_noise_sd");

        let params = match &config.p {
            Some(values) => {
                assert_eq!(
                    values.len(),
                    M::NP::USIZE,
                    "p has {} entries, model expects {}",
                    values.len(),
                    M::NP::USIZE
                );
                Vector::<M::NP>::from_column_slice(values)
            }
            None => random_params(&p_lb, &p_ub),
        };

        SimModel {
            model,
            state: Vector::<M::NS>::zeros(),
            params,
            p_lb,
            p_ub,
            s_noise_sd,
            o_noise_sd,
            o_miss_prob: config.o_miss_prob,
            u_delay: config.u_delay,
            u_delay_max_diff: config.u_delay_max_diff,
            effective_delay: config.u_delay,
            dt: config.dt,
            u_buffer: VecDeque::new(),
        }
    }

    pub fn u_delay(&self) -> usize {
        self.u_delay
    }

    pub fn obs(&self) -> Vector<M::NO> {
        let mut obs = self.model.output_equation(&self.state);

        if self.o_miss_prob > 0.0 && rand::random::<float>() < self.o_miss_prob {
            obs.fill(0.0);
        }

        for i in 0..M::NO::USIZE {
            obs[i] += self.o_noise_sd[i] * randn();
        }

        obs
    }

    pub fn reset(&mut self) -> Vector<M::NO> {
        self.u_buffer.clear();
        self.state.fill(0.0);
        self.effective_delay = self.u_delay;
        self.obs()
    }

    /// Applies one control input and integrates one timestep, returning the
    /// next observation. Inputs reach the dynamics `effective_delay` steps
    /// late; before the delay pipeline fills the plant sees zero input.
    pub fn step(&mut self, input: &Vector<M::NI>) -> Vector<M::NO> {
        self.drift_delay();

        self.u_buffer.push_back(input.clone());
        while self.u_buffer.len() > self.effective_delay + 1 {
            self.u_buffer.pop_front();
        }
        let u = if self.u_buffer.len() == self.effective_delay + 1 {
            self.u_buffer.front().unwrap().clone()
        } else {
            Vector::<M::NI>::zeros()
        };

        let mut ds = self.model.state_equation(&self.state, &u, &self.params);
        for i in 0..M::NS::USIZE {
            ds[i] += self.s_noise_sd[i] * randn();
        }
        self.state += ds * self.dt;

        self.obs()
    }

    /// Random walk of the effective delay, clamped to
    /// `u_delay +- u_delay_max_diff`.
    fn drift_delay(&mut self) {
        if self.u_delay_max_diff == 0 {
            return;
        }
        let r = rand::random::<float>();
        if r < 0.05 {
            self.effective_delay += 1;
        } else if r < 0.1 && self.effective_delay > 0 {
            self.effective_delay -= 1;
        }
        let lo = self.u_delay.saturating_sub(self.u_delay_max_diff);
        let hi = self.u_delay + self.u_delay_max_diff;
        self.effective_delay = min(max(self.effective_delay, lo), hi);
    }

    /// Zero-mean disturbance spanning the parameter range.
    pub fn random_params_disturbance(&self) -> Vector<M::NP> {
        let mut d = Vector::<M::NP>::zeros();
        for i in 0..M::NP::USIZE {
            d[i] = (rand::random::<float>() - 0.5) * (self.p_ub[i] - self.p_lb[i]);
        }
        d
    }
}

fn random_params<D: DimName>(lb: &Vector<D>, ub: &Vector<D>) -> Vector<D>
where
    DefaultAllocator: Allocator<D>,
{
    let mut p = Vector::<D>::zeros();
    for i in 0..D::USIZE {
        p[i] = lb[i] + rand::random::<float>() * (ub[i] - lb[i]);
    }
    p
}

fn optional_vector<D: DimName>(values: &[float], name: &str) -> Vector<D>
where
    DefaultAllocator: Allocator<D>,
{
    if values.is_empty() {
        return Vector::<D>::zeros();
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use dynamics_model::SimpleDrone;
    use prelude::nalgebra::Vector4;

    fn quiet_config(u_delay: usize) -> SimConfig {
        SimConfig {
            dt: 0.02,
            T_max: 100,
            N_sim: 1,
            model: "simple".to_string(),
            p: Some(vec![1.0, 1.0, 1.0, 0.0]),
            p_disturbance: 0.0,
            target_dist: 1.0,
            target_threshold: 0.05,
            s_noise_sd: Vec::new(),
            o_noise_sd: Vec::new(),
            o_miss_prob: 0.0,
            u_delay,
            u_delay_max_diff: 0,
            real_time: false,
            log_dir: None,
            mhe_config: "mhe.toml".to_string(),
            mpc_config: "mpc.toml".to_string(),
        }
    }

    #[test]
    fn input_delay_holds_back_the_first_actions() {
        let mut sim = SimModel::new(SimpleDrone, &quiet_config(2));
        sim.reset();

        let input = Vector4::new(0.0, 1.0, 0.0, 0.0);

        // the first two applied actions are the pre-delay default
        sim.step(&input);
        assert_eq!(sim.state, Vector4::zeros());
        sim.step(&input);
        assert_eq!(sim.state, Vector4::zeros());

        // afterwards the delayed input path becomes active
        sim.step(&input);
        assert!(sim.state[0] > 0.0);
    }

    #[test]
    fn zero_delay_applies_the_input_immediately() {
        let mut sim = SimModel::new(SimpleDrone, &quiet_config(0));
        sim.reset();

        let input = Vector4::new(0.0, 1.0, 0.0, 0.0);
        sim.step(&input);
        assert!((sim.state[0] - 0.02).abs() < 1e-12);
    }

    #[test]
    fn noiseless_observation_reports_the_state() {
        let mut sim = SimModel::new(SimpleDrone, &quiet_config(0));
        sim.reset();
        sim.state = Vector4::new(0.1, 0.2, 0.3, 0.4);
        assert_eq!(sim.obs(), sim.state);
    }
}
