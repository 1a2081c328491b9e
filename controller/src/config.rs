use std::fs::File;
use std::io::Read;

use serde::Deserialize;

use lm_solver::SolverConfig;
use prelude::*;

/// Control problem configuration. Weight vectors are validated against the
/// model dimensions when the problem is built.
#[derive(Clone, Debug, Deserialize)]
pub struct MpcConfig {
    /// Horizon length in timesteps.
    pub h: usize,
    pub dt: float,
    /// Action cost weights, one per input dimension.
    pub C_u: Vec<float>,
    /// Intermediate tracking weights, one per state dimension.
    pub C_s: Vec<float>,
    /// Terminal tracking weights, one per state dimension.
    pub C_s_end: Vec<float>,
    /// Penalise input changes instead of input magnitude, anchoring the
    /// first step against the previously applied action.
    #[serde(default)]
    pub u_smooth: bool,
    /// Tightens the model input bounds.
    #[serde(default)]
    pub u_lb: Option<Vec<float>>,
    #[serde(default)]
    pub u_ub: Option<Vec<float>>,
    /// Targets further than this from the predicted state are projected onto
    /// the sphere of this radius; zero disables the clamp.
    #[serde(default)]
    pub max_target_distance: float,
    /// Decay constant (in timesteps) of the stale-plan attenuation applied
    /// by `u_vector`; zero disables attenuation.
    #[serde(default = "default_lag_tau")]
    pub lag_tau: float,
    /// Input-to-dynamics delay compensated by the control loop.
    #[serde(default)]
    pub u_delay: usize,
    #[serde(default)]
    pub solver: SolverConfig,
}

fn default_lag_tau() -> float {
    10.0
}

impl MpcConfig {
    pub fn load(path: &str) -> MpcConfig {
        let mut config_str = String::new();
        File::open(path)
            .unwrap_or_else(|e| panic!("unable to open {}: {}", path, e))
            .read_to_string(&mut config_str)
            .unwrap_or_else(|e| panic!("unable to read {} as utf8: {}", path, e));
        toml::from_str(&config_str[..])
            .unwrap_or_else(|e| panic!("unable to deserialise {}: {}", path, e))
    }
}
