use std::fs::File;
use std::io::Read;

use serde::Deserialize;

use lm_solver::SolverConfig;
use prelude::*;

/// Estimation problem configuration. Weight vectors are validated against
/// the model dimensions when the problem is built.
#[derive(Clone, Debug, Deserialize)]
pub struct MheConfig {
    /// Horizon length in timesteps.
    pub h: usize,
    pub dt: float,
    /// Observation residual weights, one per output dimension.
    pub C_o: Vec<float>,
    /// Dynamics residual weights, one per state dimension.
    pub C_s: Vec<float>,
    /// Parameter prior weights, one per parameter dimension.
    pub C_p: Vec<float>,
    /// Overrides the midpoint-of-bounds default.
    #[serde(default)]
    pub p_prior: Option<Vec<float>>,
    #[serde(default)]
    pub p_lb: Option<Vec<float>>,
    #[serde(default)]
    pub p_ub: Option<Vec<float>>,
    /// Tukey scale for the observation residuals; zero disables the loss.
    #[serde(default)]
    pub obs_loss_s: float,
    /// Huber scale for the dynamics residuals; zero disables the loss.
    #[serde(default)]
    pub state_loss_s: float,
    /// Re-anchor the parameter prior to the previous solve's estimate on
    /// every shift instead of keeping the configured prior.
    #[serde(default = "default_true")]
    pub track_p_prior: bool,
    #[serde(default)]
    pub solver: SolverConfig,
}

fn default_true() -> bool {
    true
}

impl MheConfig {
    pub fn load(path: &str) -> MheConfig {
        let mut config_str = String::new();
        File::open(path)
            .unwrap_or_else(|e| panic!("unable to open {}: {}", path, e))
            .read_to_string(&mut config_str)
            .unwrap_or_else(|e| panic!("unable to read {} as utf8: {}", path, e));
        toml::from_str(&config_str[..])
            .unwrap_or_else(|e| panic!("unable to deserialise {}: {}", path, e))
    }
}
