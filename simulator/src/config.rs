use std::fs::File;
use std::io::Read;

use serde::Deserialize;

use prelude::*;

#[derive(Clone, Debug, Deserialize)]
pub struct SimConfig {
    pub dt: float,
    pub T_max: i64,
    pub N_sim: usize,
    /// "simple", "drift" or "inertia".
    pub model: String,
    /// True plant parameters; drawn randomly within the model bounds when
    /// absent.
    #[serde(default)]
    pub p: Option<Vec<float>>,
    /// Scale of the disturbance applied to the controller's initial
    /// parameter estimate.
    #[serde(default)]
    pub p_disturbance: float,
    pub target_dist: float,
    pub target_threshold: float,
    #[serde(default)]
    pub s_noise_sd: Vec<float>,
    #[serde(default)]
    pub o_noise_sd: Vec<float>,
    /// Probability of a dropped (zeroed) observation.
    #[serde(default)]
    pub o_miss_prob: float,
    /// Plant-side input delay in timesteps.
    #[serde(default)]
    pub u_delay: usize,
    /// Random-walk bound on the effective delay; zero keeps it fixed.
    #[serde(default)]
    pub u_delay_max_diff: usize,
    #[serde(default)]
    pub real_time: bool,
    #[serde(default)]
    pub log_dir: Option<String>,
    #[serde(default = "default_mhe_config")]
    pub mhe_config: String,
    #[serde(default = "default_mpc_config")]
    pub mpc_config: String,
}

fn default_mhe_config() -> String {
    "mhe.toml".to_string()
}

fn default_mpc_config() -> String {
    "mpc.toml".to_string()
}

impl SimConfig {
    pub fn load(path: &str) -> SimConfig {
        let mut config_str = String::new();
        File::open(path)
            .unwrap_or_else(|e| panic!("unable to open {}: {}", path, e))
            .read_to_string(&mut config_str)
            .unwrap_or_else(|e| panic!("unable to read {} as utf8: {}", path, e));
        toml::from_str(&config_str[..])
            .unwrap_or_else(|e| panic!("unable to deserialise {}: {}", path, e))
    }
}
