use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use touchdown::{LandingConfig, RewardTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// No gimbal, no thrust
    Idle,
    /// Uniform random control vectors
    Random,
    /// Proportional descent-rate and attitude-damping controller
    Descent,
}

/// Harness configuration for the synthetic vehicle and the run loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed tick length [s]
    pub dt: f64,
    /// Episodes per agent
    pub episodes: usize,
    /// Independent agents run in parallel
    pub agents: usize,
    /// RNG seed for reproducibility
    pub seed: u64,
    pub policy: PolicyKind,
    /// Write one CSV row per tick
    pub record_ticks: bool,
    /// Gravitational acceleration [m/s^2]
    pub gravity_mps2: f64,
    pub mass_kg: f64,
    /// Principal moments of inertia about body X, Y, Z [kg m^2]
    pub inertia_kgm2: [f64; 3],
    /// Distance from the centre of mass down to the gimbal point [m]
    pub engine_offset_m: f64,
    /// Linear angular-rate damping [1/s]
    pub angular_damping: f64,
    /// Height of the ground plane [m]
    pub ground_height_m: f64,
    /// Radius of the landing pad disc [m]
    pub pad_radius_m: f64,
    /// Maximum down ray-cast length [m]
    pub ray_length_m: f64,
    /// Half width of the square terrain patch centred on the pad [m]
    pub terrain_half_extent_m: f64,
    /// Tilt under which resting landing legs level the vehicle [deg]
    pub leg_settle_deg: f64,
    /// Standard deviation of horizontal wind gust force [N]
    pub wind_gust_sigma_n: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt: 0.02,
            episodes: 20,
            agents: 1,
            seed: 17,
            policy: PolicyKind::Descent,
            record_ticks: false,
            gravity_mps2: 9.81,
            mass_kg: 100.0,
            inertia_kgm2: [400.0, 150.0, 400.0],
            engine_offset_m: 4.0,
            angular_damping: 0.05,
            ground_height_m: 0.0,
            pad_radius_m: 15.0,
            ray_length_m: 5_000.0,
            terrain_half_extent_m: 5_000.0,
            leg_settle_deg: 3.0,
            wind_gust_sigma_n: 0.0,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.dt > 0.0, "dt must be > 0");
        anyhow::ensure!(self.episodes > 0, "episodes must be > 0");
        anyhow::ensure!(self.agents > 0, "agents must be > 0");
        anyhow::ensure!(self.mass_kg > 0.0, "mass_kg must be > 0");
        anyhow::ensure!(
            self.inertia_kgm2.iter().all(|&i| i > 0.0),
            "inertia_kgm2 entries must be > 0"
        );
        anyhow::ensure!(self.engine_offset_m >= 0.0, "engine_offset_m must be >= 0");
        anyhow::ensure!(self.angular_damping >= 0.0, "angular_damping must be >= 0");
        anyhow::ensure!(self.pad_radius_m > 0.0, "pad_radius_m must be > 0");
        anyhow::ensure!(self.ray_length_m > 0.0, "ray_length_m must be > 0");
        anyhow::ensure!(
            self.terrain_half_extent_m >= self.pad_radius_m,
            "terrain_half_extent_m must cover the pad"
        );
        anyhow::ensure!(self.leg_settle_deg >= 0.0, "leg_settle_deg must be >= 0");
        anyhow::ensure!(self.wind_gust_sigma_n >= 0.0, "wind_gust_sigma_n must be >= 0");
        Ok(())
    }
}

/// Everything a run needs, as read from one TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub sim: SimConfig,
    pub landing: LandingConfig,
    pub rewards: RewardTable,
}

impl RunConfig {
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed to load TOML config: {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let cfg: RunConfig = toml::from_str(raw).context("failed to parse TOML config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.sim.validate()?;
        self.landing.validate()?;
        self.rewards.validate()?;
        anyhow::ensure!(
            self.landing.pad_position[1] == self.sim.ground_height_m,
            "pad must sit on the ground plane (pad y {} vs ground {})",
            self.landing.pad_position[1],
            self.sim.ground_height_m
        );
        anyhow::ensure!(
            self.landing.max_init_position[1] > 0.0,
            "spawn box must lie above the ground"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_run_config_is_valid() {
        RunConfig::default().validate().unwrap();
    }

    #[test]
    fn shipped_config_parses() {
        let raw = include_str!("../configs/default.toml");
        let cfg = RunConfig::from_toml_str(raw).unwrap();
        assert_eq!(cfg.sim.policy, PolicyKind::Descent);
        assert_eq!(cfg.landing.episode_timeout, 120.0);
        assert_eq!(cfg.rewards.off_pad_contact, -0.25);
    }

    #[test]
    fn sections_are_optional() {
        let cfg = RunConfig::from_toml_str("[sim]\nagents = 4\npolicy = \"random\"\n").unwrap();
        assert_eq!(cfg.sim.agents, 4);
        assert_eq!(cfg.sim.policy, PolicyKind::Random);
        assert_eq!(cfg.landing, LandingConfig::default());
    }

    #[test]
    fn floating_pad_is_rejected() {
        let err = RunConfig::from_toml_str("[landing]\npad_position = [0.0, 5.0, 0.0]\n").unwrap_err();
        assert!(format!("{err:#}").contains("ground plane"));
    }
}
