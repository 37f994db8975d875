use std::path::PathBuf;
use std::sync::Arc;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyModule;
use touchdown::actuation::CONTROL_SIZE;
use touchdown::observation::OBSERVATION_SIZE;
use touchdown::{ControlVector, EpisodeController, Observation};

use crate::config::RunConfig;
use crate::physics::SimulatedVehicle;
use crate::{default_output_base_dir, run_simulation};

fn load_config(config_path: Option<String>) -> PyResult<RunConfig> {
    let cfg = match config_path {
        Some(path) => RunConfig::from_toml_file(&PathBuf::from(path)),
        None => Ok(RunConfig::default()),
    };
    cfg.map_err(|e| PyValueError::new_err(format!("{e:#}")))
}

/// Single-agent environment for an external training loop.
///
/// `step` scores the current state, applies the action and advances the
/// vehicle by one tick. Finished episodes restart on their own, so calling
/// `reset` after `done` is allowed but not required.
#[pyclass(unsendable)]
struct LandingEnv {
    dt: f64,
    controller: EpisodeController,
    vehicle: SimulatedVehicle,
}

#[pymethods]
impl LandingEnv {
    #[new]
    #[pyo3(signature = (config_path=None, seed=None))]
    fn new(config_path: Option<String>, seed: Option<u64>) -> PyResult<Self> {
        let cfg = load_config(config_path)?;
        let seed = seed.unwrap_or(cfg.sim.seed);
        let controller = EpisodeController::new(&cfg.landing, Arc::new(cfg.rewards.clone()), seed)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        let vehicle = SimulatedVehicle::new(&cfg.sim, cfg.landing.pad(), seed);
        Ok(Self {
            dt: cfg.sim.dt,
            controller,
            vehicle,
        })
    }

    fn reset(&mut self) -> Vec<f64> {
        self.controller.reset(&mut self.vehicle).to_vec()
    }

    fn step(&mut self, action: Vec<f64>) -> PyResult<(Vec<f64>, f64, bool)> {
        let control: [f64; CONTROL_SIZE] = action.as_slice().try_into().map_err(|_| {
            PyValueError::new_err(format!("expected {CONTROL_SIZE} actions, got {}", action.len()))
        })?;
        let control = ControlVector::from(control);
        let mut policy = |_: &Observation| control;

        let report = self
            .controller
            .tick(&mut self.vehicle, &mut policy, self.dt)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        self.vehicle.step(self.dt);

        Ok((report.observation.to_vec(), report.reward, report.done))
    }

    fn episode_reward(&self) -> f64 {
        self.controller.state().cumulative_reward
    }

    #[getter]
    fn observation_size(&self) -> usize {
        OBSERVATION_SIZE
    }

    #[getter]
    fn action_size(&self) -> usize {
        CONTROL_SIZE
    }
}

#[pyfunction]
#[pyo3(signature = (config_path=None, output_dir=None))]
fn run_landing_simulation(config_path: Option<String>, output_dir: Option<String>) -> PyResult<String> {
    let cfg = load_config(config_path)?;
    let out = output_dir
        .map(PathBuf::from)
        .unwrap_or_else(default_output_base_dir);

    let summary = run_simulation(&cfg, &out)
        .map_err(|e| PyRuntimeError::new_err(format!("simulation failed: {e:#}")))?;

    serde_json::to_string_pretty(&summary)
        .map_err(|e| PyRuntimeError::new_err(format!("summary serialization failed: {e}")))
}

#[pyfunction]
fn default_config_toml() -> PyResult<String> {
    toml::to_string_pretty(&RunConfig::default())
        .map_err(|e| PyRuntimeError::new_err(format!("config serialization failed: {e}")))
}

#[pymodule]
fn touchdown_sim(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<LandingEnv>()?;
    m.add_function(wrap_pyfunction!(run_landing_simulation, m)?)?;
    m.add_function(wrap_pyfunction!(default_config_toml, m)?)?;
    Ok(())
}
