pub mod config;
pub mod output;
pub mod physics;
pub mod policy;

#[cfg(feature = "python")]
mod py;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use nalgebra::Vector3;
use rayon::prelude::*;
use touchdown::{EpisodeController, Observation, RewardTable, TickReport};
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::output::{write_csv, write_summary, EpisodeRecord, OutputFiles, Summary, TickRecord};
use crate::physics::SimulatedVehicle;
use crate::policy::build_policy;

#[derive(Debug, Clone, Default)]
pub struct AgentRun {
    pub episodes: Vec<EpisodeRecord>,
    pub ticks: Vec<TickRecord>,
}

/// Seed for agent `agent`, distinct per agent and stable across runs.
pub fn agent_seed(base: u64, agent: usize) -> u64 {
    base.wrapping_add((agent as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Run `cfg.sim.episodes` episodes for one agent on its own vehicle.
pub fn run_agent(cfg: &RunConfig, rewards: Arc<RewardTable>, agent: usize) -> anyhow::Result<AgentRun> {
    let seed = agent_seed(cfg.sim.seed, agent);
    let dt = cfg.sim.dt;

    let mut controller = EpisodeController::new(&cfg.landing, rewards, seed)
        .with_context(|| format!("agent {agent}: invalid landing setup"))?;
    let mut vehicle = SimulatedVehicle::new(&cfg.sim, cfg.landing.pad(), seed);
    let hover = vehicle.params().hover_fraction(cfg.landing.max_thrust_force);
    let mut policy = build_policy(cfg.sim.policy, hover, seed);

    controller.reset(&mut vehicle);
    let mut run = AgentRun::default();

    while run.episodes.len() < cfg.sim.episodes {
        let report = controller
            .tick(&mut vehicle, policy.as_mut(), dt)
            .with_context(|| format!("agent {agent}: tick failed"))?;

        if cfg.sim.record_ticks {
            run.ticks.push(TickRecord::from_report(agent, &report));
        }
        if let Some(record) = episode_record(agent, dt, &report) {
            debug!(
                agent,
                episode = record.episode,
                termination = ?record.termination,
                reward = record.reward,
                "episode finished"
            );
            run.episodes.push(record);
        }

        vehicle.step(dt);
    }

    Ok(run)
}

fn episode_record(agent: usize, dt: f64, report: &TickReport) -> Option<EpisodeRecord> {
    let termination = report.termination?;
    let o = report.observation.as_slice();
    let pad_offset = Vector3::new(
        o[Observation::PAD_OFFSET],
        o[Observation::PAD_OFFSET + 1],
        o[Observation::PAD_OFFSET + 2],
    );
    Some(EpisodeRecord {
        agent,
        episode: report.episode,
        ticks: report.tick,
        duration_s: report.tick as f64 * dt,
        termination,
        reward: report.episode_reward,
        final_pad_distance_m: pad_offset.norm(),
    })
}

pub fn run_simulation(cfg: &RunConfig, output_dir: &Path) -> anyhow::Result<Summary> {
    cfg.validate()?;
    let output_base_dir = resolve_output_base_dir(output_dir);
    let output_dir = create_timestamped_run_dir(&output_base_dir)?;
    let files = OutputFiles::in_dir(&output_dir, cfg.sim.record_ticks);

    info!(
        agents = cfg.sim.agents,
        episodes = cfg.sim.episodes,
        policy = ?cfg.sim.policy,
        dir = %output_dir.display(),
        "starting run"
    );

    // One immutable reward table shared by every agent.
    let rewards = Arc::new(cfg.rewards.clone());
    let runs = (0..cfg.sim.agents)
        .into_par_iter()
        .map(|agent| run_agent(cfg, Arc::clone(&rewards), agent))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut episodes = Vec::with_capacity(cfg.sim.agents * cfg.sim.episodes);
    let mut ticks = Vec::new();
    for run in runs {
        episodes.extend(run.episodes);
        ticks.extend(run.ticks);
    }

    let rows = write_csv(&files.episodes_csv_path, &episodes)?;
    debug!(rows, path = %files.episodes_csv_path.display(), "episodes written");
    if let Some(path) = &files.ticks_csv_path {
        let rows = write_csv(path, &ticks)?;
        debug!(rows, path = %path.display(), "ticks written");
    }

    let summary = Summary::from_episodes(cfg, &episodes, files);
    write_summary(&summary.outputs.summary_path, &summary)?;

    info!(
        episodes = summary.episodes,
        landing_rate = summary.landing_rate,
        mean_reward = summary.reward.mean,
        "run complete"
    );
    Ok(summary)
}

/// Repository root, two levels above this crate's manifest.
pub fn workspace_root_dir() -> PathBuf {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    fs::canonicalize(&root).unwrap_or(root)
}

pub fn default_output_base_dir() -> PathBuf {
    workspace_root_dir().join("output-touchdown")
}

fn resolve_output_base_dir(requested: &Path) -> PathBuf {
    match requested.is_absolute() {
        true => requested.to_path_buf(),
        false => workspace_root_dir().join(requested),
    }
}

/// Fresh `YYYYmmdd-HHMMSS[-NN]` directory under `base_dir`.
fn create_timestamped_run_dir(base_dir: &Path) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(base_dir)
        .with_context(|| format!("failed to create output base directory {}", base_dir.display()))?;

    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let run_dir = std::iter::once(base_dir.join(stamp.to_string()))
        .chain((1_usize..).map(|n| base_dir.join(format!("{stamp}-{n:02}"))))
        .find(|dir| !dir.exists())
        .context("no free run directory name")?;

    fs::create_dir(&run_dir)
        .with_context(|| format!("failed to create run directory {}", run_dir.display()))?;
    Ok(run_dir)
}

#[cfg(test)]
mod tests {
    use touchdown::kinematics::Orientation;
    use touchdown::{PhysicsBackend, StartState, TerminationReason};

    use super::*;
    use crate::config::PolicyKind;
    use crate::policy::DescentPolicy;

    fn small_run(policy: PolicyKind, agents: usize) -> RunConfig {
        let mut cfg = RunConfig::default();
        cfg.sim.policy = policy;
        cfg.sim.agents = agents;
        cfg.sim.episodes = 2;
        cfg.sim.dt = 0.05;
        cfg.landing.episode_timeout = 5.0;
        cfg
    }

    #[test]
    fn descent_policy_lands_an_upright_drop_on_the_pad() {
        let cfg = RunConfig::default();
        let mut controller =
            EpisodeController::new(&cfg.landing, Arc::new(cfg.rewards.clone()), 1).unwrap();
        let mut vehicle = SimulatedVehicle::new(&cfg.sim, cfg.landing.pad(), 1);
        let mut policy = DescentPolicy::new(vehicle.params().hover_fraction(cfg.landing.max_thrust_force));

        controller.reset(&mut vehicle);
        vehicle.reset_to(&StartState {
            position: Vector3::new(0.0, 300.0, 0.0),
            orientation: Orientation::from_degrees(0.0, 30.0, 0.0),
        });

        let mut outcome = None;
        for _ in 0..10_000 {
            let report = controller.tick(&mut vehicle, &mut policy, cfg.sim.dt).unwrap();
            if report.done {
                outcome = report.termination;
                break;
            }
            vehicle.step(cfg.sim.dt);
        }
        assert_eq!(outcome, Some(TerminationReason::LandedOnPad));
    }

    #[test]
    fn agents_are_reproducible() {
        let cfg = small_run(PolicyKind::Random, 1);
        let rewards = Arc::new(cfg.rewards.clone());
        let a = run_agent(&cfg, Arc::clone(&rewards), 0).unwrap();
        let b = run_agent(&cfg, rewards, 0).unwrap();
        assert_eq!(a.episodes.len(), 2);
        let key = |r: &AgentRun| {
            r.episodes
                .iter()
                .map(|e| (e.ticks, e.termination, e.reward.to_bits()))
                .collect::<Vec<_>>()
        };
        assert_eq!(key(&a), key(&b));
    }

    #[test]
    fn run_writes_outputs_for_every_agent() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = small_run(PolicyKind::Idle, 3);
        cfg.sim.record_ticks = true;

        let summary = run_simulation(&cfg, dir.path()).unwrap();
        assert_eq!(summary.episodes, 6);
        assert_eq!(summary.outcomes.values().sum::<usize>(), 6);
        assert!(summary.outputs.output_dir.starts_with(dir.path()));
        assert!(summary.outputs.episodes_csv_path.exists());
        assert!(summary.outputs.summary_path.exists());

        let ticks = summary.outputs.ticks_csv_path.as_ref().unwrap();
        let rows = std::fs::read_to_string(ticks).unwrap().lines().count();
        assert!(rows > 6);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&summary.outputs.summary_path).unwrap()).unwrap();
        assert_eq!(json["episodes"], 6);
        assert_eq!(json["config"]["sim"]["agents"], 3);
    }

    #[test]
    fn invalid_config_is_rejected_before_any_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = small_run(PolicyKind::Idle, 1);
        cfg.sim.dt = 0.0;
        assert!(run_simulation(&cfg, &dir.path().join("never")).is_err());
        assert!(!dir.path().join("never").exists());
    }

    #[test]
    fn agent_seeds_differ() {
        assert_ne!(agent_seed(17, 0), agent_seed(17, 1));
        assert_eq!(agent_seed(17, 0), 17);
    }
}
