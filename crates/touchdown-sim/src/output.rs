use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use touchdown::{Observation, TerminationReason, TickReport};

use crate::config::RunConfig;

#[derive(Debug, Clone, Serialize)]
pub struct TickRecord {
    pub agent: usize,
    pub episode: u64,
    pub tick: u64,
    pub pitch_deg: f64,
    pub yaw_deg: f64,
    pub roll_deg: f64,
    pub vel_x_mps: f64,
    pub vel_y_mps: f64,
    pub vel_z_mps: f64,
    pub ground_distance_m: f64,
    pub pad_dx_m: f64,
    pub pad_dy_m: f64,
    pub pad_dz_m: f64,
    pub gimbal_x_deg: f64,
    pub gimbal_z_deg: f64,
    pub thrust_n: f64,
    pub reward: f64,
    pub episode_reward: f64,
    pub done: bool,
    pub termination: Option<TerminationReason>,
}

impl TickRecord {
    pub fn from_report(agent: usize, report: &TickReport) -> Self {
        let o = report.observation.as_slice();
        Self {
            agent,
            episode: report.episode,
            tick: report.tick,
            pitch_deg: o[Observation::ORIENTATION],
            yaw_deg: o[Observation::ORIENTATION + 1],
            roll_deg: o[Observation::ORIENTATION + 2],
            vel_x_mps: o[Observation::LINEAR_VELOCITY],
            vel_y_mps: o[Observation::LINEAR_VELOCITY + 1],
            vel_z_mps: o[Observation::LINEAR_VELOCITY + 2],
            ground_distance_m: o[Observation::GROUND_DISTANCE],
            pad_dx_m: o[Observation::PAD_OFFSET],
            pad_dy_m: o[Observation::PAD_OFFSET + 1],
            pad_dz_m: o[Observation::PAD_OFFSET + 2],
            gimbal_x_deg: o[Observation::GIMBAL],
            gimbal_z_deg: o[Observation::GIMBAL + 1],
            thrust_n: o[Observation::THRUST],
            reward: report.reward,
            episode_reward: report.episode_reward,
            done: report.done,
            termination: report.termination,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeRecord {
    pub agent: usize,
    pub episode: u64,
    pub ticks: u64,
    pub duration_s: f64,
    pub termination: TerminationReason,
    pub reward: f64,
    pub final_pad_distance_m: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RewardStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl RewardStats {
    pub fn from_episodes(episodes: &[EpisodeRecord]) -> Self {
        if episodes.is_empty() {
            return Self {
                mean: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }
        let n = episodes.len() as f64;
        let sum: f64 = episodes.iter().map(|e| e.reward).sum();
        Self {
            mean: sum / n,
            min: episodes.iter().map(|e| e.reward).fold(f64::INFINITY, f64::min),
            max: episodes.iter().map(|e| e.reward).fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub config: RunConfig,
    pub episodes: usize,
    pub outcomes: BTreeMap<String, usize>,
    pub landing_rate: f64,
    pub on_pad_rate: f64,
    pub reward: RewardStats,
    pub outputs: OutputFiles,
}

impl Summary {
    pub fn from_episodes(config: &RunConfig, episodes: &[EpisodeRecord], outputs: OutputFiles) -> Self {
        let mut outcomes: BTreeMap<String, usize> = TerminationReason::ALL
            .iter()
            .map(|r| (format!("{r:?}"), 0))
            .collect();
        for e in episodes {
            *outcomes.entry(format!("{:?}", e.termination)).or_default() += 1;
        }

        let n = episodes.len().max(1) as f64;
        let landed = episodes.iter().filter(|e| e.termination.is_landing()).count();
        let on_pad = episodes
            .iter()
            .filter(|e| e.termination == TerminationReason::LandedOnPad)
            .count();

        Self {
            config: config.clone(),
            episodes: episodes.len(),
            outcomes,
            landing_rate: landed as f64 / n,
            on_pad_rate: on_pad as f64 / n,
            reward: RewardStats::from_episodes(episodes),
            outputs,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputFiles {
    pub output_dir: PathBuf,
    pub episodes_csv_path: PathBuf,
    pub ticks_csv_path: Option<PathBuf>,
    pub summary_path: PathBuf,
}

impl OutputFiles {
    pub fn in_dir(output_dir: &Path, record_ticks: bool) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            episodes_csv_path: output_dir.join("episodes.csv"),
            ticks_csv_path: record_ticks.then(|| output_dir.join("ticks.csv")),
            summary_path: output_dir.join("summary.json"),
        }
    }
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display())),
        _ => Ok(()),
    }
}

/// One header row from the record's field names, then one row per record.
pub fn write_csv<'a, T, I>(path: &Path, records: I) -> anyhow::Result<usize>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to open CSV path {}", path.display()))?;

    let mut rows = 0;
    for record in records {
        writer
            .serialize(record)
            .with_context(|| format!("failed to write row {rows} of {}", path.display()))?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}

pub fn write_summary(path: &Path, summary: &Summary) -> anyhow::Result<()> {
    ensure_parent(path)?;
    let file = fs::File::create(path)
        .with_context(|| format!("failed to create summary {}", path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), summary)
        .with_context(|| format!("failed to write summary {}", path.display()))
}
