use std::path::PathBuf;

use clap::Parser;
use touchdown_sim::config::{PolicyKind, RunConfig};
use touchdown_sim::run_simulation;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Vertical-landing episodes on a synthetic rigid-body vehicle")]
struct Cli {
    /// TOML run configuration; built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output base directory (relative paths are resolved from workspace root)
    #[arg(long, default_value = "output-touchdown")]
    output: PathBuf,

    /// Episodes per agent
    #[arg(long)]
    episodes: Option<usize>,

    /// Agents run in parallel
    #[arg(long)]
    agents: Option<usize>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Tick length in seconds
    #[arg(long)]
    dt: Option<f64>,

    /// Control policy driving every agent
    #[arg(long, value_enum)]
    policy: Option<PolicyKind>,

    /// Write a per-tick CSV next to the episode CSV
    #[arg(long)]
    record_ticks: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut cfg = match &cli.config {
        Some(path) => RunConfig::from_toml_file(path)?,
        None => RunConfig::default(),
    };
    if let Some(v) = cli.episodes {
        cfg.sim.episodes = v;
    }
    if let Some(v) = cli.agents {
        cfg.sim.agents = v;
    }
    if let Some(v) = cli.seed {
        cfg.sim.seed = v;
    }
    if let Some(v) = cli.dt {
        cfg.sim.dt = v;
    }
    if let Some(v) = cli.policy {
        cfg.sim.policy = v;
    }
    if cli.record_ticks {
        cfg.sim.record_ticks = true;
    }

    let summary = run_simulation(&cfg, &cli.output)?;

    println!(
        "Run complete. Episodes: {} | Landed: {:.1}% | On pad: {:.1}%",
        summary.episodes,
        100.0 * summary.landing_rate,
        100.0 * summary.on_pad_rate
    );
    println!(
        "Reward mean/min/max: {:.4} | {:.4} | {:.4}",
        summary.reward.mean, summary.reward.min, summary.reward.max
    );
    for (outcome, count) in &summary.outcomes {
        println!("  {outcome}: {count}");
    }
    println!("Run directory: {}", summary.outputs.output_dir.display());
    println!("Episodes CSV: {}", summary.outputs.episodes_csv_path.display());
    if let Some(path) = &summary.outputs.ticks_csv_path {
        println!("Ticks CSV: {}", path.display());
    }
    println!("Summary: {}", summary.outputs.summary_path.display());

    Ok(())
}
