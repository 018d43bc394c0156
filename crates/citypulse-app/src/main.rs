use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use citypulse_app::{ConfigOverrides, JsonLinesBoundary, WorkerConfig, resolve_config, spawn_worker};
use citypulse_core::{Simulation, SpeedMultiplier};
use clap::Parser;
use tracing::info;

/// Run the CityPulse simulation headless and stream its output as NDJSON on stdout.
#[derive(Debug, Parser)]
#[command(name = "citypulse", version, about)]
struct Cli {
    /// JSON file with simulation settings.
    #[arg(long, env = "CITYPULSE_CONFIG")]
    config: Option<PathBuf>,
    /// Number of agents (overrides the config file).
    #[arg(long, env = "CITYPULSE_AGENTS")]
    agents: Option<usize>,
    /// RNG seed for a reproducible population.
    #[arg(long, env = "CITYPULSE_SEED")]
    seed: Option<u64>,
    /// Base tick period in milliseconds at speed x1.
    #[arg(long)]
    tick_ms: Option<u64>,
    /// Wall-clock seconds to run before shutting down.
    #[arg(long, default_value_t = 10.0)]
    duration_secs: f64,
    /// Playback speed: 1, 2 or 4.
    #[arg(long, default_value_t = 1, value_parser = parse_speed_factor)]
    speed: u32,
    /// Activate the optimization protocol after this many seconds.
    #[arg(long)]
    optimize_after_secs: Option<f64>,
    /// Emit complete position and status buffers instead of per-snapshot summaries.
    #[arg(long)]
    full_snapshots: bool,
}

fn parse_speed_factor(raw: &str) -> Result<u32, String> {
    let value: u32 = raw.parse().map_err(|err| format!("{err}"))?;
    SpeedMultiplier::try_from(value)
        .map(SpeedMultiplier::factor)
        .map_err(|err| err.to_string())
}

fn secs(value: f64, flag: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("--{flag} must be a non-negative number of seconds"))
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        agent_count: cli.agents,
        rng_seed: cli.seed,
        base_tick_ms: cli.tick_ms,
    };
    let config = resolve_config(cli.config.as_deref(), &overrides)?;
    let speed = SpeedMultiplier::try_from(cli.speed)?;
    let duration = secs(cli.duration_secs, "duration-secs")?;
    let optimize_after = cli
        .optimize_after_secs
        .map(|value| secs(value, "optimize-after-secs"))
        .transpose()?;

    let boundary = JsonLinesBoundary::new(BufWriter::new(io::stdout()), cli.full_snapshots);
    let sim = Simulation::with_boundary(config, Box::new(boundary))
        .context("failed to initialize simulation")?;
    let worker = spawn_worker(sim, WorkerConfig::default())?;
    let control = worker.control();

    info!(%speed, ?duration, "starting CityPulse headless run");
    control.set_speed(speed)?;
    control.start()?;

    let started = Instant::now();
    let mut optimize_at = optimize_after.map(|delay| started + delay);
    let deadline = started + duration;
    loop {
        let now = Instant::now();
        if let Some(at) = optimize_at
            && now >= at
        {
            control.optimize_productivity()?;
            optimize_at = None;
        }
        if now >= deadline {
            break;
        }
        let next = optimize_at.map_or(deadline, |at| at.min(deadline));
        thread::sleep(next.saturating_duration_since(now));
    }

    control.pause()?;
    let summary = worker.shutdown()?;
    info!(
        tick = summary.tick.0,
        phase = summary.phase.label(),
        productivity = summary.metrics.productivity,
        happiness = summary.metrics.happiness,
        "headless run finished"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .try_init();
}
