use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gridfray_app::{console::ConsoleSink, render::draw_grid, report::append_report};
use gridfray_core::{ArenaConfig, Simulation};
use gridfray_strategy::archetype_policy;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "gridfray",
    version,
    about = "Concurrent bot battles on a shared grid arena"
)]
struct Cli {
    /// Grid width in cells.
    #[arg(long, default_value_t = 12)]
    width: i32,

    /// Grid height in cells.
    #[arg(long, default_value_t = 12)]
    height: i32,

    /// Number of bots placed at start.
    #[arg(long, default_value_t = 7)]
    bots: usize,

    /// Number of items placed at start.
    #[arg(long, default_value_t = 5)]
    items: usize,

    /// RNG seed for reproducible placement and decisions.
    #[arg(long)]
    seed: Option<u64>,

    /// Lower bound of the per-action worker sleep, in milliseconds.
    #[arg(long, default_value_t = 100)]
    min_delay_ms: u64,

    /// Upper bound of the per-action worker sleep, in milliseconds.
    #[arg(long, default_value_t = 1_000)]
    max_delay_ms: u64,

    /// Milliseconds between item drops; defaults to width * height * 20.
    #[arg(long)]
    spawn_interval_ms: Option<u64>,

    /// File the timing table is appended to.
    #[arg(long, default_value = "thread_times.txt")]
    report_path: PathBuf,

    /// Suppress event narration and grid rendering.
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = ArenaConfig {
        width: cli.width,
        height: cli.height,
        bot_count: cli.bots,
        item_count: cli.items,
        rng_seed: cli.seed,
        min_action_delay_ms: cli.min_delay_ms,
        max_action_delay_ms: cli.max_delay_ms,
        item_spawn_interval_ms: cli.spawn_interval_ms,
    };

    let simulation = Simulation::new(config.clone(), Box::new(ConsoleSink::new(cli.quiet)))
        .context("failed to build the arena")?;
    let arena = simulation.arena();

    if !cli.quiet {
        println!("{}", draw_grid(&arena.view()));
    }
    info!(
        bots = config.bot_count,
        items = config.item_count,
        width = config.width,
        height = config.height,
        "starting simulation"
    );

    let report = simulation
        .run(archetype_policy)
        .context("simulation failed")?;

    if !cli.quiet {
        println!("{}", draw_grid(&arena.view()));
    }
    append_report(&cli.report_path, &config, &report.timings)
        .with_context(|| format!("failed to write {}", cli.report_path.display()))?;
    info!(
        workers = report.timings.len(),
        total_wait_ms = report.total_wait.as_secs_f64() * 1_000.0,
        report = %cli.report_path.display(),
        "simulation finished"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
