mod runner;

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "osim-server")]
#[command(about = "Runs the OS resource-manager simulation headless", long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tick interval in ms: 2000, 1000, 500, 250 or 100
    #[arg(long)]
    speed: Option<u64>,

    /// Seed for a reproducible workload
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many ticks (default: run until Ctrl-C)
    #[arg(long)]
    ticks: Option<u64>,

    /// Snapshot to resume from
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Where the reports and the final snapshot go
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize Logging
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    // 2. Assemble the configuration
    let config = runner::build_config(args.config.as_deref(), args.speed, args.seed)?;
    info!(
        "🚀 Simulation starting: {} frames, {} clusters, tick every {}",
        config.total_frames, config.total_clusters, config.speed
    );

    // 3. Tick until done
    let summary = runner::run(config, args.ticks, args.resume.as_deref(), &args.out).await?;

    info!(
        "✅ Stopped after {} ticks: {} active, {} waiting, {} files, memory {}/{}, FAT {}/{}",
        summary.ticks,
        summary.stats.processes_active,
        summary.stats.processes_waiting,
        summary.stats.files,
        summary.stats.memory.occupied,
        summary.stats.memory.total,
        summary.stats.fat.occupied,
        summary.stats.fat.total,
    );
    Ok(())
}
