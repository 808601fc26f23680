use anyhow::{Context, Result};
use osim_common::RandomSource;
use osim_engine::report::{FatReport, StateReport};
use osim_engine::{driver, PersistedState, SimConfig, Simulation, Speed, Stats, TickEvent, TickReport};
use std::fs;
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

pub const STATE_REPORT: &str = "state-report.json";
pub const FAT_REPORT: &str = "fat-report.json";
pub const SNAPSHOT: &str = "state.snap";

pub struct Summary {
    pub ticks: u64,
    pub stats: Stats,
}

/// Config file first, then command-line overrides.
pub fn build_config(path: Option<&Path>, speed: Option<u64>, seed: Option<u64>) -> Result<SimConfig> {
    let mut config = match path {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => SimConfig::default(),
    };
    if let Some(ms) = speed {
        config.speed = Speed::from_millis(ms)?;
    }
    if seed.is_some() {
        config.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

/// Ticks until `limit` is reached or Ctrl-C, then writes the reports and a
/// snapshot into `out`.
pub async fn run(
    config: SimConfig,
    limit: Option<u64>,
    resume: Option<&Path>,
    out: &Path,
) -> Result<Summary> {
    let mut sim = Simulation::new(config);
    if let Some(path) = resume {
        let state = PersistedState::load(path)
            .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
        info!(
            "📂 Resumed {} processes and {} files from {}",
            state.ready.len() + state.waiting.len(),
            state.files.len(),
            path.display()
        );
        sim.restore(state);
    }
    sim.start();

    let handle = driver::spawn(sim);
    let mut reports = handle.subscribe();

    loop {
        tokio::select! {
            received = reports.recv() => match received {
                Ok(report) => {
                    log_report(&report);
                    if limit.is_some_and(|n| report.tick >= n) {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("Dropped {} tick reports", n),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    let summary = {
        let mut sim = handle.lock().await;
        sim.stop();
        write_outputs(&*sim, out)?;
        Summary {
            ticks: sim.tick_count(),
            stats: sim.stats(),
        }
    };
    handle.shutdown().await;
    Ok(summary)
}

pub fn write_outputs<R: RandomSource>(sim: &Simulation<R>, out: &Path) -> Result<()> {
    fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;

    fs::write(out.join(STATE_REPORT), StateReport::build(sim).to_json()?)?;
    fs::write(out.join(FAT_REPORT), FatReport::build(sim).to_json()?)?;
    sim.snapshot().save(out.join(SNAPSHOT))?;

    info!("💾 Reports written to {}", out.display());
    Ok(())
}

fn log_report(report: &TickReport) {
    for event in &report.events {
        match event {
            TickEvent::Terminated { id, frames_released } => {
                info!("tick {}: {} finished, {} frames released", report.tick, id, frames_released)
            }
            TickEvent::FileCreated { file, owner, clusters } => {
                info!("tick {}: {} wrote file {} ({} clusters)", report.tick, owner, file, clusters)
            }
            TickEvent::FileSkipped { .. } => {}
            other => debug!("tick {}: {:?}", report.tick, other),
        }
    }
}
