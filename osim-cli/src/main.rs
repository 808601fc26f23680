mod commands;
mod render;

use clap::{Parser, Subcommand};
use colored::*;
use commands::Command;
use osim_engine::report::StateReport;
use osim_engine::{driver, PersistedState, SimConfig, Simulation, Speed};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(name = "osim")]
#[command(about = "Watch a tiny OS schedule processes, page memory and fill a FAT", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tick interval in ms: 2000, 1000, 500, 250 or 100
    #[arg(long)]
    speed: Option<u64>,

    /// Seed for a reproducible workload
    #[arg(long)]
    seed: Option<u64>,

    /// Start from a saved snapshot
    #[arg(long)]
    load: Option<PathBuf>,

    /// Show the engine's own log lines
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive shell (Default)
    Shell,
    /// Run a number of ticks without delay and print the state report
    Run { ticks: u64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            LevelFilter::INFO
        } else {
            LevelFilter::ERROR
        })
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if let Some(ms) = cli.speed {
        config.speed = Speed::from_millis(ms)?;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    config.validate()?;

    let mut sim = Simulation::new(config);
    if let Some(path) = &cli.load {
        sim.restore(PersistedState::load(path)?);
    }

    match cli.command {
        Some(Commands::Run { ticks }) => run_batch(sim, ticks)?,
        Some(Commands::Shell) | None => start_repl(sim).await?,
    }

    Ok(())
}

fn run_batch(mut sim: Simulation, ticks: u64) -> anyhow::Result<()> {
    sim.start();
    for _ in 0..ticks {
        if let Some(report) = sim.tick() {
            for line in render::tick_lines(&report, false) {
                eprintln!("{}", line);
            }
        }
    }
    sim.stop();
    println!("{}", StateReport::build(&sim).to_json()?);
    Ok(())
}

async fn start_repl(sim: Simulation) -> anyhow::Result<()> {
    println!(
        "{}",
        "OS simulator shell. Type 'help' for commands, 'start' to run, 'exit' to quit.".green()
    );

    // 1. Background ticker plus an echo of what each tick did
    let handle = driver::spawn(sim);
    let echo = Arc::new(AtomicBool::new(true));
    let mut reports = handle.subscribe();
    let printer_echo = echo.clone();
    tokio::spawn(async move {
        loop {
            match reports.recv().await {
                Ok(report) => {
                    for line in render::tick_lines(&report, printer_echo.load(Ordering::Relaxed)) {
                        println!("{}", line);
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    // 2. Start Read-Eval-Print Loop
    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline(&format!("{} > ", "osim".blue().bold()));
        match readline {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                rl.add_history_entry(input)?;

                let cmd = match commands::parse(input) {
                    Ok(cmd) => cmd,
                    Err(e) => {
                        println!("{} {}", "Error:".red(), e);
                        continue;
                    }
                };
                match cmd {
                    Command::Exit => break,
                    Command::Echo(on) => {
                        echo.store(on, Ordering::Relaxed);
                        continue;
                    }
                    _ => {}
                }

                // 3. Lock, execute, unlock
                let result = {
                    let mut sim = handle.lock().await;
                    commands::execute(&mut *sim, cmd)
                };
                match result {
                    Ok(output) => println!("{}", output),
                    Err(e) => println!("{} {:#}", "Error:".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
