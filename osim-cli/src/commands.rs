use crate::render;
use anyhow::{bail, Context, Result};
use osim_common::{FileId, RandomSource};
use osim_engine::report::{FatReport, StateReport};
use osim_engine::{Admission, PersistedState, Simulation};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    Toggle,
    /// Random process, or explicit pages and lifetime
    Add(Option<(u32, u32)>),
    Speed(u64),
    Rm(FileId),
    Reset,
    Ps,
    Queue,
    Wait,
    Mem,
    Fat,
    Files,
    Cat(FileId),
    Stats,
    Report(Option<PathBuf>),
    FatReport(Option<PathBuf>),
    Save(PathBuf),
    Load(PathBuf),
    Check,
    Echo(bool),
    Help,
    Exit,
}

pub const HELP: &str = "\
start | stop | toggle     control the tick loop
add [pages lifetime]      create a process (random when no arguments)
speed <ms>                2000, 1000, 500, 250 or 100
rm <file id>              delete a file and free its clusters
reset                     drop every process and file
ps | queue | wait         process table, ready order, waiting order
mem | fat | files         frame map, cluster map, file list
cat <file id>             print a file's contents
stats                     aggregate counters
report [path]             process table as JSON
fat-report [path]         cluster table as JSON
save <path> | load <path> snapshot the whole machine
check                     verify resource accounting
echo on|off               show or hide tick events
exit";

pub fn parse(line: &str) -> Result<Command> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        bail!("empty command");
    };
    let args: Vec<&str> = words.collect();

    let cmd = match (head.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("start", []) => Command::Start,
        ("stop", []) => Command::Stop,
        ("toggle", []) => Command::Toggle,
        ("add", []) => Command::Add(None),
        ("add", [pages, lifetime]) => Command::Add(Some((number(pages)?, number(lifetime)?))),
        ("speed", [ms]) => Command::Speed(number(ms)?),
        ("rm", [id]) => Command::Rm(FileId(number(id)?)),
        ("reset", []) => Command::Reset,
        ("ps", []) => Command::Ps,
        ("queue", []) => Command::Queue,
        ("wait", []) => Command::Wait,
        ("mem", []) => Command::Mem,
        ("fat", []) => Command::Fat,
        ("files", []) => Command::Files,
        ("cat", [id]) => Command::Cat(FileId(number(id)?)),
        ("stats", []) => Command::Stats,
        ("report", []) => Command::Report(None),
        ("report", [path]) => Command::Report(Some(PathBuf::from(path))),
        ("fat-report", []) => Command::FatReport(None),
        ("fat-report", [path]) => Command::FatReport(Some(PathBuf::from(path))),
        ("save", [path]) => Command::Save(PathBuf::from(path)),
        ("load", [path]) => Command::Load(PathBuf::from(path)),
        ("check", []) => Command::Check,
        ("echo", ["on"]) => Command::Echo(true),
        ("echo", ["off"]) => Command::Echo(false),
        ("help", []) => Command::Help,
        ("exit" | "quit", []) => Command::Exit,
        (other, _) => bail!("unknown command or arguments: '{}' (try 'help')", other),
    };
    Ok(cmd)
}

fn number<T: std::str::FromStr>(word: &str) -> Result<T> {
    word.parse()
        .ok()
        .with_context(|| format!("'{}' is not a number", word))
}

/// Applies one command and returns the text to print. `Echo` and `Exit`
/// belong to the shell and are answered with an empty string.
pub fn execute<R: RandomSource>(sim: &mut Simulation<R>, cmd: Command) -> Result<String> {
    let out = match cmd {
        Command::Start => {
            sim.start();
            format!("running at {}", sim.speed())
        }
        Command::Stop => {
            sim.stop();
            "stopped".into()
        }
        Command::Toggle => {
            if sim.toggle() {
                format!("running at {}", sim.speed())
            } else {
                "stopped".into()
            }
        }
        Command::Add(demand) => {
            let (id, admission) = match demand {
                Some((pages, lifetime)) => sim.add_process_with(pages, lifetime)?,
                None => sim.add_process(),
            };
            match admission {
                Admission::Ready => format!("{} admitted", id),
                Admission::Waiting => format!("{} is waiting for memory", id),
            }
        }
        Command::Speed(ms) => format!("tick every {}", sim.set_speed_millis(ms)?),
        Command::Rm(id) => {
            let file = sim.delete_file(id)?;
            format!("deleted {} ({} clusters freed)", file.name, file.clusters.len())
        }
        Command::Reset => {
            sim.reset();
            "machine reset".into()
        }
        Command::Ps => render::process_table(sim),
        Command::Queue => render::id_list("ready", &sim.ready_order()),
        Command::Wait => render::id_list("waiting", &sim.waiting_order()),
        Command::Mem => render::frame_map(sim.frames()),
        Command::Fat => render::cluster_map(sim.clusters()),
        Command::Files => render::file_list(sim.files()),
        Command::Cat(id) => match sim.file(id) {
            Some(file) => file.content.clone(),
            None => bail!("file {} not found", id),
        },
        Command::Stats => render::stats(&sim.stats()),
        Command::Report(path) => emit(StateReport::build(sim).to_json()?, path)?,
        Command::FatReport(path) => emit(FatReport::build(sim).to_json()?, path)?,
        Command::Save(path) => {
            sim.snapshot()
                .save(&path)
                .with_context(|| format!("Failed to save {}", path.display()))?;
            format!("saved to {}", path.display())
        }
        Command::Load(path) => {
            let state = PersistedState::load(&path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            sim.restore(state);
            format!("loaded {} (stopped)", path.display())
        }
        Command::Check => match sim.check_invariants() {
            Ok(()) => "all resources accounted for".into(),
            Err(problem) => bail!("inconsistent state: {}", problem),
        },
        Command::Help => HELP.into(),
        Command::Echo(_) | Command::Exit => String::new(),
    };
    Ok(out)
}

fn emit(json: String, path: Option<PathBuf>) -> Result<String> {
    match path {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(format!("written to {}", path.display()))
        }
        None => Ok(json),
    }
}
