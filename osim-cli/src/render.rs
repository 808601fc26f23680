use colored::*;
use osim_common::{FatEntry, FileEntry, MemoryFrame, ProcessId, ProcessState, RandomSource};
use osim_engine::report::cluster_status;
use osim_engine::{Simulation, Stats, TickEvent, TickReport};

const ROW: usize = 8;

pub fn process_table<R: RandomSource>(sim: &Simulation<R>) -> String {
    let mut out = format!(
        "{:<6} {:<11} {:>9} {:>5} {:>4}  {}\n",
        "PID", "STATE", "REMAINING", "SIZE", "PRIO", "FRAMES"
    );
    let rows = sim
        .processes()
        .map(|p| (p, true))
        .chain(sim.waiting().map(|p| (p, false)));

    for (p, resident) in rows {
        let state = if resident {
            match p.state {
                ProcessState::Executing => p.state.to_string().green().bold(),
                _ => p.state.to_string().normal(),
            }
        } else {
            "waiting".yellow()
        };
        let frames: Vec<String> = p
            .pages
            .iter()
            .filter_map(|page| page.frame.map(|f| f.to_string()))
            .collect();
        out.push_str(&format!(
            "{:<6} {:<11} {:>9} {:>5} {:>4}  {}\n",
            p.id.to_string(),
            state,
            p.time_remaining,
            p.size,
            p.priority,
            if frames.is_empty() { "-".into() } else { frames.join(",") }
        ));
    }
    out.trim_end().to_string()
}

pub fn id_list(label: &str, ids: &[ProcessId]) -> String {
    if ids.is_empty() {
        return format!("{}: (empty)", label);
    }
    let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    format!("{}: {}", label, ids.join(" -> "))
}

pub fn frame_map(frames: &[MemoryFrame]) -> String {
    let cells: Vec<String> = frames
        .iter()
        .map(|f| match &f.owner {
            Some(owner) => format!("{:>2}:{:<6}", f.frame_number, format!("{}.{}", owner.process, owner.page_number))
                .cyan()
                .to_string(),
            None => format!("{:>2}:{:<6}", f.frame_number, "--").dimmed().to_string(),
        })
        .collect();
    grid(&cells)
}

pub fn cluster_map(entries: &[FatEntry]) -> String {
    let cells: Vec<String> = entries
        .iter()
        .map(|e| {
            let cell = format!("{:>3}:{:<8}", e.cluster, cluster_status(e));
            if e.is_header() {
                cell.magenta().to_string()
            } else if e.free {
                cell.dimmed().to_string()
            } else {
                cell.cyan().to_string()
            }
        })
        .collect();
    grid(&cells)
}

fn grid(cells: &[String]) -> String {
    cells
        .chunks(ROW)
        .map(|row| row.join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn file_list(files: &[FileEntry]) -> String {
    if files.is_empty() {
        return "no files".into();
    }
    files
        .iter()
        .map(|f| {
            let clusters: Vec<String> = f.clusters.iter().map(|c| c.to_string()).collect();
            format!(
                "{:>3}  {:<14} {:<5} [{}]",
                f.id,
                f.name,
                f.owner.to_string(),
                clusters.join(" -> ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn stats(stats: &Stats) -> String {
    let executing = stats
        .executing
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".into());
    format!(
        "tick {}\nmemory   {}/{} frames ({} free)\nstorage  {}/{} clusters ({} free)\nactive   {}\nwaiting  {}\nrunning  {}\nfiles    {}",
        stats.ticks,
        stats.memory.occupied,
        stats.memory.total,
        stats.memory.free,
        stats.fat.occupied,
        stats.fat.total,
        stats.fat.free,
        stats.processes_active,
        stats.processes_waiting,
        executing,
        stats.files,
    )
}

/// Warnings always print; everything else only when echo is on.
pub fn tick_lines(report: &TickReport, echo: bool) -> Vec<String> {
    report
        .events
        .iter()
        .filter_map(|event| {
            let line = match event {
                TickEvent::FileSkipped { owner, reason } => {
                    return Some(format!("{} {} left no file: {}", "Warning:".yellow().bold(), owner, reason));
                }
                _ if !echo => return None,
                TickEvent::Admitted { id, pages } => format!("{} admitted ({} pages)", id, pages),
                TickEvent::Queued { id, pages } => format!("{} waiting for {} frames", id, pages),
                TickEvent::Dispatched(id) => format!("{} on the CPU", id),
                TickEvent::Executed { .. } => return None,
                TickEvent::Terminated { id, frames_released } => {
                    format!("{} finished, {} frames freed", id, frames_released)
                }
                TickEvent::FileCreated { file, owner, clusters } => {
                    format!("{} wrote file {} ({} clusters)", owner, file, clusters)
                }
                TickEvent::Promoted(id) => format!("{} promoted from waiting", id),
            };
            Some(format!("{} {}", format!("[{}]", report.tick).dimmed(), line))
        })
        .collect()
}
