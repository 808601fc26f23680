use crate::simulation::{Simulation, Stats};
use crate::EngineError;
use osim_common::{now_millis, ClusterLink, FatEntry, RandomSource};
use osim_store::fat::FatStats;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ProcessRow {
    pub id: String,
    pub state: String,
    pub time_remaining: u32,
    pub size: u32,
    pub priority: u8,
    pub pages: usize,
}

/// Process table plus aggregate counters.
#[derive(Debug, Serialize)]
pub struct StateReport {
    pub processes: Vec<ProcessRow>,
    pub stats: Stats,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct ClusterRow {
    pub cluster: u32,
    /// HEADER, FREE, EOF, NEXT:<n>, or BROKEN for an occupied cluster with no link
    pub status: String,
    pub owner: Option<String>,
    /// Following cluster of the chain, absent on EOF and free clusters
    pub next: Option<u32>,
}

/// One row per FAT entry.
#[derive(Debug, Serialize)]
pub struct FatReport {
    pub clusters: Vec<ClusterRow>,
    pub stats: FatStats,
    pub timestamp: u64,
}

impl StateReport {
    pub fn build<R: RandomSource>(sim: &Simulation<R>) -> Self {
        let processes = sim
            .processes()
            .map(|p| ProcessRow {
                id: p.id.to_string(),
                state: p.state.to_string(),
                time_remaining: p.time_remaining,
                size: p.size,
                priority: p.priority,
                pages: p.page_count(),
            })
            .collect();

        Self {
            processes,
            stats: sim.stats(),
            timestamp: now_millis(),
        }
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::Serialization(e.to_string()))
    }
}

impl FatReport {
    pub fn build<R: RandomSource>(sim: &Simulation<R>) -> Self {
        Self {
            clusters: sim.clusters().iter().map(cluster_row).collect(),
            stats: sim.stats().fat,
            timestamp: now_millis(),
        }
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::Serialization(e.to_string()))
    }
}

pub fn cluster_status(entry: &FatEntry) -> String {
    if entry.is_header() {
        return "HEADER".into();
    }
    if entry.free {
        return "FREE".into();
    }
    match entry.next {
        ClusterLink::Eof => "EOF".into(),
        ClusterLink::Next(n) => format!("NEXT:{n}"),
        ClusterLink::None => "BROKEN".into(),
    }
}

fn cluster_row(entry: &FatEntry) -> ClusterRow {
    ClusterRow {
        cluster: entry.cluster,
        status: cluster_status(entry),
        owner: entry.owner.map(|id| id.to_string()),
        next: match entry.next {
            ClusterLink::Next(n) if !entry.free => Some(n),
            _ => None,
        },
    }
}
