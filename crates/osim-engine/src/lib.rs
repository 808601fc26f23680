pub mod config;
pub mod driver;
pub mod report;
pub mod simulation;
pub mod snapshot;
pub mod tests;

pub use config::{SimConfig, Speed};
pub use simulation::{Admission, Simulation, Stats, TickEvent, TickReport};
pub use snapshot::PersistedState;
pub use osim_store::StoreError;

use osim_common::FileId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("File not found: {0}")]
    FileNotFound(FileId),
    #[error("Invalid speed: {0}ms (allowed: 2000, 1000, 500, 250, 100)")]
    InvalidSpeed(u64),
    #[error("Demand Too Large: {pages} pages requested, memory holds {frames} frames")]
    DemandTooLarge { pages: u32, frames: usize },
    #[error("Invalid demand: {0}")]
    InvalidDemand(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization Error: {0}")]
    Serialization(String),
}
