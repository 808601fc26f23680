use crate::EngineError;
use osim_common::SeededRandom;
use osim_sched::WorkloadLimits;
use osim_store::fat::{MAX_CHAIN, MIN_CHAIN, TOTAL_CLUSTERS};
use osim_store::frame::TOTAL_FRAMES;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// The five tick intervals the loop accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Speed {
    VerySlow,
    #[default]
    Normal,
    Fast,
    VeryFast,
    Max,
}

impl Speed {
    pub const ALL: [Speed; 5] = [
        Speed::VerySlow,
        Speed::Normal,
        Speed::Fast,
        Speed::VeryFast,
        Speed::Max,
    ];

    pub fn millis(self) -> u64 {
        match self {
            Speed::VerySlow => 2000,
            Speed::Normal => 1000,
            Speed::Fast => 500,
            Speed::VeryFast => 250,
            Speed::Max => 100,
        }
    }

    pub fn interval(self) -> Duration {
        Duration::from_millis(self.millis())
    }

    pub fn from_millis(ms: u64) -> Result<Self, EngineError> {
        Self::ALL
            .into_iter()
            .find(|s| s.millis() == ms)
            .ok_or(EngineError::InvalidSpeed(ms))
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.millis())
    }
}

/// Every tunable of the simulation. Missing JSON fields fall back to the
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub total_frames: usize,
    /// Includes the header cluster
    pub total_clusters: usize,
    pub workload: WorkloadLimits,
    pub chain_len: (u32, u32),
    /// Chance per tick of a new arrival
    pub arrival_probability: f64,
    /// Cap on ready + waiting processes for random arrivals
    pub max_live_processes: usize,
    pub speed: Speed,
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            total_frames: TOTAL_FRAMES,
            total_clusters: TOTAL_CLUSTERS,
            workload: WorkloadLimits::default(),
            chain_len: (MIN_CHAIN, MAX_CHAIN),
            arrival_probability: 0.3,
            max_live_processes: 10,
            speed: Speed::default(),
            seed: None,
        }
    }
}

impl SimConfig {
    /// Reads a JSON config and validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&text).map_err(|e| EngineError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the pools could never satisfy. Every random process
    /// must fit in an empty memory, and every file needs at least one cluster
    /// besides the header.
    pub fn validate(&self) -> Result<(), EngineError> {
        let w = &self.workload;
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));

        if self.total_frames == 0 {
            return invalid("total_frames must be at least 1".into());
        }
        if self.total_clusters < 2 {
            return invalid(format!(
                "total_clusters is {}, need the header plus one data cluster",
                self.total_clusters
            ));
        }
        if w.pages.0 == 0 || w.pages.0 > w.pages.1 || w.pages.1 as usize > self.total_frames {
            return invalid(format!(
                "pages range {:?} must satisfy 1 <= min <= max <= {}",
                w.pages, self.total_frames
            ));
        }
        if w.page_size == 0 || w.pages.1.checked_mul(w.page_size).is_none() {
            return invalid(format!("page_size {} is out of range", w.page_size));
        }
        if w.lifetime.0 == 0 || w.lifetime.0 > w.lifetime.1 {
            return invalid(format!("lifetime range {:?} must satisfy 1 <= min <= max", w.lifetime));
        }
        if w.priority.0 > w.priority.1 || u8::try_from(w.priority.1).is_err() {
            return invalid(format!("priority range {:?} must satisfy min <= max <= 255", w.priority));
        }
        if self.chain_len.0 == 0 || self.chain_len.0 > self.chain_len.1 {
            return invalid(format!(
                "chain_len {:?} must satisfy 1 <= min <= max",
                self.chain_len
            ));
        }
        if !(0.0..=1.0).contains(&self.arrival_probability) {
            return invalid(format!(
                "arrival_probability {} is not in 0..=1",
                self.arrival_probability
            ));
        }
        Ok(())
    }

    pub fn random_source(&self) -> SeededRandom {
        match self.seed {
            Some(seed) => SeededRandom::seeded(seed),
            None => SeededRandom::from_entropy(),
        }
    }
}
