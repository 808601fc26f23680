use crate::EngineError;
use osim_common::{FatEntry, FileEntry, MemoryFrame, Process};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Full machine state handed to a persistence collaborator. Replaying it
/// through `Simulation::restore` makes it the new ground truth.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PersistedState {
    pub memory: Vec<MemoryFrame>,
    pub ready: Vec<Process>,
    pub waiting: Vec<Process>,
    pub fat: Vec<FatEntry>,
    pub files: Vec<FileEntry>,
}

impl PersistedState {
    /// Compact binary form (Postcard)
    pub fn to_bytes(&self) -> Result<Vec<u8>, EngineError> {
        postcard::to_allocvec(self).map_err(|e| EngineError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        postcard::from_bytes(bytes).map_err(|e| EngineError::Serialization(e.to_string()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}
