pub mod model;
pub mod random;

// Re-export commonly used types
pub use model::{
    now_millis, ClusterLink, FatEntry, FileEntry, FileId, MemoryFrame, Page, PageRef,
    PageTableEntry, Process, ProcessId, ProcessState,
};
pub use random::{RandomSource, ScriptedRandom, SeededRandom};
