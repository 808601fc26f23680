use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Sequence-numbered process identifier, displayed as `P<n>`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub u32);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Executing,
    Terminated,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProcessState::Ready => "ready",
            ProcessState::Executing => "executing",
            ProcessState::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// One page of a process's memory demand.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page {
    pub process: ProcessId,
    pub page_number: u32,
    /// `None` until the frame allocator grants a frame
    pub frame: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PageTableEntry {
    pub page_number: u32,
    pub frame: Option<u32>,
    pub valid: bool,
}

/// A synthetic process: a memory demand plus a countdown of ticks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Process {
    pub id: ProcessId,
    /// Page count times the page size
    pub size: u32,
    pub pages: Vec<Page>,
    pub page_table: Vec<PageTableEntry>,
    pub state: ProcessState,
    pub time_remaining: u32,
    /// Carried for display, never used for ordering
    pub priority: u8,
    pub created_at: u64,
}

impl Process {
    /// Builds a ready process with `page_count` unassigned pages.
    pub fn new(
        id: ProcessId,
        page_count: u32,
        page_size: u32,
        time_remaining: u32,
        priority: u8,
    ) -> Self {
        let pages: Vec<Page> = (0..page_count)
            .map(|page_number| Page {
                process: id,
                page_number,
                frame: None,
            })
            .collect();

        let page_table = pages
            .iter()
            .map(|p| PageTableEntry {
                page_number: p.page_number,
                frame: None,
                valid: false,
            })
            .collect();

        Self {
            id,
            size: page_count.saturating_mul(page_size),
            pages,
            page_table,
            state: ProcessState::Ready,
            time_remaining,
            priority,
            created_at: now_millis(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// True once every page has been mapped to a frame.
    pub fn is_resident(&self) -> bool {
        !self.pages.is_empty() && self.pages.iter().all(|p| p.frame.is_some())
    }
}

/// The (process, page) pair that owns a frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRef {
    pub process: ProcessId,
    pub page_number: u32,
}

/// One slot of the fixed memory pool.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MemoryFrame {
    pub frame_number: u32,
    pub owner: Option<PageRef>,
}

impl MemoryFrame {
    pub fn free(frame_number: u32) -> Self {
        Self {
            frame_number,
            owner: None,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.owner.is_some()
    }
}

/// The `next` field of a FAT entry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterLink {
    /// Free cluster (or the header)
    None,
    Next(u32),
    /// Last cluster of a chain
    Eof,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FatEntry {
    pub cluster: u32,
    pub free: bool,
    pub next: ClusterLink,
    pub owner: Option<ProcessId>,
}

impl FatEntry {
    pub fn is_header(&self) -> bool {
        self.cluster == 0
    }
}

/// A file materialized from a terminated process.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub id: FileId,
    pub name: String,
    pub owner: ProcessId,
    /// Chain length in clusters
    pub size: u32,
    pub content: String,
    /// Cluster indices in chain order
    pub clusters: Vec<u32>,
    pub created_at: u64,
}

/// Milliseconds since the Unix epoch; zero if the clock is before it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
