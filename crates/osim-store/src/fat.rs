use crate::content;
use crate::StoreError;
use osim_common::{now_millis, ClusterLink, FatEntry, FileEntry, FileId, ProcessId, RandomSource};
use serde::Serialize;
use tracing::debug;

pub const TOTAL_CLUSTERS: usize = 128;
pub const HEADER_CLUSTER: u32 = 0;

/// Bounds on the length of a generated file's chain.
pub const MIN_CHAIN: u32 = 1;
pub const MAX_CHAIN: u32 = 5;

/// FAT-style table of storage clusters. Cluster 0 is the header and is
/// never handed out.
#[derive(Debug, Clone)]
pub struct ClusterAllocator {
    table: Vec<FatEntry>,
    file_counter: u32,
    chain_len: (u32, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FatStats {
    /// Allocatable clusters (header excluded)
    pub total: usize,
    pub occupied: usize,
    pub free: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Start index is outside the table or a free cluster
    BadStart(u32),
    /// A link points at a free cluster or outside the table
    Broken { at: u32 },
    /// The walk revisited a cluster
    Cycle { at: u32 },
}

impl ClusterAllocator {
    pub fn new(total: usize) -> Self {
        Self::with_chain_len(total, MIN_CHAIN, MAX_CHAIN)
    }

    pub fn with_chain_len(total: usize, min: u32, max: u32) -> Self {
        Self {
            table: fresh_table(total),
            file_counter: 0,
            chain_len: (min, max.max(min)),
        }
    }

    /// Adopts an externally supplied table without validation.
    pub fn restore(&mut self, table: Vec<FatEntry>) {
        self.table = table;
    }

    /// Frees every cluster and restarts file numbering.
    pub fn reset(&mut self) {
        self.table = fresh_table(self.table.len());
        self.file_counter = 0;
    }

    pub fn entries(&self) -> &[FatEntry] {
        &self.table
    }

    pub fn file_counter(&self) -> u32 {
        self.file_counter
    }

    /// Moves the file counter forward so the next file id is above `at_least`.
    pub fn advance_file_counter(&mut self, at_least: u32) {
        self.file_counter = self.file_counter.max(at_least);
    }

    pub fn free_count(&self) -> usize {
        self.table
            .iter()
            .filter(|e| e.free && !e.is_header())
            .count()
    }

    pub fn can_create_file(&self) -> bool {
        self.free_count() >= 1
    }

    pub fn is_full(&self) -> bool {
        self.free_count() == 0
    }

    /// Materializes a file for `owner` on a chain of random length.
    /// Free clusters are taken lowest index first; that order is the chain
    /// order. Nothing changes when the chain does not fit.
    pub fn create_file(
        &mut self,
        owner: ProcessId,
        demanded_size: u32,
        rng: &mut dyn RandomSource,
    ) -> Result<FileEntry, StoreError> {
        let needed = rng.range(self.chain_len.0, self.chain_len.1) as usize;

        let chain: Vec<u32> = self
            .table
            .iter()
            .filter(|e| e.free && !e.is_header())
            .map(|e| e.cluster)
            .take(needed)
            .collect();

        if chain.len() < needed {
            return Err(StoreError::StorageExhausted {
                needed,
                free: chain.len(),
            });
        }

        for (i, &cluster) in chain.iter().enumerate() {
            let next = match chain.get(i + 1) {
                Some(&n) => ClusterLink::Next(n),
                None => ClusterLink::Eof,
            };
            let entry = &mut self.table[cluster as usize];
            entry.free = false;
            entry.owner = Some(owner);
            entry.next = next;
        }

        self.file_counter += 1;
        let id = FileId(self.file_counter);
        debug!("file {} for {}: clusters {:?}", id, owner, chain);

        Ok(FileEntry {
            id,
            name: format!("file_{}.txt", id.0),
            owner,
            size: chain.len() as u32,
            content: content::generate(demanded_size, rng),
            clusters: chain,
            created_at: now_millis(),
        })
    }

    /// Returns the file's clusters to the pool. Clusters that are already
    /// free or now belong to another owner are skipped, which makes a
    /// repeated delete a no-op.
    pub fn delete_file(&mut self, file: &FileEntry) -> usize {
        let mut released = 0;
        for &cluster in &file.clusters {
            if cluster == HEADER_CLUSTER {
                continue;
            }
            if let Some(entry) = self.table.get_mut(cluster as usize) {
                if !entry.free && entry.owner == Some(file.owner) {
                    entry.free = true;
                    entry.next = ClusterLink::None;
                    entry.owner = None;
                    released += 1;
                }
            }
        }
        released
    }

    /// Follows `next` links from `start` to the EOF marker. The walk is
    /// bounded by the table size.
    pub fn chain(&self, start: u32) -> Result<Vec<u32>, ChainError> {
        match self.table.get(start as usize) {
            Some(e) if !e.free && !e.is_header() => {}
            _ => return Err(ChainError::BadStart(start)),
        }

        let mut seen = vec![false; self.table.len()];
        let mut visited = Vec::new();
        let mut current = start;

        loop {
            if seen[current as usize] {
                return Err(ChainError::Cycle { at: current });
            }
            seen[current as usize] = true;
            visited.push(current);

            match self.table[current as usize].next {
                ClusterLink::Eof => return Ok(visited),
                ClusterLink::Next(n) => match self.table.get(n as usize) {
                    Some(e) if !e.free && !e.is_header() => current = n,
                    _ => return Err(ChainError::Broken { at: current }),
                },
                ClusterLink::None => return Err(ChainError::Broken { at: current }),
            }
        }
    }

    pub fn stats(&self) -> FatStats {
        let occupied = self
            .table
            .iter()
            .filter(|e| !e.free && !e.is_header())
            .count();
        FatStats {
            total: self.table.len().saturating_sub(1),
            occupied,
            free: self.free_count(),
        }
    }
}

impl Default for ClusterAllocator {
    fn default() -> Self {
        Self::new(TOTAL_CLUSTERS)
    }
}

fn fresh_table(total: usize) -> Vec<FatEntry> {
    (0..total as u32)
        .map(|cluster| FatEntry {
            cluster,
            free: cluster != HEADER_CLUSTER,
            next: ClusterLink::None,
            owner: None,
        })
        .collect()
}
