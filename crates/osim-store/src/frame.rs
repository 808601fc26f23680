use crate::StoreError;
use osim_common::{MemoryFrame, PageRef, Process};
use serde::Serialize;
use tracing::debug;

pub const TOTAL_FRAMES: usize = 32;

/// Fixed pool of interchangeable page frames.
#[derive(Debug, Clone)]
pub struct FrameTable {
    frames: Vec<MemoryFrame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub total: usize,
    pub occupied: usize,
    pub free: usize,
}

impl FrameTable {
    pub fn new(total: usize) -> Self {
        Self {
            frames: (0..total as u32).map(MemoryFrame::free).collect(),
        }
    }

    /// Adopts an externally supplied pool as-is.
    pub fn from_frames(frames: Vec<MemoryFrame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[MemoryFrame] {
        &self.frames
    }

    pub fn free_count(&self) -> usize {
        self.frames.iter().filter(|f| !f.is_occupied()).count()
    }

    pub fn can_allocate(&self, page_count: usize) -> bool {
        self.free_count() >= page_count
    }

    /// Maps every page of `process` to a distinct free frame, in page order.
    /// All or nothing: on failure no frame and no page is touched.
    pub fn allocate(&mut self, process: &mut Process) -> Result<(), StoreError> {
        let free: Vec<usize> = self
            .frames
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_occupied())
            .map(|(i, _)| i)
            .collect();

        if free.len() < process.pages.len() {
            return Err(StoreError::MemoryExhausted {
                requested: process.pages.len(),
                free: free.len(),
            });
        }

        for (page, &slot) in process.pages.iter_mut().zip(&free) {
            let frame = &mut self.frames[slot];
            frame.owner = Some(PageRef {
                process: process.id,
                page_number: page.page_number,
            });
            page.frame = Some(frame.frame_number);

            if let Some(entry) = process
                .page_table
                .iter_mut()
                .find(|e| e.page_number == page.page_number)
            {
                entry.frame = Some(frame.frame_number);
                entry.valid = true;
            }
        }

        debug!(
            "{}: mapped {} pages, {} frames left",
            process.id,
            process.pages.len(),
            free.len() - process.pages.len()
        );
        Ok(())
    }

    /// Frees every frame owned by one of the process's pages and returns how
    /// many were released. Frames owned by anyone else are left alone, so a
    /// second call is a no-op.
    pub fn deallocate(&mut self, process: &Process) -> usize {
        let mut released = 0;
        for page in &process.pages {
            let owner = PageRef {
                process: process.id,
                page_number: page.page_number,
            };
            if let Some(frame) = self.frames.iter_mut().find(|f| f.owner == Some(owner)) {
                frame.owner = None;
                released += 1;
            }
        }
        released
    }

    pub fn stats(&self) -> FrameStats {
        let occupied = self.frames.iter().filter(|f| f.is_occupied()).count();
        FrameStats {
            total: self.frames.len(),
            occupied,
            free: self.frames.len() - occupied,
        }
    }
}

impl Default for FrameTable {
    fn default() -> Self {
        Self::new(TOTAL_FRAMES)
    }
}
