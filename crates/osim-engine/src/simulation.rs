use crate::config::{SimConfig, Speed};
use crate::snapshot::PersistedState;
use crate::EngineError;
use osim_common::{
    FatEntry, FileEntry, FileId, MemoryFrame, Process, ProcessId, ProcessState, RandomSource,
    SeededRandom,
};
use osim_sched::lifecycle::{
    transition_dispatched, transition_executing, transition_ready, transition_terminated,
};
use osim_sched::{ProcessFactory, ReadyQueue};
use osim_store::fat::{ClusterAllocator, FatStats};
use osim_store::frame::{FrameStats, FrameTable};
use osim_store::StoreError;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Where a new process ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Ready,
    Waiting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickEvent {
    Admitted { id: ProcessId, pages: usize },
    Queued { id: ProcessId, pages: usize },
    Dispatched(ProcessId),
    Executed { id: ProcessId, remaining: u32 },
    Terminated { id: ProcessId, frames_released: usize },
    FileCreated { file: FileId, owner: ProcessId, clusters: usize },
    /// Storage could not hold the file; the tick carried on
    FileSkipped { owner: ProcessId, reason: StoreError },
    Promoted(ProcessId),
}

/// Everything one tick did, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub events: Vec<TickEvent>,
}

impl TickReport {
    /// Non-fatal problems worth showing to a user.
    pub fn warnings(&self) -> impl Iterator<Item = &TickEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, TickEvent::FileSkipped { .. }))
    }

    pub fn terminated(&self) -> Option<ProcessId> {
        self.events.iter().find_map(|e| match e {
            TickEvent::Terminated { id, .. } => Some(*id),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub memory: FrameStats,
    pub fat: FatStats,
    pub processes_active: usize,
    pub processes_waiting: usize,
    pub executing: Option<ProcessId>,
    pub files: usize,
    pub ticks: u64,
}

/// One self-contained simulated machine. Every mutation goes through
/// `&mut self`, so a tick is a single critical section.
pub struct Simulation<R: RandomSource = SeededRandom> {
    config: SimConfig,
    rng: R,
    factory: ProcessFactory,
    ready: ReadyQueue,
    waiting: VecDeque<Process>,
    frames: FrameTable,
    fat: ClusterAllocator,
    files: Vec<FileEntry>,
    executing: Option<ProcessId>,
    running: bool,
    speed: Speed,
    ticks: u64,
}

impl Simulation<SeededRandom> {
    pub fn new(config: SimConfig) -> Self {
        let rng = config.random_source();
        Self::with_random(config, rng)
    }
}

impl<R: RandomSource> Simulation<R> {
    pub fn with_random(config: SimConfig, rng: R) -> Self {
        Self {
            factory: ProcessFactory::new(config.workload),
            ready: ReadyQueue::new(),
            waiting: VecDeque::new(),
            frames: FrameTable::new(config.total_frames),
            fat: ClusterAllocator::with_chain_len(
                config.total_clusters,
                config.chain_len.0,
                config.chain_len.1,
            ),
            files: Vec::new(),
            executing: None,
            running: false,
            speed: config.speed,
            ticks: 0,
            config,
            rng,
        }
    }

    // --- Tick ---

    /// Runs one step of the loop. Does nothing while stopped.
    pub fn tick(&mut self) -> Option<TickReport> {
        if !self.running {
            return None;
        }
        self.ticks += 1;
        let mut events = Vec::new();

        // 1. Never leave the machine idle while storage has room
        if self.ready.is_empty() && self.waiting.is_empty() && !self.fat.is_full() {
            self.spawn(&mut events);
        }

        // 2. Dispatch
        self.dispatch(&mut events);

        // 3. Termination, reclamation, file, promotion
        let finished = self
            .ready
            .peek_head()
            .is_some_and(|p| Some(p.id) == self.executing && p.time_remaining == 0);
        if finished {
            self.terminate_head(&mut events);
            self.promote_waiting(&mut events);
        }

        // 4. Random arrival. The coin is flipped every tick.
        let coin = self.rng.chance(self.config.arrival_probability);
        if coin
            && self.ready.len() + self.waiting.len() < self.config.max_live_processes
            && !self.fat.is_full()
        {
            self.spawn(&mut events);
        }

        Some(TickReport {
            tick: self.ticks,
            events,
        })
    }

    fn dispatch(&mut self, events: &mut Vec<TickEvent>) {
        let Some(head) = self.ready.head_mut() else {
            return;
        };

        if self.executing == Some(head.id) {
            transition_executing(head);
            debug!("{} ran, {} ticks left", head.id, head.time_remaining);
            events.push(TickEvent::Executed {
                id: head.id,
                remaining: head.time_remaining,
            });
        } else {
            // The first tick on the CPU is free
            transition_dispatched(head);
            self.executing = Some(head.id);
            info!("{} dispatched ({} ticks)", head.id, head.time_remaining);
            events.push(TickEvent::Dispatched(head.id));
        }
    }

    fn terminate_head(&mut self, events: &mut Vec<TickEvent>) {
        let Some(head) = self.ready.head_mut() else {
            return;
        };
        transition_terminated(head);
        let released = self.frames.deallocate(head);

        let Some(done) = self.ready.dequeue() else {
            return;
        };
        self.executing = None;
        info!("{} terminated, {} frames released", done.id, released);
        events.push(TickEvent::Terminated {
            id: done.id,
            frames_released: released,
        });

        match self.fat.create_file(done.id, done.size, &mut self.rng) {
            Ok(file) => {
                info!("{} written by {} on {} clusters", file.name, done.id, file.size);
                events.push(TickEvent::FileCreated {
                    file: file.id,
                    owner: done.id,
                    clusters: file.clusters.len(),
                });
                self.files.push(file);
            }
            Err(reason) => {
                warn!("FAT full, no file for {}: {}", done.id, reason);
                events.push(TickEvent::FileSkipped {
                    owner: done.id,
                    reason,
                });
            }
        }
    }

    /// Gives the oldest waiting process a chance at memory. At most one per
    /// call, and never out of order.
    fn promote_waiting(&mut self, events: &mut Vec<TickEvent>) {
        let fits = self
            .waiting
            .front()
            .is_some_and(|p| self.frames.can_allocate(p.page_count()));
        if !fits {
            return;
        }

        if let Some(mut process) = self.waiting.pop_front() {
            match self.frames.allocate(&mut process) {
                Ok(()) => {
                    info!("{} promoted from waiting", process.id);
                    events.push(TickEvent::Promoted(process.id));
                    self.ready.enqueue(process);
                }
                Err(_) => self.waiting.push_front(process),
            }
        }
    }

    fn spawn(&mut self, events: &mut Vec<TickEvent>) -> (ProcessId, Admission) {
        let process = self.factory.create(&mut self.rng);
        let (id, pages) = (process.id, process.page_count());
        let admission = self.admit(process);
        events.push(match admission {
            Admission::Ready => TickEvent::Admitted { id, pages },
            Admission::Waiting => TickEvent::Queued { id, pages },
        });
        (id, admission)
    }

    // --- Commands ---

    /// Grants memory and queues the process, or parks it on the waiting
    /// list when the pool is short.
    pub fn admit(&mut self, mut process: Process) -> Admission {
        match self.frames.allocate(&mut process) {
            Ok(()) => {
                info!("{} admitted with {} pages", process.id, process.page_count());
                self.ready.enqueue(process);
                Admission::Ready
            }
            Err(reason) => {
                warn!("{} waiting for memory: {}", process.id, reason);
                self.waiting.push_back(process);
                Admission::Waiting
            }
        }
    }

    /// Creates one random process right now, running or not.
    pub fn add_process(&mut self) -> (ProcessId, Admission) {
        let mut events = Vec::new();
        self.spawn(&mut events)
    }

    /// Creates a process with fixed demands under the next id. A demand the
    /// pool could never hold is refused, since it would block the waiting
    /// list forever.
    pub fn add_process_with(
        &mut self,
        pages: u32,
        lifetime: u32,
    ) -> Result<(ProcessId, Admission), EngineError> {
        if pages == 0 || lifetime == 0 {
            return Err(EngineError::InvalidDemand(
                "pages and lifetime must be at least 1".into(),
            ));
        }
        if pages as usize > self.config.total_frames {
            return Err(EngineError::DemandTooLarge {
                pages,
                frames: self.config.total_frames,
            });
        }

        let id = self.factory.next_id();
        let limits = *self.factory.limits();
        let priority = u8::try_from(limits.priority.0).unwrap_or(u8::MAX);
        let process = Process::new(id, pages, limits.page_size, lifetime, priority);
        Ok((id, self.admit(process)))
    }

    /// Deletes a file and returns its clusters to the FAT.
    pub fn delete_file(&mut self, id: FileId) -> Result<FileEntry, EngineError> {
        let idx = self
            .files
            .iter()
            .position(|f| f.id == id)
            .ok_or(EngineError::FileNotFound(id))?;

        let file = self.files.remove(idx);
        let released = self.fat.delete_file(&file);
        info!("{} deleted, {} clusters freed", file.name, released);
        Ok(file)
    }

    pub fn start(&mut self) {
        if !self.running {
            self.running = true;
            info!("simulation started at {}", self.speed);
        }
    }

    /// Halts ticking. The executing process goes back to ready with its
    /// queue slot, memory and remaining time untouched.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        if let Some(id) = self.executing.take() {
            if let Some(p) = self.ready.get_mut(id) {
                transition_ready(p);
            }
        }
        info!("simulation stopped after {} ticks", self.ticks);
    }

    pub fn toggle(&mut self) -> bool {
        if self.running {
            self.stop();
        } else {
            self.start();
        }
        self.running
    }

    pub fn set_speed(&mut self, speed: Speed) {
        self.speed = speed;
    }

    pub fn set_speed_millis(&mut self, ms: u64) -> Result<Speed, EngineError> {
        let speed = Speed::from_millis(ms)?;
        self.set_speed(speed);
        Ok(speed)
    }

    /// Drops every process and file and frees both pools. Configuration,
    /// speed and random source survive.
    pub fn reset(&mut self) {
        self.stop();
        self.ready.clear();
        self.waiting.clear();
        self.frames = FrameTable::new(self.config.total_frames);
        self.fat.reset();
        self.files.clear();
        self.executing = None;
        self.factory.reset();
        self.ticks = 0;
        info!("simulation reset");
    }

    // --- Persistence ---

    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            memory: self.frames.frames().to_vec(),
            ready: self.ready.to_vec(),
            waiting: self.waiting.iter().cloned().collect(),
            fat: self.fat.entries().to_vec(),
            files: self.files.clone(),
        }
    }

    /// Replaces the whole state with `state`, unchecked, and leaves the
    /// loop stopped. Id counters move past every restored id.
    pub fn restore(&mut self, state: PersistedState) {
        self.stop();
        let max_pid = state
            .ready
            .iter()
            .chain(&state.waiting)
            .map(|p| p.id)
            .chain(state.files.iter().map(|f| f.owner))
            .max();
        if let Some(id) = max_pid {
            self.factory.advance_past(id);
        }
        if let Some(id) = state.files.iter().map(|f| f.id.0).max() {
            self.fat.advance_file_counter(id);
        }

        // The machine comes back stopped, so nobody is on the CPU
        let mut ready = state.ready;
        for p in ready.iter_mut().filter(|p| p.state == ProcessState::Executing) {
            transition_ready(p);
        }

        self.frames = FrameTable::from_frames(state.memory);
        self.ready = ReadyQueue::from_processes(ready);
        self.waiting = state.waiting.into();
        self.fat.restore(state.fat);
        self.files = state.files;
        self.executing = None;
        info!(
            "state restored: {} ready, {} waiting, {} files",
            self.ready.len(),
            self.waiting.len(),
            self.files.len()
        );
    }

    // --- Queries ---

    /// Processes holding memory, in queue order.
    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.ready.iter()
    }

    pub fn ready_order(&self) -> Vec<ProcessId> {
        self.ready.ids()
    }

    pub fn waiting(&self) -> impl Iterator<Item = &Process> {
        self.waiting.iter()
    }

    pub fn waiting_order(&self) -> Vec<ProcessId> {
        self.waiting.iter().map(|p| p.id).collect()
    }

    pub fn executing(&self) -> Option<&Process> {
        self.executing.and_then(|id| self.ready.get(id))
    }

    pub fn frames(&self) -> &[MemoryFrame] {
        self.frames.frames()
    }

    pub fn clusters(&self) -> &[FatEntry] {
        self.fat.entries()
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn file(&self, id: FileId) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn fat_is_full(&self) -> bool {
        self.fat.is_full()
    }

    pub fn stats(&self) -> Stats {
        Stats {
            memory: self.frames.stats(),
            fat: self.fat.stats(),
            processes_active: self.ready.len(),
            processes_waiting: self.waiting.len(),
            executing: self.executing,
            files: self.files.len(),
            ticks: self.ticks,
        }
    }

    /// Checks the conservation and membership rules; returns the first
    /// violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        // frames
        let held: usize = self.ready.iter().map(|p| p.page_count()).sum();
        let occupied = self.frames.stats().occupied;
        if held != occupied {
            return Err(format!("{occupied} frames occupied, {held} pages resident"));
        }

        let mut owners = HashSet::new();
        for frame in self.frames.frames() {
            if let Some(owner) = frame.owner {
                if !owners.insert(owner) {
                    return Err(format!("{}:{} owns two frames", owner.process, owner.page_number));
                }
                let mapped = self
                    .ready
                    .get(owner.process)
                    .and_then(|p| p.pages.get(owner.page_number as usize))
                    .and_then(|page| page.frame);
                if mapped != Some(frame.frame_number) {
                    return Err(format!("frame {} owner mismatch", frame.frame_number));
                }
            }
        }

        // membership
        let mut ids = HashSet::new();
        for p in self.ready.iter().chain(&self.waiting) {
            if !ids.insert(p.id) {
                return Err(format!("{} queued twice", p.id));
            }
        }
        if let Some(p) = self.waiting.iter().find(|p| p.pages.iter().any(|pg| pg.frame.is_some())) {
            return Err(format!("{} holds memory while waiting", p.id));
        }

        let busy: Vec<ProcessId> = self
            .ready
            .iter()
            .filter(|p| p.state == ProcessState::Executing)
            .map(|p| p.id)
            .collect();
        match self.executing {
            Some(id) if self.ready.peek_head().map(|p| p.id) != Some(id) => {
                return Err(format!("{id} executing but not at the head"));
            }
            Some(id) if busy != [id] => return Err(format!("executing set is {busy:?}")),
            None if !busy.is_empty() => return Err(format!("stray executing {busy:?}")),
            _ => {}
        }

        // clusters
        let header = self.fat.entries().first();
        if header.map_or(true, |h| h.free) {
            return Err("header cluster is free".into());
        }
        let in_files: usize = self.files.iter().map(|f| f.size as usize).sum();
        if in_files != self.fat.stats().occupied {
            return Err(format!(
                "{} clusters occupied, {} in files",
                self.fat.stats().occupied,
                in_files
            ));
        }
        for file in &self.files {
            let first = file.clusters.first().copied().unwrap_or(0);
            let chain = self
                .fat
                .chain(first)
                .map_err(|e| format!("{}: {:?}", file.name, e))?;
            if chain != file.clusters || chain.len() != file.size as usize {
                return Err(format!("{} chain does not match its clusters", file.name));
            }
            let entries = self.fat.entries();
            if chain.iter().any(|&c| entries[c as usize].owner != Some(file.owner)) {
                return Err(format!("{} chain has a foreign cluster", file.name));
            }
        }

        Ok(())
    }
}
