use osim_common::{Process, ProcessId};
use std::collections::VecDeque;

/// Run-to-completion FIFO. The head runs every tick and only leaves the
/// queue once it has terminated.
#[derive(Debug, Clone, Default)]
pub struct ReadyQueue {
    queue: VecDeque<Process>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_processes(processes: Vec<Process>) -> Self {
        Self {
            queue: processes.into(),
        }
    }

    pub fn enqueue(&mut self, process: Process) {
        self.queue.push_back(process);
    }

    /// Pops the head. The caller has already terminated it.
    pub fn dequeue(&mut self) -> Option<Process> {
        self.queue.pop_front()
    }

    pub fn peek_head(&self) -> Option<&Process> {
        self.queue.front()
    }

    pub fn head_mut(&mut self) -> Option<&mut Process> {
        self.queue.front_mut()
    }

    pub fn get(&self, id: ProcessId) -> Option<&Process> {
        self.queue.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: ProcessId) -> Option<&mut Process> {
        self.queue.iter_mut().find(|p| p.id == id)
    }

    pub fn contains(&self, id: ProcessId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.queue.iter()
    }

    pub fn ids(&self) -> Vec<ProcessId> {
        self.queue.iter().map(|p| p.id).collect()
    }

    pub fn to_vec(&self) -> Vec<Process> {
        self.queue.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
