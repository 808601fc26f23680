use osim_common::{Process, ProcessId, ProcessState, RandomSource};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Bounds for randomized process demands (all inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadLimits {
    pub page_size: u32,
    pub pages: (u32, u32),
    pub lifetime: (u32, u32),
    pub priority: (u32, u32),
}

impl Default for WorkloadLimits {
    fn default() -> Self {
        Self {
            page_size: 4,
            pages: (1, 8),
            lifetime: (5, 15),
            priority: (1, 3),
        }
    }
}

/// Hands out sequence-numbered processes with random demands.
#[derive(Debug, Clone)]
pub struct ProcessFactory {
    limits: WorkloadLimits,
    counter: u32,
}

impl ProcessFactory {
    pub fn new(limits: WorkloadLimits) -> Self {
        Self { limits, counter: 0 }
    }

    pub fn limits(&self) -> &WorkloadLimits {
        &self.limits
    }

    /// Next id without consuming it.
    pub fn peek_id(&self) -> ProcessId {
        ProcessId(self.counter + 1)
    }

    pub fn next_id(&mut self) -> ProcessId {
        self.counter += 1;
        ProcessId(self.counter)
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }

    /// Skips past ids that already exist (after a restore).
    pub fn advance_past(&mut self, id: ProcessId) {
        self.counter = self.counter.max(id.0);
    }

    /// Draws pages, then lifetime, then priority. Touches no shared pool.
    pub fn create(&mut self, rng: &mut dyn RandomSource) -> Process {
        let id = self.next_id();
        let l = &self.limits;
        let pages = rng.range(l.pages.0, l.pages.1);
        let lifetime = rng.range(l.lifetime.0, l.lifetime.1);
        let priority = u8::try_from(rng.range(l.priority.0, l.priority.1)).unwrap_or(u8::MAX);

        debug!("created {}: {} pages, {} ticks", id, pages, lifetime);
        Process::new(id, pages, l.page_size, lifetime, priority)
    }
}

impl Default for ProcessFactory {
    fn default() -> Self {
        Self::new(WorkloadLimits::default())
    }
}

// State transitions. None of them touches the frame pool or the FAT.

/// Queue head taken up by the CPU; no time is consumed.
pub fn transition_dispatched(process: &mut Process) {
    process.state = ProcessState::Executing;
}

/// One tick of execution, floored at zero.
pub fn transition_executing(process: &mut Process) {
    process.state = ProcessState::Executing;
    process.time_remaining = process.time_remaining.saturating_sub(1);
}

pub fn transition_terminated(process: &mut Process) {
    process.state = ProcessState::Terminated;
    process.time_remaining = 0;
}

/// Back to ready, remaining time untouched.
pub fn transition_ready(process: &mut Process) {
    process.state = ProcessState::Ready;
}

#[cfg(test)]
mod tests {
    use super::*;
    use osim_common::{ScriptedRandom, SeededRandom};

    #[test]
    fn test_create_uses_draw_order() {
        let mut factory = ProcessFactory::default();
        let mut rng = ScriptedRandom::new().with_values([8, 15, 3]);

        let p = factory.create(&mut rng);
        assert_eq!(p.id, ProcessId(1));
        assert_eq!(p.page_count(), 8);
        assert_eq!(p.size, 32);
        assert_eq!(p.time_remaining, 15);
        assert_eq!(p.priority, 3);
        assert_eq!(p.state, ProcessState::Ready);
        assert!(p.page_table.iter().all(|e| !e.valid));

        let q = factory.create(&mut rng);
        assert_eq!(q.id.to_string(), "P2");
    }

    #[test]
    fn test_random_demands_within_bounds() {
        let mut factory = ProcessFactory::default();
        let mut rng = SeededRandom::seeded(99);

        for _ in 0..500 {
            let p = factory.create(&mut rng);
            assert!((1..=8).contains(&p.page_count()));
            assert!((5..=15).contains(&p.time_remaining));
            assert!((1..=3).contains(&p.priority));
            assert_eq!(p.size, p.page_count() as u32 * 4);
        }
        assert_eq!(factory.peek_id(), ProcessId(501));
    }

    #[test]
    fn test_priority_saturates_instead_of_wrapping() {
        let mut factory = ProcessFactory::new(WorkloadLimits {
            priority: (300, 300),
            ..WorkloadLimits::default()
        });
        let mut rng = ScriptedRandom::new().with_values([1, 5, 300]);

        let p = factory.create(&mut rng);
        assert_eq!(p.priority, u8::MAX);
    }

    #[test]
    fn test_counter_reset_and_advance() {
        let mut factory = ProcessFactory::default();
        factory.next_id();
        factory.next_id();
        factory.reset();
        assert_eq!(factory.next_id(), ProcessId(1));

        factory.advance_past(ProcessId(40));
        assert_eq!(factory.next_id(), ProcessId(41));
        factory.advance_past(ProcessId(3));
        assert_eq!(factory.next_id(), ProcessId(42));
    }

    #[test]
    fn test_transitions() {
        let mut p = Process::new(ProcessId(1), 2, 4, 2, 1);

        transition_dispatched(&mut p);
        assert_eq!(p.state, ProcessState::Executing);
        assert_eq!(p.time_remaining, 2);

        transition_executing(&mut p);
        transition_executing(&mut p);
        transition_executing(&mut p);
        assert_eq!(p.time_remaining, 0);

        transition_ready(&mut p);
        assert_eq!(p.state, ProcessState::Ready);
        assert_eq!(p.time_remaining, 0);

        transition_terminated(&mut p);
        transition_terminated(&mut p);
        assert_eq!(p.state, ProcessState::Terminated);
        assert_eq!(p.time_remaining, 0);
    }

    #[test]
    fn test_ready_keeps_remaining_time() {
        let mut p = Process::new(ProcessId(1), 1, 4, 9, 1);
        transition_executing(&mut p);
        transition_ready(&mut p);
        assert_eq!(p.time_remaining, 8);
    }
}
