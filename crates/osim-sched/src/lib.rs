pub mod lifecycle;
pub mod queue;

pub use lifecycle::{ProcessFactory, WorkloadLimits};
pub use queue::ReadyQueue;
