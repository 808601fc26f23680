pub mod content;
pub mod fat;
pub mod frame;

use thiserror::Error;

/// Capacity failures. Both leave the pool untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Memory Exhausted: {requested} frames requested, {free} free")]
    MemoryExhausted { requested: usize, free: usize },
    #[error("Storage Exhausted: {needed} clusters needed, {free} free")]
    StorageExhausted { needed: usize, free: usize },
}
