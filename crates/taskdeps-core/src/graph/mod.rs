//! Dependency graph: adjacency, cycle prevention, and blocking resolution.

pub mod adjacency;
pub mod blocking;
pub mod cycles;

pub use adjacency::GraphStore;
pub use blocking::BlockingResolver;
pub use cycles::{CycleGuard, CycleReport, find_cycles, has_cycles, would_create_cycle};
