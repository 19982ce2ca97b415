//! taskdeps-core: dependency graph engine for task tracking.
//!
//! Tasks are linked by directed edges. `Blocks` edges (`A → B`: A depends on
//! B) form an acyclic subgraph that decides whether a task can be completed;
//! `RelatesTo` edges are informational. The engine guards acyclicity at
//! insert time, answers blocking queries against a task status source, and
//! turns status changes into blocked/unblocked events.
//!
//! # Conventions
//!
//! - **Errors**: library errors are `thiserror` enums carrying an
//!   [`error::ErrorCode`]; config and database setup return `anyhow::Result`.
//! - **Logging**: `tracing` macros (`debug!` for snapshot loads and commits,
//!   `warn!` for rejected edges and partial recomputes).

#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod lock;
pub mod model;
pub mod notify;
pub mod sink;
pub mod status;
pub mod store;

pub use engine::{BatchError, DependencyEngine, EngineConfig, NewDependency};
pub use error::{DependencyError, ErrorCode, StatusError, StoreError};
pub use model::{
    BlockingMode, BlockingStatus, DependencyEdge, DependencyEvent, DependencyType, EdgeId, TaskId,
    TaskStatus,
};
pub use sink::NotificationSink;
pub use status::TaskStatusSource;
pub use store::EdgeStore;
