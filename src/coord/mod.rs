//! Coordinated execution
//!
//! Decomposes high-level tasks into worker tasks, runs them under a
//! coordination strategy and aggregates what comes back.

pub mod aggregate;
pub mod coordinator;
pub mod decompose;
pub mod registry;
pub mod types;

pub use coordinator::TaskCoordinator;
pub use registry::{FnHandler, HandlerRegistry, PassThroughHandler, TaskHandler};
pub use types::{
    CoordinatedTask, CoordinationResult, CoordinationStats, CoordinationStrategy, TaskKind,
};
