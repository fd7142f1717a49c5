//! # flotilla: an auto-scaling worker pool with task coordination
//!
//! Three layers, each usable on its own:
//!
//! - [`WorkerManager`] keeps a pool of workers (one OS thread each) between a
//!   minimum and maximum size, feeds them from a priority queue and scales with load.
//! - [`TaskCoordinator`] decomposes high-level tasks into worker tasks and runs
//!   them sequentially, in parallel, as a pipeline or as map-reduce.
//! - [`ParallelProcessor`] offers named fan-out strategies with per-type aggregation.
//!
//! [`PoolSystem`] wires the three together around one [`HandlerRegistry`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flotilla::{PoolConfig, PoolSystem, TaskArgs};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> flotilla::Result<()> {
//!     let system = PoolSystem::builder()
//!         .with_pool_config(PoolConfig::development())
//!         .build()?;
//!     system.start().await?;
//!
//!     let id = system.manager().submit_task(
//!         |args| Ok(json!(args.i64_at(0)? + args.i64_at(1)?)),
//!         TaskArgs::new().arg(2).arg(3),
//!     )?;
//!     let result = system.manager().get_task_result(&id, None).await?;
//!     assert_eq!(result.result, Some(json!(5)));
//!
//!     system.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod coord;
pub mod core;
pub mod parallel;
pub mod worker;

// Re-exports for convenience
pub use crate::coord::{
    CoordinatedTask, CoordinationResult, CoordinationStats, CoordinationStrategy, FnHandler,
    HandlerRegistry, TaskCoordinator, TaskHandler, TaskKind,
};
pub use crate::core::{
    CoordinatorConfig, PoolConfig, PoolConfigBuilder, PoolError, ProcessorConfig, Result,
};
pub use crate::parallel::{
    ParallelProcessor, ProcessingRequest, ProcessingResult, ProcessingStats, ProcessingStrategy,
};
pub use crate::worker::{
    ManagerStats, ManagerStatus, ResultSink, Task, TaskArgs, TaskResult, WorkerManager,
    WorkerStatus,
};

use tracing::info;

/// The worker pool, coordinator and processor of one application
pub struct PoolSystem {
    manager: WorkerManager,
    registry: HandlerRegistry,
    coordinator: TaskCoordinator,
    processor: ParallelProcessor,
}

impl PoolSystem {
    pub fn builder() -> PoolSystemBuilder {
        PoolSystemBuilder::new()
    }

    /// Start the worker pool. Safe to call more than once.
    pub async fn start(&self) -> Result<()> {
        info!(
            handlers = self.registry.list().len(),
            "Starting pool system"
        );
        self.manager.start().await
    }

    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
        info!("Pool system stopped");
    }

    pub fn manager(&self) -> &WorkerManager {
        &self.manager
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn coordinator(&self) -> &TaskCoordinator {
        &self.coordinator
    }

    pub fn processor(&self) -> &ParallelProcessor {
        &self.processor
    }
}

/// Builder for PoolSystem
pub struct PoolSystemBuilder {
    pool: Option<PoolConfig>,
    coordinator: Option<CoordinatorConfig>,
    processor: Option<ProcessorConfig>,
    registry: Option<HandlerRegistry>,
}

impl PoolSystemBuilder {
    pub fn new() -> Self {
        Self {
            pool: None,
            coordinator: None,
            processor: None,
            registry: None,
        }
    }

    pub fn with_pool_config(mut self, config: PoolConfig) -> Self {
        self.pool = Some(config);
        self
    }

    pub fn with_coordinator_config(mut self, config: CoordinatorConfig) -> Self {
        self.coordinator = Some(config);
        self
    }

    pub fn with_processor_config(mut self, config: ProcessorConfig) -> Self {
        self.processor = Some(config);
        self
    }

    /// Use an existing registry instead of an empty one
    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validate every config and wire the components. Nothing runs until `start`.
    pub fn build(self) -> Result<PoolSystem> {
        let registry = self.registry.unwrap_or_default();
        let manager = WorkerManager::new(self.pool.unwrap_or_default())?;
        let coordinator = TaskCoordinator::new(
            manager.clone(),
            registry.clone(),
            self.coordinator.unwrap_or_default(),
        )?;
        let processor = ParallelProcessor::new(
            manager.clone(),
            registry.clone(),
            self.processor.unwrap_or_default(),
        )?;

        Ok(PoolSystem {
            manager,
            registry,
            coordinator,
            processor,
        })
    }
}

impl Default for PoolSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}
