// Core infrastructure shared by the pool, the coordinator and the processor

pub mod completion;
pub mod config;
pub mod errors;
pub mod metrics;

// Re-export commonly used types
pub use completion::CompletionMap;
pub use config::{CoordinatorConfig, PoolConfig, PoolConfigBuilder, ProcessorConfig};
pub use errors::{PoolError, Result};
pub use metrics::{ResourceSnapshot, WorkerMetrics};
