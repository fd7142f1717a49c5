// Worker pool: tasks, the priority queue, workers and their manager

pub mod manager;
pub mod queue;
pub mod scaling;
pub mod sink;
pub mod task;
pub mod worker;

pub use manager::{CleanupReport, ManagerStats, ManagerStatus, WorkerManager};
pub use queue::TaskQueue;
pub use scaling::{LoadSnapshot, ScalingDecision, ScalingPolicy};
pub use sink::{ChannelSink, ResultSink};
pub use task::{Task, TaskArgs, TaskBuilder, TaskFn, TaskId, TaskResult, WorkerId};
pub use worker::{Worker, WorkerInfo, WorkerStatus};
