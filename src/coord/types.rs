//! Types for coordinated execution
//!
//! A [`CoordinatedTask`] is a logical task that fans out into worker-level
//! [`Task`]s; a [`CoordinationResult`] is what comes back once they ran.

use crate::core::errors::{PoolError, Result};
use crate::worker::task::{new_task_id, Task, TaskResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Kind of coordinated work. Drives decomposition, default strategy and aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskKind {
    CodeAnalysis,
    Testing,
    Debugging,
    Optimization,
    ParallelExecution,
    DataProcessing,
    /// Any other tag; decomposed into a single subtask
    Other(String),
}

impl TaskKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CodeAnalysis => "code_analysis",
            Self::Testing => "testing",
            Self::Debugging => "debugging",
            Self::Optimization => "optimization",
            Self::ParallelExecution => "parallel_execution",
            Self::DataProcessing => "data_processing",
            Self::Other(tag) => tag,
        }
    }

    pub fn default_strategy(&self) -> CoordinationStrategy {
        match self {
            Self::Debugging => CoordinationStrategy::Sequential,
            Self::Optimization => CoordinationStrategy::MapReduce,
            Self::DataProcessing => CoordinationStrategy::Pipeline,
            _ => CoordinationStrategy::Parallel,
        }
    }
}

impl From<&str> for TaskKind {
    fn from(tag: &str) -> Self {
        match tag {
            "code_analysis" => Self::CodeAnalysis,
            "testing" => Self::Testing,
            "debugging" => Self::Debugging,
            "optimization" => Self::Optimization,
            "parallel_execution" => Self::ParallelExecution,
            "data_processing" => Self::DataProcessing,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for TaskKind {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<TaskKind> for String {
    fn from(kind: TaskKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the subtasks of a coordinated task relate to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationStrategy {
    Sequential,
    Parallel,
    Pipeline,
    MapReduce,
}

impl CoordinationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Pipeline => "pipeline",
            Self::MapReduce => "map_reduce",
        }
    }
}

impl FromStr for CoordinationStrategy {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            "pipeline" => Ok(Self::Pipeline),
            "map_reduce" | "map-reduce" | "mapreduce" => Ok(Self::MapReduce),
            _ => Err(PoolError::invalid_value("coordination strategy", s)),
        }
    }
}

impl fmt::Display for CoordinationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logical task that may fan out into several worker tasks
#[derive(Debug, Clone)]
pub struct CoordinatedTask {
    pub task_id: String,
    pub task_type: TaskKind,
    pub strategy: CoordinationStrategy,
    pub data: Value,
    /// Pre-built subtasks. Left empty, they are generated from `data`.
    pub subtasks: Vec<Task>,
    /// Coordinated tasks that must succeed before this one starts
    pub dependencies: Vec<String>,
    pub priority: i32,
    pub timeout: Duration,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CoordinatedTask {
    pub const DEFAULT_PRIORITY: i32 = 1;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// New task using the default strategy for its kind
    pub fn new(task_type: impl Into<TaskKind>, data: Value) -> Self {
        let task_type = task_type.into();
        Self {
            task_id: new_task_id(),
            strategy: task_type.default_strategy(),
            task_type,
            data,
            subtasks: Vec::new(),
            dependencies: Vec::new(),
            priority: Self::DEFAULT_PRIORITY,
            timeout: Self::DEFAULT_TIMEOUT,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    pub fn with_strategy(mut self, strategy: CoordinationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_subtasks(mut self, subtasks: Vec<Task>) -> Self {
        self.subtasks = subtasks;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Outcome of one coordinated task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationResult {
    pub task_id: String,
    pub success: bool,
    /// Subtask results in submission order; map-reduce appends the reduce result
    pub results: Vec<TaskResult>,
    pub aggregated_result: Value,
    pub execution_time: Duration,
    pub strategy_used: CoordinationStrategy,
    pub workers_used: usize,
    pub completed_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl CoordinationResult {
    /// A result for a coordination that never ran its subtasks
    pub fn aborted(
        task: &CoordinatedTask,
        error: &PoolError,
        execution_time: Duration,
    ) -> Self {
        Self {
            task_id: task.task_id.clone(),
            success: false,
            results: Vec::new(),
            aggregated_result: Value::Null,
            execution_time,
            strategy_used: task.strategy,
            workers_used: 0,
            completed_at: Utc::now(),
            error: Some(error.to_string()),
        }
    }
}

/// Aggregate view over every finished coordination
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinationStats {
    pub total_tasks: usize,
    pub successful_tasks: usize,
    /// Percentage, 0 to 100
    pub success_rate: f64,
    pub average_execution_time_ms: f64,
    pub average_workers_used: f64,
    pub strategy_usage: BTreeMap<String, usize>,
    /// workers used -> number of coordinations that used that many
    pub worker_count_histogram: BTreeMap<usize, usize>,
}
