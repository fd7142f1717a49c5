use crate::core::errors::{PoolError, Result};
use crate::worker::task::{new_task_id, TaskResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Fan-out shape used by the parallel processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStrategy {
    /// Items split into one contiguous chunk per worker
    DataParallel,
    /// One task per item
    TaskParallel,
    /// One task per stage, each fed the previous stage's output
    PipelineParallel,
    /// Fixed-size chunks, one task per chunk
    BatchParallel,
    /// Fixed-size windows processed one after another
    StreamingParallel,
}

impl ProcessingStrategy {
    pub const ALL: [ProcessingStrategy; 5] = [
        Self::DataParallel,
        Self::TaskParallel,
        Self::PipelineParallel,
        Self::BatchParallel,
        Self::StreamingParallel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataParallel => "data_parallel",
            Self::TaskParallel => "task_parallel",
            Self::PipelineParallel => "pipeline_parallel",
            Self::BatchParallel => "batch_parallel",
            Self::StreamingParallel => "streaming_parallel",
        }
    }
}

impl FromStr for ProcessingStrategy {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| PoolError::invalid_value("processing strategy", s))
    }
}

impl fmt::Display for ProcessingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A processing job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRequest {
    pub id: String,
    /// Free-form tag selecting the handler and the aggregation shape
    pub processing_type: String,
    pub data: Value,
    pub strategy: ProcessingStrategy,
    /// Cap on tasks in flight (and chunk count for data-parallel)
    pub max_workers: Option<usize>,
    pub timeout: Duration,
    pub priority: i32,
}

impl ProcessingRequest {
    pub fn new(processing_type: impl Into<String>, data: Value, strategy: ProcessingStrategy) -> Self {
        Self {
            id: new_task_id(),
            processing_type: processing_type.into(),
            data,
            strategy,
            max_workers: None,
            timeout: Duration::from_secs(60),
            priority: 1,
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub id: String,
    pub success: bool,
    pub results: Vec<TaskResult>,
    pub aggregated_result: Option<Value>,
    pub execution_time: Duration,
    pub workers_used: usize,
    pub strategy: ProcessingStrategy,
    pub completed_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl ProcessingResult {
    pub(crate) fn failed(request: &ProcessingRequest, error: String, execution_time: Duration) -> Self {
        Self {
            id: request.id.clone(),
            success: false,
            results: Vec::new(),
            aggregated_result: None,
            execution_time,
            workers_used: 0,
            strategy: request.strategy,
            completed_at: Utc::now(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_requests: usize,
    pub successful_requests: usize,
    /// Percentage, 0 to 100
    pub success_rate: f64,
    pub average_execution_time_ms: f64,
    pub average_workers_used: f64,
    pub strategy_usage: BTreeMap<String, usize>,
}
