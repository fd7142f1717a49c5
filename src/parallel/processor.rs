//! ParallelProcessor - strategy-named fan-out over the worker pool
//!
//! Callers name a processing type and a strategy; the processor builds the
//! worker tasks, runs them and aggregates the outputs. Execution failures are
//! reported inside the [`ProcessingResult`], never as an `Err`.

use crate::coord::aggregate::{aggregate, distinct_workers};
use crate::coord::registry::{HandlerRegistry, TaskHandler};
use crate::core::config::ProcessorConfig;
use crate::core::errors::Result;
use crate::core::metrics::ExecutionTimer;
use crate::parallel::types::{
    ProcessingRequest, ProcessingResult, ProcessingStats, ProcessingStrategy,
};
use crate::worker::manager::WorkerManager;
use crate::worker::task::{Task, TaskArgs, TaskFn, TaskId, TaskResult};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What a strategy run produced, before aggregation
struct Processed {
    results: Vec<TaskResult>,
    /// Per-item outputs of the successful tasks
    outputs: Vec<Value>,
    total_items: usize,
    extra: Map<String, Value>,
}

#[derive(Debug, Default)]
struct ProcessingLedger {
    total: usize,
    successful: usize,
    total_execution_time: Duration,
    total_workers: usize,
    strategy_usage: std::collections::BTreeMap<String, usize>,
}

impl ProcessingLedger {
    fn record(&mut self, result: &ProcessingResult) {
        self.total += 1;
        if result.success {
            self.successful += 1;
        }
        self.total_execution_time += result.execution_time;
        self.total_workers += result.workers_used;
        *self
            .strategy_usage
            .entry(result.strategy.as_str().to_string())
            .or_default() += 1;
    }

    fn snapshot(&self) -> ProcessingStats {
        let mut stats = ProcessingStats {
            total_requests: self.total,
            successful_requests: self.successful,
            strategy_usage: self.strategy_usage.clone(),
            ..Default::default()
        };
        if self.total > 0 {
            let total = self.total as f64;
            stats.success_rate = self.successful as f64 * 100.0 / total;
            stats.average_execution_time_ms =
                self.total_execution_time.as_secs_f64() * 1000.0 / total;
            stats.average_workers_used = self.total_workers as f64 / total;
        }
        stats
    }
}

struct ProcessorInner {
    manager: WorkerManager,
    registry: HandlerRegistry,
    config: ProcessorConfig,
    ledger: Mutex<ProcessingLedger>,
}

#[derive(Clone)]
pub struct ParallelProcessor {
    inner: Arc<ProcessorInner>,
}

impl ParallelProcessor {
    pub fn new(
        manager: WorkerManager,
        registry: HandlerRegistry,
        config: ProcessorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(ProcessorInner {
                manager,
                registry,
                config,
                ledger: Mutex::new(ProcessingLedger::default()),
            }),
        })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.inner.config
    }

    /// A request carrying this processor's default timeout and priority
    pub fn request(
        &self,
        processing_type: impl Into<String>,
        data: Value,
        strategy: ProcessingStrategy,
    ) -> ProcessingRequest {
        ProcessingRequest::new(processing_type, data, strategy)
            .with_timeout(self.inner.config.default_timeout)
            .with_priority(self.inner.config.default_priority)
    }

    /// Process `data` with the strategy named `strategy`.
    ///
    /// The only error is an unknown strategy name; everything that goes wrong
    /// while running comes back as an unsuccessful [`ProcessingResult`].
    pub async fn process_parallel(
        &self,
        processing_type: &str,
        data: Value,
        strategy: &str,
        max_workers: Option<usize>,
        timeout: Option<Duration>,
        priority: Option<i32>,
    ) -> Result<ProcessingResult> {
        let strategy: ProcessingStrategy = strategy.parse()?;
        let mut request = self.request(processing_type, data, strategy);
        request.max_workers = max_workers;
        if let Some(timeout) = timeout {
            request.timeout = timeout;
        }
        if let Some(priority) = priority {
            request.priority = priority;
        }
        Ok(self.process_request(request).await)
    }

    pub async fn process_request(&self, request: ProcessingRequest) -> ProcessingResult {
        let timer = ExecutionTimer::start();
        let deadline = Instant::now() + request.timeout;
        info!(
            request_id = %request.id,
            processing_type = %request.processing_type,
            strategy = %request.strategy,
            "Processing request"
        );

        let outcome = match request.strategy {
            ProcessingStrategy::DataParallel => self.data_parallel(&request, deadline).await,
            ProcessingStrategy::TaskParallel => self.task_parallel(&request, deadline).await,
            ProcessingStrategy::PipelineParallel => {
                self.pipeline_parallel(&request, deadline).await
            }
            ProcessingStrategy::BatchParallel => self.batch_parallel(&request, deadline).await,
            ProcessingStrategy::StreamingParallel => {
                self.streaming_parallel(&request, deadline).await
            }
        };

        let result = match outcome {
            Ok(processed) => self.build_result(&request, processed, timer.stop()),
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "Processing failed");
                ProcessingResult::failed(&request, e.to_string(), timer.stop())
            }
        };

        info!(
            request_id = %result.id,
            success = result.success,
            tasks = result.results.len(),
            workers_used = result.workers_used,
            "Processing finished"
        );
        self.inner.ledger.lock().record(&result);
        result
    }

    /// Code files split across workers
    pub async fn process_code_analysis_parallel(&self, code_files: Vec<Value>) -> ProcessingResult {
        let request = self.request(
            "code_analysis",
            json!({ "code_files": code_files }),
            ProcessingStrategy::DataParallel,
        );
        self.process_request(request).await
    }

    /// One task per test suite
    pub async fn process_testing_parallel(&self, test_suites: Vec<Value>) -> ProcessingResult {
        let request = self.request(
            "testing",
            json!({ "test_suites": test_suites }),
            ProcessingStrategy::TaskParallel,
        );
        self.process_request(request).await
    }

    /// Optimization targets in fixed-size batches
    pub async fn process_optimization_parallel(&self, targets: Vec<Value>) -> ProcessingResult {
        let request = self.request(
            "optimization",
            json!({ "targets": targets }),
            ProcessingStrategy::BatchParallel,
        );
        self.process_request(request).await
    }

    pub fn get_processing_stats(&self) -> ProcessingStats {
        self.inner.ledger.lock().snapshot()
    }

    async fn data_parallel(
        &self,
        request: &ProcessingRequest,
        deadline: Instant,
    ) -> Result<Processed> {
        let items = extract_items(&request.processing_type, &request.data);
        let total_items = items.len();
        let cap = request
            .max_workers
            .unwrap_or(self.inner.manager.config().max_workers);
        let chunks = split_even(items, total_items.min(cap).max(1));
        let chunk_count = chunks.len();

        let handler = self.inner.registry.resolve(&request.processing_type);
        let tasks = chunks
            .into_iter()
            .map(|chunk| self.chunk_task(request, &handler, chunk))
            .collect();
        let results = self.fan_out(tasks, chunk_count.max(1), deadline).await?;

        let mut extra = Map::new();
        extra.insert("chunk_count".to_string(), json!(chunk_count));
        Ok(Processed {
            outputs: flatten_outputs(&results),
            results,
            total_items,
            extra,
        })
    }

    async fn task_parallel(
        &self,
        request: &ProcessingRequest,
        deadline: Instant,
    ) -> Result<Processed> {
        let items = extract_items(&request.processing_type, &request.data);
        let total_items = items.len();
        let handler = self.inner.registry.resolve(&request.processing_type);
        let tasks: Vec<Task> = items
            .into_iter()
            .map(|item| self.item_task(request, &handler, item))
            .collect();
        let cap = request.max_workers.unwrap_or(tasks.len()).max(1);
        let results = self.fan_out(tasks, cap, deadline).await?;

        let outputs = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.result.clone().unwrap_or(Value::Null))
            .collect();
        Ok(Processed {
            results,
            outputs,
            total_items,
            extra: Map::new(),
        })
    }

    async fn batch_parallel(
        &self,
        request: &ProcessingRequest,
        deadline: Instant,
    ) -> Result<Processed> {
        let items = extract_items(&request.processing_type, &request.data);
        let total_items = items.len();
        let batches: Vec<Vec<Value>> = items
            .chunks(self.inner.config.batch_size)
            .map(<[Value]>::to_vec)
            .collect();
        let batch_count = batches.len();
        debug!(request_id = %request.id, total_items, batch_count, "Batching items");

        let handler = self.inner.registry.resolve(&request.processing_type);
        let tasks = batches
            .into_iter()
            .map(|batch| self.chunk_task(request, &handler, batch))
            .collect();
        let cap = request.max_workers.unwrap_or(batch_count).max(1);
        let results = self.fan_out(tasks, cap, deadline).await?;

        let mut extra = Map::new();
        extra.insert("batch_count".to_string(), json!(batch_count));
        Ok(Processed {
            outputs: flatten_outputs(&results),
            results,
            total_items,
            extra,
        })
    }

    /// Windows run strictly one after another, in input order
    async fn streaming_parallel(
        &self,
        request: &ProcessingRequest,
        deadline: Instant,
    ) -> Result<Processed> {
        let items = extract_items(&request.processing_type, &request.data);
        let total_items = items.len();
        let handler = self.inner.registry.resolve(&request.processing_type);

        let mut results = Vec::new();
        let mut windows_processed = 0;
        for window in items.chunks(self.inner.config.window_size) {
            let task = self.chunk_task(request, &handler, window.to_vec());
            let result = self.run_one(task, deadline).await?;
            if result.success {
                windows_processed += 1;
            }
            results.push(result);
        }

        let mut extra = Map::new();
        extra.insert("window_count".to_string(), json!(results.len()));
        extra.insert("windows_processed".to_string(), json!(windows_processed));
        Ok(Processed {
            outputs: flatten_outputs(&results),
            results,
            total_items,
            extra,
        })
    }

    /// Each stage gets the previous stage's output; a failed stage halts the run
    async fn pipeline_parallel(
        &self,
        request: &ProcessingRequest,
        deadline: Instant,
    ) -> Result<Processed> {
        let stages: Vec<String> = match request.data.get("stages").and_then(Value::as_array) {
            Some(stages) => stages
                .iter()
                .enumerate()
                .map(|(index, stage)| match stage {
                    Value::String(name) => name.clone(),
                    other => other
                        .get("name")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("stage_{}", index)),
                })
                .collect(),
            None => self.inner.config.default_pipeline_stages.clone(),
        };
        let mut current = request
            .data
            .get("input")
            .cloned()
            .unwrap_or_else(|| request.data.clone());
        let total_items = current.as_array().map_or(1, Vec::len);

        let mut results = Vec::with_capacity(stages.len());
        let mut stages_completed = 0;
        for stage in &stages {
            let handler = self.inner.registry.resolve(stage);
            let task = self.item_task(request, &handler, current.clone());
            let result = self.run_one(task, deadline).await?;
            let succeeded = result.success;
            if succeeded {
                current = result.result.clone().unwrap_or(Value::Null);
                stages_completed += 1;
            }
            results.push(result);
            if !succeeded {
                debug!(request_id = %request.id, stage = %stage, "Pipeline stage failed, halting");
                break;
            }
        }

        let completed = stages_completed == stages.len();
        let outputs = match (&current, completed) {
            (Value::Array(values), true) => values.clone(),
            (value, true) => vec![value.clone()],
            (_, false) => Vec::new(),
        };
        let mut extra = Map::new();
        extra.insert("stages_completed".to_string(), json!(stages_completed));
        extra.insert("total_stages".to_string(), json!(stages.len()));
        if completed {
            extra.insert("final_output".to_string(), current);
        }
        Ok(Processed {
            results,
            outputs,
            total_items,
            extra,
        })
    }

    fn chunk_task(
        &self,
        request: &ProcessingRequest,
        handler: &Arc<dyn TaskHandler>,
        items: Vec<Value>,
    ) -> Task {
        Task::from_fn(chunk_fn(handler.clone()))
            .kwarg("items", Value::Array(items))
            .priority(request.priority)
            .timeout(request.timeout)
            .build()
    }

    fn item_task(
        &self,
        request: &ProcessingRequest,
        handler: &Arc<dyn TaskHandler>,
        item: Value,
    ) -> Task {
        Task::from_fn(item_fn(handler.clone()))
            .kwarg("item", item)
            .priority(request.priority)
            .timeout(request.timeout)
            .build()
    }

    async fn run_one(&self, task: Task, deadline: Instant) -> Result<TaskResult> {
        let manager = &self.inner.manager;
        let task_id = manager.submit(task)?;
        manager.await_result(&task_id, Some(deadline)).await
    }

    /// Keep at most `cap` tasks in flight; results come back in submission order
    async fn fan_out(
        &self,
        tasks: Vec<Task>,
        cap: usize,
        deadline: Instant,
    ) -> Result<Vec<TaskResult>> {
        let manager = &self.inner.manager;
        let mut in_flight: VecDeque<TaskId> = VecDeque::with_capacity(cap);
        let mut results = Vec::with_capacity(tasks.len());

        for task in tasks {
            if in_flight.len() >= cap {
                if let Some(oldest) = in_flight.pop_front() {
                    results.push(manager.await_result(&oldest, Some(deadline)).await?);
                }
            }
            in_flight.push_back(manager.submit(task)?);
        }
        while let Some(task_id) = in_flight.pop_front() {
            results.push(manager.await_result(&task_id, Some(deadline)).await?);
        }
        Ok(results)
    }

    fn build_result(
        &self,
        request: &ProcessingRequest,
        processed: Processed,
        execution_time: Duration,
    ) -> ProcessingResult {
        let Processed {
            results,
            outputs,
            total_items,
            extra,
        } = processed;

        let mut aggregated = aggregate(&request.processing_type, &outputs, total_items);
        if let Value::Object(map) = &mut aggregated {
            map.insert("total_items".to_string(), json!(total_items));
            map.extend(extra);
        }

        ProcessingResult {
            id: request.id.clone(),
            success: results.iter().all(|r| r.success),
            workers_used: distinct_workers(&results),
            results,
            aggregated_result: Some(aggregated),
            execution_time,
            strategy: request.strategy,
            completed_at: Utc::now(),
            error: None,
        }
    }
}

/// Runs the handler over every item of the `items` argument
fn chunk_fn(handler: Arc<dyn TaskHandler>) -> TaskFn {
    Arc::new(move |args: &TaskArgs| {
        let items = args
            .get_named("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        items
            .iter()
            .map(|item| handler.handle(item))
            .collect::<anyhow::Result<Vec<Value>>>()
            .map(Value::Array)
    })
}

fn item_fn(handler: Arc<dyn TaskHandler>) -> TaskFn {
    Arc::new(move |args: &TaskArgs| handler.handle(args.get_named("item").unwrap_or(&Value::Null)))
}

/// The list in `data` this processing type works on, else the payload itself
fn extract_items(processing_type: &str, data: &Value) -> Vec<Value> {
    let typed_key = match processing_type {
        "code_analysis" => "code_files",
        "testing" => "test_suites",
        "optimization" => "targets",
        _ => "items",
    };
    for key in [typed_key, "items"] {
        if let Some(items) = data.get(key).and_then(Value::as_array) {
            return items.clone();
        }
    }
    match data {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// `parts` contiguous chunks whose sizes differ by at most one
fn split_even(items: Vec<Value>, parts: usize) -> Vec<Vec<Value>> {
    let parts = parts.max(1);
    let base = items.len() / parts;
    let larger = items.len() % parts;

    let mut chunks = Vec::with_capacity(parts);
    let mut rest = items.into_iter();
    for index in 0..parts {
        let size = base + usize::from(index < larger);
        let chunk: Vec<Value> = rest.by_ref().take(size).collect();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
    }
    chunks
}

/// Successful chunk outputs, one entry per processed item
fn flatten_outputs(results: &[TaskResult]) -> Vec<Value> {
    let mut outputs = Vec::new();
    for result in results.iter().filter(|r| r.success) {
        match &result.result {
            Some(Value::Array(values)) => outputs.extend(values.iter().cloned()),
            Some(other) => outputs.push(other.clone()),
            None => {}
        }
    }
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PoolConfig;
    use pretty_assertions::assert_eq;

    async fn setup(registry: HandlerRegistry) -> (WorkerManager, ParallelProcessor) {
        let config = PoolConfig::builder()
            .workers(2, 4)
            .dequeue_wait(Duration::from_millis(20))
            .build()
            .unwrap();
        let manager = WorkerManager::new(config).unwrap();
        manager.start().await.unwrap();
        let processor =
            ParallelProcessor::new(manager.clone(), registry, ProcessorConfig::default()).unwrap();
        (manager, processor)
    }

    fn chunk_sizes(result: &ProcessingResult) -> Vec<usize> {
        result
            .results
            .iter()
            .map(|r| r.result.as_ref().and_then(Value::as_array).map_or(0, Vec::len))
            .collect()
    }

    #[test]
    fn test_split_even() {
        let items: Vec<Value> = (0..5).map(|i| json!(i)).collect();
        let sizes: Vec<usize> = split_even(items.clone(), 2).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 2]);
        let sizes: Vec<usize> = split_even(items, 4).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 1, 1, 1]);
        assert!(split_even(Vec::new(), 3).is_empty());
    }

    #[test]
    fn test_extract_items() {
        assert_eq!(
            extract_items("testing", &json!({ "test_suites": [1, 2] })),
            vec![json!(1), json!(2)]
        );
        assert_eq!(extract_items("custom", &json!({ "items": [3] })), vec![json!(3)]);
        assert_eq!(extract_items("custom", &json!([4, 5])).len(), 2);
        assert_eq!(extract_items("custom", &json!({ "x": 1 })), vec![json!({ "x": 1 })]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_testing_task_parallel_aggregates() {
        let registry = HandlerRegistry::new();
        registry
            .register_fn("testing", |suite| {
                Ok(json!({
                    "total_tests": suite["total"].clone(),
                    "passed_tests": suite["passed"].clone(),
                }))
            })
            .unwrap();
        let (manager, processor) = setup(registry).await;

        let result = processor
            .process_parallel(
                "testing",
                json!({ "test_suites": [
                    { "name": "s1", "total": 10, "passed": 8 },
                    { "name": "s2", "total": 10, "passed": 10 },
                ]}),
                "task_parallel",
                None,
                None,
                None,
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.results.len(), 2);
        let aggregated = result.aggregated_result.unwrap();
        assert_eq!(aggregated["total_tests"], json!(20));
        assert_eq!(aggregated["passed_tests"], json!(18));
        assert_eq!(aggregated["success_rate"], json!(90.0));
        assert!(result.workers_used >= 1 && result.workers_used <= 2);
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_batch_of_25_makes_three_tasks() {
        let (manager, processor) = setup(HandlerRegistry::new()).await;
        let targets: Vec<Value> = (0..25).map(|i| json!(format!("target-{}", i))).collect();

        let result = processor.process_optimization_parallel(targets).await;

        assert!(result.success);
        assert_eq!(result.strategy, ProcessingStrategy::BatchParallel);
        assert_eq!(chunk_sizes(&result), vec![10, 10, 5]);
        let aggregated = result.aggregated_result.unwrap();
        assert_eq!(aggregated["total_items"], json!(25));
        assert_eq!(aggregated["batch_count"], json!(3));
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_data_parallel_chunks_by_max_workers() {
        let registry = HandlerRegistry::new();
        registry
            .register_fn("code_analysis", |file| {
                Ok(json!({ "file": file, "issues": ["todo"], "quality_score": 6.0 }))
            })
            .unwrap();
        let (manager, processor) = setup(registry).await;

        let result = processor
            .process_parallel(
                "code_analysis",
                json!({ "code_files": ["a.rs", "b.rs", "c.rs", "d.rs", "e.rs"] }),
                "data_parallel",
                Some(2),
                None,
                None,
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(chunk_sizes(&result), vec![3, 2]);
        let aggregated = result.aggregated_result.unwrap();
        assert_eq!(aggregated["total_issues"], json!(5));
        assert_eq!(aggregated["average_quality_score"], json!(6.0));
        assert_eq!(aggregated["total_items"], json!(5));
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_streaming_windows_run_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let registry = HandlerRegistry::new();
        registry
            .register_fn("events", move |event| {
                log.lock().push(event.as_i64().unwrap_or(-1));
                Ok(event.clone())
            })
            .unwrap();
        let (manager, processor) = setup(registry).await;

        let items: Vec<i64> = (0..12).collect();
        let result = processor
            .process_parallel(
                "events",
                json!({ "items": items }),
                "streaming_parallel",
                None,
                None,
                None,
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(chunk_sizes(&result), vec![5, 5, 2]);
        assert_eq!(*seen.lock(), (0..12).collect::<Vec<i64>>());
        let aggregated = result.aggregated_result.unwrap();
        assert_eq!(aggregated["windows_processed"], json!(3));
        assert_eq!(aggregated["total_items"], json!(12));
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pipeline_feeds_previous_output() {
        let registry = HandlerRegistry::new();
        registry
            .register_fn("double", |value| Ok(json!(value.as_i64().unwrap_or(0) * 2)))
            .unwrap();
        registry
            .register_fn("increment", |value| Ok(json!(value.as_i64().unwrap_or(0) + 1)))
            .unwrap();
        registry
            .register_fn("explode", |_| anyhow::bail!("stage exploded"))
            .unwrap();
        let (manager, processor) = setup(registry).await;

        let result = processor
            .process_parallel(
                "numbers",
                json!({ "stages": ["double", "increment"], "input": 5 }),
                "pipeline_parallel",
                None,
                None,
                None,
            )
            .await
            .unwrap();
        assert!(result.success);
        let aggregated = result.aggregated_result.unwrap();
        assert_eq!(aggregated["final_output"], json!(11));
        assert_eq!(aggregated["stages_completed"], json!(2));

        let halted = processor
            .process_parallel(
                "numbers",
                json!({ "stages": ["double", "explode", "increment"], "input": 5 }),
                "pipeline_parallel",
                None,
                None,
                None,
            )
            .await
            .unwrap();
        assert!(!halted.success);
        assert_eq!(halted.results.len(), 2);
        let aggregated = halted.aggregated_result.unwrap();
        assert_eq!(aggregated["stages_completed"], json!(1));
        assert!(aggregated.get("final_output").is_none());
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unknown_strategy_is_rejected() {
        let (manager, processor) = setup(HandlerRegistry::new()).await;
        let err = processor
            .process_parallel("testing", json!({}), "quantum_parallel", None, None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("quantum_parallel"));
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_execution_errors_become_failed_result() {
        let (manager, processor) = setup(HandlerRegistry::new()).await;
        manager.shutdown().await;

        let result = processor
            .process_testing_parallel(vec![json!("unit")])
            .await;
        assert!(!result.success);
        assert!(result.results.is_empty());
        assert!(result.aggregated_result.is_none());
        assert!(result.error.is_some());

        let stats = processor.get_processing_stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.successful_requests, 0);
        assert_eq!(stats.strategy_usage.get("task_parallel"), Some(&1));
    }
}
