//! TaskCoordinator - multi-stage, dependency-aware execution
//!
//! A coordinated task is decomposed into worker tasks which are run through the
//! [`WorkerManager`] according to a [`CoordinationStrategy`]. Results are kept
//! in a completion map so dependants and callers can wait on them by id.

use crate::coord::aggregate::{aggregate, distinct_workers, successful_outputs};
use crate::coord::decompose::decompose;
use crate::coord::registry::HandlerRegistry;
use crate::coord::types::{
    CoordinatedTask, CoordinationResult, CoordinationStats, CoordinationStrategy, TaskKind,
};
use crate::core::completion::CompletionMap;
use crate::core::config::CoordinatorConfig;
use crate::core::errors::{PoolError, Result};
use crate::core::metrics::ExecutionTimer;
use crate::worker::manager::WorkerManager;
use crate::worker::task::{Task, TaskArgs, TaskResult};
use chrono::Utc;
use dashmap::DashSet;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Running totals behind [`CoordinationStats`]
#[derive(Debug, Default)]
struct StatsLedger {
    total: usize,
    successful: usize,
    total_execution_time: Duration,
    total_workers: usize,
    stats: CoordinationStats,
}

impl StatsLedger {
    fn record(&mut self, result: &CoordinationResult) {
        self.total += 1;
        if result.success {
            self.successful += 1;
        }
        self.total_execution_time += result.execution_time;
        self.total_workers += result.workers_used;
        *self
            .stats
            .strategy_usage
            .entry(result.strategy_used.as_str().to_string())
            .or_default() += 1;
        *self
            .stats
            .worker_count_histogram
            .entry(result.workers_used)
            .or_default() += 1;
    }

    fn snapshot(&self) -> CoordinationStats {
        let mut stats = self.stats.clone();
        stats.total_tasks = self.total;
        stats.successful_tasks = self.successful;
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

/// What a strategy produced before aggregation
#[derive(Default)]
struct StrategyOutcome {
    results: Vec<TaskResult>,
    reduce: Option<TaskResult>,
}

struct CoordinatorInner {
    manager: WorkerManager,
    registry: HandlerRegistry,
    config: CoordinatorConfig,
    results: CompletionMap<CoordinationResult>,
    active: DashSet<String>,
    ledger: Mutex<StatsLedger>,
}

/// Runs coordinated tasks on top of a worker pool. Cheap to clone.
#[derive(Clone)]
pub struct TaskCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl TaskCoordinator {
    pub fn new(
        manager: WorkerManager,
        registry: HandlerRegistry,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(CoordinatorInner {
                manager,
                registry,
                config,
                results: CompletionMap::new(),
                active: DashSet::new(),
                ledger: Mutex::new(StatsLedger::default()),
            }),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// A coordinated task with this coordinator's default priority and timeout
    pub fn task(&self, task_type: impl Into<TaskKind>, data: Value) -> CoordinatedTask {
        CoordinatedTask::new(task_type, data)
            .with_priority(self.inner.config.default_priority)
            .with_timeout(self.inner.config.default_timeout)
    }

    /// Start coordinating in the background and return the task id right away
    pub fn submit_coordinated_task(&self, task: CoordinatedTask) -> Result<String> {
        let task_id = task.task_id.clone();
        if self.inner.results.contains(&task_id) || !self.inner.active.insert(task_id.clone()) {
            return Err(PoolError::DuplicateTask(task_id));
        }

        debug!(
            task_id = %task_id,
            task_type = %task.task_type,
            strategy = %task.strategy,
            "Coordinated task submitted"
        );
        let coordinator = self.clone();
        tokio::spawn(async move {
            if let Err(e) = coordinator.run(task).await {
                warn!(error = %e, "Coordinated task aborted");
            }
        });
        Ok(task_id)
    }

    /// Run a coordinated task to completion.
    ///
    /// Waits for every dependency first; if any of them did not succeed the
    /// call fails with [`PoolError::DependencyFailure`] and no subtask runs.
    pub async fn coordinate_task(&self, task: CoordinatedTask) -> Result<CoordinationResult> {
        let task_id = task.task_id.clone();
        if self.inner.results.contains(&task_id) || !self.inner.active.insert(task_id.clone()) {
            return Err(PoolError::DuplicateTask(task_id));
        }
        self.run(task).await
    }

    /// Wait for the result of a coordinated task, up to `timeout` (forever if `None`)
    pub async fn get_coordination_result(
        &self,
        task_id: &str,
        timeout: Option<Duration>,
    ) -> Result<CoordinationResult> {
        // A finished task leaves `active` only after its result is stored
        if !self.inner.active.contains(task_id) {
            return self
                .inner
                .results
                .get(task_id)
                .ok_or_else(|| PoolError::TaskNotFound(task_id.to_string()));
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        self.inner
            .results
            .wait(task_id, deadline)
            .await
            .ok_or_else(|| {
                PoolError::timeout(
                    format!("waiting for coordinated task {}", task_id),
                    timeout.map_or(0, |t| t.as_millis() as u64),
                )
            })
    }

    pub fn get_coordination_stats(&self) -> CoordinationStats {
        self.inner.ledger.lock().snapshot()
    }

    /// Ids of coordinations still running
    pub fn active_tasks(&self) -> Vec<String> {
        self.inner
            .active
            .iter()
            .map(|id| id.key().clone())
            .filter(|id| !self.inner.results.contains(id))
            .collect()
    }

    async fn run(&self, mut task: CoordinatedTask) -> Result<CoordinationResult> {
        let timer = ExecutionTimer::start();
        let deadline = Instant::now() + task.timeout;
        task.started_at = Some(Utc::now());
        info!(
            task_id = %task.task_id,
            task_type = %task.task_type,
            strategy = %task.strategy,
            "Coordinating task"
        );

        if let Err(e) = self.await_dependencies(&task, deadline).await {
            warn!(task_id = %task.task_id, error = %e, "Dependencies not satisfied");
            let result = CoordinationResult::aborted(&task, &e, timer.stop());
            self.finish(result);
            return Err(e);
        }

        let subtasks = if task.subtasks.is_empty() {
            self.build_subtasks(&task)
        } else {
            std::mem::take(&mut task.subtasks)
        };

        let outcome = match task.strategy {
            CoordinationStrategy::Sequential => {
                self.run_sequential(&task, subtasks, deadline).await
            }
            CoordinationStrategy::Parallel => self
                .run_parallel(subtasks, deadline)
                .await
                .map(|results| StrategyOutcome {
                    results,
                    reduce: None,
                }),
            CoordinationStrategy::Pipeline => self.run_pipeline(&task, subtasks, deadline).await,
            CoordinationStrategy::MapReduce => self.run_map_reduce(&task, subtasks, deadline).await,
        };
        task.completed_at = Some(Utc::now());

        let result = match outcome {
            Ok(outcome) => self.build_result(&task, outcome, timer.stop()),
            Err(e) => {
                warn!(task_id = %task.task_id, error = %e, "Coordination failed");
                CoordinationResult::aborted(&task, &e, timer.stop())
            }
        };

        info!(
            task_id = %result.task_id,
            success = result.success,
            subtasks = result.results.len(),
            workers_used = result.workers_used,
            "Coordination finished"
        );
        self.finish(result.clone());
        Ok(result)
    }

    fn finish(&self, result: CoordinationResult) {
        let task_id = result.task_id.clone();
        self.inner.ledger.lock().record(&result);
        self.inner.results.insert(&task_id, result);
        self.inner.active.remove(&task_id);
        self.inner
            .results
            .purge_older_than(self.inner.manager.config().result_retention);
    }

    async fn await_dependencies(&self, task: &CoordinatedTask, deadline: Instant) -> Result<()> {
        if task.dependencies.is_empty() {
            return Ok(());
        }

        let waits = task.dependencies.iter().map(|dep| async move {
            let timeout = deadline.saturating_duration_since(Instant::now());
            match self.get_coordination_result(dep, Some(timeout)).await {
                Ok(result) if result.success => None,
                Ok(_) => Some(dep.clone()),
                Err(e) => {
                    debug!(dependency = %dep, error = %e, "Dependency unavailable");
                    Some(dep.clone())
                }
            }
        });
        let failed: Vec<String> = join_all(waits).await.into_iter().flatten().collect();

        if failed.is_empty() {
            Ok(())
        } else {
            Err(PoolError::dependency_failure(&task.task_id, failed))
        }
    }

    fn build_subtasks(&self, task: &CoordinatedTask) -> Vec<Task> {
        let payloads = decompose(task, &self.inner.config);
        let serial_steps = match task.strategy {
            CoordinationStrategy::Sequential | CoordinationStrategy::Pipeline => payloads.len(),
            CoordinationStrategy::Parallel | CoordinationStrategy::MapReduce => 1,
        };
        let per_subtask = task.timeout / serial_steps.max(1) as u32;

        payloads
            .into_iter()
            .map(|payload| self.subtask(task, payload, per_subtask))
            .collect()
    }

    fn subtask(&self, task: &CoordinatedTask, payload: Value, timeout: Duration) -> Task {
        Task::from_fn(self.inner.registry.task_fn(task.task_type.as_str()))
            .args(TaskArgs::from_object(payload))
            .priority(task.priority)
            .timeout(timeout)
            .max_retries(self.inner.config.subtask_max_retries)
            .build()
    }

    /// Submit one subtask and wait for its final attempt
    async fn run_one(&self, mut task: Task, deadline: Instant) -> Result<TaskResult> {
        let manager = &self.inner.manager;
        let task_id = manager.submit(task.clone())?;
        let mut result = manager.await_result(&task_id, Some(deadline)).await?;

        while !result.success && task.can_retry() {
            debug!(task_id = %task_id, attempt = task.retry_count + 1, "Retrying subtask");
            manager.retry(task.clone())?;
            task = task.next_attempt();
            result = manager.await_result(&task_id, Some(deadline)).await?;
        }
        Ok(result)
    }

    async fn run_sequential(
        &self,
        task: &CoordinatedTask,
        subtasks: Vec<Task>,
        deadline: Instant,
    ) -> Result<StrategyOutcome> {
        let fail_fast = task.task_type == TaskKind::Debugging;
        let mut results = Vec::with_capacity(subtasks.len());
        for subtask in subtasks {
            let result = self.run_one(subtask, deadline).await?;
            let failed = !result.success;
            results.push(result);
            if failed && fail_fast {
                debug!(task_id = %task.task_id, "Debugging step failed, stopping");
                break;
            }
        }
        Ok(StrategyOutcome {
            results,
            reduce: None,
        })
    }

    /// All subtasks in flight at once; results come back in submission order
    async fn run_parallel(&self, subtasks: Vec<Task>, deadline: Instant) -> Result<Vec<TaskResult>> {
        let runs = subtasks
            .into_iter()
            .map(|subtask| self.run_one(subtask, deadline));
        join_all(runs).await.into_iter().collect()
    }

    async fn run_pipeline(
        &self,
        task: &CoordinatedTask,
        subtasks: Vec<Task>,
        deadline: Instant,
    ) -> Result<StrategyOutcome> {
        let mut context = match &task.data {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("input".to_string(), other.clone());
                map
            }
        };

        let mut results = Vec::with_capacity(subtasks.len());
        for mut stage in subtasks {
            stage
                .args
                .named
                .insert("context".to_string(), Value::Object(context.clone()));
            let result = self.run_one(stage, deadline).await?;

            if !result.success {
                debug!(task_id = %task.task_id, stage = results.len(), "Pipeline stage failed, halting");
                results.push(result);
                break;
            }
            match &result.result {
                Some(Value::Object(output)) => context.extend(output.clone()),
                Some(other) => {
                    context.insert("previous_result".to_string(), other.clone());
                }
                None => {}
            }
            results.push(result);
        }

        Ok(StrategyOutcome {
            results,
            reduce: None,
        })
    }

    async fn run_map_reduce(
        &self,
        task: &CoordinatedTask,
        subtasks: Vec<Task>,
        deadline: Instant,
    ) -> Result<StrategyOutcome> {
        let mapped = self.run_parallel(subtasks, deadline).await?;

        let map_results = successful_outputs(&mapped);
        debug!(
            task_id = %task.task_id,
            mapped = mapped.len(),
            successful = map_results.len(),
            "Map phase complete"
        );
        let remaining = deadline.saturating_duration_since(Instant::now());
        let reducer = self.subtask(
            task,
            json!({ "stage": "reduce", "map_results": map_results }),
            remaining.max(Duration::from_millis(1)),
        );
        let reduce = self.run_one(reducer, deadline).await?;

        Ok(StrategyOutcome {
            results: mapped,
            reduce: Some(reduce),
        })
    }

    fn build_result(
        &self,
        task: &CoordinatedTask,
        outcome: StrategyOutcome,
        execution_time: Duration,
    ) -> CoordinationResult {
        let StrategyOutcome { mut results, reduce } = outcome;

        let outputs = successful_outputs(&results);
        let mut aggregated = aggregate(task.task_type.as_str(), &outputs, results.len());
        if let Some(reduce) = reduce {
            if let Value::Object(map) = &mut aggregated {
                map.insert(
                    "reduce_result".to_string(),
                    reduce.result.clone().unwrap_or(Value::Null),
                );
            }
            results.push(reduce);
        }

        let success = !results.is_empty() && results.iter().all(|r| r.success);
        CoordinationResult {
            task_id: task.task_id.clone(),
            success,
            workers_used: distinct_workers(&results),
            results,
            aggregated_result: aggregated,
            execution_time,
            strategy_used: task.strategy,
            completed_at: Utc::now(),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PoolConfig;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn setup(registry: HandlerRegistry) -> (WorkerManager, TaskCoordinator) {
        let config = PoolConfig::builder()
            .workers(2, 4)
            .dequeue_wait(Duration::from_millis(20))
            .build()
            .unwrap();
        let manager = WorkerManager::new(config).unwrap();
        manager.start().await.unwrap();
        let coordinator =
            TaskCoordinator::new(manager.clone(), registry, CoordinatorConfig::default()).unwrap();
        (manager, coordinator)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_debugging_stops_at_failed_step() {
        let registry = HandlerRegistry::new();
        registry
            .register_fn("debugging", |input| match input["stage"].as_str() {
                Some("locate") => anyhow::bail!("could not locate fault"),
                Some(stage) => Ok(json!({ "step": stage })),
                None => anyhow::bail!("missing stage"),
            })
            .unwrap();
        let (manager, coordinator) = setup(registry).await;

        let task = coordinator.task("debugging", json!({ "error": "index out of bounds" }));
        let result = coordinator.coordinate_task(task).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.strategy_used, CoordinationStrategy::Sequential);
        assert_eq!(result.results.len(), 2);
        assert!(result.results[0].success);
        assert!(!result.results[1].success);
        assert_eq!(result.aggregated_result["steps_completed"], json!(1));
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_keeps_submission_order() {
        let registry = HandlerRegistry::new();
        registry
            .register_fn("testing", |input| {
                let suite = input["suite"].as_str().unwrap_or_default();
                // Earlier suites finish later
                let delay = if suite == "a" { 80 } else { 5 };
                std::thread::sleep(Duration::from_millis(delay));
                Ok(json!({ "suite": suite, "total_tests": 4, "passed_tests": 4 }))
            })
            .unwrap();
        let (manager, coordinator) = setup(registry).await;

        let task = coordinator.task("testing", json!({ "test_suites": ["a", "b", "c"] }));
        let result = coordinator.coordinate_task(task).await.unwrap();

        assert!(result.success);
        let suites: Vec<Value> = result
            .results
            .iter()
            .map(|r| r.result.clone().unwrap()["suite"].clone())
            .collect();
        assert_eq!(suites, vec![json!("a"), json!("b"), json!("c")]);
        assert_eq!(result.aggregated_result["total_tests"], json!(12));
        assert_eq!(result.aggregated_result["success_rate"], json!(100.0));
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pipeline_passes_context_and_halts() {
        let executed = Arc::new(Mutex::new(Vec::new()));
        let seen = executed.clone();
        let registry = HandlerRegistry::new();
        registry
            .register_fn("data_processing", move |input| {
                let stage = input["stage"].as_str().unwrap_or_default().to_string();
                seen.lock().push(stage.clone());
                match stage.as_str() {
                    "load" => Ok(json!({ "rows": 3 })),
                    "clean" => {
                        anyhow::ensure!(input["context"]["rows"] == json!(3), "rows not passed on");
                        anyhow::bail!("bad row 2")
                    }
                    _ => Ok(json!({ "done": stage })),
                }
            })
            .unwrap();
        let (manager, coordinator) = setup(registry).await;

        let task = coordinator.task(
            "data_processing",
            json!({ "stages": ["load", "clean", "enrich", "store"] }),
        );
        let result = coordinator.coordinate_task(task).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.strategy_used, CoordinationStrategy::Pipeline);
        assert_eq!(result.results.len(), 2);
        assert!(result.results[1].error.as_ref().unwrap().contains("bad row 2"));
        assert_eq!(*executed.lock(), vec!["load".to_string(), "clean".to_string()]);
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_map_reduce_feeds_successful_maps() {
        let maps_done = Arc::new(AtomicUsize::new(0));
        let counter = maps_done.clone();
        let registry = HandlerRegistry::new();
        registry
            .register_fn("optimization", move |input| {
                if input["stage"] == json!("reduce") {
                    let finished = counter.load(Ordering::SeqCst);
                    let inputs = input["map_results"].clone();
                    return Ok(json!({ "maps_finished_before_reduce": finished, "inputs": inputs }));
                }
                counter.fetch_add(1, Ordering::SeqCst);
                match input["target"].as_str() {
                    Some("broken") => anyhow::bail!("cannot optimize"),
                    Some(target) => Ok(json!({ "target": target, "speedup": 2 })),
                    None => anyhow::bail!("missing target"),
                }
            })
            .unwrap();
        let (manager, coordinator) = setup(registry).await;

        let task = coordinator.task(
            "optimization",
            json!({ "targets": ["parser", "broken", "lexer"] }),
        );
        let result = coordinator.coordinate_task(task).await.unwrap();

        assert_eq!(result.strategy_used, CoordinationStrategy::MapReduce);
        // Three map results plus the reduce result
        assert_eq!(result.results.len(), 4);
        assert!(!result.success);

        let reduce = &result.aggregated_result["reduce_result"];
        assert_eq!(reduce["maps_finished_before_reduce"], json!(3));
        assert_eq!(
            reduce["inputs"],
            json!([
                { "target": "parser", "speedup": 2 },
                { "target": "lexer", "speedup": 2 }
            ])
        );
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dependency_failure_blocks_execution() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let registry = HandlerRegistry::new();
        registry
            .register_fn("testing", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("suite crashed")
            })
            .unwrap();
        let (manager, coordinator) = setup(registry).await;

        let upstream = coordinator
            .task("testing", json!({ "test_suites": ["unit"] }))
            .with_id("upstream");
        let upstream_id = coordinator.submit_coordinated_task(upstream).unwrap();

        let downstream = coordinator
            .task("testing", json!({ "test_suites": ["integration"] }))
            .with_dependencies(vec![upstream_id.clone()]);
        let err = coordinator.coordinate_task(downstream).await.unwrap_err();

        match err {
            PoolError::DependencyFailure { failed, .. } => assert_eq!(failed, vec![upstream_id]),
            other => panic!("unexpected error: {other}"),
        }
        // Only the upstream suite ran
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_submit_then_wait_and_stats() {
        let (manager, coordinator) = setup(HandlerRegistry::new()).await;

        let first = coordinator
            .submit_coordinated_task(coordinator.task("translation", json!({ "text": "hola" })))
            .unwrap();
        let second = coordinator
            .submit_coordinated_task(
                coordinator
                    .task("translation", json!({ "text": "adios" }))
                    .with_dependencies(vec![first.clone()]),
            )
            .unwrap();

        let result = coordinator
            .get_coordination_result(&second, Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.aggregated_result["subtask_count"], json!(1));
        assert_eq!(
            result.aggregated_result["results"][0]["input"]["data"],
            json!({ "text": "adios" })
        );

        let stats = coordinator.get_coordination_stats();
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.success_rate, 100.0);
        assert_eq!(stats.strategy_usage.get("parallel"), Some(&2));
        assert_eq!(stats.worker_count_histogram.get(&1), Some(&2));

        assert!(matches!(
            coordinator.get_coordination_result("missing", None).await,
            Err(PoolError::TaskNotFound(_))
        ));
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_finished_task_is_not_active() {
        let (manager, coordinator) = setup(HandlerRegistry::new()).await;

        let id = coordinator
            .submit_coordinated_task(coordinator.task("translation", json!({ "text": "hola" })))
            .unwrap();
        coordinator
            .get_coordination_result(&id, Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(coordinator.active_tasks().is_empty());

        // Result stored but the id not yet cleared from the active set
        let finished = CoordinationResult::aborted(
            &coordinator.task("translation", Value::Null).with_id("stored"),
            &PoolError::Shutdown,
            Duration::ZERO,
        );
        coordinator.inner.active.insert("stored".to_string());
        coordinator.inner.results.insert("stored", finished);
        assert!(coordinator.active_tasks().is_empty());
        let fetched = coordinator
            .get_coordination_result("stored", Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(!fetched.success);
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_subtask_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let registry = HandlerRegistry::new();
        registry
            .register_fn("flaky", move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    anyhow::bail!("transient")
                }
                Ok(json!("done"))
            })
            .unwrap();

        let config = PoolConfig::builder()
            .workers(1, 2)
            .dequeue_wait(Duration::from_millis(20))
            .build()
            .unwrap();
        let manager = WorkerManager::new(config).unwrap();
        manager.start().await.unwrap();
        let coordinator = TaskCoordinator::new(
            manager.clone(),
            registry,
            CoordinatorConfig {
                subtask_max_retries: 2,
                ..Default::default()
            },
        )
        .unwrap();

        let result = coordinator
            .coordinate_task(coordinator.task("flaky", json!({})))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.results[0].attempt, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_prebuilt_subtasks_are_used() {
        let (manager, coordinator) = setup(HandlerRegistry::new()).await;
        let subtasks = vec![
            Task::builder(|_| Ok(json!({ "total_tests": 2, "passed_tests": 1 }))).build(),
            Task::builder(|_| Ok(json!({ "total_tests": 2, "passed_tests": 2 }))).build(),
        ];
        let task = coordinator
            .task("testing", json!({}))
            .with_subtasks(subtasks);
        let result = coordinator.coordinate_task(task).await.unwrap();

        assert!(result.success);
        assert_eq!(result.aggregated_result["passed_tests"], json!(3));
        assert_eq!(result.aggregated_result["success_rate"], json!(75.0));
        manager.shutdown().await;
    }
}
