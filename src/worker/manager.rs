//! WorkerManager - owns the worker pool
//!
//! The manager keeps between `min_workers` and `max_workers` workers alive,
//! feeds them from a shared priority queue and runs three background loops:
//! cleanup (result retention, errored and long-idle workers), auto-scaling,
//! and metrics collection.

use crate::core::completion::CompletionMap;
use crate::core::config::PoolConfig;
use crate::core::errors::{PoolError, Result};
use crate::core::metrics::{
    ExecutionTimer, PoolCounters, ResourceSampler, ResourceSnapshot, TaskSample,
};
use crate::worker::queue::TaskQueue;
use crate::worker::scaling::{LoadSnapshot, ScalingDecision, ScalingPolicy};
use crate::worker::sink::ResultSink;
use crate::worker::task::{Task, TaskArgs, TaskId, TaskResult, WorkerId};
use crate::worker::worker::{Execution, Worker, WorkerInfo, WorkerStatus};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lightweight view of the pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagerStatus {
    pub running: bool,
    pub total_workers: usize,
    pub busy_workers: usize,
    pub idle_workers: usize,
    pub error_workers: usize,
    pub queue_size: usize,
    pub system_load: f64,
}

/// Full statistics, including cumulative counters and per-worker detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerStats {
    #[serde(flatten)]
    pub status: ManagerStatus,
    pub tasks_submitted: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub avg_processing_time_ms: f64,
    pub throughput_per_minute: f64,
    /// Busy workers as a percentage of all workers
    pub worker_utilization: f64,
    pub resources: ResourceSnapshot,
    pub workers: Vec<WorkerInfo>,
}

/// What one cleanup pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub results_purged: usize,
    pub errored_removed: usize,
    pub idle_removed: usize,
    pub workers_replaced: usize,
}

struct ManagerInner {
    config: PoolConfig,
    policy: ScalingPolicy,
    queue: TaskQueue,
    workers: RwLock<HashMap<WorkerId, Arc<Worker>>>,
    worker_loops: Mutex<HashMap<WorkerId, JoinHandle<()>>>,
    background: Mutex<Vec<JoinHandle<()>>>,
    results: CompletionMap<TaskResult>,
    /// Queued or running tasks, with the attempt number in flight
    pending: DashMap<TaskId, u32>,
    counters: PoolCounters,
    resources: Mutex<ResourceSnapshot>,
    sink: RwLock<Option<Arc<dyn ResultSink>>>,
    running: AtomicBool,
    shut_down: AtomicBool,
    next_worker: AtomicU64,
}

/// Handle to the worker pool. Cloning is cheap and shares the same pool.
#[derive(Clone)]
pub struct WorkerManager {
    inner: Arc<ManagerInner>,
}

impl WorkerManager {
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let policy = ScalingPolicy::from(&config);
        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                policy,
                queue: TaskQueue::new(),
                workers: RwLock::new(HashMap::new()),
                worker_loops: Mutex::new(HashMap::new()),
                background: Mutex::new(Vec::new()),
                results: CompletionMap::new(),
                pending: DashMap::new(),
                counters: PoolCounters::new(),
                resources: Mutex::new(ResourceSnapshot::default()),
                sink: RwLock::new(None),
                running: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                next_worker: AtomicU64::new(1),
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Start `min_workers` workers and the background loops. Calling it again is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(PoolError::Shutdown);
        }
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Worker manager already running");
            return Ok(());
        }

        info!(
            min_workers = self.inner.config.min_workers,
            max_workers = self.inner.config.max_workers,
            "Starting worker manager"
        );

        for _ in 0..self.inner.config.min_workers {
            if let Err(e) = self.spawn_worker() {
                error!(error = %e, "Failed to start worker");
                return Err(e);
            }
        }

        let handles = vec![
            self.spawn_cleanup_loop(),
            self.spawn_autoscale_loop(),
            self.spawn_metrics_loop(),
        ];
        self.inner.background.lock().extend(handles);
        Ok(())
    }

    /// Queue a task with the default priority and timeout
    pub fn submit_task<F>(&self, function: F, args: TaskArgs) -> Result<TaskId>
    where
        F: Fn(&TaskArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let task = Task::builder(function)
            .args(args)
            .priority(self.inner.config.default_priority)
            .maybe_timeout(self.inner.config.default_task_timeout)
            .build();
        self.submit(task)
    }

    /// Queue a prepared task. Never waits for a worker.
    pub fn submit(&self, task: Task) -> Result<TaskId> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(PoolError::Shutdown);
        }
        if self.inner.results.contains(&task.id) {
            return Err(PoolError::DuplicateTask(task.id));
        }
        match self.inner.pending.entry(task.id.clone()) {
            Entry::Occupied(_) => return Err(PoolError::DuplicateTask(task.id)),
            Entry::Vacant(slot) => {
                slot.insert(task.retry_count);
            }
        }

        let task_id = task.id.clone();
        self.inner.counters.record_submitted();
        debug!(task_id = %task_id, priority = task.priority, "Task submitted");
        self.inner.queue.push(task);
        Ok(task_id)
    }

    /// Re-queue a failed task under the same id as its next attempt.
    /// The earlier attempt's result is dropped from the cache.
    pub fn retry(&self, task: Task) -> Result<TaskId> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(PoolError::Shutdown);
        }
        if !task.can_retry() {
            return Err(PoolError::configuration(format!(
                "task {} has used all {} retries",
                task.id, task.max_retries
            )));
        }

        let task = task.next_attempt();
        let task_id = task.id.clone();
        // Mark pending before dropping the old result so waiters never see neither
        match self.inner.pending.entry(task_id.clone()) {
            Entry::Occupied(mut slot) => {
                // Still pending with no result: the earlier attempt is in flight
                if !self.inner.results.contains(&task_id) {
                    return Err(PoolError::DuplicateTask(task_id));
                }
                slot.insert(task.retry_count);
            }
            Entry::Vacant(slot) => {
                slot.insert(task.retry_count);
            }
        }
        self.inner.results.remove(&task_id);
        self.inner.counters.record_submitted();
        debug!(task_id = %task_id, attempt = task.retry_count, "Task re-queued");
        self.inner.queue.push(task);
        Ok(task_id)
    }

    /// Wait for a task's result, up to `timeout` (forever if `None`)
    pub async fn get_task_result(
        &self,
        task_id: &str,
        timeout: Option<Duration>,
    ) -> Result<TaskResult> {
        self.await_result(task_id, timeout.map(|t| Instant::now() + t))
            .await
    }

    /// Wait for a task's result until an absolute deadline
    pub async fn await_result(
        &self,
        task_id: &str,
        deadline: Option<Instant>,
    ) -> Result<TaskResult> {
        // Pending is cleared only after the result is stored, so check it first
        if !self.inner.pending.contains_key(task_id) {
            return self
                .inner
                .results
                .get(task_id)
                .ok_or_else(|| PoolError::TaskNotFound(task_id.to_string()));
        }

        let started = Instant::now();
        match self.inner.results.wait(task_id, deadline).await {
            Some(result) => Ok(result),
            None => Err(PoolError::timeout(
                format!("waiting for task {}", task_id),
                started.elapsed().as_millis() as u64,
            )),
        }
    }

    /// Converge on `target` workers, clamped to the configured bounds.
    /// Only idle workers are removed, so the result can stay above the target.
    pub fn scale_workers(&self, target: usize) -> Result<usize> {
        if !self.is_running() {
            return Err(PoolError::configuration("worker pool has not been started"));
        }
        let target = self.inner.policy.clamp(target);
        let current = self.worker_count();

        if target > current {
            for _ in current..target {
                self.spawn_worker()?;
            }
        } else if target < current {
            let removed = self.remove_idle_workers(current - target);
            if removed < current - target {
                debug!(
                    wanted = current - target,
                    removed, "Busy workers kept while scaling down"
                );
            }
        }

        let count = self.worker_count();
        info!(target, workers = count, "Scaled worker pool");
        Ok(count)
    }

    /// One auto-scaler tick
    pub fn evaluate_scaling(&self) -> ScalingDecision {
        let load = self.load_snapshot();
        match self.inner.policy.decide(&load) {
            ScalingDecision::ScaleUp => match self.spawn_worker() {
                Ok(Some(worker_id)) => {
                    info!(
                        worker_id = %worker_id,
                        system_load = load.system_load(),
                        "Scaled up"
                    );
                    ScalingDecision::ScaleUp
                }
                Ok(None) => ScalingDecision::Hold,
                Err(e) => {
                    warn!(error = %e, "Scale up failed");
                    ScalingDecision::Hold
                }
            },
            ScalingDecision::ScaleDown => {
                if self.remove_idle_workers(1) == 1 {
                    info!(system_load = load.system_load(), "Scaled down");
                    ScalingDecision::ScaleDown
                } else {
                    ScalingDecision::Hold
                }
            }
            ScalingDecision::Hold => ScalingDecision::Hold,
        }
    }

    /// One cleanup pass: expire results, recycle errored workers, trim idle ones
    pub fn run_cleanup(&self) -> CleanupReport {
        let config = &self.inner.config;
        let mut report = CleanupReport {
            results_purged: self.inner.results.purge_older_than(config.result_retention),
            ..Default::default()
        };

        let workers: Vec<Arc<Worker>> = self.inner.workers.read().values().cloned().collect();

        for worker in &workers {
            if worker.status() == WorkerStatus::Error
                && worker.metrics().error_count > config.max_worker_errors
                && worker.try_retire()
            {
                warn!(worker_id = %worker.id(), "Recycling worker after repeated errors");
                self.detach_worker(worker.id());
                report.errored_removed += 1;
            }
        }

        for worker in &workers {
            if self.worker_count() <= config.min_workers {
                break;
            }
            if worker.status() == WorkerStatus::Idle
                && worker.idle_for() > config.worker_idle_timeout
                && worker.try_retire()
            {
                debug!(worker_id = %worker.id(), "Removing long-idle worker");
                self.detach_worker(worker.id());
                report.idle_removed += 1;
            }
        }

        while self.is_running() && self.worker_count() < config.min_workers {
            match self.spawn_worker() {
                Ok(Some(_)) => report.workers_replaced += 1,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Could not replace worker");
                    break;
                }
            }
        }

        report
    }

    pub fn set_result_sink(&self, sink: Arc<dyn ResultSink>) {
        *self.inner.sink.write() = Some(sink);
    }

    pub fn worker_count(&self) -> usize {
        self.inner.workers.read().len()
    }

    pub fn queue_size(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn workers(&self) -> Vec<WorkerInfo> {
        let mut infos: Vec<WorkerInfo> = self
            .inner
            .workers
            .read()
            .values()
            .map(|worker| worker.info())
            .collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        infos
    }

    pub fn load_snapshot(&self) -> LoadSnapshot {
        let workers = self.inner.workers.read();
        let mut snapshot = LoadSnapshot {
            total_workers: workers.len(),
            queue_size: self.inner.queue.len(),
            ..Default::default()
        };
        for worker in workers.values() {
            match worker.status() {
                WorkerStatus::Busy => snapshot.busy_workers += 1,
                WorkerStatus::Idle => snapshot.idle_workers += 1,
                _ => {}
            }
        }
        snapshot
    }

    pub fn status(&self) -> ManagerStatus {
        let load = self.load_snapshot();
        let error_workers = self
            .inner
            .workers
            .read()
            .values()
            .filter(|worker| worker.status() == WorkerStatus::Error)
            .count();
        ManagerStatus {
            running: self.is_running(),
            total_workers: load.total_workers,
            busy_workers: load.busy_workers,
            idle_workers: load.idle_workers,
            error_workers,
            queue_size: load.queue_size,
            system_load: load.system_load(),
        }
    }

    pub fn stats(&self) -> ManagerStats {
        let status = self.status();
        let counters = self.inner.counters.snapshot();
        let worker_utilization = if status.total_workers == 0 {
            0.0
        } else {
            status.busy_workers as f64 / status.total_workers as f64 * 100.0
        };

        ManagerStats {
            tasks_submitted: counters.tasks_submitted,
            tasks_completed: counters.tasks_completed,
            tasks_failed: counters.tasks_failed,
            avg_processing_time_ms: counters.avg_processing_time().as_secs_f64() * 1000.0,
            throughput_per_minute: counters.throughput_per_minute(),
            worker_utilization,
            resources: *self.inner.resources.lock(),
            workers: self.workers(),
            status,
        }
    }

    /// Stop every loop and worker. Running tasks are abandoned, queued ones dropped.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down worker manager");
        self.inner.running.store(false, Ordering::Release);

        for handle in self.inner.background.lock().drain(..) {
            handle.abort();
        }
        for (_, handle) in self.inner.worker_loops.lock().drain() {
            handle.abort();
        }
        let workers: Vec<Arc<Worker>> = self
            .inner
            .workers
            .write()
            .drain()
            .map(|(_, worker)| worker)
            .collect();
        for worker in &workers {
            worker.force_stop();
        }

        let discarded = self.inner.queue.clear();
        self.inner.pending.clear();
        info!(
            workers = workers.len(),
            discarded_tasks = discarded,
            "Worker manager stopped"
        );
    }

    /// Add one worker if below `max_workers`. Returns its id, or `None` at the cap.
    fn spawn_worker(&self) -> Result<Option<WorkerId>> {
        let mut workers = self.inner.workers.write();
        if workers.len() >= self.inner.config.max_workers {
            return Ok(None);
        }

        let number = self.inner.next_worker.fetch_add(1, Ordering::Relaxed);
        let worker_id = format!("worker-{}", number);
        let worker = Arc::new(Worker::spawn(worker_id.clone())?);
        workers.insert(worker_id.clone(), worker.clone());
        drop(workers);

        let handle = tokio::spawn(worker_loop(self.clone(), worker));
        self.inner
            .worker_loops
            .lock()
            .insert(worker_id.clone(), handle);
        debug!(worker_id = %worker_id, "Worker created");
        Ok(Some(worker_id))
    }

    /// Retire up to `count` idle workers without dropping below `min_workers`
    fn remove_idle_workers(&self, count: usize) -> usize {
        let candidates: Vec<Arc<Worker>> = self
            .inner
            .workers
            .read()
            .values()
            .filter(|worker| worker.status() == WorkerStatus::Idle)
            .cloned()
            .collect();

        let mut removed = 0;
        for worker in candidates {
            if removed == count || self.worker_count() <= self.inner.config.min_workers {
                break;
            }
            if worker.try_retire() {
                self.detach_worker(worker.id());
                removed += 1;
            }
        }
        removed
    }

    fn detach_worker(&self, worker_id: &str) {
        if let Some(worker) = self.inner.workers.write().remove(worker_id) {
            worker.release_thread();
        }
        // The loop notices the retired status and exits on its own
        self.inner.worker_loops.lock().remove(worker_id);
        debug!(worker_id = %worker_id, "Worker removed");
    }

    async fn run_task(&self, worker: &Worker, task: Task) {
        let task_id = task.id.clone();
        let timeout = task.timeout.or(self.inner.config.default_task_timeout);
        let timer = ExecutionTimer::start();
        let outcome = worker
            .execute(task.function.clone(), task.args.clone(), timeout)
            .await;
        let execution_time = timer.stop();

        let result = match outcome {
            Execution::Completed(value) => {
                TaskResult::succeeded(&task, worker.id(), value, execution_time)
            }
            Execution::Failed(message) => {
                warn!(task_id = %task_id, worker_id = %worker.id(), error = %message, "Task failed");
                TaskResult::failed(&task, worker.id(), message, execution_time)
            }
            Execution::TimedOut(limit) => {
                warn!(task_id = %task_id, worker_id = %worker.id(), "Task timed out");
                TaskResult::failed(
                    &task,
                    worker.id(),
                    format!("task timed out after {}ms", limit.as_millis()),
                    execution_time,
                )
            }
        };

        let sample = TaskSample {
            execution_time,
            success: result.success,
        };
        let errors = worker.finish(sample, self.inner.config.max_worker_errors);
        if errors > self.inner.config.max_worker_errors {
            warn!(worker_id = %worker.id(), errors, "Worker exceeded its error budget");
        }
        self.inner.counters.record_finished(sample);

        // Publish before clearing pending so a concurrent reader always finds one of them
        self.inner.results.insert(&task_id, result.clone());
        // A retry may already have claimed the id for its next attempt
        self.inner
            .pending
            .remove_if(&task_id, |_, attempt| *attempt == task.retry_count);

        let sink = self.inner.sink.read().clone();
        if let Some(sink) = sink {
            sink.on_result(&result).await;
        }
    }

    fn collect_metrics(&self, sampler: &mut ResourceSampler) {
        let resources = sampler.sample();
        *self.inner.resources.lock() = resources;
        for worker in self.inner.workers.read().values() {
            worker.set_resources(resources);
        }

        let stats = self.stats();
        info!(
            workers = stats.status.total_workers,
            busy = stats.status.busy_workers,
            queue = stats.status.queue_size,
            load = stats.status.system_load,
            completed = stats.tasks_completed,
            throughput_per_minute = stats.throughput_per_minute,
            memory_bytes = resources.memory_bytes,
            "Worker pool metrics"
        );
    }

    fn spawn_cleanup_loop(&self) -> JoinHandle<()> {
        let manager = self.clone();
        let period = self.inner.config.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            while manager.is_running() {
                ticker.tick().await;
                let report = manager.run_cleanup();
                if report != CleanupReport::default() {
                    debug!(?report, "Cleanup pass");
                }
            }
        })
    }

    fn spawn_autoscale_loop(&self) -> JoinHandle<()> {
        let manager = self.clone();
        let period = self.inner.config.autoscale_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            while manager.is_running() {
                ticker.tick().await;
                manager.evaluate_scaling();
            }
        })
    }

    fn spawn_metrics_loop(&self) -> JoinHandle<()> {
        let manager = self.clone();
        let period = self.inner.config.metrics_interval;
        tokio::spawn(async move {
            let mut sampler = ResourceSampler::new();
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            while manager.is_running() {
                ticker.tick().await;
                manager.collect_metrics(&mut sampler);
            }
        })
    }
}

/// Per-worker loop: pull, claim, execute, record, repeat
async fn worker_loop(manager: WorkerManager, worker: Arc<Worker>) {
    debug!(worker_id = %worker.id(), "Worker loop started");
    let wait = manager.inner.config.dequeue_wait;

    while manager.is_running() && worker.accepts_work() {
        let Some(queued) = manager.inner.queue.pop_wait(wait).await else {
            continue;
        };
        if !manager.is_running() || !worker.begin(&queued.task.id) {
            manager.inner.queue.requeue(queued);
            break;
        }
        manager.run_task(&worker, queued.task).await;
    }

    debug!(worker_id = %worker.id(), status = ?worker.status(), "Worker loop exited");
}
