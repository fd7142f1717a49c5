use crate::core::errors::{PoolError, Result};
use crate::core::metrics::{ResourceSnapshot, TaskSample, WorkerMetrics};
use crate::worker::task::{TaskArgs, TaskFn, TaskId, WorkerId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Error,
    Stopping,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A dedicated OS thread that runs jobs one at a time
struct ThreadExecutor {
    jobs: mpsc::Sender<Job>,
}

impl ThreadExecutor {
    fn spawn(name: String) -> Result<Self> {
        let (jobs, rx) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
                debug!(thread = %name, "Worker thread exiting");
            })
            .map_err(|e| PoolError::io("spawn worker thread", e))?;
        Ok(Self { jobs })
    }
}

/// Outcome of running a task body on the worker thread
pub enum Execution {
    Completed(Value),
    Failed(String),
    TimedOut(Duration),
}

/// Mutable part of a worker, guarded by one lock
#[derive(Debug, Clone)]
struct WorkerState {
    status: WorkerStatus,
    current_task: Option<TaskId>,
    last_active: Instant,
    last_active_at: DateTime<Utc>,
    metrics: WorkerMetrics,
}

/// Point-in-time view of a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: WorkerId,
    pub status: WorkerStatus,
    pub current_task: Option<TaskId>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub metrics: WorkerMetrics,
}

/// An execution slot bound to its own single-thread executor
pub struct Worker {
    id: WorkerId,
    created_at: DateTime<Utc>,
    state: Mutex<WorkerState>,
    executor: Mutex<Option<ThreadExecutor>>,
    generation: Mutex<u32>,
}

impl Worker {
    pub fn spawn(id: WorkerId) -> Result<Self> {
        let executor = ThreadExecutor::spawn(format!("{}-0", id))?;
        let now = Utc::now();
        Ok(Self {
            id,
            created_at: now,
            state: Mutex::new(WorkerState {
                status: WorkerStatus::Idle,
                current_task: None,
                last_active: Instant::now(),
                last_active_at: now,
                metrics: WorkerMetrics::default(),
            }),
            executor: Mutex::new(Some(executor)),
            generation: Mutex::new(0),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> WorkerStatus {
        self.state.lock().status
    }

    pub fn metrics(&self) -> WorkerMetrics {
        self.state.lock().metrics.clone()
    }

    pub fn idle_for(&self) -> Duration {
        self.state.lock().last_active.elapsed()
    }

    pub fn info(&self) -> WorkerInfo {
        let state = self.state.lock();
        WorkerInfo {
            id: self.id.clone(),
            status: state.status,
            current_task: state.current_task.clone(),
            created_at: self.created_at,
            last_active: state.last_active_at,
            metrics: state.metrics.clone(),
        }
    }

    /// Whether the worker should keep pulling tasks. An errored worker keeps
    /// serving until cleanup recycles it, as long as it still has a thread.
    pub fn accepts_work(&self) -> bool {
        match self.status() {
            WorkerStatus::Idle | WorkerStatus::Busy => true,
            WorkerStatus::Error => self.has_thread(),
            WorkerStatus::Stopping => false,
        }
    }

    /// Claim the worker for a task. Fails once it is being stopped or has lost its thread.
    pub fn begin(&self, task_id: &str) -> bool {
        let has_thread = self.has_thread();
        let mut state = self.state.lock();
        let claimable = match state.status {
            WorkerStatus::Idle => true,
            WorkerStatus::Error => has_thread,
            _ => false,
        };
        if !claimable {
            return false;
        }
        state.status = WorkerStatus::Busy;
        state.current_task = Some(task_id.to_string());
        state.last_active = Instant::now();
        state.last_active_at = Utc::now();
        true
    }

    /// Record a finished task. Returns the error count after the update.
    pub fn finish(&self, sample: TaskSample, max_errors: u32) -> u32 {
        let mut state = self.state.lock();
        state.metrics = state.metrics.clone().record(sample);
        state.current_task = None;
        state.last_active = Instant::now();
        state.last_active_at = Utc::now();
        if state.status == WorkerStatus::Busy {
            state.status = if state.metrics.error_count > max_errors {
                WorkerStatus::Error
            } else {
                WorkerStatus::Idle
            };
        }
        state.metrics.error_count
    }

    /// Move an idle worker to `Stopping`. Busy workers are left alone.
    pub fn try_retire(&self) -> bool {
        let mut state = self.state.lock();
        match state.status {
            WorkerStatus::Idle | WorkerStatus::Error => {
                state.status = WorkerStatus::Stopping;
                true
            }
            _ => false,
        }
    }

    fn has_thread(&self) -> bool {
        self.executor.lock().is_some()
    }

    /// Stop regardless of status; used on shutdown
    pub fn force_stop(&self) {
        self.state.lock().status = WorkerStatus::Stopping;
        self.executor.lock().take();
    }

    /// Release the worker thread once the worker has been retired
    pub fn release_thread(&self) {
        self.executor.lock().take();
    }

    pub fn set_resources(&self, resources: ResourceSnapshot) {
        let mut state = self.state.lock();
        state.metrics = state.metrics.clone().with_resources(resources);
    }

    /// Run `function` on this worker's thread, bounded by `timeout` if set.
    ///
    /// A task that overruns its timeout cannot be interrupted: its thread is
    /// detached and left to finish in the background (the result is dropped),
    /// and the worker gets a fresh thread for the next task.
    pub async fn execute(
        &self,
        function: TaskFn,
        args: TaskArgs,
        timeout: Option<Duration>,
    ) -> Execution {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| function(&args)));
            let _ = tx.send(outcome);
        });

        let sent = match self.executor.lock().as_ref() {
            Some(executor) => executor.jobs.send(job).is_ok(),
            None => false,
        };
        if !sent {
            return Execution::Failed(format!("worker {} has no running thread", self.id));
        }

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.replace_thread();
                    return Execution::TimedOut(limit);
                }
            },
            None => rx.await,
        };

        match received {
            Ok(Ok(Ok(value))) => Execution::Completed(value),
            Ok(Ok(Err(e))) => Execution::Failed(format!("{:#}", e)),
            Ok(Err(panic)) => Execution::Failed(panic_message(panic.as_ref())),
            Err(_) => Execution::Failed(format!("worker {} thread stopped", self.id)),
        }
    }

    fn replace_thread(&self) {
        let generation = {
            let mut generation = self.generation.lock();
            *generation += 1;
            *generation
        };
        let mut executor = self.executor.lock();
        if executor.is_none() {
            return;
        }
        match ThreadExecutor::spawn(format!("{}-{}", self.id, generation)) {
            Ok(fresh) => {
                warn!(worker_id = %self.id, "Abandoned timed-out thread; started a replacement");
                *executor = Some(fresh);
            }
            Err(e) => {
                warn!(worker_id = %self.id, error = %e, "Could not replace worker thread");
                *executor = None;
                self.state.lock().status = WorkerStatus::Error;
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("task panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("task panicked: {}", message)
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn func<F>(f: F) -> TaskFn
    where
        F: Fn(&TaskArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    #[tokio::test]
    async fn test_execute_success() {
        let worker = Worker::spawn("worker-t".into()).unwrap();
        let outcome = worker
            .execute(
                func(|args| Ok(json!(args.i64_at(0)? * 2))),
                TaskArgs::new().arg(21),
                None,
            )
            .await;
        assert!(matches!(outcome, Execution::Completed(v) if v == json!(42)));
    }

    #[tokio::test]
    async fn test_execute_error_and_panic() {
        let worker = Worker::spawn("worker-t".into()).unwrap();

        let outcome = worker
            .execute(func(|_| anyhow::bail!("bad input")), TaskArgs::new(), None)
            .await;
        assert!(matches!(outcome, Execution::Failed(ref m) if m.contains("bad input")));

        let outcome = worker
            .execute(func(|_| panic!("kaboom")), TaskArgs::new(), None)
            .await;
        assert!(matches!(outcome, Execution::Failed(ref m) if m.contains("kaboom")));

        // The thread survived both
        let outcome = worker
            .execute(func(|_| Ok(json!("still here"))), TaskArgs::new(), None)
            .await;
        assert!(matches!(outcome, Execution::Completed(_)));
    }

    #[tokio::test]
    async fn test_timeout_replaces_thread() {
        let worker = Worker::spawn("worker-t".into()).unwrap();
        let outcome = worker
            .execute(
                func(|_| {
                    std::thread::sleep(Duration::from_millis(500));
                    Ok(Value::Null)
                }),
                TaskArgs::new(),
                Some(Duration::from_millis(20)),
            )
            .await;
        assert!(matches!(outcome, Execution::TimedOut(_)));

        let started = Instant::now();
        let outcome = worker
            .execute(func(|_| Ok(json!(1))), TaskArgs::new(), None)
            .await;
        assert!(matches!(outcome, Execution::Completed(_)));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_status_transitions() {
        let worker = Worker::spawn("worker-t".into()).unwrap();
        assert!(worker.begin("t1"));
        assert_eq!(worker.status(), WorkerStatus::Busy);
        assert!(!worker.begin("t2"));
        assert!(!worker.try_retire());

        let sample = TaskSample {
            execution_time: Duration::from_millis(5),
            success: false,
        };
        assert_eq!(worker.finish(sample, 0), 1);
        assert_eq!(worker.status(), WorkerStatus::Error);

        // Errored workers keep serving until they are retired
        assert!(worker.accepts_work());
        assert!(worker.begin("t2"));
        assert_eq!(worker.status(), WorkerStatus::Busy);
        assert_eq!(worker.finish(sample, 0), 2);
        assert_eq!(worker.status(), WorkerStatus::Error);

        assert!(worker.try_retire());
        assert_eq!(worker.status(), WorkerStatus::Stopping);
        assert!(!worker.accepts_work());
        assert!(!worker.begin("t3"));
    }

    #[test]
    fn test_finish_returns_to_idle() {
        let worker = Worker::spawn("worker-t".into()).unwrap();
        assert!(worker.begin("t1"));
        let sample = TaskSample {
            execution_time: Duration::from_millis(5),
            success: true,
        };
        worker.finish(sample, 5);
        let info = worker.info();
        assert_eq!(info.status, WorkerStatus::Idle);
        assert_eq!(info.current_task, None);
        assert_eq!(info.metrics.tasks_completed, 1);
    }
}
