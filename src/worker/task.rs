use crate::core::errors::{PoolError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub type TaskId = String;
pub type WorkerId = String;

/// The callable a worker runs. Executed on the worker's own OS thread.
pub type TaskFn = Arc<dyn Fn(&TaskArgs) -> anyhow::Result<Value> + Send + Sync>;

/// Priority used when none is given
pub const DEFAULT_PRIORITY: i32 = 5;

/// Positional and named arguments handed to a task function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskArgs {
    pub positional: Vec<Value>,
    pub named: Map<String, Value>,
}

impl TaskArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: values.into_iter().collect(),
            named: Map::new(),
        }
    }

    /// Named arguments taken from a JSON object; other values land under `"input"`
    pub fn from_object(value: Value) -> Self {
        let named = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("input".to_string(), other);
                map
            }
        };
        Self {
            positional: Vec::new(),
            named,
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    /// Positional argument as an integer, with a descriptive error
    pub fn i64_at(&self, index: usize) -> anyhow::Result<i64> {
        self.get(index)
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow::anyhow!("argument {} is missing or not an integer", index))
    }

    /// Named arguments as a JSON object
    pub fn named_value(&self) -> Value {
        Value::Object(self.named.clone())
    }
}

/// A unit of work submitted to the worker pool
#[derive(Clone)]
pub struct Task {
    pub id: TaskId,
    pub function: TaskFn,
    pub args: TaskArgs,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub timeout: Option<Duration>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("args", &self.args)
            .field("priority", &self.priority)
            .field("created_at", &self.created_at)
            .field("timeout", &self.timeout)
            .field("retry_count", &self.retry_count)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl Task {
    pub fn builder<F>(function: F) -> TaskBuilder
    where
        F: Fn(&TaskArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        TaskBuilder::new(Arc::new(function))
    }

    pub fn from_fn(function: TaskFn) -> TaskBuilder {
        TaskBuilder::new(function)
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Same task, same id, one more attempt
    pub(crate) fn next_attempt(mut self) -> Self {
        self.retry_count += 1;
        self
    }
}

pub struct TaskBuilder {
    id: Option<TaskId>,
    function: TaskFn,
    args: TaskArgs,
    priority: i32,
    timeout: Option<Duration>,
    max_retries: u32,
}

impl TaskBuilder {
    fn new(function: TaskFn) -> Self {
        Self {
            id: None,
            function,
            args: TaskArgs::default(),
            priority: DEFAULT_PRIORITY,
            timeout: None,
            max_retries: 0,
        }
    }

    pub fn id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn args(mut self, args: TaskArgs) -> Self {
        self.args = args;
        self
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.positional.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.named.insert(name.into(), value.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn maybe_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn build(self) -> Task {
        Task {
            id: self.id.unwrap_or_else(new_task_id),
            function: self.function,
            args: self.args,
            priority: self.priority,
            created_at: Utc::now(),
            timeout: self.timeout,
            retry_count: 0,
            max_retries: self.max_retries,
        }
    }
}

pub fn new_task_id() -> TaskId {
    uuid::Uuid::new_v4().to_string()
}

/// Outcome of one task attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    pub result: Option<Value>,
    pub execution_time: Duration,
    pub success: bool,
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
    /// Zero for the first attempt
    pub attempt: u32,
}

impl TaskResult {
    pub fn succeeded(
        task: &Task,
        worker_id: &str,
        value: Value,
        execution_time: Duration,
    ) -> Self {
        Self {
            task_id: task.id.clone(),
            worker_id: worker_id.to_string(),
            result: Some(value),
            execution_time,
            success: true,
            error: None,
            completed_at: Utc::now(),
            attempt: task.retry_count,
        }
    }

    pub fn failed(
        task: &Task,
        worker_id: &str,
        error: impl Into<String>,
        execution_time: Duration,
    ) -> Self {
        Self {
            task_id: task.id.clone(),
            worker_id: worker_id.to_string(),
            result: None,
            execution_time,
            success: false,
            error: Some(error.into()),
            completed_at: Utc::now(),
            attempt: task.retry_count,
        }
    }

    /// The task's output, or a [`PoolError::TaskExecution`] naming the worker and attempt
    pub fn into_output(self) -> Result<Value> {
        if self.success {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        let message = self
            .error
            .unwrap_or_else(|| "task failed without a message".to_string());
        Err(PoolError::task_execution(self.task_id, message)
            .with_context("worker_id", self.worker_id)
            .with_context("attempt", self.attempt.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_defaults() {
        let task = Task::builder(|_| Ok(Value::Null)).arg(2).arg(3).build();
        assert_eq!(task.priority, DEFAULT_PRIORITY);
        assert_eq!(task.args.positional, vec![json!(2), json!(3)]);
        assert_eq!(task.retry_count, 0);
        assert!(!task.can_retry());
        assert!(!task.id.is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Task::builder(|_| Ok(Value::Null)).build();
        let b = Task::builder(|_| Ok(Value::Null)).build();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_next_attempt_keeps_id() {
        let task = Task::builder(|_| Ok(Value::Null)).max_retries(2).build();
        let id = task.id.clone();
        let retried = task.next_attempt();
        assert_eq!(retried.id, id);
        assert_eq!(retried.retry_count, 1);
        assert!(retried.can_retry());
    }

    #[test]
    fn test_args_from_object() {
        let args = TaskArgs::from_object(json!({"stage": "fix"}));
        assert_eq!(args.get_named("stage"), Some(&json!("fix")));

        let wrapped = TaskArgs::from_object(json!([1, 2]));
        assert_eq!(wrapped.get_named("input"), Some(&json!([1, 2])));
    }

    #[test]
    fn test_into_output() {
        let task = Task::builder(|_| Ok(Value::Null)).max_retries(1).build();
        let ok = TaskResult::succeeded(&task, "worker-0", json!(5), Duration::ZERO);
        assert_eq!(ok.into_output().unwrap(), json!(5));

        let retried = task.next_attempt();
        let failed = TaskResult::failed(&retried, "worker-3", "disk full", Duration::ZERO);
        match failed.into_output().unwrap_err() {
            PoolError::TaskExecution {
                task_id,
                message,
                context,
            } => {
                assert_eq!(task_id, retried.id);
                assert_eq!(message, "disk full");
                assert_eq!(context.get("worker_id"), Some(&"worker-3".to_string()));
                assert_eq!(context.get("attempt"), Some(&"1".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_i64_at() {
        let args = TaskArgs::new().arg(7).arg("x");
        assert_eq!(args.i64_at(0).unwrap(), 7);
        assert!(args.i64_at(1).is_err());
        assert!(args.i64_at(5).is_err());
    }
}
