use std::collections::HashMap;
use thiserror::Error;

/// Unified error type for the worker pool, coordinator and processor
#[derive(Debug, Error)]
pub enum PoolError {
    /// A task body failed; produced by [`TaskResult::into_output`](crate::worker::TaskResult::into_output)
    #[error("Task {task_id} failed: {message}")]
    TaskExecution {
        task_id: String,
        message: String,
        context: HashMap<String, String>,
    },

    /// A task, coordination or wait deadline elapsed
    #[error("Operation timed out: {operation} (timeout: {timeout_ms}ms)")]
    Timeout {
        operation: String,
        timeout_ms: u64,
    },

    /// A coordinated task's dependencies did not all succeed
    #[error("Dependencies of {task_id} did not complete successfully: {}", .failed.join(", "))]
    DependencyFailure {
        task_id: String,
        failed: Vec<String>,
    },

    /// Invalid configuration or unknown strategy name
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
        actual: Option<String>,
    },

    /// Polling for an id that was never submitted or has been purged
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// A task with this id is already queued or running
    #[error("Task already pending: {0}")]
    DuplicateTask(String),

    /// The component has been shut down
    #[error("Worker pool is shut down")]
    Shutdown,

    /// Serialization errors
    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IO errors (thread spawning, config files)
    #[error("IO operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl PoolError {
    pub fn task_execution<S: Into<String>, M: Into<String>>(task_id: S, message: M) -> Self {
        Self::TaskExecution {
            task_id: task_id.into(),
            message: message.into(),
            context: HashMap::new(),
        }
    }

    /// Add context to a task execution error
    pub fn with_context<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        if let Self::TaskExecution { ref mut context, .. } = self {
            context.insert(key.into(), value.into());
        }
        self
    }

    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn dependency_failure<S: Into<String>>(task_id: S, failed: Vec<String>) -> Self {
        Self::DependencyFailure {
            task_id: task_id.into(),
            failed,
        }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
            actual: None,
        }
    }

    /// Configuration error that names the offending field and value
    pub fn invalid_value<F: Into<String>, V: Into<String>>(field: F, actual: V) -> Self {
        let field = field.into();
        let actual = actual.into();
        Self::Configuration {
            message: format!("invalid {}: '{}'", field, actual),
            field: Some(field),
            actual: Some(actual),
        }
    }

    pub fn serialization<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        format: S,
        source: E,
    ) -> Self {
        Self::Serialization {
            format: format.into(),
            source: Box::new(source),
        }
    }

    pub fn io<S: Into<String>>(operation: S, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::TaskExecution { .. } => "task_execution",
            Self::Timeout { .. } => "timeout",
            Self::DependencyFailure { .. } => "dependency",
            Self::Configuration { .. } => "configuration",
            Self::TaskNotFound(_) => "not_found",
            Self::DuplicateTask(_) => "duplicate",
            Self::Shutdown => "shutdown",
            Self::Serialization { .. } => "serialization",
            Self::Io { .. } => "io",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, PoolError>;

impl From<std::io::Error> for PoolError {
    fn from(err: std::io::Error) -> Self {
        Self::io("io_operation", err)
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("json", err)
    }
}

impl From<serde_yaml::Error> for PoolError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization("yaml", err)
    }
}
