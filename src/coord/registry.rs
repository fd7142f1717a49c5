//! Registry of task handlers
//!
//! Maps a task-type tag (`"testing"`, `"debugging"`, a pipeline stage name, ...)
//! to a typed handler. Coordinated subtasks and processor units look their
//! handler up here when they are built; tags without a handler fall back to
//! [`PassThroughHandler`].

use crate::core::errors::{PoolError, Result};
use crate::worker::task::{TaskArgs, TaskFn};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Business logic for one task type. Runs on a worker thread, so it may block.
pub trait TaskHandler: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn handle(&self, input: &Value) -> anyhow::Result<Value>;
}

/// Handler built from a closure
pub struct FnHandler<F> {
    name: String,
    function: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Value) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, function: F) -> Self {
        Self {
            name: name.into(),
            function,
        }
    }
}

impl<F> TaskHandler for FnHandler<F>
where
    F: Fn(&Value) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, input: &Value) -> anyhow::Result<Value> {
        (self.function)(input)
    }
}

/// Fallback for unregistered tags.
///
/// A `"reduce"` stage summarises its `map_results`; anything else is echoed
/// back as `{"status": "completed", "input": ...}`.
pub struct PassThroughHandler;

impl TaskHandler for PassThroughHandler {
    fn name(&self) -> &str {
        "pass_through"
    }

    fn handle(&self, input: &Value) -> anyhow::Result<Value> {
        if input.get("stage").and_then(Value::as_str) == Some("reduce") {
            let results = input
                .get("map_results")
                .cloned()
                .unwrap_or_else(|| json!([]));
            let reduced = results.as_array().map_or(0, Vec::len);
            return Ok(json!({ "reduced": reduced, "results": results }));
        }
        Ok(json!({ "status": "completed", "input": input }))
    }
}

/// Registry of task handlers, shared by the coordinator and the processor
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn TaskHandler>>>>,
    fallback: Arc<dyn TaskHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            fallback: Arc::new(PassThroughHandler),
        }
    }

    /// Register a handler under its own name. Names must be non-empty and unique.
    pub fn register(&self, handler: Arc<dyn TaskHandler>) -> Result<()> {
        let name = handler.name().trim().to_string();
        if name.is_empty() {
            return Err(PoolError::invalid_value("handler name", handler.name()));
        }

        let mut handlers = self.handlers.write();
        if handlers.contains_key(&name) {
            return Err(PoolError::configuration(format!(
                "a handler named '{}' is already registered",
                name
            )));
        }
        tracing::debug!(handler = %name, "Registered task handler");
        handlers.insert(name, handler);
        Ok(())
    }

    /// Register a closure as the handler for `name`
    pub fn register_fn<F>(&self, name: impl Into<String>, function: F) -> Result<()>
    where
        F: Fn(&Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnHandler::new(name, function)))
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// The handler for `name`, or the pass-through fallback
    pub fn resolve(&self, name: &str) -> Arc<dyn TaskHandler> {
        self.get(name).unwrap_or_else(|| self.fallback.clone())
    }

    /// A task function that feeds the task's named arguments to the handler for `name`
    pub fn task_fn(&self, name: &str) -> TaskFn {
        let handler = self.resolve(name);
        Arc::new(move |args: &TaskArgs| handler.handle(&args.named_value()))
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
