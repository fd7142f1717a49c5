//! Splitting a coordinated task into subtask payloads
//!
//! Each payload is a JSON object handed to the handler registered for the
//! task's kind. Every payload carries a `"stage"` field naming what the
//! handler is asked to do.

use crate::coord::types::{CoordinatedTask, TaskKind};
use crate::core::config::CoordinatorConfig;
use serde_json::{json, Value};

/// Subtask payloads for `task`, in execution order. Never empty.
pub fn decompose(task: &CoordinatedTask, config: &CoordinatorConfig) -> Vec<Value> {
    let data = &task.data;
    let payloads = match task.task_type {
        TaskKind::CodeAnalysis => code_analysis(data, config),
        TaskKind::Testing => list(data, "test_suites")
            .iter()
            .map(|suite| json!({ "stage": "test", "suite": suite }))
            .collect(),
        TaskKind::Debugging => config
            .debugging_steps
            .iter()
            .map(|step| json!({ "stage": step, "context": data }))
            .collect(),
        TaskKind::Optimization => list(data, "targets")
            .iter()
            .map(|target| json!({ "stage": "optimize", "target": target }))
            .collect(),
        TaskKind::ParallelExecution => list(data, "items")
            .iter()
            .map(|item| json!({ "stage": "execute", "data": item }))
            .collect(),
        TaskKind::DataProcessing => list(data, "stages")
            .iter()
            .enumerate()
            .map(|(index, stage)| {
                json!({
                    "stage": stage_name(stage, index),
                    "stage_index": index,
                    "definition": stage,
                    "input": data.get("input").cloned().unwrap_or(Value::Null),
                })
            })
            .collect(),
        TaskKind::Other(_) => Vec::new(),
    };

    if payloads.is_empty() {
        vec![json!({ "stage": "execute", "data": data })]
    } else {
        payloads
    }
}

fn code_analysis(data: &Value, config: &CoordinatorConfig) -> Vec<Value> {
    let snippets = list(data, "code_snippets");
    let requested = list(data, "analysis_types");
    let analysis_types: Vec<Value> = if requested.is_empty() {
        config
            .default_analysis_types
            .iter()
            .map(|t| Value::String(t.clone()))
            .collect()
    } else {
        requested.to_vec()
    };

    let mut payloads = Vec::with_capacity(snippets.len() * analysis_types.len());
    for snippet in snippets {
        for analysis_type in &analysis_types {
            payloads.push(json!({
                "stage": "analyze",
                "code": snippet,
                "analysis_type": analysis_type,
            }));
        }
    }
    payloads
}

fn list<'a>(data: &'a Value, key: &str) -> &'a [Value] {
    data.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn stage_name(stage: &Value, index: usize) -> String {
    match stage {
        Value::String(name) => name.clone(),
        other => other
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("stage_{}", index)),
    }
}
