//! Task-type specific aggregation of successful outputs
//!
//! Used by the coordinator and the parallel processor alike. Each function
//! receives only the outputs of units that succeeded.

use crate::worker::task::TaskResult;
use serde_json::{json, Value};
use std::collections::HashSet;

/// Aggregate `outputs` according to `task_type`. `unit_count` is the number of
/// units that ran, successful or not.
pub fn aggregate(task_type: &str, outputs: &[Value], unit_count: usize) -> Value {
    match task_type {
        "testing" => testing(outputs),
        "code_analysis" => code_analysis(outputs),
        "debugging" => debugging(outputs),
        _ => generic(outputs, unit_count),
    }
}

/// Outputs of the successful results, in order
pub fn successful_outputs(results: &[TaskResult]) -> Vec<Value> {
    results
        .iter()
        .filter(|r| r.success)
        .map(|r| r.result.clone().unwrap_or(Value::Null))
        .collect()
}

/// Number of distinct workers that produced `results`
pub fn distinct_workers(results: &[TaskResult]) -> usize {
    results
        .iter()
        .map(|r| r.worker_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

fn count(output: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| output.get(*key).and_then(Value::as_u64))
}

fn testing(outputs: &[Value]) -> Value {
    let mut total = 0;
    let mut passed = 0;
    let mut failed = 0;
    for output in outputs {
        let suite_total = count(output, &["total_tests", "total"]).unwrap_or(0);
        let suite_passed = count(output, &["passed_tests", "passed"]).unwrap_or(0);
        total += suite_total;
        passed += suite_passed;
        failed += count(output, &["failed_tests", "failed"])
            .unwrap_or_else(|| suite_total.saturating_sub(suite_passed));
    }

    let success_rate = if total == 0 {
        0.0
    } else {
        passed as f64 * 100.0 / total as f64
    };
    json!({
        "total_tests": total,
        "passed_tests": passed,
        "failed_tests": failed,
        "success_rate": success_rate,
    })
}

fn code_analysis(outputs: &[Value]) -> Value {
    let mut total_issues = 0;
    let mut scores = Vec::new();
    for output in outputs {
        total_issues += match output.get("issues") {
            Some(Value::Array(issues)) => issues.len() as u64,
            Some(other) => other.as_u64().unwrap_or(0),
            None => count(output, &["issues_count"]).unwrap_or(0),
        };
        if let Some(score) = output.get("quality_score").and_then(Value::as_f64) {
            scores.push(score);
        }
    }

    let average_quality_score = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };
    json!({
        "total_issues": total_issues,
        "average_quality_score": average_quality_score,
        "units_analyzed": outputs.len(),
    })
}

fn debugging(outputs: &[Value]) -> Value {
    let issue_resolved = outputs
        .iter()
        .any(|output| output.get("resolved").and_then(Value::as_bool) == Some(true));
    json!({
        "issue_resolved": issue_resolved,
        "steps_completed": outputs.len(),
    })
}

fn generic(outputs: &[Value], unit_count: usize) -> Value {
    json!({
        "subtask_count": unit_count,
        "successful_count": outputs.len(),
        "results": outputs,
    })
}
