use anyhow::Result;
use flotilla::{PoolConfig, PoolSystem, TaskArgs};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Test suites report their own totals
fn run_suite(suite: &Value) -> Result<Value> {
    std::thread::sleep(Duration::from_millis(50));
    Ok(json!({
        "suite": suite["name"],
        "total_tests": suite["total"],
        "passed_tests": suite["passed"],
    }))
}

/// Debugging steps; locating the fault fails
fn debug_step(input: &Value) -> Result<Value> {
    match input["stage"].as_str() {
        Some("analyze") => Ok(json!({ "symptom": input["context"]["error"] })),
        Some("locate") => anyhow::bail!("fault could not be located"),
        Some(step) => {
            let resolved = step == "verify";
            Ok(json!({ "step": step, "resolved": resolved }))
        }
        None => anyhow::bail!("missing debugging stage"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let system = PoolSystem::builder()
        .with_pool_config(PoolConfig::development())
        .build()?;
    system.registry().register_fn("testing", run_suite)?;
    system.registry().register_fn("debugging", debug_step)?;
    system.start().await?;

    // Plain task: 2 + 3
    let manager = system.manager();
    let id = manager.submit_task(
        |args| Ok(json!(args.i64_at(0)? + args.i64_at(1)?)),
        TaskArgs::new().arg(2).arg(3),
    )?;
    let sum = manager
        .get_task_result(&id, Some(Duration::from_secs(5)))
        .await?
        .into_output()?;
    info!(%sum, "add(2, 3)");

    // Two test suites, one task each
    let processed = system
        .processor()
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
        .await?;
    info!(
        aggregated = %processed.aggregated_result.unwrap_or(serde_json::Value::Null),
        workers_used = processed.workers_used,
        "Test suites processed"
    );

    // Debugging workflow halts at the failing step
    let coordinator = system.coordinator();
    let task = coordinator.task("debugging", json!({ "error": "index out of bounds" }));
    let coordinated = coordinator.coordinate_task(task).await?;
    info!(
        success = coordinated.success,
        steps_run = coordinated.results.len(),
        "Debugging workflow finished"
    );

    let stats = manager.stats();
    info!(
        completed = stats.tasks_completed,
        failed = stats.tasks_failed,
        workers = stats.status.total_workers,
        "Pool stats"
    );

    system.shutdown().await;
    Ok(())
}
