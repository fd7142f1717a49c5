//! Fan-out strategies of the parallel processor

use flotilla::{HandlerRegistry, PoolConfig, PoolSystem, ProcessingStrategy, ProcessorConfig};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;

async fn start_system(registry: HandlerRegistry, processor: ProcessorConfig) -> PoolSystem {
    let pool = PoolConfig::builder()
        .workers(2, 4)
        .dequeue_wait(Duration::from_millis(20))
        .build()
        .unwrap();
    let system = PoolSystem::builder()
        .with_pool_config(pool)
        .with_processor_config(processor)
        .with_registry(registry)
        .build()
        .unwrap();
    system.start().await.unwrap();
    system
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_suites_task_parallel() {
    let registry = HandlerRegistry::new();
    registry
        .register_fn("testing", |suite| {
            Ok(json!({
                "total_tests": suite["total"].clone(),
                "passed_tests": suite["passed"].clone(),
            }))
        })
        .unwrap();
    let system = start_system(registry, ProcessorConfig::default()).await;

    let result = system
        .processor()
        .process_testing_parallel(vec![
            json!({ "total": 10, "passed": 8 }),
            json!({ "total": 10, "passed": 10 }),
        ])
        .await;

    assert!(result.success);
    assert_eq!(result.strategy, ProcessingStrategy::TaskParallel);
    let aggregated = result.aggregated_result.unwrap();
    assert_eq!(aggregated["total_tests"], json!(20));
    assert_eq!(aggregated["passed_tests"], json!(18));
    assert_eq!(aggregated["failed_tests"], json!(2));
    assert_eq!(aggregated["success_rate"], json!(90.0));
    system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_code_analysis_data_parallel() {
    let registry = HandlerRegistry::new();
    registry
        .register_fn("code_analysis", |file| {
            anyhow::ensure!(file.is_string(), "expected a file path");
            Ok(json!({ "issues": 1, "quality_score": 6.0 }))
        })
        .unwrap();
    let system = start_system(registry, ProcessorConfig::default()).await;

    let files: Vec<Value> = (0..7).map(|i| json!(format!("src/file_{}.rs", i))).collect();
    let result = system.processor().process_code_analysis_parallel(files).await;

    assert!(result.success);
    assert_eq!(result.strategy, ProcessingStrategy::DataParallel);
    let aggregated = result.aggregated_result.unwrap();
    assert_eq!(aggregated["total_issues"], json!(7));
    assert_eq!(aggregated["units_analyzed"], json!(7));
    assert_eq!(aggregated["total_items"], json!(7));
    system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batch_size_controls_task_count() {
    let config = ProcessorConfig {
        batch_size: 4,
        ..Default::default()
    };
    let system = start_system(HandlerRegistry::new(), config).await;

    let items: Vec<Value> = (0..10).map(|i| json!(i)).collect();
    let result = system
        .processor()
        .process_parallel(
            "resize",
            json!({ "items": items }),
            "batch_parallel",
            Some(2),
            Some(Duration::from_secs(5)),
            Some(3),
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.results.len(), 3);
    assert_eq!(result.aggregated_result.unwrap()["batch_count"], json!(3));
    system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failures_show_up_in_stats() {
    let registry = HandlerRegistry::new();
    registry
        .register_fn("flaky", |item| {
            anyhow::ensure!(*item != json!(2), "item 2 is corrupt");
            Ok(item.clone())
        })
        .unwrap();
    let system = start_system(registry, ProcessorConfig::default()).await;

    let result = system
        .processor()
        .process_parallel("flaky", json!([1, 2, 3]), "task_parallel", None, None, None)
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.results.iter().filter(|r| r.success).count(), 2);

    assert!(system
        .processor()
        .process_parallel("flaky", json!([1]), "warp_parallel", None, None, None)
        .await
        .is_err());

    let stats = system.processor().get_processing_stats();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.successful_requests, 0);
    assert_eq!(stats.strategy_usage.get("task_parallel"), Some(&1));
    system.shutdown().await;
}
