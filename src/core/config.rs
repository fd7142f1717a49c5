use crate::core::errors::{PoolError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Worker pool configuration with all tuning parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    // Worker pool sizing
    /// Minimum number of workers to maintain
    pub min_workers: usize,
    /// Maximum number of concurrent workers
    pub max_workers: usize,

    // Auto-scaling
    /// System load above which one worker is added
    pub scaling_threshold: f64,
    /// System load below which one idle worker may be removed
    pub scale_down_threshold: f64,
    /// Largest queue depth that still allows scaling down (0 = queue must be empty)
    pub scale_down_max_queue: usize,
    /// Auto-scaler tick interval
    pub autoscale_interval: Duration,

    // Health and cleanup
    /// Cleanup loop interval
    pub cleanup_interval: Duration,
    /// How long completed results stay retrievable
    pub result_retention: Duration,
    /// Error count above which an errored worker is recycled
    pub max_worker_errors: u32,
    /// Idle time after which a surplus worker is removed
    pub worker_idle_timeout: Duration,

    // Metrics
    /// Metrics collector interval
    pub metrics_interval: Duration,

    // Task execution
    /// Bounded wait a worker spends on an empty queue before re-checking liveness
    pub dequeue_wait: Duration,
    /// Timeout applied to tasks submitted without one
    pub default_task_timeout: Option<Duration>,
    /// Priority used by `submit_task`
    pub default_priority: i32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);

        Self {
            min_workers: 2,
            max_workers: (cpu_count * 2).max(2),

            scaling_threshold: 0.8,
            scale_down_threshold: 0.3,
            scale_down_max_queue: 0,
            autoscale_interval: Duration::from_secs(10),

            cleanup_interval: Duration::from_secs(30),
            result_retention: Duration::from_secs(3600),
            max_worker_errors: 5,
            worker_idle_timeout: Duration::from_secs(300),

            metrics_interval: Duration::from_secs(60),

            dequeue_wait: Duration::from_secs(1),
            default_task_timeout: None,
            default_priority: 5,
        }
    }
}

impl PoolConfig {
    /// Create a new builder for PoolConfig
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(PoolError::configuration("max_workers must be greater than 0"));
        }
        if self.min_workers > self.max_workers {
            return Err(PoolError::configuration(
                "min_workers cannot be greater than max_workers",
            ));
        }
        if !(0.0..=1.0).contains(&self.scaling_threshold) {
            return Err(PoolError::configuration(
                "scaling_threshold must be between 0.0 and 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.scale_down_threshold) {
            return Err(PoolError::configuration(
                "scale_down_threshold must be between 0.0 and 1.0",
            ));
        }
        if self.scale_down_threshold >= self.scaling_threshold {
            return Err(PoolError::configuration(
                "scale_down_threshold must be below scaling_threshold",
            ));
        }
        for (name, interval) in [
            ("autoscale_interval", self.autoscale_interval),
            ("cleanup_interval", self.cleanup_interval),
            ("metrics_interval", self.metrics_interval),
            ("dequeue_wait", self.dequeue_wait),
        ] {
            if interval.is_zero() {
                return Err(PoolError::configuration(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }
        if let Some(timeout) = self.default_task_timeout {
            if timeout.is_zero() {
                return Err(PoolError::configuration(
                    "default_task_timeout must be greater than 0",
                ));
            }
        }
        Ok(())
    }

    /// Small, fast-ticking pool for development and tests
    pub fn development() -> Self {
        Self {
            min_workers: 1,
            max_workers: 4,
            autoscale_interval: Duration::from_secs(1),
            cleanup_interval: Duration::from_secs(5),
            metrics_interval: Duration::from_secs(10),
            dequeue_wait: Duration::from_millis(100),
            worker_idle_timeout: Duration::from_secs(30),
            ..Default::default()
        }
    }

    /// Create a configuration for production
    pub fn production() -> Self {
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);

        Self {
            min_workers: cpu_count,
            max_workers: cpu_count * 4,
            default_task_timeout: Some(Duration::from_secs(300)),
            ..Default::default()
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yaml`/`.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PoolError::io(format!("read {}", path.display()), e))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            other => Err(PoolError::invalid_value(
                "config file extension",
                other.unwrap_or(""),
            )),
        }
    }
}

/// Builder for PoolConfig
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
        }
    }

    /// Set the worker bounds
    pub fn workers(mut self, min: usize, max: usize) -> Self {
        self.config.min_workers = min;
        self.config.max_workers = max;
        self
    }

    /// Set scale-up and scale-down load thresholds
    pub fn thresholds(mut self, scale_up: f64, scale_down: f64) -> Self {
        self.config.scaling_threshold = scale_up;
        self.config.scale_down_threshold = scale_down;
        self
    }

    pub fn scale_down_max_queue(mut self, depth: usize) -> Self {
        self.config.scale_down_max_queue = depth;
        self
    }

    pub fn autoscale_interval(mut self, interval: Duration) -> Self {
        self.config.autoscale_interval = interval;
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.config.cleanup_interval = interval;
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.config.metrics_interval = interval;
        self
    }

    pub fn result_retention(mut self, retention: Duration) -> Self {
        self.config.result_retention = retention;
        self
    }

    pub fn max_worker_errors(mut self, errors: u32) -> Self {
        self.config.max_worker_errors = errors;
        self
    }

    pub fn worker_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.worker_idle_timeout = timeout;
        self
    }

    pub fn dequeue_wait(mut self, wait: Duration) -> Self {
        self.config.dequeue_wait = wait;
        self
    }

    pub fn default_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.default_task_timeout = timeout;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<PoolConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings for the task coordinator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Timeout used when a coordinated task does not specify one
    pub default_timeout: Duration,
    pub default_priority: i32,
    /// How many times a failed subtask is re-queued before its failure counts
    pub subtask_max_retries: u32,
    /// Analysis types used when code analysis input names none
    pub default_analysis_types: Vec<String>,
    /// Ordered debugging steps
    pub debugging_steps: Vec<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(60),
            default_priority: 1,
            subtask_max_retries: 0,
            default_analysis_types: vec![
                "syntax".to_string(),
                "quality".to_string(),
                "security".to_string(),
            ],
            debugging_steps: vec![
                "analyze".to_string(),
                "locate".to_string(),
                "fix".to_string(),
                "verify".to_string(),
            ],
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout.is_zero() {
            return Err(PoolError::configuration("default_timeout must be greater than 0"));
        }
        if self.debugging_steps.is_empty() {
            return Err(PoolError::configuration("debugging_steps cannot be empty"));
        }
        Ok(())
    }
}

/// Settings for the parallel processor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Items per task for batch processing
    pub batch_size: usize,
    /// Items per window for streaming processing
    pub window_size: usize,
    pub default_timeout: Duration,
    pub default_priority: i32,
    /// Stages used by pipeline processing when the input names none
    pub default_pipeline_stages: Vec<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            window_size: 5,
            default_timeout: Duration::from_secs(60),
            default_priority: 1,
            default_pipeline_stages: vec![
                "preprocess".to_string(),
                "process".to_string(),
                "postprocess".to_string(),
            ],
        }
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PoolError::configuration("batch_size must be greater than 0"));
        }
        if self.window_size == 0 {
            return Err(PoolError::configuration("window_size must be greater than 0"));
        }
        if self.default_timeout.is_zero() {
            return Err(PoolError::configuration("default_timeout must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scaling_threshold, 0.8);
        assert_eq!(config.default_priority, 5);
    }

    #[test]
    fn test_presets_validate() {
        let dev = PoolConfig::development();
        assert!(dev.validate().is_ok());
        assert_eq!(dev.min_workers, 1);
        assert_eq!(dev.max_workers, 4);

        let prod = PoolConfig::production();
        assert!(prod.validate().is_ok());
        assert!(prod.default_task_timeout.is_some());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = PoolConfig::default();

        config.max_workers = 0;
        assert!(config.validate().is_err());
        config.max_workers = 4;

        config.min_workers = 5;
        assert!(config.validate().is_err());
        config.min_workers = 1;

        config.scale_down_threshold = 0.9;
        assert!(config.validate().is_err());
        config.scale_down_threshold = 0.3;

        config.dequeue_wait = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = PoolConfig::builder()
            .workers(2, 8)
            .thresholds(0.75, 0.25)
            .max_worker_errors(3)
            .dequeue_wait(Duration::from_millis(50))
            .build()
            .unwrap();

        assert_eq!(config.min_workers, 2);
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.scaling_threshold, 0.75);
        assert_eq!(config.max_worker_errors, 3);

        assert!(PoolConfig::builder().workers(4, 2).build().is_err());
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = "min_workers: 3\nmax_workers: 6\nscaling_threshold: 0.9\n";
        let config = PoolConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.min_workers, 3);
        assert_eq!(config.max_workers, 6);
        assert_eq!(config.scaling_threshold, 0.9);
        assert_eq!(config.max_worker_errors, 5);

        assert!(PoolConfig::from_yaml_str("min_workers: 9\nmax_workers: 1\n").is_err());
    }

    #[test]
    fn test_from_json() {
        let config = PoolConfig::from_json_str(r#"{"min_workers": 1, "max_workers": 2}"#).unwrap();
        assert_eq!(config.max_workers, 2);
    }

    #[test]
    fn test_component_configs() {
        assert!(CoordinatorConfig::default().validate().is_ok());
        assert_eq!(CoordinatorConfig::default().debugging_steps.len(), 4);

        let mut processor = ProcessorConfig::default();
        assert!(processor.validate().is_ok());
        assert_eq!(processor.batch_size, 10);
        processor.window_size = 0;
        assert!(processor.validate().is_err());
    }
}
