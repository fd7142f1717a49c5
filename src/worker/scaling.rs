//! Auto-scaling decisions.
//!
//! `system_load = max(busy / total, min(queue / (2 * total), 1.0))`. One worker
//! is added when the load exceeds the scale-up threshold, one idle worker is
//! removed when the load is clearly low and the backlog is drained.

use crate::core::config::PoolConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadSnapshot {
    pub total_workers: usize,
    pub busy_workers: usize,
    pub idle_workers: usize,
    pub queue_size: usize,
}

impl LoadSnapshot {
    pub fn worker_load(&self) -> f64 {
        if self.total_workers == 0 {
            0.0
        } else {
            self.busy_workers as f64 / self.total_workers as f64
        }
    }

    pub fn queue_load(&self) -> f64 {
        if self.total_workers == 0 {
            // Any backlog with no workers is full load
            if self.queue_size > 0 {
                1.0
            } else {
                0.0
            }
        } else {
            (self.queue_size as f64 / (self.total_workers * 2) as f64).min(1.0)
        }
    }

    pub fn system_load(&self) -> f64 {
        self.worker_load().max(self.queue_load())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    ScaleUp,
    ScaleDown,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingPolicy {
    pub min_workers: usize,
    pub max_workers: usize,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub scale_down_max_queue: usize,
}

impl From<&PoolConfig> for ScalingPolicy {
    fn from(config: &PoolConfig) -> Self {
        Self {
            min_workers: config.min_workers,
            max_workers: config.max_workers,
            scale_up_threshold: config.scaling_threshold,
            scale_down_threshold: config.scale_down_threshold,
            scale_down_max_queue: config.scale_down_max_queue,
        }
    }
}

impl ScalingPolicy {
    pub fn decide(&self, load: &LoadSnapshot) -> ScalingDecision {
        let system_load = load.system_load();
        if system_load > self.scale_up_threshold && load.total_workers < self.max_workers {
            ScalingDecision::ScaleUp
        } else if system_load < self.scale_down_threshold
            && load.total_workers > self.min_workers
            && load.queue_size <= self.scale_down_max_queue
            && load.idle_workers > 0
        {
            ScalingDecision::ScaleDown
        } else {
            ScalingDecision::Hold
        }
    }

    pub fn clamp(&self, target: usize) -> usize {
        target.clamp(self.min_workers, self.max_workers)
    }
}
