//! Worker and pool metrics
//!
//! Per-worker metrics are plain values updated through [`WorkerMetrics::record`],
//! an explicit `old + sample -> new` transition, so the arithmetic can be tested
//! without running a pool. Pool-wide counters are atomics shared by all workers.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Process resource usage captured by the metrics collector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub memory_bytes: u64,
    pub cpu_percent: f32,
}

/// One finished task attempt as seen by the worker that ran it
#[derive(Debug, Clone, Copy)]
pub struct TaskSample {
    pub execution_time: Duration,
    pub success: bool,
}

/// Running metrics for a single worker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub tasks_completed: u64,
    pub total_processing_time: Duration,
    pub avg_processing_time: Duration,
    pub error_count: u32,
    pub resources: ResourceSnapshot,
}

impl WorkerMetrics {
    /// Fold one task sample into the metrics
    pub fn record(self, sample: TaskSample) -> Self {
        let tasks_completed = self.tasks_completed + 1;
        let total_processing_time = self.total_processing_time + sample.execution_time;
        let avg_nanos = total_processing_time.as_nanos() / u128::from(tasks_completed);
        let avg_processing_time =
            Duration::from_nanos(u64::try_from(avg_nanos).unwrap_or(u64::MAX));
        let error_count = if sample.success {
            self.error_count
        } else {
            self.error_count.saturating_add(1)
        };

        Self {
            tasks_completed,
            total_processing_time,
            avg_processing_time,
            error_count,
            resources: self.resources,
        }
    }

    pub fn with_resources(self, resources: ResourceSnapshot) -> Self {
        Self { resources, ..self }
    }
}

/// Pool-wide task counters
#[derive(Debug)]
pub struct PoolCounters {
    started: Instant,
    tasks_submitted: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    total_execution_time_us: AtomicU64,
}

impl Default for PoolCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolCounters {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            tasks_submitted: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            total_execution_time_us: AtomicU64::new(0),
        }
    }

    pub fn record_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished attempt, successful or not
    pub fn record_finished(&self, sample: TaskSample) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        if !sample.success {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_execution_time_us
            .fetch_add(sample.execution_time.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            uptime: self.started.elapsed(),
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            total_execution_time: Duration::from_micros(
                self.total_execution_time_us.load(Ordering::Relaxed),
            ),
        }
    }
}

/// Snapshot of the pool counters at a point in time
#[derive(Debug, Clone)]
pub struct CountersSnapshot {
    pub uptime: Duration,
    pub tasks_submitted: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub total_execution_time: Duration,
}

impl CountersSnapshot {
    pub fn avg_processing_time(&self) -> Duration {
        if self.tasks_completed == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(
                self.total_execution_time.as_secs_f64() / self.tasks_completed as f64,
            )
        }
    }

    /// Completed tasks per minute of uptime
    pub fn throughput_per_minute(&self) -> f64 {
        let minutes = self.uptime.as_secs_f64() / 60.0;
        if minutes <= 0.0 {
            0.0
        } else {
            self.tasks_completed as f64 / minutes
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.tasks_completed == 0 {
            0.0
        } else {
            (self.tasks_completed - self.tasks_failed) as f64 / self.tasks_completed as f64
        }
    }
}

/// Timer for measuring execution duration
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

/// Samples memory and CPU usage of the current process
pub struct ResourceSampler {
    system: sysinfo::System,
    pid: Option<sysinfo::Pid>,
}

impl ResourceSampler {
    pub fn new() -> Self {
        Self {
            system: sysinfo::System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// Refresh and read the process usage; zeroes when the platform can't report it
    pub fn sample(&mut self) -> ResourceSnapshot {
        let Some(pid) = self.pid else {
            return ResourceSnapshot::default();
        };
        let refreshed = self
            .system
            .refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]));
        if refreshed == 0 {
            return ResourceSnapshot::default();
        }
        self.system
            .process(pid)
            .map(|process| ResourceSnapshot {
                memory_bytes: process.memory(),
                cpu_percent: process.cpu_usage(),
            })
            .unwrap_or_default()
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}
