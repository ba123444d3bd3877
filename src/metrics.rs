//! Metrics collection for worker pools
//!
//! Provides Prometheus-compatible metrics for task throughput, processing
//! latency, batch completion and worker activity.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, Encoder,
    HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};

lazy_static! {
    /// Counter for tasks accepted into a task queue
    static ref TASKS_SUBMITTED: IntCounterVec = register_int_counter_vec!(
        "batchpool_tasks_submitted_total",
        "Total number of tasks accepted into the task queue",
        &["pool"]
    ).unwrap();

    /// Counter for tasks processed, by outcome
    static ref TASKS_COMPLETED: IntCounterVec = register_int_counter_vec!(
        "batchpool_tasks_completed_total",
        "Total number of tasks processed",
        &["pool", "outcome"]
    ).unwrap();

    /// Histogram for processor duration
    static ref TASK_DURATION: HistogramVec = register_histogram_vec!(
        "batchpool_task_duration_seconds",
        "Time spent inside the processor per task",
        &["pool"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    /// Counter for batches whose completion was signalled
    static ref BATCHES_COMPLETED: IntCounterVec = register_int_counter_vec!(
        "batchpool_batches_completed_total",
        "Total number of batches completed",
        &["pool"]
    ).unwrap();

    /// Gauge for running workers
    static ref ACTIVE_WORKERS: IntGaugeVec = register_int_gauge_vec!(
        "batchpool_active_workers",
        "Number of workers currently running",
        &["pool"]
    ).unwrap();
}

/// Metrics recorder for one pool
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pool: String,
}

impl PoolMetrics {
    /// Create a recorder labelled with `pool`
    pub fn new(pool: impl Into<String>) -> Self {
        Self { pool: pool.into() }
    }

    /// Record a task entering the queue
    pub fn record_submitted(&self) {
        TASKS_SUBMITTED.with_label_values(&[&self.pool]).inc();
    }

    /// Record a processed task
    pub fn record_completed(&self, success: bool, duration_secs: f64) {
        let outcome = if success { "success" } else { "failure" };
        TASKS_COMPLETED
            .with_label_values(&[&self.pool, outcome])
            .inc();
        TASK_DURATION
            .with_label_values(&[&self.pool])
            .observe(duration_secs);
    }

    /// Record a batch completion
    pub fn record_batch_completed(&self) {
        BATCHES_COMPLETED.with_label_values(&[&self.pool]).inc();
    }

    /// Record a worker starting
    pub fn worker_started(&self) {
        ACTIVE_WORKERS.with_label_values(&[&self.pool]).inc();
    }

    /// Record a worker exiting
    pub fn worker_stopped(&self) {
        ACTIVE_WORKERS.with_label_values(&[&self.pool]).dec();
    }
}

/// Export metrics in Prometheus format
pub fn export_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer)
        .map_err(|e| format!("Failed to convert metrics to UTF-8: {}", e).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_metrics_export() {
        let metrics = PoolMetrics::new("metrics_test_pool");

        metrics.record_submitted();
        metrics.worker_started();
        metrics.record_completed(true, 0.02);
        metrics.record_completed(false, 0.5);
        metrics.record_batch_completed();
        metrics.worker_stopped();

        let text = export_metrics().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to export metrics: {}", e);
            String::new()
        });
        assert!(text.contains("batchpool_tasks_submitted_total"));
        assert!(text.contains("batchpool_batches_completed_total"));
        assert!(text.contains("metrics_test_pool"));
    }
}
