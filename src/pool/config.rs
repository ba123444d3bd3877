//! Construction-time pool configuration

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{PoolError, Result};

/// Default number of workers
pub const DEFAULT_WORKERS: usize = 5;
/// Default capacity of the task and result queues
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
/// Default number of tasks per batch in [`execute`](super::WorkerPool::execute)
pub const DEFAULT_BATCH_SIZE: usize = 5;
/// Default pool name used as the metrics label
pub const DEFAULT_POOL_NAME: &str = "batchpool";

const ENV_NAME: &str = "BATCHPOOL_NAME";
const ENV_WORKERS: &str = "BATCHPOOL_WORKERS";
const ENV_TASK_QUEUE_CAPACITY: &str = "BATCHPOOL_TASK_QUEUE_CAPACITY";
const ENV_RESULT_QUEUE_CAPACITY: &str = "BATCHPOOL_RESULT_QUEUE_CAPACITY";
const ENV_BATCH_SIZE: &str = "BATCHPOOL_BATCH_SIZE";

/// Worker pool configuration, fixed once the pool is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Name attached to logs and metrics
    pub name: String,
    /// Number of concurrent workers
    pub workers: usize,
    /// Capacity of the task queue before `submit` waits
    pub task_queue_capacity: usize,
    /// Capacity of the result queue before workers wait
    pub result_queue_capacity: usize,
    /// Tasks per batch when partitioning in `execute`, and the expected size of
    /// batches the pool did not open itself
    pub batch_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_POOL_NAME.to_string(),
            workers: DEFAULT_WORKERS,
            task_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            result_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set pool name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set number of workers
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set task queue capacity
    pub fn with_task_queue_capacity(mut self, capacity: usize) -> Self {
        self.task_queue_capacity = capacity;
        self
    }

    /// Set result queue capacity
    pub fn with_result_queue_capacity(mut self, capacity: usize) -> Self {
        self.result_queue_capacity = capacity;
        self
    }

    /// Set both queue capacities
    pub fn with_queue_capacity(self, capacity: usize) -> Self {
        self.with_task_queue_capacity(capacity)
            .with_result_queue_capacity(capacity)
    }

    /// Set batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Defaults overridden by `BATCHPOOL_*` environment variables.
    ///
    /// Unset variables keep their default; unparsable values are an error.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(name) = std::env::var(ENV_NAME) {
            config.name = name;
        }
        if let Some(workers) = read_env(ENV_WORKERS)? {
            config.workers = workers;
        }
        if let Some(capacity) = read_env(ENV_TASK_QUEUE_CAPACITY)? {
            config.task_queue_capacity = capacity;
        }
        if let Some(capacity) = read_env(ENV_RESULT_QUEUE_CAPACITY)? {
            config.result_queue_capacity = capacity;
        }
        if let Some(batch_size) = read_env(ENV_BATCH_SIZE)? {
            config.batch_size = batch_size;
        }
        Ok(config)
    }

    /// Parse a JSON document; missing fields keep their default
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PoolError::InvalidConfig(e.to_string()))
    }

    /// Check the configuration can build a working pool
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(PoolError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(PoolError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Channel capacity for the task queue; tokio channels need at least one slot
    pub(crate) fn task_channel_capacity(&self) -> usize {
        self.task_queue_capacity.max(1)
    }

    /// Channel capacity for the result queue
    pub(crate) fn result_channel_capacity(&self) -> usize {
        self.result_queue_capacity.max(1)
    }
}

fn read_env(key: &str) -> Result<Option<usize>> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<usize>().map(Some).map_err(|e| {
            warn!(key = key, value = %raw, "Rejecting pool setting from environment");
            PoolError::InvalidConfig(format!("{key}={raw}: {e}"))
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.workers, 5);
        assert_eq!(config.task_queue_capacity, 100);
        assert_eq!(config.result_queue_capacity, 100);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.name, DEFAULT_POOL_NAME);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PoolConfig::new()
            .with_name("uploads")
            .with_workers(3)
            .with_queue_capacity(7)
            .with_result_queue_capacity(9)
            .with_batch_size(2);

        assert_eq!(config.name, "uploads");
        assert_eq!(config.workers, 3);
        assert_eq!(config.task_queue_capacity, 7);
        assert_eq!(config.result_queue_capacity, 9);
        assert_eq!(config.batch_size, 2);
    }

    #[test]
    fn test_validate_rejects_zero_workers_and_batch() {
        assert!(matches!(
            PoolConfig::default().with_workers(0).validate(),
            Err(PoolError::InvalidConfig(_))
        ));
        assert!(matches!(
            PoolConfig::default().with_batch_size(0).validate(),
            Err(PoolError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_capacity_maps_to_single_slot() {
        let config = PoolConfig::default().with_queue_capacity(0);
        assert!(config.validate().is_ok());
        assert_eq!(config.task_channel_capacity(), 1);
        assert_eq!(config.result_channel_capacity(), 1);
    }

    #[test]
    fn test_from_json_partial() {
        let config = PoolConfig::from_json(r#"{"workers": 8, "batch_size": 10}"#).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.task_queue_capacity, DEFAULT_QUEUE_CAPACITY);

        assert!(PoolConfig::from_json("{\"workers\": -1}").is_err());
    }

    #[test]
    fn test_from_env() {
        std::env::set_var(ENV_WORKERS, "12");
        std::env::set_var(ENV_BATCH_SIZE, "3");
        let config = PoolConfig::from_env().unwrap();
        assert_eq!(config.workers, 12);
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.result_queue_capacity, DEFAULT_QUEUE_CAPACITY);

        std::env::set_var(ENV_WORKERS, "many");
        assert!(PoolConfig::from_env().is_err());

        std::env::remove_var(ENV_WORKERS);
        std::env::remove_var(ENV_BATCH_SIZE);
    }
}
