//! Sizing advisor: pool parameters recommended from an expected task count.
//!
//! This is a heuristic, not a throughput guarantee. It spares callers with a
//! known, bounded workload from hand-tuning the pool.

use serde::{Deserialize, Serialize};

use super::config::PoolConfig;

/// Upper bound on the number of recommended workers
pub const MAX_ADVISED_WORKERS: usize = 16;

/// Recommended pool parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingAdvice {
    /// Number of workers
    pub workers: usize,
    /// Task queue capacity
    pub task_queue_capacity: usize,
    /// Result queue capacity
    pub result_queue_capacity: usize,
    /// Tasks per batch
    pub batch_size: usize,
}

/// Recommend a pool shape for `num_tasks` tasks.
///
/// Workers grow with the square root of the workload, capped at
/// [`MAX_ADVISED_WORKERS`]. Both queues hold the whole workload so producers
/// never wait, and batches spread the work evenly over the workers.
pub fn compute_config(num_tasks: i64) -> SizingAdvice {
    if num_tasks <= 0 {
        return SizingAdvice {
            workers: 1,
            task_queue_capacity: 0,
            result_queue_capacity: 0,
            batch_size: 1,
        };
    }

    let tasks = num_tasks as usize;
    let workers = ((tasks as f64).sqrt().floor() as usize).clamp(1, MAX_ADVISED_WORKERS);

    SizingAdvice {
        workers,
        task_queue_capacity: tasks,
        result_queue_capacity: tasks,
        batch_size: tasks.div_ceil(workers),
    }
}

impl From<SizingAdvice> for PoolConfig {
    fn from(advice: SizingAdvice) -> Self {
        PoolConfig {
            workers: advice.workers,
            task_queue_capacity: advice.task_queue_capacity,
            result_queue_capacity: advice.result_queue_capacity,
            batch_size: advice.batch_size,
            ..PoolConfig::default()
        }
    }
}

impl PoolConfig {
    /// Configuration recommended by [`compute_config`]
    pub fn for_task_count(num_tasks: i64) -> Self {
        compute_config(num_tasks).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_workloads() {
        let expected = SizingAdvice {
            workers: 1,
            task_queue_capacity: 0,
            result_queue_capacity: 0,
            batch_size: 1,
        };
        assert_eq!(compute_config(0), expected);
        assert_eq!(compute_config(-5), expected);
    }

    #[test]
    fn test_single_task() {
        let advice = compute_config(1);
        assert_eq!(advice.workers, 1);
        assert_eq!(advice.batch_size, 1);
        assert_eq!(advice.task_queue_capacity, 1);
    }

    #[test]
    fn test_perfect_square() {
        let advice = compute_config(100);
        assert_eq!(advice.workers, 10);
        assert_eq!(advice.batch_size, 10);
        assert_eq!(advice.task_queue_capacity, 100);
        assert_eq!(advice.result_queue_capacity, 100);
    }

    #[test]
    fn test_uneven_and_capped() {
        // floor(sqrt(10)) = 3, ceil(10 / 3) = 4
        let advice = compute_config(10);
        assert_eq!((advice.workers, advice.batch_size), (3, 4));

        let advice = compute_config(10_000);
        assert_eq!(advice.workers, MAX_ADVISED_WORKERS);
        assert_eq!(advice.batch_size, 625);
    }

    #[test]
    fn test_into_pool_config() {
        let config = PoolConfig::for_task_count(100);
        assert_eq!(config.workers, 10);
        assert_eq!(config.batch_size, 10);
        assert!(config.validate().is_ok());
    }
}
