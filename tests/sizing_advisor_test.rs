use batchpool::pool::{compute_config, PoolConfig, SizingAdvice, MAX_ADVISED_WORKERS};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Boundary workloads from the sizing rules
#[test]
fn test_sizing_boundaries() {
    assert_eq!(
        compute_config(0),
        SizingAdvice {
            workers: 1,
            task_queue_capacity: 0,
            result_queue_capacity: 0,
            batch_size: 1,
        }
    );

    let hundred = compute_config(100);
    assert_eq!((hundred.workers, hundred.batch_size), (10, 10));

    let one = compute_config(1);
    assert_eq!((one.workers, one.batch_size), (1, 1));

    // floor(sqrt(13)) = 3, ceil(13 / 3) = 5
    let thirteen = compute_config(13);
    assert_eq!((thirteen.workers, thirteen.batch_size), (3, 5));
}

/// The degenerate advice still builds a valid pool configuration
#[test]
fn test_degenerate_advice_is_valid_config() {
    let config: PoolConfig = compute_config(-1).into();
    assert!(config.validate().is_ok());
}

proptest! {
    #[test]
    fn advice_covers_the_workload(num_tasks in 1i64..1_000_000) {
        let advice = compute_config(num_tasks);
        let tasks = num_tasks as usize;

        prop_assert!(advice.workers >= 1 && advice.workers <= MAX_ADVISED_WORKERS);
        prop_assert!(advice.workers * advice.workers <= tasks);
        prop_assert_eq!(advice.task_queue_capacity, tasks);
        prop_assert_eq!(advice.result_queue_capacity, tasks);

        // batch_size is the smallest size that spreads the work over every worker
        prop_assert!(advice.workers * advice.batch_size >= tasks);
        prop_assert!(advice.workers * (advice.batch_size - 1) < tasks);
    }

    #[test]
    fn advice_is_monotonic_in_workers(a in 1i64..100_000, b in 1i64..100_000) {
        let (small, large) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(compute_config(small).workers <= compute_config(large).workers);
    }

    #[test]
    fn non_positive_workloads_are_degenerate(num_tasks in i64::MIN..=0) {
        let advice = compute_config(num_tasks);
        prop_assert_eq!(advice.workers, 1);
        prop_assert_eq!(advice.batch_size, 1);
        prop_assert_eq!(advice.task_queue_capacity, 0);
    }
}
