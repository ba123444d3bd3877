//! Task and batch ID allocation and per-batch completion counts

use std::collections::HashMap;
use std::ops::Range;

use parking_lot::Mutex;
use tracing::debug;

use super::types::{BatchId, TaskId, NO_BATCH};

/// Progress of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// Number of tasks that make up the batch
    pub expected: usize,
    /// Number of tasks whose result has been produced
    pub completed: usize,
}

#[derive(Debug)]
struct TrackerState {
    next_task_id: TaskId,
    next_batch_id: BatchId,
    batches: HashMap<BatchId, BatchProgress>,
}

/// ID counters and per-batch completion counts of one pool.
///
/// All state sits behind a single lock. Critical sections are a counter bump or a
/// map lookup, so the lock is never held across processing or an `.await`.
#[derive(Debug)]
pub struct BatchTracker {
    default_batch_size: usize,
    state: Mutex<TrackerState>,
}

impl BatchTracker {
    /// Create a tracker. `default_batch_size` is the expected size of any batch
    /// that completes tasks without having been opened through [`open_batch`](Self::open_batch).
    pub fn new(default_batch_size: usize) -> Self {
        Self {
            default_batch_size,
            state: Mutex::new(TrackerState {
                next_task_id: 1,
                next_batch_id: 1,
                batches: HashMap::new(),
            }),
        }
    }

    /// Allocate one fresh task ID
    pub fn next_task_id(&self) -> TaskId {
        let mut state = self.state.lock();
        let id = state.next_task_id;
        state.next_task_id += 1;
        id
    }

    /// Allocate `count` consecutive task IDs in one step
    pub fn reserve_task_ids(&self, count: usize) -> Range<TaskId> {
        let mut state = self.state.lock();
        let start = state.next_task_id;
        state.next_task_id += count as TaskId;
        start..state.next_task_id
    }

    /// Allocate a batch ID and start tracking it with `expected` tasks
    pub fn open_batch(&self, expected: usize) -> BatchId {
        let mut state = self.state.lock();
        let batch_id = state.next_batch_id;
        state.next_batch_id += 1;
        state.batches.insert(
            batch_id,
            BatchProgress {
                expected,
                completed: 0,
            },
        );
        debug!(batch_id = batch_id, expected = expected, "Opened batch");
        batch_id
    }

    /// Count one finished task of `batch_id`.
    ///
    /// Returns `true` exactly once per batch: on the completion that brings the
    /// count up to the expected size. The entry is dropped at that point.
    /// Tasks outside any batch ([`NO_BATCH`]) are not tracked and never complete one.
    pub fn record_completion(&self, batch_id: BatchId) -> bool {
        if batch_id == NO_BATCH {
            return false;
        }
        let mut state = self.state.lock();
        let default_batch_size = self.default_batch_size;
        let progress = state.batches.entry(batch_id).or_insert(BatchProgress {
            expected: default_batch_size,
            completed: 0,
        });
        progress.completed += 1;

        if progress.completed >= progress.expected {
            state.batches.remove(&batch_id);
            true
        } else {
            false
        }
    }

    /// Stop tracking a batch whose tasks will never all be processed
    pub fn discard_batch(&self, batch_id: BatchId) -> Option<BatchProgress> {
        let removed = self.state.lock().batches.remove(&batch_id);
        if let Some(progress) = removed {
            debug!(
                batch_id = batch_id,
                expected = progress.expected,
                completed = progress.completed,
                "Discarded batch"
            );
        }
        removed
    }

    /// Progress of a batch still being tracked
    pub fn pending(&self, batch_id: BatchId) -> Option<BatchProgress> {
        self.state.lock().batches.get(&batch_id).copied()
    }

    /// Number of batches still being tracked
    pub fn in_flight(&self) -> usize {
        self.state.lock().batches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ids_strictly_increase() {
        let tracker = BatchTracker::new(5);
        assert_eq!(tracker.next_task_id(), 1);
        assert_eq!(tracker.reserve_task_ids(3), 2..5);
        assert_eq!(tracker.next_task_id(), 5);

        assert_eq!(tracker.open_batch(2), 1);
        assert_eq!(tracker.open_batch(2), 2);
    }

    #[test]
    fn test_completion_fires_once_and_clears_entry() {
        let tracker = BatchTracker::new(5);
        let batch = tracker.open_batch(3);

        assert!(!tracker.record_completion(batch));
        assert!(!tracker.record_completion(batch));
        assert_eq!(
            tracker.pending(batch),
            Some(BatchProgress {
                expected: 3,
                completed: 2
            })
        );
        assert!(tracker.record_completion(batch));
        assert_eq!(tracker.pending(batch), None);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_unopened_batch_uses_default_size() {
        let tracker = BatchTracker::new(2);
        assert!(!tracker.record_completion(42));
        assert_eq!(tracker.in_flight(), 1);
        assert!(tracker.record_completion(42));
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_tasks_outside_batches_are_not_tracked() {
        let tracker = BatchTracker::new(1);
        for _ in 0..3 {
            assert!(!tracker.record_completion(NO_BATCH));
        }
        assert_eq!(tracker.pending(NO_BATCH), None);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_discard_batch() {
        let tracker = BatchTracker::new(5);
        let batch = tracker.open_batch(4);
        assert!(!tracker.record_completion(batch));

        assert_eq!(
            tracker.discard_batch(batch),
            Some(BatchProgress {
                expected: 4,
                completed: 1
            })
        );
        assert_eq!(tracker.in_flight(), 0);
        assert_eq!(tracker.discard_batch(batch), None);
    }

    #[test]
    fn test_concurrent_id_reservation_is_unique() {
        let tracker = Arc::new(BatchTracker::new(5));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    let mut ids: Vec<TaskId> = tracker.reserve_task_ids(50).collect();
                    ids.extend((0..50).map(|_| tracker.next_task_id()));
                    ids
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate task id {id}");
            }
        }
        assert_eq!(seen.len(), 800);
    }
}
