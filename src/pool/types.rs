//! Task and result envelopes, the task outcome type and pool status types

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a single task, unique per pool instance
pub type TaskId = u64;

/// Identifier of a batch of tasks, unique per pool instance
pub type BatchId = u64;

/// Batch ID carried by tasks that belong to no batch; never tracked or signalled
pub const NO_BATCH: BatchId = 0;

/// One unit of input work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task<T> {
    /// Task identifier
    pub id: TaskId,
    /// Batch this task belongs to
    pub batch_id: BatchId,
    /// Input handed to the processor
    pub input: T,
}

impl<T> Task<T> {
    /// Create a task outside of any batch
    pub fn new(id: TaskId, input: T) -> Self {
        Self {
            id,
            batch_id: NO_BATCH,
            input,
        }
    }

    /// Create a task already tagged with a batch
    pub fn with_batch(id: TaskId, batch_id: BatchId, input: T) -> Self {
        Self { id, batch_id, input }
    }
}

/// Reason a processor could not complete a task
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskError {
    /// The processor attempted the work and it failed
    #[error("Task failed: {0}")]
    Failed(String),

    /// The input was rejected before processing
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The processor did not finish within its time limit
    #[error("Task timed out after {0:?}")]
    TimedOut(Duration),

    /// The processor panicked and the panic was recovered
    #[error("Task panicked: {0}")]
    Panicked(String),
}

/// Outcome of processing one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome<U> {
    /// The processor produced a value
    Success(U),
    /// The processor reported a failure
    Failure(TaskError),
}

impl<U> Outcome<U> {
    /// Shorthand for `Outcome::Failure(TaskError::Failed(..))`
    pub fn failed(message: impl Into<String>) -> Self {
        Outcome::Failure(TaskError::Failed(message.into()))
    }

    /// Whether the task succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Whether the task failed
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// Borrow the value on success
    pub fn value(&self) -> Option<&U> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    /// Borrow the error on failure
    pub fn error(&self) -> Option<&TaskError> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(err) => Some(err),
        }
    }

    /// Convert into a standard `Result`
    pub fn into_result(self) -> std::result::Result<U, TaskError> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(err) => Err(err),
        }
    }

    /// Transform the success value
    pub fn map<V, F>(self, f: F) -> Outcome<V>
    where
        F: FnOnce(U) -> V,
    {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failure(err) => Outcome::Failure(err),
        }
    }
}

impl<U, E> From<std::result::Result<U, E>> for Outcome<U>
where
    E: Into<TaskError>,
{
    fn from(result: std::result::Result<U, E>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::Failure(err.into()),
        }
    }
}

/// Result of one task, correlated with its task and batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult<U> {
    /// Task that produced this result
    pub task_id: TaskId,
    /// Batch the task belonged to
    pub batch_id: BatchId,
    /// What the processor returned
    pub output: Outcome<U>,
    /// Time spent inside the processor
    pub elapsed: Duration,
}

/// Lifecycle of a pool instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolState {
    /// Queues built, workers not yet spawned
    Created,
    /// Workers consuming tasks
    Running,
    /// Shutdown requested, workers finishing queued work
    Draining,
    /// All workers exited and output streams closed
    Stopped,
}

/// Snapshot of pool activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Tasks accepted into the queue
    pub submitted_tasks: u64,
    /// Tasks whose result was produced
    pub completed_tasks: u64,
    /// Completed tasks whose outcome was a failure
    pub failed_tasks: u64,
    /// Batches whose completion was signalled
    pub completed_batches: u64,
    /// Batches still being tracked
    pub in_flight_batches: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        let ok: Outcome<u32> = Outcome::Success(7);
        assert!(ok.is_success());
        assert!(!ok.is_failure());
        assert_eq!(ok.value(), Some(&7));
        assert!(ok.error().is_none());

        let err: Outcome<u32> = Outcome::failed("disk unavailable");
        assert!(err.is_failure());
        assert_eq!(err.value(), None);
        assert_eq!(
            err.error(),
            Some(&TaskError::Failed("disk unavailable".to_string()))
        );
    }

    #[test]
    fn test_outcome_from_result() {
        let outcome: Outcome<&str> = Err::<&str, _>(TaskError::InvalidInput("empty".into())).into();
        assert_eq!(
            outcome.into_result(),
            Err(TaskError::InvalidInput("empty".to_string()))
        );

        let outcome: Outcome<u8> = Ok::<u8, TaskError>(3).into();
        assert_eq!(outcome.map(|v| v as u32 * 2), Outcome::Success(6));
    }

    #[test]
    fn test_task_constructors() {
        let task = Task::new(4, "payload");
        assert_eq!(task.batch_id, NO_BATCH);

        let task = Task::with_batch(5, 2, "payload");
        assert_eq!((task.id, task.batch_id), (5, 2));
    }
}
