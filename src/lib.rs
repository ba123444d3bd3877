//! # batchpool
//!
//! A batched concurrent task executor: typed work items are distributed across a
//! fixed pool of tokio workers, and results are reported per task together with a
//! reliable "batch complete" signal per caller-defined batch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batchpool::pool::{Outcome, PoolConfig, WorkerPool};
//! use batchpool::processor::processor_fn;
//! use tokio_stream::StreamExt;
//!
//! # async fn example() -> batchpool::Result<()> {
//! let processor = processor_fn(|n: u64| async move { Outcome::Success(n * 2) });
//! let pool = WorkerPool::new(processor, PoolConfig::default().with_batch_size(5))?;
//!
//! let mut results = pool.results()?;
//! let mut done = pool.batch_done()?;
//!
//! let batches = pool.execute((0..13).collect()).await?;
//! assert_eq!(batches.len(), 3);
//!
//! for _ in 0..13 {
//!     let result = results.next().await.expect("result stream open");
//!     assert!(result.output.is_success());
//! }
//! for _ in 0..3 {
//!     done.next().await;
//! }
//!
//! pool.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`pool`]: the worker pool, its configuration, envelopes and sizing advisor
//! - [`processor`]: the pluggable unit of work and its adapters
//! - [`metrics`]: Prometheus metrics for pool activity

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use std::time::Duration;

use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors raised by the pool itself.
///
/// Failures of individual tasks are never reported here; they travel as
/// [`pool::TaskError`] inside each [`pool::TaskResult`].
#[derive(Error, Debug)]
pub enum PoolError {
    /// Configuration rejected at construction time
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// Submission attempted after shutdown began
    #[error("Pool is shut down and no longer accepts tasks")]
    ShutDown,

    /// Shutdown called more than once
    #[error("Pool shutdown was already requested")]
    AlreadyShutDown,

    /// Non-blocking submission found the task queue at capacity
    #[error("Task queue is full")]
    QueueFull,

    /// Bounded submission gave up waiting for queue capacity
    #[error("Timed out after {0:?} waiting for task queue capacity")]
    SubmitTimeout(Duration),

    /// A batch must contain at least one task
    #[error("Cannot submit an empty batch")]
    EmptyBatch,

    /// A result or batch-completion stream can be taken only once
    #[error("The {0} stream was already taken")]
    StreamTaken(&'static str),

    /// Every worker has exited, so the queue has no consumer left
    #[error("Task queue is closed")]
    Closed,

    /// The pool was constructed outside of a tokio runtime
    #[error("No tokio runtime available to spawn workers")]
    NoRuntime,

    /// One or more workers terminated abnormally
    #[error("{count} worker(s) terminated abnormally: {message}")]
    WorkerPanicked {
        /// Number of workers that did not exit cleanly
        count: usize,
        /// Message of the first failure
        message: String,
    },
}

/// Worker pool core, configuration and sizing
pub mod pool;

/// Pluggable processors
pub mod processor;

/// Prometheus metrics for pool activity
pub mod metrics;
