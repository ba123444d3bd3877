//! Worker Pool Implementation
//!
//! A fixed set of tokio workers consumes tasks from one bounded queue:
//! - Backpressure through bounded task and result queues
//! - Per-batch completion tracking with an exactly-once completion signal
//! - Guarded shutdown that drains queued work before the streams close
//! - Structured logging and Prometheus metrics for every task

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::config::PoolConfig;
use super::sizing::compute_config;
use super::tracker::BatchTracker;
use super::types::{BatchId, PoolState, PoolStats, Task, TaskResult};
use crate::metrics::PoolMetrics;
use crate::processor::Processor;
use crate::{PoolError, Result};

/// Stream of task results, in completion order
pub type ResultStream<U> = ReceiverStream<TaskResult<U>>;

/// Stream of completed batch IDs
pub type BatchDoneStream = UnboundedReceiverStream<BatchId>;

#[derive(Debug, Default)]
struct PoolCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    batches: AtomicU64,
}

struct Control<T> {
    state: PoolState,
    sender: Option<mpsc::Sender<Task<T>>>,
    workers: Vec<JoinHandle<()>>,
}

/// State shared by every worker of one pool
struct WorkerShared<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    pool_id: Uuid,
    processor: Arc<dyn Processor<T, U>>,
    queue: tokio::sync::Mutex<mpsc::Receiver<Task<T>>>,
    tracker: Arc<BatchTracker>,
    counters: Arc<PoolCounters>,
    metrics: PoolMetrics,
}

/// Fixed-size pool of workers running one [`Processor`] over queued tasks
pub struct WorkerPool<T, U> {
    id: Uuid,
    config: PoolConfig,
    tracker: Arc<BatchTracker>,
    counters: Arc<PoolCounters>,
    metrics: PoolMetrics,
    control: Mutex<Control<T>>,
    results: Mutex<Option<mpsc::Receiver<TaskResult<U>>>>,
    batch_done: Mutex<Option<mpsc::UnboundedReceiver<BatchId>>>,
}

impl<T, U> std::fmt::Debug for WorkerPool<T, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("state", &self.control.lock().state)
            .finish()
    }
}

impl<T, U> WorkerPool<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    /// Build the queues and start `config.workers` workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<P>(processor: P, config: PoolConfig) -> Result<Self>
    where
        P: Processor<T, U> + 'static,
    {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;

        let id = Uuid::new_v4();
        let (task_tx, task_rx) = mpsc::channel(config.task_channel_capacity());
        let (result_tx, result_rx) = mpsc::channel(config.result_channel_capacity());
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let tracker = Arc::new(BatchTracker::new(config.batch_size));
        let counters = Arc::new(PoolCounters::default());
        let metrics = PoolMetrics::new(config.name.clone());

        let mut control = Control {
            state: PoolState::Created,
            sender: Some(task_tx),
            workers: Vec::with_capacity(config.workers),
        };

        let shared = Arc::new(WorkerShared {
            pool_id: id,
            processor: Arc::new(processor),
            queue: tokio::sync::Mutex::new(task_rx),
            tracker: Arc::clone(&tracker),
            counters: Arc::clone(&counters),
            metrics: metrics.clone(),
        });

        for worker_id in 0..config.workers {
            control.workers.push(runtime.spawn(run_worker(
                worker_id,
                Arc::clone(&shared),
                result_tx.clone(),
                done_tx.clone(),
            )));
        }
        control.state = PoolState::Running;

        info!(
            pool_id = %id,
            pool = %config.name,
            workers = config.workers,
            task_queue_capacity = config.task_queue_capacity,
            result_queue_capacity = config.result_queue_capacity,
            batch_size = config.batch_size,
            "Worker pool started"
        );

        Ok(Self {
            id,
            config,
            tracker,
            counters,
            metrics,
            control: Mutex::new(control),
            results: Mutex::new(Some(result_rx)),
            batch_done: Mutex::new(Some(done_rx)),
        })
    }

    /// Build a pool with the default configuration
    pub fn with_defaults<P>(processor: P) -> Result<Self>
    where
        P: Processor<T, U> + 'static,
    {
        Self::new(processor, PoolConfig::default())
    }

    /// Build a pool shaped by the sizing advisor for `num_tasks` tasks
    pub fn for_task_count<P>(processor: P, num_tasks: i64) -> Result<Self>
    where
        P: Processor<T, U> + 'static,
    {
        Self::new(processor, compute_config(num_tasks).into())
    }

    /// Pool instance identifier, as it appears in logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Configuration the pool was built with
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> PoolState {
        self.control.lock().state
    }

    /// Snapshot of task and batch counts
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            submitted_tasks: self.counters.submitted.load(Ordering::Relaxed),
            completed_tasks: self.counters.completed.load(Ordering::Relaxed),
            failed_tasks: self.counters.failed.load(Ordering::Relaxed),
            completed_batches: self.counters.batches.load(Ordering::Relaxed),
            in_flight_batches: self.tracker.in_flight(),
        }
    }

    /// Create a task with a fresh task ID and no batch ([`NO_BATCH`](super::types::NO_BATCH))
    pub fn new_task(&self, input: T) -> Task<T> {
        Task::new(self.tracker.next_task_id(), input)
    }

    /// Queue one task, waiting while the task queue is full
    #[instrument(
        skip(self, task),
        fields(pool_id = %self.id, task_id = task.id, batch_id = task.batch_id)
    )]
    pub async fn submit(&self, task: Task<T>) -> Result<()> {
        let sender = self.sender()?;
        sender.send(task).await.map_err(|_| PoolError::Closed)?;
        self.record_submitted();
        Ok(())
    }

    /// Queue one task without waiting; fails with [`PoolError::QueueFull`] at capacity
    pub fn try_submit(&self, task: Task<T>) -> Result<()> {
        let sender = self.sender()?;
        sender.try_send(task).map_err(|e| match e {
            TrySendError::Full(task) => {
                debug!(pool_id = %self.id, task_id = task.id, "Task queue full");
                PoolError::QueueFull
            }
            TrySendError::Closed(_) => PoolError::Closed,
        })?;
        self.record_submitted();
        Ok(())
    }

    /// Queue one task, waiting at most `limit` for queue capacity
    #[instrument(skip(self, task), fields(pool_id = %self.id, task_id = task.id))]
    pub async fn submit_timeout(&self, task: Task<T>, limit: Duration) -> Result<()> {
        let sender = self.sender()?;
        match tokio::time::timeout(limit, sender.send(task)).await {
            Ok(Ok(())) => {
                self.record_submitted();
                Ok(())
            }
            Ok(Err(_)) => Err(PoolError::Closed),
            Err(_) => {
                warn!(
                    limit_ms = limit.as_millis() as u64,
                    "Gave up waiting for task queue capacity"
                );
                Err(PoolError::SubmitTimeout(limit))
            }
        }
    }

    /// Tag `tasks` with a new batch ID and queue them all.
    ///
    /// The batch is registered with its exact size before any task is queued, so
    /// its completion fires once every one of these tasks has a result. The
    /// batch ID is returned once every task is queued.
    #[instrument(skip(self, tasks), fields(pool_id = %self.id, task_count = tasks.len()))]
    pub async fn submit_batch(&self, tasks: Vec<Task<T>>) -> Result<BatchId> {
        if tasks.is_empty() {
            return Err(PoolError::EmptyBatch);
        }

        // One sender for the whole batch: a shutdown racing this call cannot
        // strand a half-queued batch.
        let sender = self.sender()?;
        let batch_id = self.tracker.open_batch(tasks.len());
        let task_count = tasks.len();

        for (queued, mut task) in tasks.into_iter().enumerate() {
            task.batch_id = batch_id;
            if sender.send(task).await.is_err() {
                // Every worker is gone: nothing queued for this batch will run.
                self.tracker.discard_batch(batch_id);
                warn!(
                    batch_id = batch_id,
                    queued = queued,
                    task_count = task_count,
                    "Task queue closed while queuing batch"
                );
                return Err(PoolError::Closed);
            }
            self.record_submitted();
        }

        debug!(batch_id = batch_id, task_count = task_count, "Batch queued");
        Ok(batch_id)
    }

    /// Split `inputs` into batches of `batch_size` (the last may be smaller),
    /// give every input a fresh task ID and queue each batch.
    ///
    /// On error, batches queued before the failure still run and signal
    /// completion; their IDs are logged at `warn`.
    #[instrument(
        skip(self, inputs),
        fields(pool_id = %self.id, input_count = inputs.len())
    )]
    pub async fn execute(&self, inputs: Vec<T>) -> Result<Vec<BatchId>> {
        let batch_size = self.config.batch_size;
        let mut batch_ids = Vec::with_capacity(inputs.len().div_ceil(batch_size));
        let mut inputs = inputs.into_iter().peekable();

        while inputs.peek().is_some() {
            let chunk: Vec<T> = inputs.by_ref().take(batch_size).collect();
            let tasks = self
                .tracker
                .reserve_task_ids(chunk.len())
                .zip(chunk)
                .map(|(id, input)| Task::new(id, input))
                .collect();
            match self.submit_batch(tasks).await {
                Ok(batch_id) => batch_ids.push(batch_id),
                Err(e) => {
                    if !batch_ids.is_empty() {
                        warn!(
                            queued_batches = ?batch_ids,
                            error = %e,
                            "Stopped queuing inputs; earlier batches were already queued"
                        );
                    }
                    return Err(e);
                }
            }
        }

        info!(batches = batch_ids.len(), "Inputs queued");
        Ok(batch_ids)
    }

    /// Take the result stream. Only the first call succeeds.
    ///
    /// The stream must be drained: once the result queue is full, workers wait,
    /// and the task queue backs up behind them.
    pub fn results(&self) -> Result<ResultStream<U>> {
        self.results
            .lock()
            .take()
            .map(ReceiverStream::new)
            .ok_or(PoolError::StreamTaken("results"))
    }

    /// Take the batch-completion stream. Only the first call succeeds.
    pub fn batch_done(&self) -> Result<BatchDoneStream> {
        self.batch_done
            .lock()
            .take()
            .map(UnboundedReceiverStream::new)
            .ok_or(PoolError::StreamTaken("batch completion"))
    }

    /// Stop accepting tasks, wait for the workers to drain the queue and exit.
    ///
    /// Both output streams end once the last worker exits. Only the first call
    /// performs the shutdown; later calls fail with [`PoolError::AlreadyShutDown`].
    #[instrument(skip(self), fields(pool_id = %self.id))]
    pub async fn shutdown(&self) -> Result<()> {
        let workers = {
            let mut control = self.control.lock();
            if matches!(control.state, PoolState::Draining | PoolState::Stopped) {
                warn!("Shutdown requested twice");
                return Err(PoolError::AlreadyShutDown);
            }
            control.state = PoolState::Draining;
            control.sender = None;
            std::mem::take(&mut control.workers)
        };

        info!(workers = workers.len(), "Draining worker pool");

        let mut failures = Vec::new();
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker terminated abnormally");
                failures.push(e.to_string());
            }
        }

        self.control.lock().state = PoolState::Stopped;

        let stats = self.stats();
        info!(
            submitted = stats.submitted_tasks,
            completed = stats.completed_tasks,
            failed = stats.failed_tasks,
            batches = stats.completed_batches,
            "Worker pool stopped"
        );

        match failures.first() {
            Some(message) => Err(PoolError::WorkerPanicked {
                count: failures.len(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<Task<T>>> {
        self.control.lock().sender.clone().ok_or_else(|| {
            warn!(pool_id = %self.id, "Rejecting task submitted after shutdown");
            PoolError::ShutDown
        })
    }

    fn record_submitted(&self) {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_submitted();
    }
}

impl<T, U> Drop for WorkerPool<T, U> {
    fn drop(&mut self) {
        if self.control.get_mut().state == PoolState::Running {
            debug!(
                pool_id = %self.id,
                "Pool dropped without shutdown; workers exit once the queue drains"
            );
        }
    }
}

/// Marks a worker as stopped in metrics even if the processor panics
struct ActiveWorker<'a> {
    metrics: &'a PoolMetrics,
}

impl<'a> ActiveWorker<'a> {
    fn start(metrics: &'a PoolMetrics) -> Self {
        metrics.worker_started();
        Self { metrics }
    }
}

impl Drop for ActiveWorker<'_> {
    fn drop(&mut self) {
        self.metrics.worker_stopped();
    }
}

async fn run_worker<T, U>(
    worker_id: usize,
    shared: Arc<WorkerShared<T, U>>,
    results: mpsc::Sender<TaskResult<U>>,
    batch_done: mpsc::UnboundedSender<BatchId>,
) where
    T: Send + 'static,
    U: Send + 'static,
{
    let _active = ActiveWorker::start(&shared.metrics);
    debug!(pool_id = %shared.pool_id, worker_id = worker_id, "Worker started");

    loop {
        let next = {
            let mut queue = shared.queue.lock().await;
            queue.recv().await
        };
        let Some(Task { id, batch_id, input }) = next else {
            break;
        };

        let start = Instant::now();
        let output = shared.processor.process(input).await;
        let elapsed = start.elapsed();
        let success = output.is_success();

        shared.counters.completed.fetch_add(1, Ordering::Relaxed);
        if !success {
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        shared.metrics.record_completed(success, elapsed.as_secs_f64());
        debug!(
            worker_id = worker_id,
            task_id = id,
            batch_id = batch_id,
            success = success,
            elapsed_ms = elapsed.as_millis() as u64,
            "Task processed"
        );

        let result = TaskResult {
            task_id: id,
            batch_id,
            output,
            elapsed,
        };
        if results.send(result).await.is_err() {
            warn!(
                worker_id = worker_id,
                task_id = id,
                "Result stream dropped; discarding result"
            );
        }

        if shared.tracker.record_completion(batch_id) {
            shared.counters.batches.fetch_add(1, Ordering::Relaxed);
            shared.metrics.record_batch_completed();
            debug!(worker_id = worker_id, batch_id = batch_id, "Batch complete");
            if batch_done.send(batch_id).is_err() {
                debug!(batch_id = batch_id, "Batch completion stream dropped");
            }
        }
    }

    debug!(pool_id = %shared.pool_id, worker_id = worker_id, "Worker exiting");
}
