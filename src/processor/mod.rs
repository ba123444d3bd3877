//! The pluggable unit of work run by each worker.
//!
//! A [`Processor`] turns one task input into an [`Outcome`]. The pool never
//! inspects the outcome; it only carries it to the caller. Adapters in this
//! module bound a processor's running time and recover from its panics, so the
//! pool itself stays free of timeout and recovery policy.

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{error, warn};

use crate::pool::{Outcome, TaskError};

/// Turns a task input into an outcome
#[async_trait]
pub trait Processor<T, U>: Send + Sync
where
    T: Send + 'static,
    U: Send + 'static,
{
    /// Process one input
    async fn process(&self, input: T) -> Outcome<U>;
}

#[async_trait]
impl<T, U, P> Processor<T, U> for Arc<P>
where
    T: Send + 'static,
    U: Send + 'static,
    P: Processor<T, U> + ?Sized,
{
    async fn process(&self, input: T) -> Outcome<U> {
        (**self).process(input).await
    }
}

/// Processor backed by an async closure
pub struct FnProcessor<F, T, U> {
    func: F,
    _marker: PhantomData<fn(T) -> U>,
}

/// Wrap an async closure as a [`Processor`]
pub fn processor_fn<F, Fut, T, U>(func: F) -> FnProcessor<F, T, U>
where
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome<U>> + Send + 'static,
{
    FnProcessor {
        func,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, T, U> Processor<T, U> for FnProcessor<F, T, U>
where
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome<U>> + Send + 'static,
    T: Send + 'static,
    U: Send + 'static,
{
    async fn process(&self, input: T) -> Outcome<U> {
        (self.func)(input).await
    }
}

/// Fails any call that runs longer than `limit` with [`TaskError::TimedOut`]
pub struct TimeoutProcessor<P> {
    inner: P,
    limit: Duration,
}

impl<P> TimeoutProcessor<P> {
    /// Bound `inner` to `limit` per call
    pub fn new(inner: P, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl<T, U, P> Processor<T, U> for TimeoutProcessor<P>
where
    T: Send + 'static,
    U: Send + 'static,
    P: Processor<T, U>,
{
    async fn process(&self, input: T) -> Outcome<U> {
        match tokio::time::timeout(self.limit, self.inner.process(input)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    limit_ms = self.limit.as_millis() as u64,
                    "Processor timed out"
                );
                Outcome::Failure(TaskError::TimedOut(self.limit))
            }
        }
    }
}

/// Converts a panic inside the wrapped processor into [`TaskError::Panicked`]
pub struct CatchPanic<P> {
    inner: P,
}

impl<P> CatchPanic<P> {
    /// Recover panics raised by `inner`
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T, U, P> Processor<T, U> for CatchPanic<P>
where
    T: Send + 'static,
    U: Send + 'static,
    P: Processor<T, U>,
{
    async fn process(&self, input: T) -> Outcome<U> {
        match AssertUnwindSafe(self.inner.process(input)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "Processor panicked");
                Outcome::Failure(TaskError::Panicked(message))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Combinators for any [`Processor`]
pub trait ProcessorExt<T, U>: Processor<T, U> + Sized
where
    T: Send + 'static,
    U: Send + 'static,
{
    /// Fail calls that exceed `limit`
    fn with_timeout(self, limit: Duration) -> TimeoutProcessor<Self> {
        TimeoutProcessor::new(self, limit)
    }

    /// Recover panics as failed outcomes
    fn catch_panic(self) -> CatchPanic<Self> {
        CatchPanic::new(self)
    }
}

impl<T, U, P> ProcessorExt<T, U> for P
where
    T: Send + 'static,
    U: Send + 'static,
    P: Processor<T, U>,
{
}
