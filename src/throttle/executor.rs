//! Batched task execution under a concurrency ceiling and a rate budget.

use super::bucket::TokenBucket;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Why a batched task did not produce a value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecError {
    #[error("task cancelled before completion")]
    Cancelled,
}

/// Runs awaitable tasks with at most `max_concurrent` in flight, each one
/// paying one rate-limiter token before it starts.
pub struct BatchExecutor {
    semaphore: Arc<Semaphore>,
    limiter: Arc<TokenBucket>,
    max_concurrent: usize,
}

impl BatchExecutor {
    pub fn new(max_concurrent: usize, limiter: Arc<TokenBucket>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            limiter,
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn limiter(&self) -> &Arc<TokenBucket> {
        &self.limiter
    }

    /// Run every task, returning results in input order.
    ///
    /// A task's own failure must be encoded in its output type; the executor
    /// itself only injects `ExecError::Cancelled`, and only when the shared
    /// token fires.
    pub async fn execute_batch<T, F>(
        &self,
        tasks: Vec<F>,
        cancel: &CancellationToken,
    ) -> Vec<Result<T, ExecError>>
    where
        F: Future<Output = T>,
    {
        let runs = tasks.into_iter().map(|task| {
            let semaphore = Arc::clone(&self.semaphore);
            let limiter = Arc::clone(&self.limiter);
            async move {
                let guarded = async {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .expect("executor semaphore closed");
                    limiter.acquire(1).await;
                    task.await
                };
                tokio::select! {
                    _ = cancel.cancelled() => Err(ExecError::Cancelled),
                    output = guarded => Ok(output),
                }
            }
        });
        join_all(runs).await
    }
}
