//! A small bounded pool for running inbound JSON-RPC handler callbacks.
//!
//! The dispatcher's reader task must never block on handler work, or a slow
//! `textDocument/publishDiagnostics` handler would stall response delivery for
//! every in-flight request. `HandlerPool` hands work off to tokio tasks gated
//! by a capacity semaphore; callers that only need fire-and-forget execution
//! can drop the returned `JoinHandle`.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

/// Runs futures on a capacity-limited slice of the ambient tokio runtime.
///
/// Jobs are spawned as ordinary tokio tasks; the semaphore only bounds how
/// many run concurrently, so a burst of handler calls queues behind the
/// permit instead of spawning unbounded tasks.
pub struct HandlerPool {
    limit: Arc<Semaphore>,
}

impl HandlerPool {
    /// Creates a pool that runs at most `capacity` jobs concurrently.
    pub fn new(capacity: usize) -> Self {
        Self {
            limit: Arc::new(Semaphore::new(capacity.max(1))),
        }
    }

    /// Submits a job, returning a handle that resolves once it completes.
    pub fn submit<F>(&self, job: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let limit = self.limit.clone();
        tokio::spawn(async move {
            let _permit = match limit.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("handler pool semaphore closed; running job unthrottled");
                    return;
                }
            };
            job.await;
        })
    }

    /// Submits a job, logging instead of propagating if it panics.
    ///
    /// `tokio::spawn` already isolates a panicking task from the rest of the
    /// runtime — this just turns the resulting `JoinError` into a log line so
    /// a caller-supplied handler (request/notification callback) can never
    /// take down the process or silently vanish.
    pub fn submit_guarded<F>(&self, label: &'static str, job: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let inner = self.submit(job);
        tokio::spawn(async move {
            if let Err(err) = inner.await {
                if err.is_panic() {
                    warn!(handler = label, "handler panicked");
                } else {
                    warn!(handler = label, "handler task was cancelled");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_job_to_completion() {
        let pool = HandlerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        pool.submit(async move {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bounds_concurrency() {
        let pool = HandlerPool::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let active = active.clone();
            let max_seen = max_seen.clone();
            handles.push(pool.submit(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn guarded_job_panic_is_contained() {
        let pool = HandlerPool::new(1);
        let handle = pool.submit_guarded("test-handler", async move {
            panic!("boom");
        });
        // The outer JoinHandle resolves normally: the panic was isolated to
        // the inner spawned task, not propagated through this one.
        handle.await.unwrap();
    }
}
