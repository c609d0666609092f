//! Bounded worker pool for executions.
//!
//! [`WorkerPool::submit`] queues a job and returns immediately; at most
//! `concurrency` jobs run at once, the rest wait for a permit in FIFO order.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

/// Handle to a submitted job.
pub struct JobHandle {
    inner: JoinHandle<()>,
}

impl JobHandle {
    /// Wait for the job to finish.
    pub async fn join(self) {
        if let Err(e) = self.inner.await {
            tracing::error!(error = %e, "Execution job panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tracker: TaskTracker::new(),
        }
    }

    pub fn submit<F>(&self, job: F) -> JobHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let inner = self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!("Worker pool closed, job dropped");
                return;
            };
            job.await;
        });
        JobHandle { inner }
    }

    /// Free worker slots right now.
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stop accepting work and wait for submitted jobs to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
