//! Bounded worker pool for bulk-load jobs
//!
//! Jobs are spawned onto the tokio runtime immediately and then wait for one
//! of `max_workers` semaphore permits. Submission never blocks: when every
//! worker is busy the job simply waits in the semaphore queue, and that queue
//! has no upper bound.

use bulkbench_common::{BenchError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use super::loader::{BulkLoader, BulkSink};
use super::types::{BulkJob, JobOutcome, WorkerPoolState};

/// Handle to one submitted job
#[derive(Debug)]
pub struct JobHandle {
    batch: u64,
    rows: usize,
    inner: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub fn batch(&self) -> u64 {
        self.batch
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Wait for the job to reach a terminal state
    pub async fn wait(self) -> JobOutcome {
        match self.inner.await {
            Ok(outcome) => outcome,
            Err(e) => JobOutcome {
                batch: self.batch,
                rows: self.rows,
                trailing: false,
                duration: Duration::ZERO,
                result: Err(BenchError::WorkerPanic {
                    batch: self.batch,
                    message: e.to_string(),
                }),
            },
        }
    }
}

/// Bounded-concurrency executor for [`BulkJob`]s
///
/// `min_workers` is the number of store connections opened up front by the
/// sink; `max_workers` bounds how many jobs run at once.
pub struct WorkerPool<S> {
    loader: BulkLoader<S>,
    permits: Arc<Semaphore>,
    tasks: TaskTracker,
    runtime: Handle,
    min_workers: usize,
    max_workers: usize,
    active: Arc<AtomicUsize>,
    pending: Arc<AtomicUsize>,
}

impl<S> Clone for WorkerPool<S> {
    fn clone(&self) -> Self {
        Self {
            loader: self.loader.clone(),
            permits: Arc::clone(&self.permits),
            tasks: self.tasks.clone(),
            runtime: self.runtime.clone(),
            min_workers: self.min_workers,
            max_workers: self.max_workers,
            active: Arc::clone(&self.active),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<S: BulkSink> WorkerPool<S> {
    /// Create a pool bound to the current tokio runtime
    pub fn new(loader: BulkLoader<S>, min_workers: usize, max_workers: usize) -> Result<Self> {
        if max_workers == 0 {
            return Err(BenchError::config("max_workers must be greater than 0"));
        }
        if min_workers == 0 || min_workers > max_workers {
            return Err(BenchError::config(format!(
                "min_workers ({}) must be between 1 and max_workers ({})",
                min_workers, max_workers
            )));
        }

        let runtime = Handle::try_current()
            .map_err(|e| BenchError::config(format!("worker pool needs a tokio runtime: {}", e)))?;

        Ok(Self {
            loader,
            permits: Arc::new(Semaphore::new(max_workers)),
            tasks: TaskTracker::new(),
            runtime,
            min_workers,
            max_workers,
            active: Arc::new(AtomicUsize::new(0)),
            pending: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Queue a job and return immediately.
    ///
    /// Safe to call from a blocking (non-runtime) thread.
    pub fn submit(&self, job: BulkJob) -> JobHandle {
        let batch = job.batch_number();
        let rows = job.len();

        let loader = self.loader.clone();
        let permits = Arc::clone(&self.permits);
        let active = Arc::clone(&self.active);
        let pending = Arc::clone(&self.pending);
        pending.fetch_add(1, Ordering::SeqCst);

        let inner = self.tasks.spawn_on(
            async move {
                // The semaphore is only closed after every task has finished
                let _permit = permits.acquire_owned().await.ok();
                pending.fetch_sub(1, Ordering::SeqCst);
                let _active = ActiveGuard::enter(active);
                loader.run(job, false).await
            },
            &self.runtime,
        );

        JobHandle { batch, rows, inner }
    }

    pub fn state(&self) -> WorkerPoolState {
        WorkerPoolState {
            min_workers: self.min_workers,
            max_workers: self.max_workers,
            active_count: self.active.load(Ordering::SeqCst),
            pending_jobs: self.pending.load(Ordering::SeqCst),
        }
    }

    /// Wait for queued and in-flight jobs, then release the pool
    pub async fn shutdown(self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.permits.close();
    }
}

/// Counts a job as active until dropped, including when the job panics
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
