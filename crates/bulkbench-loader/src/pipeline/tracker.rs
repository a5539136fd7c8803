//! Completion tracking for submitted jobs

use futures::future::join_all;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::pool::JobHandle;
use super::types::JobOutcome;

/// Registry of outstanding job handles and finished outcomes.
///
/// Shared between the producer thread, which registers handles as it
/// submits, and the task that drains the run.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    handles: Mutex<Vec<JobHandle>>,
    finished: Mutex<Vec<JobOutcome>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a pooled job
    pub fn register(&self, handle: JobHandle) {
        lock(&self.handles).push(handle);
    }

    /// Record an outcome that was produced inline (the trailing batch)
    pub fn record(&self, outcome: JobOutcome) {
        lock(&self.finished).push(outcome);
    }

    /// Registered jobs that have not reached a terminal state yet
    pub fn outstanding(&self) -> usize {
        lock(&self.handles)
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Wait until every registered job is terminal and return all outcomes,
    /// ordered by batch number.
    pub async fn await_all(&self) -> Vec<JobOutcome> {
        let handles = std::mem::take(&mut *lock(&self.handles));
        let pooled = join_all(handles.into_iter().map(JobHandle::wait)).await;

        let mut outcomes = std::mem::take(&mut *lock(&self.finished));
        outcomes.extend(pooled);
        outcomes.sort_by_key(|o| o.batch);
        outcomes
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pipeline::loader::{BulkLoader, BulkSink};
    use crate::pipeline::pool::WorkerPool;
    use crate::pipeline::types::{Batch, BulkJob, BulkOptions, TargetTable};
    use async_trait::async_trait;
    use bulkbench_common::{BenchError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Sleeps longer for lower batch numbers so completion order is reversed
    struct ReversingSink {
        completed: AtomicUsize,
    }

    #[async_trait]
    impl BulkSink for ReversingSink {
        async fn load(&self, job: &BulkJob) -> Result<u64> {
            let delay = 60u64.saturating_sub(job.batch_number() * 10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            if job.batch_number() == 2 {
                return Err(BenchError::bulk_insert(2, "constraint violation"));
            }
            Ok(job.len() as u64)
        }
    }

    fn job(number: u64) -> BulkJob {
        BulkJob {
            batch: Batch::new(number, 1, vec![vec!["x".into()]; 2]),
            target: Arc::new(TargetTable {
                name: "t".into(),
                columns: vec!["a".into()],
            }),
            options: BulkOptions::trailing(),
            batch_size: 2,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_await_all_waits_for_every_handle() {
        let sink = Arc::new(ReversingSink {
            completed: AtomicUsize::new(0),
        });
        let pool = WorkerPool::new(BulkLoader::new(Arc::clone(&sink)), 1, 5).unwrap();
        let tracker = CompletionTracker::new();

        for n in 1..=5 {
            tracker.register(pool.submit(job(n)));
        }
        assert_eq!(tracker.outstanding(), 5);

        let outcomes = tracker.await_all().await;

        assert_eq!(sink.completed.load(Ordering::SeqCst), 5);
        assert_eq!(tracker.outstanding(), 0);
        assert_eq!(
            outcomes.iter().map(|o| o.batch).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert_eq!(outcomes.iter().filter(|o| !o.is_success()).count(), 1);
        assert!(matches!(
            outcomes[1].error(),
            Some(BenchError::BulkInsert { batch: 2, .. })
        ));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_inline_outcomes_are_included() {
        let tracker = CompletionTracker::new();
        tracker.record(JobOutcome {
            batch: 9,
            rows: 1,
            trailing: true,
            duration: Duration::from_millis(3),
            result: Ok(1),
        });

        let outcomes = tracker.await_all().await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].trailing);
    }
}
