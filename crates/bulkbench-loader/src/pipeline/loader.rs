//! Bulk loader: the single job routine every batch goes through

use async_trait::async_trait;
use bulkbench_common::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::types::{BulkJob, JobOutcome};

/// Destination for bulk-insert sessions
///
/// An implementation opens one session per call, streams the job's rows,
/// commits, and reports the number of rows the store accepted. Errors are
/// scoped to the job; the pipeline never retries them.
#[async_trait]
pub trait BulkSink: Send + Sync + 'static {
    async fn load(&self, job: &BulkJob) -> Result<u64>;

    /// Short name for logs
    fn name(&self) -> &str {
        "sink"
    }
}

/// Runs [`BulkJob`]s against a sink and turns the result into a [`JobOutcome`]
pub struct BulkLoader<S> {
    sink: Arc<S>,
}

impl<S> Clone for BulkLoader<S> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<S: BulkSink> BulkLoader<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    /// Load one job. Consumes the job, so the batch is freed on return.
    pub async fn run(&self, job: BulkJob, trailing: bool) -> JobOutcome {
        let started = Instant::now();
        let batch = job.batch_number();
        let rows = job.len();

        let result = self.sink.load(&job).await;
        drop(job);

        let duration = started.elapsed();
        match &result {
            Ok(written) => debug!(
                batch,
                rows,
                written,
                trailing,
                elapsed_ms = duration.as_millis() as u64,
                sink = self.sink.name(),
                "Batch loaded"
            ),
            Err(e) => debug!(batch, rows, trailing, error = %e, "Batch failed"),
        }

        JobOutcome {
            batch,
            rows,
            trailing,
            duration,
            result,
        }
    }
}
