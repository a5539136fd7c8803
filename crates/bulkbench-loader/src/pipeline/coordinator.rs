//! Load pipeline coordinator
//!
//! Drives one run through `Idle → Streaming → Draining → Reporting → Done`:
//!
//! 1. A blocking producer thread reads the source, parses rows, seals batches
//!    and submits each full batch to the worker pool without waiting.
//! 2. At end of stream the producer loads the trailing batch itself, while
//!    pooled jobs may still be writing.
//! 3. The coordinator waits on every job handle, shuts the pool down, stops
//!    the timer and builds the report.
//!
//! Batch failures are recorded on their outcome and never stop the run.

use bulkbench_common::{BenchError, Result};
use chrono::Utc;
use indicatif::ProgressBar;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use super::batch::BatchAccumulator;
use super::loader::{BulkLoader, BulkSink};
use super::meter::{Throughput, ThroughputMeter};
use super::pool::WorkerPool;
use super::report::LoadReport;
use super::source::{LineSource, RowParser, DEFAULT_DELIMITER};
use super::tracker::CompletionTracker;
use super::types::{Batch, BulkJob, BulkMode, BulkOptions, PipelineState, TargetTable};

/// Default rows per batch
pub const DEFAULT_BATCH_SIZE: usize = 2000;

/// Default lower bound on workers
pub const DEFAULT_MIN_WORKERS: usize = 1;

/// Default upper bound on concurrently running jobs
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Default statement timeout for pooled batch sessions
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30;

/// Settings the pipeline itself consumes
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub min_workers: usize,
    pub max_workers: usize,
    pub delimiter: char,
    /// Mode for pooled batches. The trailing batch always uses [`BulkOptions::trailing`].
    pub bulk_mode: BulkMode,
    /// Statement timeout for pooled batches, `None` for unbounded
    pub session_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            min_workers: DEFAULT_MIN_WORKERS,
            max_workers: DEFAULT_MAX_WORKERS,
            delimiter: DEFAULT_DELIMITER,
            bulk_mode: BulkMode::TableLock,
            session_timeout: Some(Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS)),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(BenchError::config("batch_size must be greater than 0"));
        }
        if self.max_workers == 0 {
            return Err(BenchError::config("max_workers must be greater than 0"));
        }
        if self.min_workers == 0 || self.min_workers > self.max_workers {
            return Err(BenchError::config(format!(
                "min_workers ({}) must be between 1 and max_workers ({})",
                self.min_workers, self.max_workers
            )));
        }
        if self.delimiter == '\n' || self.delimiter == '\r' {
            return Err(BenchError::config("delimiter cannot be a line terminator"));
        }
        Ok(())
    }

    fn pooled_options(&self) -> BulkOptions {
        BulkOptions::new(self.bulk_mode, self.session_timeout)
    }
}

/// Parallel batched bulk-load pipeline
pub struct LoadPipeline<S> {
    config: PipelineConfig,
    table: String,
    loader: BulkLoader<S>,
    state: Arc<watch::Sender<PipelineState>>,
    progress: Option<ProgressBar>,
}

impl<S: BulkSink> LoadPipeline<S> {
    pub fn new(config: PipelineConfig, table: impl Into<String>, sink: Arc<S>) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            config,
            table: table.into(),
            loader: BulkLoader::new(sink),
            state: Arc::new(state),
            progress: None,
        }
    }

    /// Report rows read on a progress bar while streaming
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Run the whole load from `source`.
    ///
    /// Returns `Err` only for failures that stop the run (invalid
    /// configuration, unreadable source, missing header). Failed batches are
    /// reported in [`LoadReport::outcomes`].
    pub async fn run(&self, source: LineSource) -> Result<LoadReport> {
        self.config.validate()?;

        let run_id = Uuid::new_v4();
        let span = info_span!("load", %run_id, table = %self.table);
        self.execute(run_id, source, span.clone())
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        run_id: Uuid,
        source: LineSource,
        span: tracing::Span,
    ) -> Result<LoadReport> {
        let started_at = Utc::now();
        let pool = WorkerPool::new(
            self.loader.clone(),
            self.config.min_workers,
            self.config.max_workers,
        )?;
        let tracker = Arc::new(CompletionTracker::new());

        info!(
            source = %source.path().display(),
            batch_size = self.config.batch_size,
            min_workers = self.config.min_workers,
            max_workers = self.config.max_workers,
            bulk_mode = self.config.bulk_mode.as_str(),
            "Starting load"
        );
        transition(&self.state, PipelineState::Streaming);

        let producer = Producer {
            config: self.config.clone(),
            table: self.table.clone(),
            pool: pool.clone(),
            loader: self.loader.clone(),
            tracker: Arc::clone(&tracker),
            state: Arc::clone(&self.state),
            runtime: Handle::current(),
            progress: self.progress.clone(),
            span,
        };

        let produced = tokio::task::spawn_blocking(move || producer.run(source))
            .await
            .map_err(|e| BenchError::Io(std::io::Error::other(format!("producer thread failed: {}", e))))
            .and_then(|result| result);

        // Jobs already submitted keep running even if the producer failed.
        let outcomes = tracker.await_all().await;
        pool.shutdown().await;

        let produced = produced?;
        let elapsed = produced.meter.stop();

        transition(&self.state, PipelineState::Reporting);
        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }

        let report = LoadReport {
            run_id,
            started_at,
            table: self.table.clone(),
            columns: produced.columns,
            rows_read: produced.rows_read,
            batches_submitted: produced.batches_submitted,
            trailing_rows: produced.trailing_rows,
            elapsed,
            throughput: Throughput::compute(produced.rows_read, elapsed),
            outcomes,
        };

        info!(
            rows = report.rows_read,
            batches = report.outcomes.len(),
            failed = report.failed().count(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Load finished"
        );
        transition(&self.state, PipelineState::Done);

        Ok(report)
    }
}

fn transition(state: &watch::Sender<PipelineState>, next: PipelineState) {
    let previous = state.send_replace(next);
    debug!(from = previous.as_str(), to = next.as_str(), "Pipeline state");
}

/// What the producer thread hands back once the source is exhausted
struct Produced {
    columns: Vec<String>,
    rows_read: u64,
    batches_submitted: u64,
    trailing_rows: usize,
    meter: ThroughputMeter,
}

/// Reading side of the pipeline; runs on a blocking thread
struct Producer<S> {
    config: PipelineConfig,
    table: String,
    pool: WorkerPool<S>,
    loader: BulkLoader<S>,
    tracker: Arc<CompletionTracker>,
    state: Arc<watch::Sender<PipelineState>>,
    runtime: Handle,
    progress: Option<ProgressBar>,
    span: tracing::Span,
}

impl<S: BulkSink> Producer<S> {
    fn run(self, source: LineSource) -> Result<Produced> {
        let _enter = self.span.enter();
        let parser = RowParser::new(self.config.delimiter);
        let mut lines = source.lines();

        let header = match lines.next() {
            Some(line) => line?,
            None => return Err(BenchError::Parse("source has no header line".into())),
        };
        let columns = parser.parse_header(&header);
        let target = Arc::new(TargetTable {
            name: self.table.clone(),
            columns: columns.clone(),
        });
        debug!(columns = columns.len(), "Header parsed");

        let options = self.config.pooled_options();
        let mut accumulator = BatchAccumulator::new(self.config.batch_size, columns.len());
        let mut meter = ThroughputMeter::new();
        let mut rows_read = 0u64;
        let mut batches_submitted = 0u64;

        for line in lines {
            // Every data line is a row, blank ones included
            let line = line?;
            rows_read += 1;
            if let Some(batch) = accumulator.add(parser.parse(&line)) {
                meter.start();
                let handle = self.pool.submit(self.job(batch, &target, options));
                self.tracker.register(handle);
                batches_submitted += 1;

                if let Some(progress) = &self.progress {
                    progress.set_position(rows_read);
                }
            }
        }

        transition(&self.state, PipelineState::Draining);
        debug!(
            submitted = batches_submitted,
            running = self.tracker.outstanding(),
            "Draining pooled jobs"
        );

        let mut trailing_rows = 0;
        if let Some(batch) = accumulator.finish() {
            meter.start();
            trailing_rows = batch.len();
            let job = self.job(batch, &target, BulkOptions::trailing());
            let outcome = self.runtime.block_on(self.loader.run(job, true));
            self.tracker.record(outcome);
        }

        if let Some(progress) = &self.progress {
            progress.set_position(rows_read);
        }
        debug!(
            rows_read,
            batches_submitted,
            trailing_rows,
            pool = ?self.pool.state(),
            "Source exhausted"
        );

        Ok(Produced {
            columns,
            rows_read,
            batches_submitted,
            trailing_rows,
            meter,
        })
    }

    fn job(&self, batch: Batch, target: &Arc<TargetTable>, options: BulkOptions) -> BulkJob {
        BulkJob {
            batch,
            target: Arc::clone(target),
            options,
            batch_size: self.config.batch_size,
        }
    }
}
