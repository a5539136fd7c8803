//! Parallel batched bulk-load pipeline
//!
//! One producer streams the source file into fixed-size batches and hands
//! each full batch to a bounded worker pool; every worker runs a single
//! bulk-insert session per batch. The undersized trailing batch is loaded by
//! the producer itself. A completion tracker waits for every job before the
//! throughput meter stops.
//!
//! ```text
//! LineSource → RowParser → BatchAccumulator ──submit──▶ WorkerPool ──▶ BulkLoader ──▶ BulkSink
//!                                  │                                        │
//!                                  └── trailing batch (inline) ─────────────┘
//!                                                    CompletionTracker ◀── outcomes
//! ```

pub mod batch;
pub mod coordinator;
pub mod loader;
pub mod meter;
pub mod pool;
pub mod report;
pub mod source;
pub mod tracker;
pub mod types;

pub use batch::BatchAccumulator;
pub use coordinator::{
    LoadPipeline, PipelineConfig, DEFAULT_BATCH_SIZE, DEFAULT_MAX_WORKERS, DEFAULT_MIN_WORKERS,
    DEFAULT_SESSION_TIMEOUT_SECS,
};
pub use loader::{BulkLoader, BulkSink};
pub use meter::{Throughput, ThroughputMeter};
pub use pool::{JobHandle, WorkerPool};
pub use report::{FailedBatch, LoadReport, LoadSummary};
pub use source::{LineSource, RowParser, DEFAULT_DELIMITER};
pub use tracker::CompletionTracker;
pub use types::{
    Batch, BulkJob, BulkMode, BulkOptions, JobOutcome, PipelineState, Row, TargetTable,
    WorkerPoolState,
};
