//! Parallel batched bulk-load benchmark
//!
//! Streams a delimited text file into a PostgreSQL table through a bounded
//! pool of concurrent `COPY` sessions and reports rows/sec and rows/min.
//!
//! - [`pipeline`]: source reading, batching, worker pool, completion tracking
//!   and throughput measurement. Storage-agnostic through [`pipeline::BulkSink`].
//! - [`db`]: the PostgreSQL sink, server property discovery and provisioning.
//! - [`config`]: run and connection configuration.

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod db;
pub mod pipeline;

pub use bulkbench_common::{BenchError, Result};
pub use config::{AuthMode, ConnectionConfig, LoadConfig};
pub use db::{PgBulkSink, ServerProperties};
pub use pipeline::{LineSource, LoadPipeline, LoadReport, PipelineConfig, Throughput};
