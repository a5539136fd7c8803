//! Core types for the bulk-load pipeline

use bulkbench_common::BenchError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One parsed data line. Arity is whatever the line had; it is not checked
/// against the header.
pub type Row = Vec<String>;

/// Bulk-insert mode for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BulkMode {
    /// Exclusive table lock for the duration of the batch transaction.
    /// Concurrent writers queue behind each other inside the engine.
    #[default]
    TableLock,
    /// No table lock; writers run in parallel.
    Default,
}

impl BulkMode {
    pub fn as_str(&self) -> &str {
        match self {
            BulkMode::TableLock => "table_lock",
            BulkMode::Default => "default",
        }
    }

    /// In-memory (unlogged) targets load without the table lock
    pub fn for_in_memory(in_memory: bool) -> Self {
        if in_memory {
            BulkMode::Default
        } else {
            BulkMode::TableLock
        }
    }
}

impl std::str::FromStr for BulkMode {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table_lock" | "tablelock" | "exclusive" => Ok(BulkMode::TableLock),
            "default" | "concurrent" => Ok(BulkMode::Default),
            other => Err(BenchError::config(format!("Unknown bulk mode: {}", other))),
        }
    }
}

/// Session options for one bulk-insert transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOptions {
    pub mode: BulkMode,
    /// Statement timeout for the session. `None` means unbounded.
    pub timeout: Option<Duration>,
}

impl BulkOptions {
    pub fn new(mode: BulkMode, timeout: Option<Duration>) -> Self {
        Self { mode, timeout }
    }

    /// Options for the trailing batch: no lock, no timeout
    pub fn trailing() -> Self {
        Self {
            mode: BulkMode::Default,
            timeout: None,
        }
    }
}

/// A sealed group of rows in file order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    number: u64,
    arity: usize,
    rows: Vec<Row>,
}

impl Batch {
    pub(crate) fn new(number: u64, arity: usize, rows: Vec<Row>) -> Self {
        Self { number, arity, rows }
    }

    /// 1-based position of this batch in the file
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Header column count at the time the batch was built
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Target table plus its column list, shared by every job of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTable {
    pub name: String,
    pub columns: Vec<String>,
}

/// Unit of work: one batch, loaded once by one worker
#[derive(Debug, Clone)]
pub struct BulkJob {
    pub batch: Batch,
    pub target: Arc<TargetTable>,
    pub options: BulkOptions,
    /// Rows per send; the server-side chunking hint
    pub batch_size: usize,
}

impl BulkJob {
    pub fn batch_number(&self) -> u64 {
        self.batch.number()
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

/// Terminal state of one job
#[derive(Debug)]
pub struct JobOutcome {
    pub batch: u64,
    pub rows: usize,
    /// Ran on the producer instead of the pool
    pub trailing: bool,
    pub duration: Duration,
    /// Rows reported by the store, or the batch's error
    pub result: Result<u64, BenchError>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&BenchError> {
        self.result.as_ref().err()
    }
}

/// Pipeline state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    /// Reading, parsing, accumulating and submitting
    Streaming,
    /// Submission done; trailing batch and pooled jobs finishing
    Draining,
    Reporting,
    Done,
}

impl PipelineState {
    pub fn as_str(&self) -> &str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Streaming => "streaming",
            PipelineState::Draining => "draining",
            PipelineState::Reporting => "reporting",
            PipelineState::Done => "done",
        }
    }
}

/// Snapshot of the worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolState {
    pub min_workers: usize,
    pub max_workers: usize,
    pub active_count: usize,
    pub pending_jobs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_mode_from_in_memory_flag() {
        assert_eq!(BulkMode::for_in_memory(true), BulkMode::Default);
        assert_eq!(BulkMode::for_in_memory(false), BulkMode::TableLock);
    }

    #[test]
    fn test_bulk_mode_parse() {
        assert_eq!("exclusive".parse::<BulkMode>().ok(), Some(BulkMode::TableLock));
        assert_eq!("DEFAULT".parse::<BulkMode>().ok(), Some(BulkMode::Default));
        assert!("fast".parse::<BulkMode>().is_err());
    }

    #[test]
    fn test_trailing_options_are_unbounded() {
        let options = BulkOptions::trailing();
        assert_eq!(options.mode, BulkMode::Default);
        assert!(options.timeout.is_none());
    }
}
