//! Run report

use chrono::{DateTime, Utc};
use indicatif::HumanCount;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::meter::Throughput;
use super::types::JobOutcome;

/// Result of one pipeline run
#[derive(Debug)]
pub struct LoadReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub table: String,
    pub columns: Vec<String>,
    /// Data lines read, excluding the header
    pub rows_read: u64,
    /// Batches sent through the worker pool
    pub batches_submitted: u64,
    /// Rows in the batch run on the producer, 0 if there was none
    pub trailing_rows: usize,
    pub elapsed: Duration,
    pub throughput: Option<Throughput>,
    /// Every job's terminal state, ordered by batch number
    pub outcomes: Vec<JobOutcome>,
}

impl LoadReport {
    pub fn failed(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    /// Rows the store acknowledged across successful batches
    pub fn rows_written(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .sum()
    }

    pub fn summary(&self) -> LoadSummary {
        LoadSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            table: self.table.clone(),
            rows_read: self.rows_read,
            rows_written: self.rows_written(),
            batches: self.outcomes.len(),
            trailing_rows: self.trailing_rows,
            elapsed_seconds: self.elapsed.as_secs_f64(),
            throughput: self.throughput,
            failed_batches: self
                .failed()
                .map(|o| FailedBatch {
                    batch: o.batch,
                    rows: o.rows,
                    trailing: o.trailing,
                    error: o.error().map(ToString::to_string).unwrap_or_default(),
                })
                .collect(),
        }
    }
}

/// Metrics lines printed at the end of a run.
///
/// The throughput line is omitted when no rows were processed or the timer
/// measured zero time.
impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rows imported:   {}", HumanCount(self.rows_read))?;
        writeln!(f, "Elapsed seconds: {:.2}", self.elapsed.as_secs_f64())?;
        if let Some(throughput) = &self.throughput {
            writeln!(f, "Rows/sec:        {}", HumanCount(throughput.rows_per_second))?;
            writeln!(f, "Rows/min:        {}", HumanCount(throughput.rows_per_minute))?;
        }
        Ok(())
    }
}

/// Serializable view of a [`LoadReport`]
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub table: String,
    pub rows_read: u64,
    pub rows_written: u64,
    pub batches: usize,
    pub trailing_rows: usize,
    pub elapsed_seconds: f64,
    pub throughput: Option<Throughput>,
    pub failed_batches: Vec<FailedBatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedBatch {
    pub batch: u64,
    pub rows: usize,
    pub trailing: bool,
    pub error: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use bulkbench_common::BenchError;

    fn report(rows: u64, elapsed: Duration, outcomes: Vec<JobOutcome>) -> LoadReport {
        LoadReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            table: "trips".into(),
            columns: vec!["a".into(), "b".into()],
            rows_read: rows,
            batches_submitted: 1,
            trailing_rows: 0,
            elapsed,
            throughput: Throughput::compute(rows, elapsed),
            outcomes,
        }
    }

    fn outcome(batch: u64, rows: usize, result: Result<u64, BenchError>) -> JobOutcome {
        JobOutcome {
            batch,
            rows,
            trailing: false,
            duration: Duration::from_millis(5),
            result,
        }
    }

    #[test]
    fn test_display_with_throughput() {
        let r = report(1_000_000, Duration::from_secs(40), vec![]);
        let text = r.to_string();
        assert!(text.contains("Rows imported:   1,000,000"));
        assert!(text.contains("Elapsed seconds: 40.00"));
        assert!(text.contains("Rows/sec:        25,000"));
        assert!(text.contains("Rows/min:        1,500,000"));
    }

    #[test]
    fn test_display_without_rows_has_no_throughput_line() {
        let r = report(0, Duration::from_millis(1), vec![]);
        assert!(!r.to_string().contains("Rows/sec"));
    }

    #[test]
    fn test_summary_lists_failures() {
        let r = report(
            4,
            Duration::from_secs(1),
            vec![
                outcome(1, 2, Ok(2)),
                outcome(2, 2, Err(BenchError::bulk_insert(2, "missing data for column \"b\""))),
            ],
        );
        assert_eq!(r.rows_written(), 2);
        assert!(r.has_failures());

        let summary = r.summary();
        assert_eq!(summary.failed_batches.len(), 1);
        assert_eq!(summary.failed_batches[0].batch, 2);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["rows_read"], 4);
        assert_eq!(json["throughput"]["rows_per_second"], 4);
    }
}
