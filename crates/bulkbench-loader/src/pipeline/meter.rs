//! Throughput measurement

use indicatif::HumanCount;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Monotonic run timer.
///
/// Started right before the first batch is dispatched; later `start` calls
/// keep the original instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThroughputMeter {
    started: Option<Instant>,
}

impl ThroughputMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.started.get_or_insert_with(Instant::now);
    }

    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    /// Elapsed time since `start`, zero if never started
    pub fn stop(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }
}

/// Rows per second and per minute for a finished run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Throughput {
    pub rows: u64,
    #[serde(rename = "elapsed_seconds", serialize_with = "as_secs")]
    pub elapsed: Duration,
    pub rows_per_second: u64,
    pub rows_per_minute: u64,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl Throughput {
    /// `None` when no rows were processed or no time elapsed
    pub fn compute(rows: u64, elapsed: Duration) -> Option<Self> {
        let secs = elapsed.as_secs_f64();
        if rows == 0 || secs <= 0.0 {
            return None;
        }

        let per_second = rows as f64 / secs;
        Some(Self {
            rows,
            elapsed,
            rows_per_second: per_second.round() as u64,
            rows_per_minute: (per_second * 60.0).round() as u64,
        })
    }
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows/sec, {} rows/min",
            HumanCount(self.rows_per_second),
            HumanCount(self.rows_per_minute)
        )
    }
}
