//! Shared helpers for bulkbench integration tests
//!
//! - [`RecordingSink`]: in-memory [`BulkSink`] that records every batch and
//!   tracks how many pooled jobs run at once
//! - [`write_source`]: temporary source files
//! - [`TestPostgres`]: PostgreSQL container for end-to-end tests

#![allow(dead_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use bulkbench_loader::config::{AuthMode, ConnectionConfig};
use bulkbench_loader::pipeline::{BulkJob, BulkOptions, BulkSink, Row};
use bulkbench_loader::BenchError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::NamedTempFile;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

// ============================================================================
// Recording Sink
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedBatch {
    pub number: u64,
    pub rows: Vec<Row>,
    pub options: BulkOptions,
}

impl RecordedBatch {
    pub fn is_trailing(&self) -> bool {
        self.options == BulkOptions::trailing()
    }
}

/// Accepts a batch only when every row matches the header arity, the way a
/// table with one column per header field would.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delay: Duration,
    trailing_delay: Duration,
    pooled_active: AtomicUsize,
    pooled_peak: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    batches: Mutex<Vec<RecordedBatch>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every session open for `delay`
    pub fn with_delay(delay: Duration) -> Self {
        Self::with_delays(delay, delay)
    }

    /// Separate session times for pooled batches and the trailing batch
    pub fn with_delays(pooled: Duration, trailing: Duration) -> Self {
        Self {
            delay: pooled,
            trailing_delay: trailing,
            ..Self::default()
        }
    }

    /// Most jobs of any kind, trailing included, inside `load` at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Most pooled jobs seen inside `load` at the same time
    pub fn pooled_peak(&self) -> usize {
        self.pooled_peak.load(Ordering::SeqCst)
    }

    /// Accepted batches ordered by batch number
    pub fn batches(&self) -> Vec<RecordedBatch> {
        let mut batches = self.batches.lock().unwrap().clone();
        batches.sort_by_key(|b| b.number);
        batches
    }

    /// Accepted rows in batch order
    pub fn rows(&self) -> Vec<Row> {
        self.batches().into_iter().flat_map(|b| b.rows).collect()
    }
}

#[async_trait]
impl BulkSink for RecordingSink {
    async fn load(&self, job: &BulkJob) -> bulkbench_loader::Result<u64> {
        let pooled = job.options != BulkOptions::trailing();
        if pooled {
            let now = self.pooled_active.fetch_add(1, Ordering::SeqCst) + 1;
            self.pooled_peak.fetch_max(now, Ordering::SeqCst);
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = if pooled { self.delay } else { self.trailing_delay };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let arity = job.batch.arity();
        let result = match job.batch.rows().iter().find(|row| row.len() != arity) {
            Some(row) => Err(BenchError::bulk_insert(
                job.batch_number(),
                format!("expected {} fields, got {}", arity, row.len()),
            )),
            None => {
                self.batches.lock().unwrap().push(RecordedBatch {
                    number: job.batch_number(),
                    rows: job.batch.rows().to_vec(),
                    options: job.options,
                });
                Ok(job.len() as u64)
            },
        };

        if pooled {
            self.pooled_active.fetch_sub(1, Ordering::SeqCst);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &str {
        "recording"
    }
}

// ============================================================================
// Source Files
// ============================================================================

/// Write `content` to a temporary file with the given suffix
pub fn write_source(content: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("bulkbench-")
        .suffix(suffix)
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Tab separated file with header `id\tname` and `rows` data lines
pub fn numbered_source(rows: usize) -> String {
    let mut content = String::from("id\tname\n");
    for i in 1..=rows {
        content.push_str(&format!("{}\trow-{}\n", i, i));
    }
    content
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    pool: PgPool,
    host: String,
    port: u16,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?
            .to_string();
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&format!("postgresql://postgres:postgres@{}:{}/postgres", host, port))
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self {
            container,
            pool,
            host,
            port,
        })
    }

    /// Admin pool on the `postgres` database
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            database: "postgres".to_string(),
            auth: AuthMode::Password {
                user: "postgres".to_string(),
                password: "postgres".to_string(),
            },
            connect_timeout_secs: 30,
            packet_size: None,
        }
    }

    pub async fn count(&self, table: &str) -> Result<i64> {
        let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
