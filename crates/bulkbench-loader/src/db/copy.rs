//! COPY-based bulk sink
//!
//! Each batch is one transaction on its own pooled connection:
//!
//! ```text
//! BEGIN
//! SET LOCAL statement_timeout = <ms | 0>
//! LOCK TABLE <t> IN EXCLUSIVE MODE        -- table_lock mode only
//! COPY <t> FROM STDIN (FORMAT text)       -- rows streamed in packet-sized sends
//! COMMIT
//! ```
//!
//! Any error rolls the transaction back, so a failed batch leaves no rows
//! behind.

use async_trait::async_trait;
use bulkbench_common::{BenchError, Result};
use sqlx::PgPool;
use tracing::debug;

use super::quote_ident;
use crate::pipeline::{BulkJob, BulkMode, BulkSink, Row};

/// [`BulkSink`] writing through PostgreSQL `COPY ... FROM STDIN`
#[derive(Debug, Clone)]
pub struct PgBulkSink {
    pool: PgPool,
    packet_size: usize,
}

impl PgBulkSink {
    pub fn new(pool: PgPool, packet_size: usize) -> Self {
        Self {
            pool,
            packet_size: packet_size.max(1),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }
}

#[async_trait]
impl BulkSink for PgBulkSink {
    async fn load(&self, job: &BulkJob) -> Result<u64> {
        let batch = job.batch_number();
        let fail = |e: sqlx::Error| BenchError::bulk_insert(batch, e);
        let table = quote_ident(&job.target.name);

        let mut tx = self.pool.begin().await.map_err(fail)?;

        sqlx::query(&timeout_statement(job.options.timeout))
            .execute(&mut *tx)
            .await
            .map_err(fail)?;

        if job.options.mode == BulkMode::TableLock {
            sqlx::query(&format!("LOCK TABLE {} IN EXCLUSIVE MODE", table))
                .execute(&mut *tx)
                .await
                .map_err(fail)?;
        }

        let mut copy = tx
            .copy_in_raw(&copy_statement(&table))
            .await
            .map_err(fail)?;

        // A batch never exceeds `batch_size` rows, so the whole batch is one
        // COPY; only `packet_size` splits it on the wire.
        let mut buf = Vec::with_capacity(self.packet_size + 1024);
        for row in job.batch.rows() {
            encode_row(row, &mut buf);
            if buf.len() >= self.packet_size {
                copy.send(std::mem::take(&mut buf)).await.map_err(fail)?;
            }
        }
        if !buf.is_empty() {
            copy.send(buf).await.map_err(fail)?;
        }

        let written = copy.finish().await.map_err(fail)?;
        tx.commit().await.map_err(fail)?;

        debug!(
            batch,
            rows = written,
            batch_size = job.batch_size,
            packet_size = self.packet_size,
            mode = job.options.mode.as_str(),
            "COPY committed"
        );
        Ok(written)
    }

    fn name(&self) -> &str {
        "postgres-copy"
    }
}

fn timeout_statement(timeout: Option<std::time::Duration>) -> String {
    let millis = timeout.map(|t| t.as_millis()).unwrap_or(0);
    format!("SET LOCAL statement_timeout = {}", millis)
}

/// Columns bind by position, so user-supplied DDL may name them freely
fn copy_statement(quoted_table: &str) -> String {
    format!("COPY {} FROM STDIN WITH (FORMAT text)", quoted_table)
}

/// Append one row in COPY text format: tab separated, newline terminated.
///
/// Fields are written as given; a row shorter or longer than the table is
/// rejected by the server.
pub fn encode_row(row: &Row, buf: &mut Vec<u8>) {
    for (i, field) in row.iter().enumerate() {
        if i > 0 {
            buf.push(b'\t');
        }
        for byte in field.bytes() {
            match byte {
                b'\\' => buf.extend_from_slice(b"\\\\"),
                b'\t' => buf.extend_from_slice(b"\\t"),
                b'\n' => buf.extend_from_slice(b"\\n"),
                b'\r' => buf.extend_from_slice(b"\\r"),
                other => buf.push(other),
            }
        }
    }
    buf.push(b'\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn encode(fields: &[&str]) -> String {
        let row: Row = fields.iter().map(|s| s.to_string()).collect();
        let mut buf = Vec::new();
        encode_row(&row, &mut buf);
        String::from_utf8(buf).unwrap_or_default()
    }

    #[test]
    fn test_encode_plain_row() {
        assert_eq!(encode(&["1", "a", "x"]), "1\ta\tx\n");
    }

    #[test]
    fn test_encode_escapes_specials() {
        assert_eq!(encode(&["a\\b", "c\td", "e\nf\r"]), "a\\\\b\tc\\td\te\\nf\\r\n");
    }

    #[test]
    fn test_empty_field_is_not_null() {
        assert_eq!(encode(&["", "b"]), "\tb\n");
    }

    #[test]
    fn test_timeout_statement() {
        assert_eq!(
            timeout_statement(Some(Duration::from_secs(30))),
            "SET LOCAL statement_timeout = 30000"
        );
        assert_eq!(timeout_statement(None), "SET LOCAL statement_timeout = 0");
    }

    #[test]
    fn test_copy_statement() {
        assert_eq!(
            copy_statement(&quote_ident("public.trips")),
            "COPY \"public\".\"trips\" FROM STDIN WITH (FORMAT text)"
        );
    }
}
