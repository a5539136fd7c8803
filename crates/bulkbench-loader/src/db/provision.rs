//! Database and table provisioning
//!
//! Runs before the pipeline starts. Every failure here is fatal.

use bulkbench_common::{BenchError, Result};
use sqlx::{Connection, PgConnection, PgPool};
use tracing::info;

use super::{connect_options, quote_ident};
use crate::config::ConnectionConfig;

/// Database used to create the target database
pub const MAINTENANCE_DATABASE: &str = "postgres";

/// Create `config.database` if it does not exist. Returns true when created.
pub async fn ensure_database(config: &ConnectionConfig) -> Result<bool> {
    let maintenance = config.with_database(MAINTENANCE_DATABASE);
    let mut conn = PgConnection::connect_with(&connect_options(&maintenance))
        .await
        .map_err(|e| {
            BenchError::connectivity(format!(
                "cannot connect to {}:{}/{}: {}",
                config.host, config.port, MAINTENANCE_DATABASE, e
            ))
        })?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&config.database)
            .fetch_one(&mut conn)
            .await
            .map_err(BenchError::provisioning)?;

    let created = if exists {
        false
    } else {
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&config.database)))
            .execute(&mut conn)
            .await
            .map_err(|e| {
                BenchError::provisioning(format!("creating database {}: {}", config.database, e))
            })?;
        info!(database = %config.database, "Database created");
        true
    };

    conn.close().await.ok();
    Ok(created)
}

/// DDL for a table whose columns mirror the header, every column `text`.
///
/// Names are trimmed; an empty name cannot become a column.
pub fn table_ddl(table: &str, columns: &[String], unlogged: bool) -> Result<String> {
    let mut defs = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let name = column.trim();
        if name.is_empty() {
            return Err(BenchError::provisioning(format!(
                "cannot derive a table from the header: column {} has no name",
                i + 1
            )));
        }
        defs.push(format!("    {} text", quote_ident(name)));
    }

    Ok(format!(
        "CREATE {}TABLE IF NOT EXISTS {} (\n{}\n)",
        if unlogged { "UNLOGGED " } else { "" },
        quote_ident(table),
        defs.join(",\n")
    ))
}

/// Run `ddl` against the target database, optionally dropping `table` first.
///
/// `ddl` may hold several statements.
pub async fn create_table(pool: &PgPool, table: &str, ddl: &str, drop_existing: bool) -> Result<()> {
    if drop_existing {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
            .execute(pool)
            .await
            .map_err(|e| BenchError::provisioning(format!("dropping {}: {}", table, e)))?;
        info!(table, "Dropped existing table");
    }

    sqlx::raw_sql(ddl)
        .execute(pool)
        .await
        .map_err(|e| BenchError::provisioning(format!("creating {}: {}", table, e)))?;
    info!(table, "Table ready");
    Ok(())
}
