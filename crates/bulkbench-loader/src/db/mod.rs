//! PostgreSQL collaborators: connections, COPY sink, server properties and
//! provisioning

pub mod copy;
pub mod properties;
pub mod provision;

use bulkbench_common::{BenchError, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::config::ConnectionConfig;

pub use copy::PgBulkSink;
pub use properties::{get_server_property, ServerProperties};

const APPLICATION_NAME: &str = "bulkbench";

/// Translate a connection descriptor into sqlx options
pub fn connect_options(config: &ConnectionConfig) -> PgConnectOptions {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(config.auth.user())
        .application_name(APPLICATION_NAME);

    match config.auth.password() {
        Some(password) => options.password(password),
        None => options,
    }
}

/// Open a pool with `min_connections` ready and room for `max_connections`.
///
/// At least one connection is established before returning, so an
/// unreachable server fails here, before any rows are read.
pub async fn create_pool(
    config: &ConnectionConfig,
    min_connections: u32,
    max_connections: u32,
) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(min_connections)
        .max_connections(max_connections.max(min_connections).max(1))
        .acquire_timeout(config.connect_timeout())
        .connect_with(connect_options(config))
        .await
        .map_err(|e| {
            BenchError::connectivity(format!(
                "cannot connect to {}:{}/{}: {}",
                config.host, config.port, config.database, e
            ))
        })
}

/// Quote an identifier, keeping `schema.table` qualification
pub fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}
