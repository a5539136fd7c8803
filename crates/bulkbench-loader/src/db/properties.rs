//! Server property discovery
//!
//! Reads run-time settings through `current_setting`. Anything the
//! connecting role may not read falls back to a default instead of failing
//! the run.

use bulkbench_common::{BenchError, Result};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, warn};

/// Reported when `server_version` cannot be read
pub const UNKNOWN_VERSION: &str = "unknown";

/// PostgreSQL's compiled-in default page size
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

/// Read one server setting by name
pub async fn get_server_property(pool: &PgPool, name: &str) -> Result<String> {
    sqlx::query_scalar::<_, String>("SELECT current_setting($1)")
        .bind(name)
        .fetch_one(pool)
        .await
        .map_err(|e| BenchError::connectivity(format!("reading setting {}: {}", name, e)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerProperties {
    pub version: String,
    /// Needs superuser or `pg_read_all_settings`
    pub data_directory: Option<String>,
    pub block_size: usize,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            version: UNKNOWN_VERSION.to_string(),
            data_directory: None,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl ServerProperties {
    /// Discover what the connecting role is allowed to see
    pub async fn discover(pool: &PgPool) -> Self {
        let defaults = Self::default();

        let version = fallback(get_server_property(pool, "server_version").await, "server_version")
            .unwrap_or(defaults.version);
        let data_directory =
            fallback(get_server_property(pool, "data_directory").await, "data_directory");
        let block_size = fallback(get_server_property(pool, "block_size").await, "block_size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.block_size);

        let properties = Self {
            version,
            data_directory,
            block_size,
        };
        debug!(?properties, "Server properties");
        properties
    }

    /// COPY send buffer when the user did not pick one: four pages
    pub fn preferred_packet_size(&self) -> usize {
        self.block_size.saturating_mul(4)
    }
}

fn fallback(result: Result<String>, name: &str) -> Option<String> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(setting = name, error = %e, "Server setting unavailable, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let props = ServerProperties::default();
        assert_eq!(props.version, "unknown");
        assert_eq!(props.data_directory, None);
        assert_eq!(props.preferred_packet_size(), 32 * 1024);
    }

    #[test]
    fn test_fallback_drops_errors() {
        assert_eq!(fallback(Ok("16.2".into()), "server_version"), Some("16.2".into()));
        assert_eq!(
            fallback(Err(BenchError::connectivity("permission denied")), "data_directory"),
            None
        );
    }
}
