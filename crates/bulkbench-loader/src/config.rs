//! Configuration management
//!
//! Values come from defaults, then `BULKBENCH_*` environment variables (a
//! `.env` file is honoured), then CLI flags.

use bulkbench_common::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::{
    BulkMode, PipelineConfig, DEFAULT_BATCH_SIZE, DEFAULT_DELIMITER, DEFAULT_MAX_WORKERS,
    DEFAULT_MIN_WORKERS, DEFAULT_SESSION_TIMEOUT_SECS,
};

// ============================================================================
// Connection Defaults
// ============================================================================

/// Default database host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default database port.
pub const DEFAULT_PORT: u16 = 5432;

/// Default target database.
pub const DEFAULT_DATABASE: &str = "bulkbench";

/// Default database user.
pub const DEFAULT_USER: &str = "postgres";

/// Default connect (pool acquire) timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default target table.
pub const DEFAULT_TABLE: &str = "bulk_load";

/// How the client authenticates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AuthMode {
    /// User name and password
    Password { user: String, password: String },
    /// No password; the server trusts the OS or network identity
    Trust { user: String },
}

impl AuthMode {
    pub fn user(&self) -> &str {
        match self {
            AuthMode::Password { user, .. } | AuthMode::Trust { user } => user,
        }
    }

    pub fn password(&self) -> Option<&str> {
        match self {
            AuthMode::Password { password, .. } => Some(password),
            AuthMode::Trust { .. } => None,
        }
    }
}

/// Connection descriptor for the target store
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub auth: AuthMode,
    pub connect_timeout_secs: u64,
    /// COPY send buffer in bytes. `None` lets the server's block size decide.
    pub packet_size: Option<usize>,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.auth.user())
            .field("password", &self.auth.password().map(|_| "***"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("packet_size", &self.packet_size)
            .finish()
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.to_string(),
            auth: AuthMode::Trust {
                user: DEFAULT_USER.to_string(),
            },
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            packet_size: None,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Same server, different database
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..self.clone()
        }
    }
}

/// Everything one benchmark run needs
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub source: PathBuf,
    pub table: String,
    pub connection: ConnectionConfig,
    pub batch_size: usize,
    pub min_workers: usize,
    pub max_workers: usize,
    pub delimiter: char,
    /// Unlogged target table and lock-free bulk mode
    pub in_memory: bool,
    /// Statement timeout for pooled batches in seconds; 0 disables it
    pub session_timeout_secs: u64,
    pub create_database: bool,
    pub create_table: bool,
    pub drop_existing: bool,
    /// DDL to run instead of deriving the table from the header
    pub schema_file: Option<PathBuf>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            table: DEFAULT_TABLE.to_string(),
            connection: ConnectionConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            min_workers: DEFAULT_MIN_WORKERS,
            max_workers: DEFAULT_MAX_WORKERS,
            delimiter: DEFAULT_DELIMITER,
            in_memory: false,
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            create_database: false,
            create_table: false,
            drop_existing: false,
            schema_file: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl LoadConfig {
    /// Load configuration from environment and defaults
    ///
    /// - `BULKBENCH_SOURCE`, `BULKBENCH_TABLE`
    /// - `BULKBENCH_HOST`, `BULKBENCH_PORT`, `BULKBENCH_DATABASE`
    /// - `BULKBENCH_USER`, `BULKBENCH_PASSWORD` (password auth when set)
    /// - `BULKBENCH_CONNECT_TIMEOUT`, `BULKBENCH_PACKET_SIZE`
    /// - `BULKBENCH_BATCH_SIZE`, `BULKBENCH_MIN_WORKERS`, `BULKBENCH_MAX_WORKERS`
    /// - `BULKBENCH_SESSION_TIMEOUT`, `BULKBENCH_IN_MEMORY`
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let user = std::env::var("BULKBENCH_USER").unwrap_or_else(|_| DEFAULT_USER.to_string());
        let auth = match std::env::var("BULKBENCH_PASSWORD") {
            Ok(password) => AuthMode::Password { user, password },
            Err(_) => AuthMode::Trust { user },
        };

        Self {
            source: std::env::var("BULKBENCH_SOURCE")
                .map(PathBuf::from)
                .unwrap_or(defaults.source),
            table: std::env::var("BULKBENCH_TABLE").unwrap_or(defaults.table),
            connection: ConnectionConfig {
                host: std::env::var("BULKBENCH_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
                port: env_parse("BULKBENCH_PORT").unwrap_or(DEFAULT_PORT),
                database: std::env::var("BULKBENCH_DATABASE")
                    .unwrap_or_else(|_| DEFAULT_DATABASE.to_string()),
                auth,
                connect_timeout_secs: env_parse("BULKBENCH_CONNECT_TIMEOUT")
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
                packet_size: env_parse("BULKBENCH_PACKET_SIZE"),
            },
            batch_size: env_parse("BULKBENCH_BATCH_SIZE").unwrap_or(defaults.batch_size),
            min_workers: env_parse("BULKBENCH_MIN_WORKERS").unwrap_or(defaults.min_workers),
            max_workers: env_parse("BULKBENCH_MAX_WORKERS").unwrap_or(defaults.max_workers),
            in_memory: env_parse("BULKBENCH_IN_MEMORY").unwrap_or(defaults.in_memory),
            session_timeout_secs: env_parse("BULKBENCH_SESSION_TIMEOUT")
                .unwrap_or(defaults.session_timeout_secs),
            ..defaults
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.source.as_os_str().is_empty() {
            return Err(BenchError::config("source file path cannot be empty"));
        }
        if self.table.trim().is_empty() {
            return Err(BenchError::config("table name cannot be empty"));
        }
        if self.connection.host.is_empty() {
            return Err(BenchError::config("host cannot be empty"));
        }
        if self.connection.database.is_empty() {
            return Err(BenchError::config("database cannot be empty"));
        }
        if self.connection.packet_size == Some(0) {
            return Err(BenchError::config("packet_size must be greater than 0"));
        }
        if self.schema_file.is_some() && !self.create_table {
            tracing::warn!("schema file given without --create-table; it will be ignored");
        }
        self.pipeline().validate()
    }

    pub fn bulk_mode(&self) -> BulkMode {
        BulkMode::for_in_memory(self.in_memory)
    }

    /// Connections the loader needs: every pooled worker plus the trailing writer
    pub fn max_connections(&self) -> u32 {
        u32::try_from(self.max_workers.saturating_add(1)).unwrap_or(u32::MAX)
    }

    /// The subset of settings the pipeline consumes
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            batch_size: self.batch_size,
            min_workers: self.min_workers,
            max_workers: self.max_workers,
            delimiter: self.delimiter,
            bulk_mode: self.bulk_mode(),
            session_timeout: (self.session_timeout_secs > 0)
                .then(|| Duration::from_secs(self.session_timeout_secs)),
        }
    }
}
