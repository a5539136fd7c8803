//! Error types for bulkbench

use thiserror::Error;

/// Result type alias for bulkbench operations
pub type Result<T> = std::result::Result<T, BenchError>;

/// Main error type for bulkbench
///
/// `Connectivity`, `Provisioning` and `Config` are fatal and only occur before
/// rows start streaming. `BulkInsert` is scoped to a single batch and is
/// recorded on that batch's outcome instead of stopping the run.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Provisioning error: {0}")]
    Provisioning(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Bulk insert of batch {batch} failed: {message}")]
    BulkInsert { batch: u64, message: String },

    #[error("Worker panicked while loading batch {batch}: {message}")]
    WorkerPanic { batch: u64, message: String },
}

impl BenchError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn connectivity(message: impl std::fmt::Display) -> Self {
        Self::Connectivity(message.to_string())
    }

    pub fn provisioning(message: impl std::fmt::Display) -> Self {
        Self::Provisioning(message.to_string())
    }

    pub fn bulk_insert(batch: u64, message: impl std::fmt::Display) -> Self {
        Self::BulkInsert {
            batch,
            message: message.to_string(),
        }
    }

    /// True for errors that abort the run rather than a single batch
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::BulkInsert { .. } | Self::WorkerPanic { .. })
    }
}
