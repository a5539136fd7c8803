//! bulkbench common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error type and logging setup for the bulkbench workspace.
//!
//! - **Error Handling**: [`BenchError`] and the crate-wide [`Result`] alias
//! - **Logging**: [`logging::init_logging`] driven by a [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use bulkbench_common::logging::{init_logging, LogConfig};
//! use bulkbench_common::Result;
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{BenchError, Result};
