//! Error types for perf-dashboard-core

use thiserror::Error;

/// Result type alias for perf-dashboard-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the query engine
///
/// Empty result sets are never reported through this type; a request that
/// matches nothing yields an empty response instead.
#[derive(Error, Debug)]
pub enum Error {
    /// The request itself is malformed (wrong axis count, unsupported axis
    /// kind for the chart mode, unparseable integer label, ...)
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Run not found: {run_id}")]
    NotFound { run_id: String },

    #[error("Store query failed: {context}")]
    StoreError {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Query task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::ConfigError(message.into())
    }

    /// Whether this error was caused by the request rather than by the data or the store
    pub fn is_config(&self) -> bool {
        matches!(self, Error::ConfigError(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
