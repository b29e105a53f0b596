/// Domain-specific error types for the connection pool using thiserror
///
/// The taxonomy mirrors the pool's failure modes: capacity exhaustion,
/// use-after-close, connection creation failures, and statement errors
/// surfaced verbatim from the engine.
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type PoolResult<T> = std::result::Result<T, PoolError>;

/// Main error type for pool operations
#[derive(Error, Debug)]
pub enum PoolError {
    /// No connection became free within `connection_timeout`. The pool never
    /// retries on the caller's behalf; retry with backoff or surface a 503.
    #[error("connection pool exhausted after waiting {waited:?}")]
    Exhausted { waited: Duration },

    /// Operation attempted after `close()`. Terminal; do not retry.
    #[error("connection pool is closed")]
    Closed,

    /// The underlying database connection could not be opened. Fatal during
    /// initialization; during on-demand growth the borrow attempt fails with
    /// this while the rest of the pool keeps serving.
    #[error("failed to open database connection at {path}")]
    CreateConnection {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The engine rejected the SQL or a constraint fired. The connection is
    /// released (or retired) before this is raised.
    #[error("statement failed: {sql}")]
    Statement {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Eager configuration validation failure.
    #[error("invalid pool configuration for {field}: {reason}")]
    Config { field: &'static str, reason: String },

    /// The database directory could not be created.
    #[error("failed to prepare database directory {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A blocking query worker panicked.
    #[error("query worker panicked")]
    Join(#[from] tokio::task::JoinError),
}

impl PoolError {
    /// Whether the caller may reasonably retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::Exhausted { .. })
    }

    pub(crate) fn statement(sql: impl Into<String>, source: rusqlite::Error) -> Self {
        PoolError::Statement {
            sql: sql.into(),
            source,
        }
    }
}
