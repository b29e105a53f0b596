use crate::error::{PoolError, PoolResult};
use crate::telemetry::PerformanceSnapshot;
use rusqlite::OpenFlags;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the connection pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Database file path
    pub db_path: PathBuf,
    /// Minimum number of connections to maintain
    pub min_connections: usize,
    /// Maximum number of connections allowed
    pub max_connections: usize,
    /// Maximum time a borrower waits for a free connection
    pub connection_timeout: Duration,
    /// Idle time after which a connection becomes eligible for reclamation
    pub idle_timeout: Duration,
    /// How often the maintenance sweep runs
    pub maintenance_interval: Duration,
    /// Enable WAL mode for better concurrency
    pub enable_wal: bool,
    /// Enforce foreign-key constraints on every connection
    pub enable_foreign_keys: bool,
    /// Engine page-cache size in KiB, applied per connection
    pub cache_size_kib: i64,
    /// Capacity of each connection's prepared-statement LRU
    pub statement_cache_capacity: usize,
    /// Executions slower than this are recorded as slow queries
    pub slow_query_threshold: Duration,
    /// Idempotent DDL (tables, secondary indexes) applied once at startup
    pub bootstrap_sql: Option<String>,
    /// Connection flags for opening the database
    pub open_flags: OpenFlags,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("database.db"),
            min_connections: 2,
            max_connections: 10,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300), // 5 minutes
            maintenance_interval: Duration::from_secs(60), // 1 minute
            enable_wal: true,
            enable_foreign_keys: true,
            cache_size_kib: 64_000,
            statement_cache_capacity: 64,
            slow_query_threshold: Duration::from_millis(1000),
            bootstrap_sql: None,
            open_flags: OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX, // Pool serializes access itself
        }
    }
}

impl PoolConfig {
    /// Reject inconsistent settings before any connection is opened.
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_connections == 0 {
            return Err(PoolError::Config {
                field: "max_connections",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.min_connections > self.max_connections {
            return Err(PoolError::Config {
                field: "min_connections",
                reason: format!(
                    "{} exceeds max_connections {}",
                    self.min_connections, self.max_connections
                ),
            });
        }
        if self.connection_timeout.is_zero() {
            return Err(PoolError::Config {
                field: "connection_timeout",
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Connection counts at one instant. `total = available + busy` always holds.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionCounts {
    pub total: usize,
    pub available: usize,
    pub busy: usize,
    pub created: u64,
    pub destroyed: u64,
}

/// Combined pool and performance statistics, the read-only surface exposed to
/// the dashboard handlers.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub connections: ConnectionCounts,
    pub performance: PerformanceSnapshot,
    pub cached_results: usize,
}
