use crate::error::PoolResult;
use crate::pool::types::PoolConfig;
use crate::pool::ConnectionPool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating pools with specific configurations
pub struct PoolBuilder {
    config: PoolConfig,
}

impl PoolBuilder {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            config: PoolConfig {
                db_path: db_path.as_ref().to_path_buf(),
                ..Default::default()
            },
        }
    }

    pub fn min_connections(mut self, min: usize) -> Self {
        self.config.min_connections = min;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.config.maintenance_interval = interval;
        self
    }

    pub fn enable_wal(mut self, enable: bool) -> Self {
        self.config.enable_wal = enable;
        self
    }

    pub fn enable_foreign_keys(mut self, enable: bool) -> Self {
        self.config.enable_foreign_keys = enable;
        self
    }

    pub fn slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.config.slow_query_threshold = threshold;
        self
    }

    pub fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.statement_cache_capacity = capacity;
        self
    }

    /// Idempotent DDL (`CREATE TABLE IF NOT EXISTS`, secondary indexes) run
    /// once when the first connection opens.
    pub fn bootstrap_sql(mut self, sql: impl Into<String>) -> Self {
        self.config.bootstrap_sql = Some(sql.into());
        self
    }

    pub async fn build(self) -> PoolResult<Arc<ConnectionPool>> {
        ConnectionPool::new(self.config).await
    }
}
