use crate::error::{PoolError, PoolResult};
use crate::pool::types::{ConnectionCounts, PoolConfig};
use rusqlite::Connection;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Internal connection with pool bookkeeping
pub(crate) struct InternalConnection {
    pub connection: Connection,
    pub id: u64,
    #[allow(dead_code)]
    pub created_at: Instant,
    pub last_used: Instant,
    pub query_count: u64,
}

impl InternalConnection {
    fn new(connection: Connection, id: u64) -> Self {
        let now = Instant::now();
        Self {
            connection,
            id,
            created_at: now,
            last_used: now,
            query_count: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    fn is_expired(&self, config: &PoolConfig) -> bool {
        self.last_used.elapsed() > config.idle_timeout
    }
}

/// Manages the lifecycle of database connections.
///
/// Invariant: every connection is either in `idle` or lent out through a
/// `PooledConnection`, never both, and the live count never exceeds
/// `max_connections`.
pub(crate) struct ConnectionManager {
    config: PoolConfig,
    idle: Mutex<VecDeque<InternalConnection>>,
    next_id: AtomicU64,
    created: AtomicU64,
    destroyed: AtomicU64,
    live: AtomicUsize,
    bootstrapped: AtomicBool,
    closed: AtomicBool,
}

impl ConnectionManager {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            idle: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            created: AtomicU64::new(0),
            destroyed: AtomicU64::new(0),
            live: AtomicUsize::new(0),
            bootstrapped: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Eagerly open `min_connections` connections. Any failure here is fatal.
    pub async fn initialize(&self) -> PoolResult<()> {
        for _ in 0..self.config.min_connections {
            let conn = self.open_connection().await?;
            self.idle.lock().await.push_back(conn);
        }
        Ok(())
    }

    /// Open one tuned connection. Pragma failures degrade (logged); an open
    /// failure or a bootstrap DDL failure is an error.
    pub async fn open_connection(&self) -> PoolResult<InternalConnection> {
        let db_path = self.config.db_path.clone();
        let flags = self.config.open_flags;
        let pragmas = self.tuning_pragmas();
        let statement_cache_capacity = self.config.statement_cache_capacity;
        // First successful open runs the bootstrap DDL exactly once.
        let bootstrap = if self.bootstrapped.swap(true, Ordering::SeqCst) {
            None
        } else {
            self.config.bootstrap_sql.clone()
        };

        let open_path = db_path.clone();
        let connection = tokio::task::spawn_blocking(move || -> PoolResult<Connection> {
            let conn = Connection::open_with_flags(&open_path, flags).map_err(|source| {
                PoolError::CreateConnection {
                    path: open_path.clone(),
                    source,
                }
            })?;

            conn.set_prepared_statement_cache_capacity(statement_cache_capacity);

            if let Err(error) = conn.execute_batch(&pragmas) {
                warn!(%error, "tuning pragmas failed, continuing with engine defaults");
            }

            if let Some(ddl) = bootstrap {
                conn.execute_batch(&ddl)
                    .map_err(|source| PoolError::statement(ddl, source))?;
            }

            Ok(conn)
        })
        .await??;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.created.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::Relaxed);
        debug!(id, path = ?db_path, "opened database connection");
        Ok(InternalConnection::new(connection, id))
    }

    fn tuning_pragmas(&self) -> String {
        format!(
            "PRAGMA synchronous = NORMAL;\n\
             PRAGMA temp_store = memory;\n\
             PRAGMA cache_size = -{};\n\
             {}{}",
            self.config.cache_size_kib,
            if self.config.enable_wal {
                "PRAGMA journal_mode = WAL;\n"
            } else {
                ""
            },
            if self.config.enable_foreign_keys {
                "PRAGMA foreign_keys = ON;\n"
            } else {
                ""
            },
        )
    }

    /// Pop an idle connection, if any.
    pub async fn checkout(&self) -> Option<InternalConnection> {
        let mut idle = self.idle.lock().await;
        let mut conn = idle.pop_front()?;
        conn.touch();
        Some(conn)
    }

    /// Return a lent connection. Poisoned connections and returns after
    /// shutdown are retired instead of re-entering the idle set.
    pub async fn checkin(&self, mut conn: InternalConnection, poisoned: bool) {
        if poisoned {
            self.retire(conn, "poisoned");
            return;
        }
        conn.touch();
        let mut idle = self.idle.lock().await;
        // Checked under the lock so a late return cannot slip into the deque
        // after shutdown has drained it.
        if self.closed.load(Ordering::SeqCst) {
            drop(idle);
            self.retire(conn, "pool closed");
            return;
        }
        idle.push_back(conn);
    }

    fn retire(&self, conn: InternalConnection, reason: &str) {
        self.destroyed.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_sub(1, Ordering::Relaxed);
        debug!(id = conn.id, queries = conn.query_count, reason, "retired connection");
        // Dropping the rusqlite handle closes the native connection.
    }

    /// Reclaim idle connections past `idle_timeout`, never dropping the live
    /// count below `min_connections`. Lent connections are untouched.
    pub async fn sweep_idle(&self) {
        let mut idle = self.idle.lock().await;
        let live = self.live.load(Ordering::Relaxed);
        let mut budget = live.saturating_sub(self.config.min_connections);
        if budget == 0 {
            return;
        }

        let mut kept = VecDeque::with_capacity(idle.len());
        let mut removed = 0usize;
        while let Some(conn) = idle.pop_front() {
            if budget > 0 && conn.is_expired(&self.config) {
                budget -= 1;
                removed += 1;
                self.retire(conn, "idle timeout");
            } else {
                kept.push_back(conn);
            }
        }
        *idle = kept;

        if removed > 0 {
            debug!(removed, "maintenance reclaimed idle connections");
        }
    }

    /// Whether retirements have dropped the pool below its floor.
    pub fn needs_restore(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && self.live.load(Ordering::Relaxed) < self.config.min_connections
    }

    /// Drop every idle connection and refuse further checkins.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut idle = self.idle.lock().await;
        while let Some(conn) = idle.pop_front() {
            self.retire(conn, "shutdown");
        }
    }

    pub async fn counts(&self) -> ConnectionCounts {
        let available = self.idle.lock().await.len();
        let total = self.live.load(Ordering::Relaxed);
        ConnectionCounts {
            total,
            available,
            busy: total.saturating_sub(available),
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
        }
    }
}
