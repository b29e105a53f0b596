use crate::cache::{fingerprint, ResultCache};
use crate::error::{PoolError, PoolResult};
use crate::pool::connection::PooledConnection;
use crate::pool::manager::{ConnectionManager, InternalConnection};
use crate::pool::types::{PoolConfig, PoolStats};
use crate::query::{run_statement, QueryOptions, QueryOutcome, SqlParam};
use crate::telemetry::PerformanceRecorder;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// A bounded, thread-safe SQLite connection pool.
///
/// Connections are opened lazily up to `max_connections`; borrowers wait at
/// most `connection_timeout` for capacity. The pool owns the result cache and
/// the performance recorder, and runs one background maintenance task for idle
/// reclamation and cache expiry.
pub struct ConnectionPool {
    pub(crate) config: PoolConfig,
    manager: ConnectionManager,
    /// Capacity tokens; one held per lease for its whole duration.
    semaphore: Arc<Semaphore>,
    result_cache: ResultCache,
    recorder: PerformanceRecorder,
    maintenance: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Create and initialize a pool: validate the configuration, ensure the
    /// database directory exists, open the minimum connections (running the
    /// bootstrap DDL once), and start the maintenance task.
    pub async fn new(config: PoolConfig) -> PoolResult<Arc<Self>> {
        config.validate()?;

        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| PoolError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        let pool = Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(config.max_connections)),
            manager: ConnectionManager::new(config.clone()),
            result_cache: ResultCache::new(),
            recorder: PerformanceRecorder::new(),
            maintenance: Mutex::new(None),
            closed: AtomicBool::new(false),
            config,
        });

        pool.manager.initialize().await?;

        let maintenance_pool = Arc::clone(&pool);
        let handle = tokio::spawn(async move {
            maintenance_pool.maintenance_loop().await;
        });
        *pool.maintenance.lock().await = Some(handle);

        info!(
            min = pool.config.min_connections,
            max = pool.config.max_connections,
            path = ?pool.config.db_path,
            "connection pool initialized"
        );

        Ok(pool)
    }

    /// Borrow a connection, waiting at most `connection_timeout` for capacity.
    ///
    /// Waiters queue on the semaphore and are woken one per release, each
    /// receiving a distinct connection; no connection is ever double-lent.
    pub async fn acquire(self: &Arc<Self>) -> PoolResult<PooledConnection> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }

        let started = Instant::now();
        let permit = match timeout(
            self.config.connection_timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await
        {
            Err(_) => {
                let waited = started.elapsed();
                warn!(?waited, "no connection became free in time");
                return Err(PoolError::Exhausted { waited });
            }
            Ok(Err(_)) => return Err(PoolError::Closed), // semaphore closed by close()
            Ok(Ok(permit)) => permit,
        };

        let inner = match self.manager.checkout().await {
            Some(conn) => conn,
            // Permit in hand and nothing idle: grow on demand. Holding the
            // permit guarantees live < max here.
            None => match self.manager.open_connection().await {
                Ok(conn) => conn,
                Err(error) => {
                    // Only this borrow fails; the pool keeps serving.
                    warn!(%error, "on-demand connection growth failed");
                    return Err(error);
                }
            },
        };

        debug!(id = inner.id, waited = ?started.elapsed(), "connection acquired");
        Ok(PooledConnection::new(inner, Arc::clone(self), permit))
    }

    /// Execute one parameterized statement; the single entry point for
    /// request handlers.
    ///
    /// A live cached result short-circuits without borrowing a connection.
    /// Otherwise the statement runs on a borrowed connection via the blocking
    /// thread pool, latency is recorded (with slow queries ringed), and the
    /// connection is released on every path, error paths included.
    pub async fn execute(
        self: &Arc<Self>,
        sql: &str,
        params: Vec<SqlParam>,
        options: QueryOptions,
    ) -> PoolResult<QueryOutcome> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }

        let key = options.use_cache.then(|| fingerprint(sql, &params));
        if let Some(key) = key {
            if let Some(cached) = self.result_cache.get(&key) {
                self.recorder.record_cache_hit();
                debug!(sql, "result cache hit");
                return Ok(cached);
            }
            self.recorder.record_cache_miss();
        }

        let mut guard = self.acquire().await?;
        let sql_owned = sql.to_string();
        let (guard, params, result, elapsed) =
            tokio::task::spawn_blocking(move || {
                let started = Instant::now();
                let result = run_statement(guard.connection(), &sql_owned, &params);
                (guard, params, result, started.elapsed())
            })
            .await?;

        match result {
            Ok(outcome) => {
                self.recorder.record_query(elapsed);
                if elapsed > self.config.slow_query_threshold {
                    warn!(sql, ?elapsed, "slow query");
                    self.recorder.record_slow_query(sql, &params, elapsed).await;
                }
                if let (Some(key), Some(ttl)) = (key, options.cache_ttl) {
                    self.result_cache.insert(key, outcome.clone(), ttl);
                }
                drop(guard);
                Ok(outcome)
            }
            Err(source) => {
                // Retire rather than re-lend a possibly-poisoned connection.
                let mut guard = guard;
                guard.mark_poisoned();
                drop(guard);
                Err(PoolError::statement(sql, source))
            }
        }
    }

    /// Snapshot of connection counts, query performance, and cache occupancy.
    pub async fn stats(&self) -> PoolStats {
        PoolStats {
            connections: self.manager.counts().await,
            performance: self.recorder.snapshot().await,
            cached_results: self.result_cache.len(),
        }
    }

    /// Terminal shutdown: pending waiters fail with [`PoolError::Closed`],
    /// idle connections close immediately, lent connections close as their
    /// guards drop, and the caches and recorder are cleared.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.maintenance.lock().await.take() {
            handle.abort();
        }
        self.semaphore.close();
        self.manager.shutdown().await;
        self.result_cache.clear();
        self.recorder.reset().await;

        info!("connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Called by the guard on drop.
    pub(crate) async fn return_connection(&self, inner: InternalConnection, poisoned: bool) {
        self.manager.checkin(inner, poisoned).await;
    }

    /// Reopen connections after retirements dropped the pool below its floor.
    ///
    /// Each restore happens under a spare semaphore permit, held until the
    /// connection is parked in the idle set. Restoration therefore can never
    /// race an on-demand open in [`acquire`] past `max_connections`; when no
    /// permit is spare, the next borrower grows the pool instead.
    ///
    /// [`acquire`]: ConnectionPool::acquire
    async fn restore_minimum(&self) {
        while self.manager.needs_restore() {
            let _permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => break,
            };
            if !self.manager.needs_restore() {
                break;
            }
            match self.manager.open_connection().await {
                Ok(conn) => self.manager.checkin(conn, false).await,
                Err(error) => {
                    warn!(%error, "failed to restore minimum connections");
                    break;
                }
            }
        }
    }

    async fn maintenance_loop(&self) {
        let mut ticker = tokio::time::interval(self.config.maintenance_interval);
        ticker.tick().await; // first tick fires immediately

        loop {
            ticker.tick().await;
            if self.closed.load(Ordering::SeqCst) {
                break;
            }
            self.manager.sweep_idle().await;
            self.result_cache.purge_expired();
            self.restore_minimum().await;
        }
    }
}
