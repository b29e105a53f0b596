use crate::pool::manager::InternalConnection;
use crate::pool::ConnectionPool;
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;

/// A borrowed database connection with automatic return-to-pool.
///
/// The guard holds the pool's semaphore permit for the whole lease; the permit
/// is released only after the connection is back in the idle set, so a woken
/// waiter always finds either a free connection or spare capacity to open one.
pub struct PooledConnection {
    inner: Option<InternalConnection>,
    pool: Arc<ConnectionPool>,
    permit: Option<OwnedSemaphorePermit>,
    poisoned: bool,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.inner.as_ref().map(|c| c.id))
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    pub(crate) fn new(
        inner: InternalConnection,
        pool: Arc<ConnectionPool>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            inner: Some(inner),
            pool,
            permit: Some(permit),
            poisoned: false,
        }
    }

    /// Access the underlying connection, stamping usage bookkeeping.
    ///
    /// A multi-statement transaction must run entirely through one guard; the
    /// pool gives no ordering across connections.
    pub fn connection(&mut self) -> &mut Connection {
        let inner = self
            .inner
            .as_mut()
            .expect("connection present until guard drop");
        inner.touch();
        inner.query_count += 1;
        &mut inner.connection
    }

    /// Opaque id of the underlying connection.
    pub fn id(&self) -> u64 {
        self.inner
            .as_ref()
            .expect("connection present until guard drop")
            .id
    }

    /// Mark the connection as unsafe to re-lend. It is retired instead of
    /// returning to the idle set.
    pub fn mark_poisoned(&mut self) {
        self.poisoned = true;
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            let pool = Arc::clone(&self.pool);
            let permit = self.permit.take();
            let poisoned = self.poisoned;

            tokio::spawn(async move {
                pool.return_connection(inner, poisoned).await;
                // Wakes exactly one waiter, after the connection is back.
                drop(permit);
            });
        }
    }
}
