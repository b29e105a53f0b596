//! # qanun-db
//!
//! Bounded SQLite connection pool and query-execution layer for the Qanun
//! legal-document training dashboard.
//!
//! The pool creates, lends, reclaims, and instruments a fixed-size set of
//! database connections shared by many concurrent request handlers. It owns a
//! per-connection prepared-statement cache, a time-bounded result cache, and
//! slow-query telemetry, and exposes two operations to the rest of the
//! application: execute a parameterized statement, and read pool statistics.
//!
//! ## Quick Start
//!
//! ```no_run
//! use qanun_db::{PoolBuilder, QueryOptions, SqlParam};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = PoolBuilder::new("data/legal_docs.db")
//!         .max_connections(10)
//!         .bootstrap_sql("CREATE TABLE IF NOT EXISTS documents (id INTEGER PRIMARY KEY, title TEXT)")
//!         .build()
//!         .await?;
//!
//!     pool.execute(
//!         "INSERT INTO documents (title) VALUES (?)",
//!         vec![SqlParam::from("قرارداد اجاره")],
//!         QueryOptions::default(),
//!     )
//!     .await?;
//!
//!     let rows = pool
//!         .execute(
//!             "SELECT id, title FROM documents",
//!             vec![],
//!             QueryOptions::cached(Duration::from_secs(30)),
//!         )
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&rows)?);
//!
//!     pool.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`pool`] - Connection pool, borrow/release lifecycle, and builder
//! - [`query`] - Parameter values, execution options, and result shapes
//! - [`telemetry`] - Query latency and slow-query accounting
//! - [`error`] - Error taxonomy

/// Time-bounded result caching keyed by query fingerprint
mod cache;
/// Error types and handling utilities
pub mod error;
/// Connection pool, lifecycle, and configuration
pub mod pool;
/// Statement execution, parameters, and result shapes
pub mod query;
/// Performance and slow-query accounting
pub mod telemetry;

pub use error::{PoolError, PoolResult};
pub use pool::{ConnectionCounts, ConnectionPool, PoolBuilder, PoolConfig, PoolStats, PooledConnection};
pub use query::{QueryOptions, QueryOutcome, Row, SqlParam};
pub use telemetry::{PerformanceSnapshot, SlowQuery};
