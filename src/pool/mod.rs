pub mod builder;
pub mod connection;
mod manager;
pub mod types;

#[allow(clippy::module_inception)]
mod pool;

pub use builder::PoolBuilder;
pub use connection::PooledConnection;
pub use pool::ConnectionPool;
pub use types::{ConnectionCounts, PoolConfig, PoolStats};
