//! Pooled configured connections
//!
//! r2d2-based pool in which every connection runs the same bootstrap plan
//! from the manager's init hook, so a pooled handle is indistinguishable from
//! one returned by [`Connector::open`].

use std::sync::Arc;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{info, instrument, warn};

use crate::bootstrap::BootstrapPlan;
use crate::connection::{open_flags, shared_cache_eligible, Connector};
use crate::error::{ConnectError, ConnectResult};
use crate::source::{DatabaseLocation, NormalizedConfig};

/// Pool sizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of connections (default: 10)
    pub max_size: u32,

    /// How long `get` waits for a free connection (default: 5s)
    pub connection_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_size: 10, connection_timeout: Duration::from_secs(5) }
    }
}

impl PoolConfig {
    pub fn new(max_size: u32, connection_timeout: Duration) -> Self {
        Self { max_size, connection_timeout }
    }
}

/// A pooled connection
pub type PooledConnectionHandle = PooledConnection<SqliteConnectionManager>;

/// Pool of connections sharing one configuration
#[derive(Debug)]
pub struct ConnectionPool {
    pool: Pool<SqliteConnectionManager>,
    config: PoolConfig,
}

impl ConnectionPool {
    /// Build a pool for `config`
    ///
    /// # Process
    /// 1. Create a manager whose init hook runs the bootstrap plan
    /// 2. Build the pool; r2d2 opens the initial connections eagerly, so a
    ///    wrong key fails here
    /// 3. Apply the shared-cache request to the connector's context
    ///
    /// # Errors
    /// - [`ConnectError::KeyMismatch`] if the engine rejects the key
    /// - [`ConnectError::Pool`] for any other build failure
    #[instrument(skip(connector, config), fields(location = %config.location(), pool_size = pool_config.max_size))]
    pub fn new(
        connector: &Connector,
        config: &NormalizedConfig,
        pool_config: PoolConfig,
    ) -> ConnectResult<Self> {
        let context = connector.context();
        let shared_cache = shared_cache_eligible(config, context);

        let plan = Arc::new(BootstrapPlan::from_config(config));
        let manager = match config.location() {
            DatabaseLocation::File(path) => SqliteConnectionManager::file(path),
            DatabaseLocation::Memory => SqliteConnectionManager::memory(),
        }
        .with_flags(open_flags(shared_cache))
        .with_init(move |conn| {
            plan.run(&*conn).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        });

        let pool = Pool::builder()
            .max_size(pool_config.max_size)
            .connection_timeout(pool_config.connection_timeout)
            .build(manager)
            .map_err(|e| {
                warn!("Failed to create connection pool: {}", e);
                classify_pool_error(&e.to_string())
            })?;

        if config.shared_cache_requested() {
            context.enable_shared_cache();
        }
        info!("Connection pool ready");
        Ok(Self { pool, config: pool_config })
    }

    /// Check out a configured connection
    pub fn get(&self) -> ConnectResult<PooledConnectionHandle> {
        self.pool.get().map_err(|e| classify_pool_error(&e.to_string()))
    }

    pub fn state(&self) -> r2d2::State {
        self.pool.state()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

/// r2d2 flattens init errors into its message, so classification is textual
fn classify_pool_error(message: &str) -> ConnectError {
    let lowered = message.to_lowercase();
    if lowered.contains("wrong encryption key")
        || lowered.contains("file is not a database")
        || lowered.contains("file is encrypted")
        || lowered.contains("notadb")
    {
        ConnectError::KeyMismatch { source: None }
    } else {
        ConnectError::Pool(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for pool.
    use super::*;
    use crate::context::ProcessContext;

    /// Validates pool defaults.
    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_size, 10);
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
    }

    /// Validates textual classification of pool errors.
    #[test]
    fn test_classify_pool_error() {
        assert!(matches!(
            classify_pool_error(
                "timed out waiting for connection: Wrong encryption key or database not encrypted"
            ),
            ConnectError::KeyMismatch { source: None }
        ));
        assert!(matches!(classify_pool_error("timed out"), ConnectError::Pool(_)));
    }

    /// Validates that pooled in-memory connections run the plan.
    ///
    /// Assertions:
    /// - Confirms the configured pragma is live on a checked-out connection.
    /// - Confirms the pool reports its connections.
    #[test]
    fn test_pooled_connection_is_configured() {
        let connector = Connector::new(ProcessContext::new());
        let config = NormalizedConfig::from_uri("sqlite::memory:?cache_size=-4096").unwrap();
        let pool = ConnectionPool::new(&connector, &config, PoolConfig::new(2, Duration::from_secs(2)))
            .unwrap();

        let conn = pool.get().unwrap();
        let cache_size: i64 = conn.query_row("PRAGMA cache_size", [], |row| row.get(0)).unwrap();
        assert_eq!(cache_size, -4096);
        assert!(pool.state().connections >= 1);
        assert_eq!(pool.config().max_size, 2);
    }
}
