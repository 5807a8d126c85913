//! Opening configured connections
//!
//! [`Connector`] owns the [`ProcessContext`] and turns a configuration into a
//! live, fully configured [`Connection`]. A handle is only returned after
//! every plan step and every readback succeeded; on any failure the handle
//! is dropped before the error reaches the caller.
//!
//! Two paths are offered:
//! - declarative ([`Connector::open`], [`Connector::open_uri`]): options come
//!   from the URI and properties and run through [`BootstrapPlan`]
//! - statement-driven ([`Connector::open_with_statements`]): the caller
//!   supplies its own configuration statements; the URI may only carry
//!   `cache=`, and the process-wide shared-cache flag is never touched

use std::ops::Deref;

use rusqlite::OpenFlags;
use tracing::{debug, info, instrument};

use crate::bootstrap::{BootstrapPlan, ConfigTarget, VERIFY_KEY_SQL};
use crate::context::ProcessContext;
use crate::error::{ConnectError, ConnectResult};
use crate::key::KeyMaterial;
use crate::registry::{ConfigOption, Stage};
use crate::source::{CacheScope, ConfigSource, DatabaseLocation, NormalizedConfig};

/// Observable post-configuration state of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    location: DatabaseLocation,
    shared_cache_enabled: bool,
    shared_cache_connection: bool,
    encrypted: bool,
}

impl ConnectionState {
    pub fn location(&self) -> &DatabaseLocation {
        &self.location
    }

    /// Process-wide shared-cache flag as seen when the handle was opened
    pub fn is_shared_cache_enabled(&self) -> bool {
        self.shared_cache_enabled
    }

    /// Whether this handle was opened with the shared-cache open flag
    pub fn is_shared_cache_connection(&self) -> bool {
        self.shared_cache_connection
    }

    /// Whether a key was applied when the handle was opened
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }
}

/// Opens configured connections against one process context
#[derive(Debug, Clone)]
pub struct Connector {
    context: ProcessContext,
}

impl Default for Connector {
    /// Connector bound to [`ProcessContext::global`]
    fn default() -> Self {
        Self::new(ProcessContext::global().clone())
    }
}

impl Connector {
    pub fn new(context: ProcessContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ProcessContext {
        &self.context
    }

    /// Parse `uri` with the built-in defaults and open it
    pub fn open_uri(&self, uri: &str) -> ConnectResult<Connection> {
        self.open_source(&ConfigSource::new(uri))
    }

    /// Parse `source` and open it
    pub fn open_source(&self, source: &ConfigSource) -> ConnectResult<Connection> {
        let config = source.parse()?;
        self.open(&config)
    }

    /// Open and configure a handle for `config`
    ///
    /// # Process
    /// 1. Open the handle with shared or private cache flags
    /// 2. Run the bootstrap plan and verify every pragma by readback
    /// 3. Apply the shared-cache request to the process context; a failed
    ///    open leaves the context unchanged
    ///
    /// # Errors
    /// - [`ConnectError::KeyMismatch`] if the key is wrong or the file is not
    ///   encrypted
    /// - [`ConnectError::BootstrapFailure`] or
    ///   [`ConnectError::ReadbackMismatch`] if configuration fails
    #[instrument(skip(self, config), fields(location = %config.location(), keyed = config.has_key()))]
    pub fn open(&self, config: &NormalizedConfig) -> ConnectResult<Connection> {
        let shared_cache_connection = shared_cache_eligible(config, &self.context);

        let inner = open_handle(config.location(), shared_cache_connection)?;
        let plan = BootstrapPlan::from_config(config);
        plan.run(&inner)?;

        // Only a fully configured handle may change process-wide state
        if config.shared_cache_requested() {
            self.context.enable_shared_cache();
        }

        let state = ConnectionState {
            location: config.location().clone(),
            shared_cache_enabled: self.context.is_shared_cache_enabled(),
            shared_cache_connection,
            encrypted: config.has_key(),
        };
        info!(
            steps = plan.len(),
            shared_cache = state.shared_cache_connection,
            "Connection configured"
        );
        Ok(Connection { inner, state })
    }

    /// Open `uri` and configure it with caller-supplied statements
    ///
    /// The URI may only carry `cache=`; no defaults are applied. The handle is
    /// shared-cache eligible unless `cache=private` is given. Each statement
    /// runs as its own step, followed by a page read that proves any key the
    /// statements applied.
    ///
    /// # Errors
    /// - [`ConnectError::InvalidArgument`] if the URI carries other options
    /// - [`ConnectError::KeyMismatch`] if the engine rejects the key
    /// - [`ConnectError::BootstrapFailure`] naming `statement[i]` otherwise
    #[instrument(skip(self, uri, statements), fields(statements = statements.len()))]
    pub fn open_with_statements(&self, uri: &str, statements: &[&str]) -> ConnectResult<Connection> {
        let config = ConfigSource::new(uri).without_defaults().parse()?;
        if let Some((option, _)) =
            config.iter().find(|(option, _)| *option != ConfigOption::CacheScope)
        {
            return Err(ConnectError::InvalidArgument(format!(
                "option '{}' cannot be combined with statement-driven configuration",
                option
            )));
        }

        let shared_cache_connection = config.cache_scope() != Some(CacheScope::Private);
        let inner = open_handle(config.location(), shared_cache_connection)?;

        for (index, sql) in statements.iter().enumerate() {
            ConfigTarget::execute(&inner, sql)
                .map_err(|e| ConnectError::from_step(format!("statement[{}]", index), e))?;
            debug!(step = index, "Applied caller statement");
        }
        inner
            .query_scalar(VERIFY_KEY_SQL)
            .map_err(|e| ConnectError::from_step("verify_key", e))?;

        let state = ConnectionState {
            location: config.location().clone(),
            shared_cache_enabled: self.context.is_shared_cache_enabled(),
            shared_cache_connection,
            encrypted: statements.iter().any(|sql| is_key_statement(sql)),
        };
        info!(shared_cache = shared_cache_connection, "Connection configured from statements");
        Ok(Connection { inner, state })
    }
}

/// Whether a declaratively configured handle opens with the shared-cache flag
pub(crate) fn shared_cache_eligible(config: &NormalizedConfig, context: &ProcessContext) -> bool {
    match config.cache_scope() {
        Some(CacheScope::Shared) => true,
        Some(CacheScope::Private) => false,
        None => config.shared_cache_requested() || context.is_shared_cache_enabled(),
    }
}

fn is_key_statement(sql: &str) -> bool {
    let normalized = sql.trim_start().to_ascii_lowercase();
    let Some(rest) = normalized.strip_prefix("pragma") else {
        return false;
    };
    let name = rest.trim_start();
    ["key", "hexkey"].iter().any(|pragma| {
        name.strip_prefix(pragma)
            .is_some_and(|tail| tail.trim_start().starts_with('=') || tail.trim_start().starts_with('('))
    })
}

pub(crate) fn open_flags(shared_cache: bool) -> OpenFlags {
    let cache = if shared_cache {
        OpenFlags::SQLITE_OPEN_SHARED_CACHE
    } else {
        OpenFlags::SQLITE_OPEN_PRIVATE_CACHE
    };
    OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
        | cache
}

fn open_handle(location: &DatabaseLocation, shared_cache: bool) -> ConnectResult<rusqlite::Connection> {
    let flags = open_flags(shared_cache);
    let result = match location {
        DatabaseLocation::File(path) => rusqlite::Connection::open_with_flags(path, flags),
        DatabaseLocation::Memory => rusqlite::Connection::open_in_memory_with_flags(flags),
    };
    result.map_err(|e| ConnectError::from_step("open", e))
}

/// A configured connection
#[derive(Debug)]
pub struct Connection {
    inner: rusqlite::Connection,
    state: ConnectionState,
}

impl Connection {
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Underlying engine handle
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.inner
    }

    /// Read the live value of a registry pragma
    ///
    /// # Errors
    /// Returns [`ConnectError::UnsupportedOption`] for unknown names and
    /// [`ConnectError::InvalidArgument`] for options that are not pragmas.
    pub fn pragma(&self, name: &str) -> ConnectResult<String> {
        let option = ConfigOption::from_name(name)?;
        if option.stage() != Stage::Pragma {
            return Err(ConnectError::InvalidArgument(format!(
                "option '{}' cannot be read back",
                option
            )));
        }
        Ok(self.inner.query_scalar(&format!("PRAGMA {}", option.name()))?)
    }

    /// Re-encrypt the database under `new_key`
    ///
    /// The engine performs the rekey atomically; on failure the file keeps
    /// its current key.
    ///
    /// # Errors
    /// - [`ConnectError::InvalidArgument`] if the handle was opened without a key
    /// - [`ConnectError::RekeyFailure`] if the engine refuses the rekey
    #[instrument(skip_all)]
    pub fn rekey(&self, new_key: &KeyMaterial) -> ConnectResult<()> {
        if !self.state.encrypted {
            return Err(ConnectError::InvalidArgument(
                "cannot rekey a connection opened without a key".to_string(),
            ));
        }

        ConfigTarget::execute(&self.inner, &new_key.rekey_statement())
            .map_err(ConnectError::RekeyFailure)?;
        self.inner
            .query_scalar(VERIFY_KEY_SQL)
            .map_err(|e| ConnectError::from_step("verify_rekey", e))?;

        info!(key_kind = ?new_key.kind(), "Database rekeyed");
        Ok(())
    }

    /// Close the handle, reporting any engine error
    pub fn close(self) -> ConnectResult<()> {
        self.inner.close().map_err(|(_, e)| ConnectError::Sqlite(e))
    }
}

impl Deref for Connection {
    type Target = rusqlite::Connection;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for connection.
    use super::*;

    /// Validates open flags for both cache scopes.
    #[test]
    fn test_open_flags() {
        let shared = open_flags(true);
        assert!(shared.contains(OpenFlags::SQLITE_OPEN_SHARED_CACHE));
        assert!(!shared.contains(OpenFlags::SQLITE_OPEN_PRIVATE_CACHE));

        let private = open_flags(false);
        assert!(private.contains(OpenFlags::SQLITE_OPEN_PRIVATE_CACHE));
        assert!(private.contains(OpenFlags::SQLITE_OPEN_URI));
    }

    /// Validates recognition of caller key statements.
    #[test]
    fn test_is_key_statement() {
        assert!(is_key_statement("PRAGMA key = 'secret'"));
        assert!(is_key_statement("  pragma hexkey='00ff'"));
        assert!(is_key_statement("PRAGMA key('secret')"));
        assert!(!is_key_statement("PRAGMA kdf_iter = 4000"));
        assert!(!is_key_statement("PRAGMA keyboard = 1"));
        assert!(!is_key_statement("SELECT 'PRAGMA key = 1'"));
    }

    /// Validates an in-memory open through the declarative path.
    ///
    /// Assertions:
    /// - Confirms the default busy timeout is live.
    /// - Confirms a private context leaves shared cache off.
    #[test]
    fn test_open_memory() {
        let connector = Connector::new(ProcessContext::new());
        let conn = connector.open_uri("sqlite::memory:?synchronous=off").unwrap();
        assert_eq!(conn.pragma("busy_timeout").unwrap(), "3000");
        assert_eq!(conn.pragma("synchronous").unwrap(), "0");
        assert!(!conn.state().is_shared_cache_enabled());
        assert!(!conn.state().is_shared_cache_connection());
        assert!(!conn.state().is_encrypted());
        assert!(conn.state().location().is_memory());
        conn.close().unwrap();
    }

    /// Validates `pragma` argument checks.
    #[test]
    fn test_pragma_rejects_non_pragmas() {
        let conn = Connector::new(ProcessContext::new()).open_uri("sqlite::memory:").unwrap();
        assert!(matches!(conn.pragma("key"), Err(ConnectError::InvalidArgument(_))));
        assert!(matches!(conn.pragma("cache"), Err(ConnectError::InvalidArgument(_))));
        assert!(matches!(conn.pragma("vfs"), Err(ConnectError::UnsupportedOption(_))));
    }

    /// Validates that rekey requires an encrypted connection.
    #[test]
    fn test_rekey_requires_key() {
        let conn = Connector::new(ProcessContext::new()).open_uri("sqlite::memory:").unwrap();
        let key = KeyMaterial::raw_unsalted(&[7u8; 32]).unwrap();
        assert!(matches!(conn.rekey(&key), Err(ConnectError::InvalidArgument(_))));
    }

    /// Validates statement-driven URI restrictions.
    ///
    /// Assertions:
    /// - Ensures options other than `cache` are rejected.
    /// - Confirms the default eligibility is shared without touching the flag.
    #[test]
    fn test_statement_path_restrictions() {
        let connector = Connector::new(ProcessContext::new());
        let err = connector
            .open_with_statements("sqlite::memory:?busy_timeout=10", &[])
            .unwrap_err();
        assert!(matches!(err, ConnectError::InvalidArgument(_)));

        let conn = connector
            .open_with_statements("sqlite::memory:", &["PRAGMA cache_size = -1024"])
            .unwrap();
        assert!(conn.state().is_shared_cache_connection());
        assert!(!conn.state().is_shared_cache_enabled());
        assert_eq!(conn.pragma("cache_size").unwrap(), "-1024");
        assert!(!connector.context().is_shared_cache_enabled());
    }

    /// Validates that a failing caller statement names its index.
    #[test]
    fn test_statement_failure_names_index() {
        let connector = Connector::new(ProcessContext::new());
        let err = connector
            .open_with_statements("sqlite::memory:", &["PRAGMA cache_size = 10", "NOT SQL"])
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectError::BootstrapFailure { ref step, .. } if step == "statement[1]"
        ));
    }
}
