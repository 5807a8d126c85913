//! Declarative connection configuration for SQLCipher databases.
//!
//! Turns a connection URI plus optional properties into the exact, ordered
//! statements that bring a freshly opened handle into the requested state,
//! including key provisioning, and rekeys existing encrypted databases.
//!
//! # Modules
//! - [`key`]: key material validation and the [`CipherConfig`] builder
//! - [`registry`]: catalog of supported options and their encoders
//! - [`source`]: URI and property parsing into a [`NormalizedConfig`]
//! - [`bootstrap`]: ordered configuration plan and pragma readback
//! - [`connection`]: opening configured handles through a [`Connector`]
//! - [`rekey`]: the rekey state machine
//! - [`pool`]: r2d2 pooling of configured handles
//! - [`loader`]: properties from TOML files and the environment
//!
//! # Example
//! ```rust,ignore
//! use cipherlink_connect::{CipherConfig, Connector};
//!
//! let mut config = CipherConfig::new();
//! config.with_raw_unsalted_key(&secret)?;
//! let conn = config
//!     .build()
//!     .open(&Connector::default(), "sqlite:/var/lib/app.db?journal_mode=wal")?;
//! assert_eq!(conn.pragma("journal_mode")?, "wal");
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod bootstrap;
pub mod connection;
pub mod context;
pub mod error;
pub mod key;
pub mod loader;
pub mod pool;
pub mod properties;
pub mod registry;
pub mod rekey;
pub mod source;

pub use bootstrap::{BootstrapPlan, ConfigCommand, ConfigTarget};
pub use connection::{Connection, ConnectionState, Connector};
pub use context::ProcessContext;
pub use error::{ConnectError, ConnectResult};
pub use key::{CipherConfig, CipherName, CipherSettings, HexKeyMode, KeyKind, KeyMaterial};
pub use loader::{
    load_config_source, load_properties_file, parse_config_source, properties_from_env,
};
pub use pool::{ConnectionPool, PoolConfig};
pub use properties::Properties;
pub use registry::{ConfigOption, Stage, ValueKind};
pub use rekey::{rekey_database, RekeyOperator, RekeyState};
pub use source::{CacheScope, ConfigSource, DatabaseLocation, NormalizedConfig};
