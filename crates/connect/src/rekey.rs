//! Rekey operator
//!
//! Re-encrypts an existing database under a new key.
//!
//! ```text
//! Unopened --open--> OpenedWithOldKey --rekey--> Rekeyed --close--> Closed
//!                            |
//!                            +--rekey fails--> Failed
//! ```
//!
//! Opening runs the full bootstrap plan with the old key, so a wrong old key
//! is reported as [`ConnectError::KeyMismatch`] before anything is written.
//! A failed rekey leaves the file under its old key and the handle is dropped.

use std::fmt;

use tracing::{error, info, instrument};

use crate::connection::{Connection, Connector};
use crate::error::{ConnectError, ConnectResult};
use crate::key::KeyMaterial;
use crate::properties::Properties;
use crate::registry::ConfigOption;
use crate::source::{ConfigSource, NormalizedConfig};

/// Lifecycle of a [`RekeyOperator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RekeyState {
    Unopened,
    OpenedWithOldKey,
    Rekeyed,
    Closed,
    Failed,
}

impl fmt::Display for RekeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unopened => "Unopened",
            Self::OpenedWithOldKey => "OpenedWithOldKey",
            Self::Rekeyed => "Rekeyed",
            Self::Closed => "Closed",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Drives one rekey of one database
#[derive(Debug)]
pub struct RekeyOperator<'c> {
    connector: &'c Connector,
    config: NormalizedConfig,
    connection: Option<Connection>,
    state: RekeyState,
}

impl<'c> RekeyOperator<'c> {
    /// Prepare a rekey for a configuration carrying the old key
    ///
    /// # Errors
    /// Returns [`ConnectError::InvalidArgument`] if `config` has no key.
    pub fn new(connector: &'c Connector, config: NormalizedConfig) -> ConnectResult<Self> {
        if !config.has_key() {
            return Err(ConnectError::InvalidArgument(
                "rekey requires a configuration with the current key".to_string(),
            ));
        }
        Ok(Self { connector, config, connection: None, state: RekeyState::Unopened })
    }

    pub fn state(&self) -> RekeyState {
        self.state
    }

    fn expect_state(&self, expected: RekeyState, label: &'static str) -> ConnectResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ConnectError::InvalidState { expected: label, actual: self.state.to_string() })
        }
    }

    /// Open the database with the old key and the full bootstrap plan
    ///
    /// On failure the operator stays `Unopened`.
    #[instrument(skip(self), fields(location = %self.config.location()))]
    pub fn open(&mut self) -> ConnectResult<()> {
        self.expect_state(RekeyState::Unopened, "Unopened")?;
        self.connection = Some(self.connector.open(&self.config)?);
        self.state = RekeyState::OpenedWithOldKey;
        Ok(())
    }

    /// Re-encrypt under `new_key`
    ///
    /// # Errors
    /// - [`ConnectError::InvalidState`] unless the operator is `OpenedWithOldKey`
    /// - [`ConnectError::RekeyFailure`] if the engine refuses; the operator
    ///   moves to `Failed`
    #[instrument(skip_all, fields(location = %self.config.location()))]
    pub fn rekey(&mut self, new_key: &KeyMaterial) -> ConnectResult<()> {
        self.expect_state(RekeyState::OpenedWithOldKey, "OpenedWithOldKey")?;
        let Some(connection) = self.connection.as_ref() else {
            return Err(ConnectError::InvalidState {
                expected: "open connection",
                actual: "no connection".to_string(),
            });
        };

        match connection.rekey(new_key) {
            Ok(()) => {
                self.state = RekeyState::Rekeyed;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Rekey failed, database keeps its old key");
                self.connection = None;
                self.state = RekeyState::Failed;
                Err(e)
            }
        }
    }

    /// Close the rekeyed handle
    pub fn close(&mut self) -> ConnectResult<()> {
        self.expect_state(RekeyState::Rekeyed, "Rekeyed")?;
        if let Some(connection) = self.connection.take() {
            connection.close()?;
        }
        self.state = RekeyState::Closed;
        info!(location = %self.config.location(), "Rekey complete");
        Ok(())
    }

    /// Open, rekey and close in one call
    pub fn run(mut self, new_key: &KeyMaterial) -> ConnectResult<()> {
        self.open()?;
        self.rekey(new_key)?;
        self.close()
    }
}

/// Rekey the database at `uri` from `old_key` to `new_key`
///
/// Options on the URI (journal mode, timeouts) apply to the rekeying handle.
pub fn rekey_database(
    connector: &Connector,
    uri: &str,
    old_key: &KeyMaterial,
    new_key: &KeyMaterial,
) -> ConnectResult<()> {
    let mut properties = Properties::new();
    properties
        .set(ConfigOption::Key.name(), old_key.canonical_pragma_value().as_str())
        .set(ConfigOption::HexKeyMode.name(), old_key.hex_key_mode().as_str());
    let config = ConfigSource::new(uri).with_properties(properties).parse()?;
    RekeyOperator::new(connector, config)?.run(new_key)
}
