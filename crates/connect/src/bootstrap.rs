//! Connection bootstrapper
//!
//! Translates a [`NormalizedConfig`] into the ordered statements that bring a
//! freshly opened handle into the requested state, applies them, then reads
//! every pragma back.
//!
//! # Statement order
//! ```sql
//! PRAGMA key = "x'<hex>'";              -- or hexkey / passphrase form
//! PRAGMA cipher_compatibility = 4;      -- cipher selection, if requested
//! PRAGMA kdf_iter = 256000;
//! SELECT count(*) FROM sqlite_master;   -- first page read, proves the key
//! PRAGMA busy_timeout = 3000;           -- remaining pragmas, registry order
//! PRAGMA auto_vacuum = 2;
//! ...
//! ```
//!
//! SQLCipher binds cipher parameters to the codec the key statement creates,
//! so they follow the key directly. Neither statement reads a page; the
//! verification read is the first statement that does.
//!
//! A failing step aborts the plan. Callers must drop the handle.

use std::fmt;

use rusqlite::types::ValueRef;
use tracing::{debug, error, instrument, warn};
use zeroize::Zeroizing;

use crate::error::{ConnectError, ConnectResult};
use crate::key::{render_key_statement, KeyPragma};
use crate::registry::{ConfigOption, Stage};
use crate::source::NormalizedConfig;

/// Statement that forces the first page read
pub const VERIFY_KEY_SQL: &str = "SELECT count(*) FROM sqlite_master";

/// Anything configuration statements can be issued against
///
/// Implemented for [`rusqlite::Connection`]. Engine errors are returned
/// unchanged so the caller can classify them.
pub trait ConfigTarget {
    /// Execute one statement, discarding any rows it returns
    fn execute(&self, sql: &str) -> rusqlite::Result<()>;

    /// Execute one statement and return the first column of its first row
    fn query_scalar(&self, sql: &str) -> rusqlite::Result<String>;
}

impl ConfigTarget for rusqlite::Connection {
    fn execute(&self, sql: &str) -> rusqlite::Result<()> {
        self.execute_batch(sql)
    }

    fn query_scalar(&self, sql: &str) -> rusqlite::Result<String> {
        self.query_row(sql, [], |row| Ok(value_to_string(row.get_ref(0)?)))
    }
}

fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => hex::encode(bytes),
    }
}

/// One configuration step
pub enum ConfigCommand {
    /// Key application; the statement embeds the secret
    ApplyKey { sql: Zeroizing<String> },
    /// Cipher parameter bound to the keyed codec
    SelectCipher { option: ConfigOption, sql: String },
    /// First page read, proving the key
    VerifyKey,
    /// Ordinary pragma assignment
    SetPragma { option: ConfigOption, sql: String },
}

impl ConfigCommand {
    /// Statement text
    pub fn sql(&self) -> &str {
        match self {
            Self::ApplyKey { sql } => sql.as_str(),
            Self::SelectCipher { sql, .. } | Self::SetPragma { sql, .. } => sql,
            Self::VerifyKey => VERIFY_KEY_SQL,
        }
    }

    /// Name used in logs and in [`ConnectError::BootstrapFailure`]
    pub fn step_name(&self) -> String {
        match self {
            Self::ApplyKey { .. } => "key".to_string(),
            Self::SelectCipher { option, .. } => format!("cipher:{}", option),
            Self::VerifyKey => "verify_key".to_string(),
            Self::SetPragma { option, .. } => format!("pragma:{}", option),
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, Self::ApplyKey { .. })
    }
}

// Custom Debug impl to avoid exposing the key
impl fmt::Debug for ConfigCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_secret() {
            write!(f, "{}(***)", self.step_name())
        } else {
            write!(f, "{}({})", self.step_name(), self.sql())
        }
    }
}

/// Ordered statements for one open request
#[derive(Debug)]
pub struct BootstrapPlan {
    commands: Vec<ConfigCommand>,
    readback: Vec<(ConfigOption, String)>,
}

impl BootstrapPlan {
    /// Build the plan for `config`
    ///
    /// Pure: the same configuration always yields the same statements.
    pub fn from_config(config: &NormalizedConfig) -> Self {
        let mut commands = Vec::new();

        if let Some(value) = config.key_value() {
            commands.push(ConfigCommand::ApplyKey {
                sql: render_key_statement(KeyPragma::Key, value, config.hex_key_mode()),
            });
            for (option, value) in config.stage(Stage::Cipher) {
                if let Some(sql) = cipher_statement(option, value) {
                    commands.push(ConfigCommand::SelectCipher { option, sql });
                }
            }
            commands.push(ConfigCommand::VerifyKey);
        }

        let mut readback = Vec::new();
        for (option, value) in config.stage(Stage::Pragma) {
            commands.push(ConfigCommand::SetPragma {
                option,
                sql: format!("PRAGMA {} = {}", option.name(), value),
            });
            if !skip_readback(option, config) {
                readback.push((option, value.to_string()));
            }
        }

        Self { commands, readback }
    }

    pub fn commands(&self) -> &[ConfigCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Options whose values are compared after the plan runs
    pub fn readback_expectations(&self) -> &[(ConfigOption, String)] {
        &self.readback
    }

    /// Issue every statement in order, stopping at the first failure
    ///
    /// # Errors
    /// - [`ConnectError::KeyMismatch`] if the engine rejects the key or the
    ///   file header at any step
    /// - [`ConnectError::BootstrapFailure`] naming the failed step otherwise
    #[instrument(skip_all, fields(steps = self.commands.len()))]
    pub fn apply<T: ConfigTarget + ?Sized>(&self, target: &T) -> ConnectResult<()> {
        for command in &self.commands {
            let result = match command {
                ConfigCommand::VerifyKey => target.query_scalar(command.sql()).map(|_| ()),
                _ => target.execute(command.sql()),
            };

            if let Err(e) = result {
                let err = ConnectError::from_step(command.step_name(), e);
                match err {
                    ConnectError::KeyMismatch { .. } => {
                        warn!(step = %command.step_name(), "Key rejected by engine");
                    }
                    _ => error!(step = %command.step_name(), error = %err, "Configuration step failed"),
                }
                return Err(err);
            }

            debug!(step = %command.step_name(), "Applied configuration step");
        }
        Ok(())
    }

    /// Read every configured pragma back and compare it with its encoded value
    ///
    /// # Errors
    /// Returns [`ConnectError::ReadbackMismatch`] for the first pragma whose
    /// live value differs (case-insensitive).
    pub fn verify_readback<T: ConfigTarget + ?Sized>(&self, target: &T) -> ConnectResult<()> {
        for (option, expected) in &self.readback {
            let actual = target
                .query_scalar(&format!("PRAGMA {}", option.name()))
                .map_err(|e| ConnectError::from_step(format!("readback:{}", option), e))?;

            if !actual.eq_ignore_ascii_case(expected) {
                error!(
                    option = %option,
                    expected = %expected,
                    actual = %actual,
                    "Pragma readback mismatch"
                );
                return Err(ConnectError::ReadbackMismatch {
                    option: option.name().to_string(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }

    /// [`BootstrapPlan::apply`] followed by [`BootstrapPlan::verify_readback`]
    pub fn run<T: ConfigTarget + ?Sized>(&self, target: &T) -> ConnectResult<()> {
        self.apply(target)?;
        self.verify_readback(target)
    }
}

fn cipher_statement(option: ConfigOption, value: &str) -> Option<String> {
    match option {
        ConfigOption::Legacy => Some(format!("PRAGMA cipher_compatibility = {}", value)),
        ConfigOption::KdfIter => Some(format!("PRAGMA kdf_iter = {}", value)),
        // sqlcipher is the only family and the engine default
        _ => None,
    }
}

/// In-memory databases always report `memory` journaling and exclusive locking
fn skip_readback(option: ConfigOption, config: &NormalizedConfig) -> bool {
    config.is_memory() && matches!(option, ConfigOption::JournalMode | ConfigOption::LockingMode)
}
