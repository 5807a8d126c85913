//! Connection configuration error types
//!
//! Validation errors (`InvalidArgument`, `UnsupportedOption`, `InvalidValue`,
//! `InvalidUri`) are raised before any engine handle exists. Engine failures
//! are carried verbatim as the `source` of the variant that names the step.

use std::time::Duration;

use cipherlink_common::{CommonError, ErrorClassification, ErrorSeverity};
use thiserror::Error;

/// Connection configuration error type
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Key material or a builder argument violates its constraints
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Option name not present in the registry
    #[error("Unsupported option: '{0}'")]
    UnsupportedOption(String),

    /// Option value outside the option's domain
    #[error("Invalid value for option '{option}': {reason}")]
    InvalidValue { option: String, reason: String },

    /// Connection URI could not be parsed
    #[error("Invalid connection URI: {0}")]
    InvalidUri(String),

    /// The engine rejected the supplied key (or the file is not a database)
    ///
    /// `source` is the engine error when one was observed directly; pool
    /// builds only see r2d2's flattened message and leave it empty.
    #[error("Wrong encryption key or database not encrypted")]
    KeyMismatch {
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// A configuration statement failed after the handle was opened
    #[error("Connection bootstrap failed at step '{step}': {source}")]
    BootstrapFailure {
        step: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A pragma did not read back the value it was configured with
    #[error("Pragma '{option}' read back as '{actual}', expected '{expected}'")]
    ReadbackMismatch { option: String, expected: String, actual: String },

    /// The rekey statement failed; the file keeps its old key
    #[error("Rekey failed: {0}")]
    RekeyFailure(#[source] rusqlite::Error),

    /// An operation was invoked in the wrong lifecycle state
    #[error("Invalid state: expected {expected}, found {actual}")]
    InvalidState { expected: &'static str, actual: String },

    /// Property file or environment configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection pool could not be built or could not hand out a connection
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Connection configuration result type
pub type ConnectResult<T> = Result<T, ConnectError>;

impl ConnectError {
    /// Build an `InvalidValue` error
    pub(crate) fn invalid_value(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue { option: option.into(), reason: reason.into() }
    }

    /// Classify an engine error raised by a configuration step
    ///
    /// Header and key rejections become [`ConnectError::KeyMismatch`];
    /// everything else is a [`ConnectError::BootstrapFailure`] for `step`.
    pub(crate) fn from_step(step: impl Into<String>, source: rusqlite::Error) -> Self {
        if is_key_rejection(&source) {
            Self::KeyMismatch { source: Some(source) }
        } else {
            Self::BootstrapFailure { step: step.into(), source }
        }
    }

    /// Whether this error is a validation failure raised before any engine call
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::UnsupportedOption(_)
                | Self::InvalidValue { .. }
                | Self::InvalidUri(_)
                | Self::Config(_)
        )
    }
}

/// Whether the engine refused the page header, which is how SQLCipher reports
/// a wrong key
pub(crate) fn is_key_rejection(err: &rusqlite::Error) -> bool {
    if err.sqlite_error_code() == Some(rusqlite::ErrorCode::NotADatabase) {
        return true;
    }
    let err_str = err.to_string().to_lowercase();
    err_str.contains("file is not a database")
        || err_str.contains("file is encrypted")
        || err_str.contains("notadb")
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

impl ErrorClassification for ConnectError {
    /// Only engine BUSY/LOCKED conditions are worth a new attempt, and only on
    /// a fresh handle
    fn is_retryable(&self) -> bool {
        match self {
            Self::Sqlite(err) => is_busy(err),
            Self::BootstrapFailure { source, .. } => is_busy(source),
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidArgument(_) => ErrorSeverity::Error,
            Self::UnsupportedOption(_) => ErrorSeverity::Error,
            Self::InvalidValue { .. } => ErrorSeverity::Error,
            Self::InvalidUri(_) => ErrorSeverity::Error,
            Self::KeyMismatch { .. } => ErrorSeverity::Critical,
            Self::BootstrapFailure { .. } if self.is_retryable() => ErrorSeverity::Warning,
            Self::BootstrapFailure { .. } => ErrorSeverity::Error,
            Self::ReadbackMismatch { .. } => ErrorSeverity::Error,
            Self::RekeyFailure(_) => ErrorSeverity::Critical,
            Self::InvalidState { .. } => ErrorSeverity::Critical,
            Self::Config(_) => ErrorSeverity::Error,
            Self::Pool(_) => ErrorSeverity::Error,
            Self::Sqlite(_) if self.is_retryable() => ErrorSeverity::Warning,
            Self::Sqlite(_) => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl From<ConnectError> for CommonError {
    fn from(err: ConnectError) -> Self {
        match &err {
            ConnectError::InvalidArgument(_) => CommonError::invalid_input(err.to_string()),
            ConnectError::UnsupportedOption(name) => CommonError::config_option(name.clone(), err.to_string()),
            ConnectError::InvalidValue { option, .. } => {
                CommonError::config_option(option.clone(), err.to_string())
            }
            ConnectError::InvalidUri(_) | ConnectError::Config(_) => CommonError::config(err.to_string()),
            ConnectError::KeyMismatch { .. } => CommonError::encryption("open", err.to_string()),
            ConnectError::RekeyFailure(_) => CommonError::encryption("rekey", err.to_string()),
            ConnectError::InvalidState { .. } => CommonError::internal(err.to_string()),
            _ if err.is_retryable() => CommonError::busy(err.to_string()),
            _ => CommonError::storage("connect", err.to_string()),
        }
    }
}
