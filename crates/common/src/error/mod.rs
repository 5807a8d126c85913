//! Shared error categories and the classification contract
//!
//! Crate errors such as `cipherlink_connect::ConnectError` keep their precise
//! variants and fold into a [`CommonError`] category when they leave the
//! crate. Both implement [`ErrorClassification`].
//!
//! ## Severity
//!
//! | Level | Typical cause |
//! |-------|---------------|
//! | **Info** | Nothing failed |
//! | **Warning** | Database busy or locked |
//! | **Error** | Unknown option, bad value, engine I/O failure |
//! | **Critical** | Wrong key, failed rekey, misuse of the rekey sequence |
//!
//! Nothing here retries. `is_retryable` only says a fresh handle might
//! succeed where this one failed.

use std::fmt;
use std::time::Duration;

pub type CommonResult<T> = Result<T, CommonError>;

/// Error categories shared by the workspace crates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// A connection option or property file was rejected
    Config { message: String, option: Option<String> },

    /// An argument failed validation before reaching the engine
    InvalidInput { message: String },

    /// The engine refused the key, or key handling failed
    Encryption { message: String, operation: &'static str },

    /// The engine reported the database busy or locked
    Busy { message: String },

    /// Any other engine or file failure
    Storage { message: String, operation: &'static str },

    /// An operation was called out of sequence
    Internal { message: String },
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message, option: Some(option) } => {
                write!(f, "Configuration error for option '{}': {}", option, message)
            }
            Self::Config { message, option: None } => write!(f, "Configuration error: {}", message),
            Self::InvalidInput { message } => write!(f, "Invalid input: {}", message),
            Self::Encryption { message, operation } => {
                write!(f, "Encryption error during {}: {}", operation, message)
            }
            Self::Busy { message } => write!(f, "Database busy: {}", message),
            Self::Storage { message, operation } => {
                write!(f, "Storage error during {}: {}", operation, message)
            }
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for CommonError {}

impl CommonError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into(), option: None }
    }

    /// Configuration error attributed to one option
    pub fn config_option(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config { message: message.into(), option: Some(option.into()) }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput { message: message.into() }
    }

    pub fn encryption(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Encryption { message: message.into(), operation }
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self::Busy { message: message.into() }
    }

    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage { message: message.into(), operation }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Short category name for log fields
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::InvalidInput { .. } => "invalid_input",
            Self::Encryption { .. } => "encryption",
            Self::Busy { .. } => "busy",
            Self::Storage { .. } => "storage",
            Self::Internal { .. } => "internal",
        }
    }
}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Busy { .. } => ErrorSeverity::Warning,
            Self::Config { .. } | Self::InvalidInput { .. } | Self::Storage { .. } => {
                ErrorSeverity::Error
            }
            Self::Encryption { .. } | Self::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Classification every workspace error type provides
///
/// ```rust,ignore
/// impl ErrorClassification for MyError {
///     fn is_retryable(&self) -> bool {
///         matches!(self, Self::Locked)
///     }
///
///     fn severity(&self) -> ErrorSeverity {
///         match self {
///             Self::Locked => ErrorSeverity::Warning,
///             Self::WrongKey => ErrorSeverity::Critical,
///         }
///     }
///
///     fn is_critical(&self) -> bool {
///         self.severity() == ErrorSeverity::Critical
///     }
///
///     fn retry_after(&self) -> Option<Duration> {
///         None
///     }
/// }
/// ```
pub trait ErrorClassification {
    /// Whether a new attempt on a fresh handle may succeed
    fn is_retryable(&self) -> bool;

    fn severity(&self) -> ErrorSeverity;

    /// Wrong key material, a failed rekey, or a broken invariant
    fn is_critical(&self) -> bool;

    /// Suggested delay before a retry, if any
    fn retry_after(&self) -> Option<Duration>;
}

/// Severity levels, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for error handling functionality
    use super::*;

    /// Validates display text for each category.
    ///
    /// Assertions:
    /// - Confirms option-scoped config errors name the option.
    /// - Confirms operation-scoped errors name the operation.
    #[test]
    fn test_display() {
        assert_eq!(
            CommonError::config_option("busy_timeout", "must be non-negative").to_string(),
            "Configuration error for option 'busy_timeout': must be non-negative"
        );
        assert_eq!(CommonError::config("no uri").to_string(), "Configuration error: no uri");
        assert_eq!(
            CommonError::encryption("rekey", "engine refused").to_string(),
            "Encryption error during rekey: engine refused"
        );
        assert_eq!(CommonError::busy("database is locked").to_string(), "Database busy: database is locked");
    }

    /// Validates retryability and severity classification.
    ///
    /// Assertions:
    /// - Ensures only busy errors are retryable.
    /// - Ensures encryption and internal errors are critical.
    #[test]
    fn test_classification() {
        assert!(CommonError::busy("locked").is_retryable());
        assert_eq!(CommonError::busy("locked").severity(), ErrorSeverity::Warning);
        assert!(!CommonError::config("bad").is_retryable());

        let err = CommonError::encryption("open", "wrong key");
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.is_critical());
        assert_eq!(err.retry_after(), None);

        assert!(CommonError::internal("rekey before open").is_critical());
        assert!(!CommonError::storage("open", "disk I/O error").is_critical());
        assert_eq!(CommonError::storage("open", "disk I/O error").category(), "storage");
    }

    /// Validates severity ordering and labels.
    #[test]
    fn test_severity_ordering() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Warning < ErrorSeverity::Error);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
    }
}
