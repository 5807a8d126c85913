//! Configuration option registry
//!
//! Static catalog of every option a connection request may carry. Each entry
//! fixes the canonical name, the stage at which the option is applied, the
//! accepted value domain and a pure encoder from the caller's spelling to the
//! value written to (and read back from) the engine.
//!
//! The declaration order of [`ConfigOption`] is the registry-insertion order.
//! Pragmas are emitted in this order, so it must stay stable.

use std::fmt;

use crate::error::{ConnectError, ConnectResult};

/// Stage at which an option takes effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Consumed when the handle is opened (open flags, process context)
    Connection,
    /// Key provisioning
    Key,
    /// Cipher-family selection, bound to the codec created by the key
    Cipher,
    /// Ordinary pragma, applied after the key is verified
    Pragma,
}

/// Accepted value domain of an option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// `true/false/on/off/yes/no/1/0`, encoded as `"1"`/`"0"`
    Boolean,
    /// Signed integer within an inclusive range, encoded as decimal
    Integer { min: i64, max: i64 },
    /// Named values mapped to their encoded form
    Enum(&'static [(&'static str, &'static str)]),
    /// Non-empty secret text; never logged
    Secret,
}

/// Registry entry
#[derive(Debug, Clone, Copy)]
pub struct OptionSpec {
    pub option: ConfigOption,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub stage: Stage,
    pub kind: ValueKind,
}

/// Supported configuration options, in registry order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigOption {
    CacheScope,
    SharedCache,
    Key,
    HexKeyMode,
    Cipher,
    Legacy,
    KdfIter,
    BusyTimeout,
    AutoVacuum,
    JournalMode,
    Synchronous,
    CacheSize,
    ForeignKeys,
    RecursiveTriggers,
    SecureDelete,
    TempStore,
    LockingMode,
    JournalSizeLimit,
    UserVersion,
    ApplicationId,
}

const I32_RANGE: ValueKind = ValueKind::Integer { min: i32::MIN as i64, max: i32::MAX as i64 };

const CACHE_VALUES: &[(&str, &str)] = &[("shared", "shared"), ("private", "private")];
const HEXKEY_MODE_VALUES: &[(&str, &str)] = &[("none", "NONE"), ("sse", "SSE")];
const CIPHER_VALUES: &[(&str, &str)] = &[("sqlcipher", "sqlcipher")];
const AUTO_VACUUM_VALUES: &[(&str, &str)] =
    &[("none", "0"), ("full", "1"), ("incremental", "2"), ("0", "0"), ("1", "1"), ("2", "2")];
const JOURNAL_MODE_VALUES: &[(&str, &str)] = &[
    ("delete", "delete"),
    ("truncate", "truncate"),
    ("persist", "persist"),
    ("memory", "memory"),
    ("wal", "wal"),
    ("off", "off"),
];
const SYNCHRONOUS_VALUES: &[(&str, &str)] = &[
    ("off", "0"),
    ("normal", "1"),
    ("full", "2"),
    ("extra", "3"),
    ("0", "0"),
    ("1", "1"),
    ("2", "2"),
    ("3", "3"),
];
const TEMP_STORE_VALUES: &[(&str, &str)] =
    &[("default", "0"), ("file", "1"), ("memory", "2"), ("0", "0"), ("1", "1"), ("2", "2")];
const LOCKING_MODE_VALUES: &[(&str, &str)] = &[("normal", "normal"), ("exclusive", "exclusive")];

static REGISTRY: [OptionSpec; 20] = [
    OptionSpec {
        option: ConfigOption::CacheScope,
        name: "cache",
        aliases: &[],
        stage: Stage::Connection,
        kind: ValueKind::Enum(CACHE_VALUES),
    },
    OptionSpec {
        option: ConfigOption::SharedCache,
        name: "shared_cache",
        aliases: &[],
        stage: Stage::Connection,
        kind: ValueKind::Boolean,
    },
    OptionSpec {
        option: ConfigOption::Key,
        name: "key",
        aliases: &["password"],
        stage: Stage::Key,
        kind: ValueKind::Secret,
    },
    OptionSpec {
        option: ConfigOption::HexKeyMode,
        name: "hexkey_mode",
        aliases: &[],
        stage: Stage::Key,
        kind: ValueKind::Enum(HEXKEY_MODE_VALUES),
    },
    OptionSpec {
        option: ConfigOption::Cipher,
        name: "cipher",
        aliases: &[],
        stage: Stage::Cipher,
        kind: ValueKind::Enum(CIPHER_VALUES),
    },
    OptionSpec {
        option: ConfigOption::Legacy,
        name: "legacy",
        aliases: &[],
        stage: Stage::Cipher,
        kind: ValueKind::Integer { min: 1, max: 4 },
    },
    OptionSpec {
        option: ConfigOption::KdfIter,
        name: "kdf_iter",
        aliases: &[],
        stage: Stage::Cipher,
        kind: ValueKind::Integer { min: 1, max: i32::MAX as i64 },
    },
    OptionSpec {
        option: ConfigOption::BusyTimeout,
        name: "busy_timeout",
        aliases: &[],
        stage: Stage::Pragma,
        kind: ValueKind::Integer { min: 0, max: i32::MAX as i64 },
    },
    OptionSpec {
        option: ConfigOption::AutoVacuum,
        name: "auto_vacuum",
        aliases: &[],
        stage: Stage::Pragma,
        kind: ValueKind::Enum(AUTO_VACUUM_VALUES),
    },
    OptionSpec {
        option: ConfigOption::JournalMode,
        name: "journal_mode",
        aliases: &[],
        stage: Stage::Pragma,
        kind: ValueKind::Enum(JOURNAL_MODE_VALUES),
    },
    OptionSpec {
        option: ConfigOption::Synchronous,
        name: "synchronous",
        aliases: &[],
        stage: Stage::Pragma,
        kind: ValueKind::Enum(SYNCHRONOUS_VALUES),
    },
    OptionSpec {
        option: ConfigOption::CacheSize,
        name: "cache_size",
        aliases: &[],
        stage: Stage::Pragma,
        kind: I32_RANGE,
    },
    OptionSpec {
        option: ConfigOption::ForeignKeys,
        name: "foreign_keys",
        aliases: &[],
        stage: Stage::Pragma,
        kind: ValueKind::Boolean,
    },
    OptionSpec {
        option: ConfigOption::RecursiveTriggers,
        name: "recursive_triggers",
        aliases: &[],
        stage: Stage::Pragma,
        kind: ValueKind::Boolean,
    },
    OptionSpec {
        option: ConfigOption::SecureDelete,
        name: "secure_delete",
        aliases: &[],
        stage: Stage::Pragma,
        kind: ValueKind::Boolean,
    },
    OptionSpec {
        option: ConfigOption::TempStore,
        name: "temp_store",
        aliases: &[],
        stage: Stage::Pragma,
        kind: ValueKind::Enum(TEMP_STORE_VALUES),
    },
    OptionSpec {
        option: ConfigOption::LockingMode,
        name: "locking_mode",
        aliases: &[],
        stage: Stage::Pragma,
        kind: ValueKind::Enum(LOCKING_MODE_VALUES),
    },
    OptionSpec {
        option: ConfigOption::JournalSizeLimit,
        name: "journal_size_limit",
        aliases: &[],
        stage: Stage::Pragma,
        kind: ValueKind::Integer { min: -1, max: i64::MAX },
    },
    OptionSpec {
        option: ConfigOption::UserVersion,
        name: "user_version",
        aliases: &[],
        stage: Stage::Pragma,
        kind: I32_RANGE,
    },
    OptionSpec {
        option: ConfigOption::ApplicationId,
        name: "application_id",
        aliases: &[],
        stage: Stage::Pragma,
        kind: I32_RANGE,
    },
];

/// The full registry, in emission order
pub fn registry() -> &'static [OptionSpec] {
    &REGISTRY
}

impl ConfigOption {
    /// Every option, in registry order
    pub const ALL: [ConfigOption; 20] = [
        ConfigOption::CacheScope,
        ConfigOption::SharedCache,
        ConfigOption::Key,
        ConfigOption::HexKeyMode,
        ConfigOption::Cipher,
        ConfigOption::Legacy,
        ConfigOption::KdfIter,
        ConfigOption::BusyTimeout,
        ConfigOption::AutoVacuum,
        ConfigOption::JournalMode,
        ConfigOption::Synchronous,
        ConfigOption::CacheSize,
        ConfigOption::ForeignKeys,
        ConfigOption::RecursiveTriggers,
        ConfigOption::SecureDelete,
        ConfigOption::TempStore,
        ConfigOption::LockingMode,
        ConfigOption::JournalSizeLimit,
        ConfigOption::UserVersion,
        ConfigOption::ApplicationId,
    ];

    /// Resolve an option by canonical name or alias (case-insensitive)
    ///
    /// # Errors
    /// Returns [`ConnectError::UnsupportedOption`] for names the registry
    /// does not know.
    pub fn from_name(name: &str) -> ConnectResult<Self> {
        let wanted = name.trim();
        REGISTRY
            .iter()
            .find(|spec| {
                spec.name.eq_ignore_ascii_case(wanted)
                    || spec.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(wanted))
            })
            .map(|spec| spec.option)
            .ok_or_else(|| ConnectError::UnsupportedOption(name.to_string()))
    }

    /// Registry entry for this option
    pub fn spec(self) -> &'static OptionSpec {
        // ALL and REGISTRY share the enum's declaration order
        &REGISTRY[self as usize]
    }

    /// Canonical pragma/property name
    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn stage(self) -> Stage {
        self.spec().stage
    }

    pub fn kind(self) -> ValueKind {
        self.spec().kind
    }

    /// Whether values of this option must never be logged or formatted
    pub fn is_secret(self) -> bool {
        matches!(self.kind(), ValueKind::Secret)
    }

    /// Accepted spellings for enum options (empty for other kinds)
    pub fn allowed_values(self) -> Vec<&'static str> {
        match self.kind() {
            ValueKind::Enum(values) => values.iter().map(|(name, _)| *name).collect(),
            _ => Vec::new(),
        }
    }

    /// Encode a caller-supplied value into its canonical engine form
    ///
    /// Pure and deterministic. Secret values are checked for emptiness only
    /// and never echoed in the returned error.
    ///
    /// # Errors
    /// Returns [`ConnectError::InvalidValue`] when `raw` is outside the
    /// option's domain.
    pub fn encode(self, raw: &str) -> ConnectResult<String> {
        match self.kind() {
            ValueKind::Secret => {
                if raw.is_empty() {
                    Err(ConnectError::invalid_value(self.name(), "value must not be empty"))
                } else {
                    Ok(raw.to_string())
                }
            }
            ValueKind::Boolean => encode_bool(raw)
                .map(|flag| if flag { "1" } else { "0" }.to_string())
                .ok_or_else(|| {
                    ConnectError::invalid_value(
                        self.name(),
                        format!("'{}' is not a boolean", raw.trim()),
                    )
                }),
            ValueKind::Integer { min, max } => {
                let value: i64 = raw.trim().parse().map_err(|_| {
                    ConnectError::invalid_value(
                        self.name(),
                        format!("'{}' is not an integer", raw.trim()),
                    )
                })?;
                if value < min || value > max {
                    return Err(ConnectError::invalid_value(
                        self.name(),
                        format!("{} is outside {}..={}", value, min, max),
                    ));
                }
                Ok(value.to_string())
            }
            ValueKind::Enum(values) => {
                let wanted = raw.trim();
                values
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
                    .map(|(_, encoded)| (*encoded).to_string())
                    .ok_or_else(|| {
                        ConnectError::invalid_value(
                            self.name(),
                            format!(
                                "'{}' is not one of [{}]",
                                wanted,
                                self.allowed_values().join(", ")
                            ),
                        )
                    })
            }
        }
    }
}

impl fmt::Display for ConfigOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn encode_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}
