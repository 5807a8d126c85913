//! Key material codec and cipher configuration builder
//!
//! [`KeyMaterial`] validates caller key bytes and projects them into the
//! single canonical value the engine's key pragma accepts:
//!
//! | Variant | Minimum | Canonical value | `hexkey_mode` |
//! |---------|---------|-----------------|---------------|
//! | `RawUnsalted` | 32 bytes | `x'<lowercase hex>'` | `NONE` |
//! | `RawSalted` | 48 bytes (salt is the trailing 16) | `x'<lowercase hex>'` | `NONE` |
//! | `Hex` | non-empty | `<lowercase hex>` | `SSE` |
//!
//! All validation happens here, before any engine handle exists. Payloads and
//! every rendered statement live in zeroizing buffers and are never logged.

use std::fmt;

use cipherlink_common::SecureBytes;
use zeroize::Zeroizing;

use crate::connection::{Connection, Connector};
use crate::error::{ConnectError, ConnectResult};
use crate::properties::Properties;
use crate::registry::ConfigOption;
use crate::source::ConfigSource;

/// Minimum secret length for a raw unsalted key (256 bits)
pub const MIN_RAW_UNSALTED_LEN: usize = 32;

/// Salt length carried at the end of a raw salted key
pub const SALT_LEN: usize = 16;

/// Minimum length of a raw salted key (secret plus salt)
pub const MIN_RAW_SALTED_LEN: usize = MIN_RAW_UNSALTED_LEN + SALT_LEN;

/// How the engine should interpret the key value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HexKeyMode {
    /// Key value is a raw literal or a passphrase
    #[default]
    None,
    /// Key value is bare hex, decoded by the engine before use
    Sse,
}

impl HexKeyMode {
    /// Encoded marker, as stored under `hexkey_mode`
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Sse => "SSE",
        }
    }

    /// Parse an encoded marker (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("none") {
            Some(Self::None)
        } else if value.eq_ignore_ascii_case("sse") {
            Some(Self::Sse)
        } else {
            None
        }
    }
}

impl fmt::Display for HexKeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cipher family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherName {
    /// SQLCipher page encryption (AES-256 with HMAC)
    #[default]
    SqlCipher,
}

impl CipherName {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SqlCipher => "sqlcipher",
        }
    }
}

/// Variant tag of a [`KeyMaterial`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    RawUnsalted,
    RawSalted,
    Hex,
}

/// Validated key material
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    /// Raw 256-bit (or longer) secret, used without key derivation
    RawUnsalted(SecureBytes),
    /// Raw secret followed by a 16-byte salt
    RawSalted(SecureBytes),
    /// Bytes handed to the engine as bare hex
    Hex(SecureBytes),
}

impl KeyMaterial {
    /// Raw unsalted key
    ///
    /// SQLCipher uses an `x'..'` value as the key directly only when it holds
    /// exactly 32 bytes (64 hex digits). A 48-byte value is read as key plus
    /// salt, and any other length is treated as a passphrase and run through
    /// PBKDF2. Longer keys are accepted here but are derived, not raw.
    ///
    /// # Errors
    /// Returns [`ConnectError::InvalidArgument`] if `bytes` is shorter than
    /// [`MIN_RAW_UNSALTED_LEN`].
    pub fn raw_unsalted(bytes: &[u8]) -> ConnectResult<Self> {
        if bytes.len() < MIN_RAW_UNSALTED_LEN {
            return Err(ConnectError::InvalidArgument(format!(
                "raw unsalted key must be at least {} bytes, got {}",
                MIN_RAW_UNSALTED_LEN,
                bytes.len()
            )));
        }
        Ok(Self::RawUnsalted(SecureBytes::from_slice(bytes)))
    }

    /// Raw salted key; the trailing [`SALT_LEN`] bytes are the salt
    ///
    /// Only exactly 48 bytes (96 hex digits) reach SQLCipher as key plus
    /// salt. A longer value is treated as a passphrase and run through PBKDF2.
    ///
    /// # Errors
    /// Returns [`ConnectError::InvalidArgument`] if `bytes` is shorter than
    /// [`MIN_RAW_SALTED_LEN`].
    pub fn raw_salted(bytes: &[u8]) -> ConnectResult<Self> {
        if bytes.len() < MIN_RAW_SALTED_LEN {
            return Err(ConnectError::InvalidArgument(format!(
                "raw salted key must be at least {} bytes, got {}",
                MIN_RAW_SALTED_LEN,
                bytes.len()
            )));
        }
        Ok(Self::RawSalted(SecureBytes::from_slice(bytes)))
    }

    /// Hex-mode key from raw bytes
    ///
    /// # Errors
    /// Returns [`ConnectError::InvalidArgument`] if `bytes` is empty.
    pub fn hex(bytes: &[u8]) -> ConnectResult<Self> {
        if bytes.is_empty() {
            return Err(ConnectError::InvalidArgument("hex key must not be empty".to_string()));
        }
        Ok(Self::Hex(SecureBytes::from_slice(bytes)))
    }

    /// Hex-mode key from a hex string (either case)
    ///
    /// # Errors
    /// Returns [`ConnectError::InvalidArgument`] if `hex_str` is empty, has
    /// an odd length or contains non-hex characters.
    pub fn hex_str(hex_str: &str) -> ConnectResult<Self> {
        let bytes = decode_hex(hex_str)?;
        Self::hex(&bytes)
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            Self::RawUnsalted(_) => KeyKind::RawUnsalted,
            Self::RawSalted(_) => KeyKind::RawSalted,
            Self::Hex(_) => KeyKind::Hex,
        }
    }

    fn bytes(&self) -> &SecureBytes {
        match self {
            Self::RawUnsalted(bytes) | Self::RawSalted(bytes) | Self::Hex(bytes) => bytes,
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    /// Trailing salt of a raw salted key
    pub fn salt(&self) -> Option<&[u8]> {
        match self {
            Self::RawSalted(bytes) => {
                let payload = bytes.expose();
                Some(&payload[payload.len() - SALT_LEN..])
            }
            _ => None,
        }
    }

    /// Companion `hexkey_mode` marker
    pub fn hex_key_mode(&self) -> HexKeyMode {
        match self {
            Self::Hex(_) => HexKeyMode::Sse,
            _ => HexKeyMode::None,
        }
    }

    /// Value written under the `key` option
    pub fn canonical_pragma_value(&self) -> Zeroizing<String> {
        let hex = self.bytes().to_hex();
        match self {
            Self::RawUnsalted(_) | Self::RawSalted(_) => {
                Zeroizing::new(format!("x'{}'", hex.as_str()))
            }
            Self::Hex(_) => hex,
        }
    }

    /// Statement that applies this key to a fresh handle
    pub fn key_statement(&self) -> Zeroizing<String> {
        render_key_statement(KeyPragma::Key, &self.canonical_pragma_value(), self.hex_key_mode())
    }

    /// Statement that re-encrypts an open database under this key
    pub fn rekey_statement(&self) -> Zeroizing<String> {
        render_key_statement(KeyPragma::Rekey, &self.canonical_pragma_value(), self.hex_key_mode())
    }
}

// Constant-time over the payload; the variant must match too
impl PartialEq for KeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.bytes().constant_time_eq(other.bytes())
    }
}

impl Eq for KeyMaterial {}

/// Which key pragma to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyPragma {
    Key,
    Rekey,
}

/// Render the key or rekey statement for an encoded key value
///
/// Raw literals are passed double-quoted so the engine sees the `x'..'`
/// form; passphrases are single-quoted with embedded quotes doubled.
pub(crate) fn render_key_statement(
    pragma: KeyPragma,
    value: &str,
    mode: HexKeyMode,
) -> Zeroizing<String> {
    let name = match pragma {
        KeyPragma::Key => "key",
        KeyPragma::Rekey => "rekey",
    };
    let sql = match mode {
        HexKeyMode::Sse => format!("PRAGMA hex{} = '{}'", name, value),
        HexKeyMode::None if raw_literal_payload(value).is_some() => {
            format!("PRAGMA {} = \"{}\"", name, value)
        }
        HexKeyMode::None => {
            let escaped = Zeroizing::new(value.replace('\'', "''"));
            format!("PRAGMA {} = '{}'", name, escaped.as_str())
        }
    };
    Zeroizing::new(sql)
}

/// Hex payload of an `x'..'` literal
pub(crate) fn raw_literal_payload(value: &str) -> Option<&str> {
    let body = value.strip_prefix("x'").or_else(|| value.strip_prefix("X'"))?;
    body.strip_suffix('\'')
}

/// Check an encoded key value against its `hexkey_mode`
///
/// # Errors
/// Returns [`ConnectError::InvalidArgument`] for SSE values that are not
/// even-length hex, and for `x'..'` literals that are not hex or shorter than
/// [`MIN_RAW_UNSALTED_LEN`] bytes.
pub(crate) fn validate_key_value(value: &str, mode: HexKeyMode) -> ConnectResult<()> {
    match mode {
        HexKeyMode::Sse => {
            decode_hex(value)?;
        }
        HexKeyMode::None => {
            if let Some(payload) = raw_literal_payload(value) {
                let bytes = decode_hex(payload)?;
                if bytes.len() < MIN_RAW_UNSALTED_LEN {
                    return Err(ConnectError::InvalidArgument(format!(
                        "raw key literal must hold at least {} bytes, got {}",
                        MIN_RAW_UNSALTED_LEN,
                        bytes.len()
                    )));
                }
            }
        }
    }
    Ok(())
}

fn decode_hex(hex_str: &str) -> ConnectResult<Zeroizing<Vec<u8>>> {
    if hex_str.is_empty() {
        return Err(ConnectError::InvalidArgument("hex key must not be empty".to_string()));
    }
    hex::decode(hex_str).map(Zeroizing::new).map_err(|e| {
        ConnectError::InvalidArgument(format!("hex key must be an even-length hex string: {}", e))
    })
}

/// Fluent cipher configuration builder
///
/// Holds at most one key (a later key call replaces the earlier one) plus
/// cipher-family selection.
///
/// # Example
/// ```rust,ignore
/// let mut config = CipherConfig::new();
/// config.with_raw_unsalted_key(&secret)?.with_legacy(4)?;
/// let settings = config.build();
/// let conn = settings.open(&Connector::default(), "sqlite:/tmp/app.db")?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct CipherConfig {
    key: Option<KeyMaterial>,
    cipher: Option<CipherName>,
    legacy: Option<u8>,
    kdf_iter: Option<u32>,
}

impl CipherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a raw unsalted key (at least 32 bytes)
    pub fn with_raw_unsalted_key(&mut self, bytes: &[u8]) -> ConnectResult<&mut Self> {
        self.key = Some(KeyMaterial::raw_unsalted(bytes)?);
        Ok(self)
    }

    /// Set a raw salted key (at least 48 bytes)
    pub fn with_raw_salted_key(&mut self, bytes: &[u8]) -> ConnectResult<&mut Self> {
        self.key = Some(KeyMaterial::raw_salted(bytes)?);
        Ok(self)
    }

    /// Set a hex-mode key from bytes; also selects `hexkey_mode = SSE`
    pub fn with_hex_key(&mut self, bytes: &[u8]) -> ConnectResult<&mut Self> {
        self.key = Some(KeyMaterial::hex(bytes)?);
        Ok(self)
    }

    /// Set a hex-mode key from a hex string; also selects `hexkey_mode = SSE`
    pub fn with_hex_key_str(&mut self, hex_str: &str) -> ConnectResult<&mut Self> {
        self.key = Some(KeyMaterial::hex_str(hex_str)?);
        Ok(self)
    }

    /// Set already validated key material
    pub fn with_key(&mut self, key: KeyMaterial) -> &mut Self {
        self.key = Some(key);
        self
    }

    pub fn with_cipher(&mut self, cipher: CipherName) -> &mut Self {
        self.cipher = Some(cipher);
        self
    }

    /// Select a legacy compatibility level (1 to 4)
    pub fn with_legacy(&mut self, level: u8) -> ConnectResult<&mut Self> {
        if !(1..=4).contains(&level) {
            return Err(ConnectError::InvalidArgument(format!(
                "legacy compatibility level must be 1..=4, got {}",
                level
            )));
        }
        self.legacy = Some(level);
        Ok(self)
    }

    /// Override the key derivation iteration count
    pub fn with_kdf_iter(&mut self, iterations: u32) -> ConnectResult<&mut Self> {
        if iterations == 0 || iterations > i32::MAX as u32 {
            return Err(ConnectError::InvalidArgument(format!(
                "kdf_iter must be 1..={}, got {}",
                i32::MAX,
                iterations
            )));
        }
        self.kdf_iter = Some(iterations);
        Ok(self)
    }

    pub fn key(&self) -> Option<&KeyMaterial> {
        self.key.as_ref()
    }

    /// Snapshot the accumulated settings; the builder is left untouched
    pub fn build(&self) -> CipherSettings {
        CipherSettings {
            key: self.key.clone(),
            cipher: self.cipher,
            legacy: self.legacy,
            kdf_iter: self.kdf_iter,
        }
    }
}

/// Immutable output of [`CipherConfig::build`]
#[derive(Debug, Clone)]
pub struct CipherSettings {
    key: Option<KeyMaterial>,
    cipher: Option<CipherName>,
    legacy: Option<u8>,
    kdf_iter: Option<u32>,
}

impl CipherSettings {
    pub fn key(&self) -> Option<&KeyMaterial> {
        self.key.as_ref()
    }

    /// Property view of the settings, keyed by registry name
    pub fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        if let Some(key) = &self.key {
            props.set(ConfigOption::Key.name(), key.canonical_pragma_value().as_str());
            props.set(ConfigOption::HexKeyMode.name(), key.hex_key_mode().as_str());
        }
        if let Some(cipher) = self.cipher {
            props.set(ConfigOption::Cipher.name(), cipher.as_str());
        }
        if let Some(level) = self.legacy {
            props.set(ConfigOption::Legacy.name(), level.to_string());
        }
        if let Some(iterations) = self.kdf_iter {
            props.set(ConfigOption::KdfIter.name(), iterations.to_string());
        }
        props
    }

    /// Open `uri` with these settings layered over the URI's options
    pub fn open(&self, connector: &Connector, uri: &str) -> ConnectResult<Connection> {
        connector.open_source(&ConfigSource::new(uri).with_properties(self.to_properties()))
    }
}
