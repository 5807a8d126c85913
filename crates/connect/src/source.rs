//! Connection source parsing
//!
//! Turns a connection URI plus optional explicit properties into an immutable
//! [`NormalizedConfig`].
//!
//! # URI grammar
//! ```text
//! sqlite:<path>[?opt=val&...]
//! sqlite:file:<path>[?opt=val&...]
//! file:<path>[?opt=val&...]
//! ```
//! `<path>` may be `:memory:`. Query keys and values are percent-decoded,
//! empty segments are skipped and a repeated key keeps its last value.
//!
//! # Precedence
//! Three overlays are folded left to right into one map: built-in defaults,
//! then the URI query, then explicit properties. Every name is resolved and
//! encoded through the registry before merging, so an unknown option fails
//! the request before any handle is opened.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;
use zeroize::Zeroize;

use crate::error::{ConnectError, ConnectResult};
use crate::key::{validate_key_value, HexKeyMode, KeyMaterial};
use crate::properties::Properties;
use crate::registry::{ConfigOption, Stage};

/// Default busy timeout in milliseconds
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 3000;

/// Built-in default overlay
pub fn builtin_defaults() -> Properties {
    Properties::new().with(ConfigOption::BusyTimeout.name(), DEFAULT_BUSY_TIMEOUT_MS.to_string())
}

/// Where the database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

impl DatabaseLocation {
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Memory => None,
        }
    }
}

impl fmt::Display for DatabaseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Memory => f.write_str(":memory:"),
        }
    }
}

/// Per-connection cache scope requested with `cache=`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    Shared,
    Private,
}

/// A parsed connection URI
///
/// Query pairs are kept decoded and in order of appearance, with later
/// duplicates replacing earlier ones.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionUri {
    location: DatabaseLocation,
    query: Vec<(String, String)>,
}

impl ConnectionUri {
    /// Parse `scheme:path[?query]`
    ///
    /// # Errors
    /// Returns [`ConnectError::InvalidUri`] for an unknown scheme, an empty
    /// path or a query that does not percent-decode to UTF-8.
    pub fn parse(uri: &str) -> ConnectResult<Self> {
        let (head, query) = match uri.split_once('?') {
            Some((head, query)) => (head, Some(query)),
            None => (uri, None),
        };

        let path = if let Some(rest) = head.strip_prefix("sqlite:") {
            rest.strip_prefix("file:").unwrap_or(rest)
        } else if let Some(rest) = head.strip_prefix("file:") {
            rest
        } else {
            return Err(ConnectError::InvalidUri(format!(
                "unsupported scheme in '{}', expected 'sqlite:' or 'file:'",
                head
            )));
        };

        // file:///abs/path carries an empty authority
        let path = match path.strip_prefix("//") {
            Some(rest) if rest.starts_with('/') => rest,
            _ => path,
        };

        if path.is_empty() {
            return Err(ConnectError::InvalidUri(format!("missing database path in '{}'", head)));
        }

        let location = if path == ":memory:" {
            DatabaseLocation::Memory
        } else {
            DatabaseLocation::File(PathBuf::from(path))
        };

        let mut pairs: Vec<(String, String)> = Vec::new();
        for segment in query.unwrap_or("").split('&').filter(|s| !s.is_empty()) {
            let (name, value) = segment.split_once('=').unwrap_or((segment, ""));
            let name = decode_component(name)?;
            let value = decode_component(value)?;
            if let Some(pos) = pairs.iter().position(|(existing, _)| *existing == name) {
                let (_, mut old) = pairs.remove(pos);
                old.zeroize();
            }
            pairs.push((name, value));
        }

        Ok(Self { location, query: pairs })
    }

    pub fn location(&self) -> &DatabaseLocation {
        &self.location
    }

    /// Decoded query pairs, duplicates already collapsed
    pub fn query(&self) -> impl Iterator<Item = (&str, &str)> {
        self.query.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl Drop for ConnectionUri {
    fn drop(&mut self) {
        for (_, value) in &mut self.query {
            value.zeroize();
        }
    }
}

// Custom Debug impl to avoid exposing the key
impl fmt::Debug for ConnectionUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.query.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("ConnectionUri")
            .field("location", &self.location)
            .field("query_names", &names)
            .finish()
    }
}

fn decode_component(raw: &str) -> ConnectResult<String> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| ConnectError::InvalidUri(format!("query is not valid UTF-8: {}", e)))
}

/// A connection request: URI plus explicit properties and defaults
#[derive(Debug, Clone)]
pub struct ConfigSource {
    uri: String,
    properties: Properties,
    defaults: Properties,
}

impl ConfigSource {
    /// Request for `uri` with the built-in defaults and no explicit properties
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), properties: Properties::new(), defaults: builtin_defaults() }
    }

    /// Explicit properties; these override URI query options
    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Replace the default overlay
    #[must_use]
    pub fn with_defaults(mut self, defaults: Properties) -> Self {
        self.defaults = defaults;
        self
    }

    /// Drop the default overlay entirely
    #[must_use]
    pub fn without_defaults(self) -> Self {
        self.with_defaults(Properties::new())
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Resolve, encode, merge and cross-validate
    ///
    /// # Errors
    /// - [`ConnectError::InvalidUri`] if the URI does not parse
    /// - [`ConnectError::UnsupportedOption`] for names outside the registry
    /// - [`ConnectError::InvalidValue`] for out-of-domain values
    /// - [`ConnectError::InvalidArgument`] for inconsistent key/cipher options
    pub fn parse(&self) -> ConnectResult<NormalizedConfig> {
        let uri = ConnectionUri::parse(&self.uri)?;

        let defaults = encode_overlay(self.defaults.iter())?;
        let from_uri = encode_overlay(uri.query())?;
        let explicit = encode_overlay(self.properties.iter())?;

        let mut values = BTreeMap::new();
        for overlay in [defaults, from_uri, explicit] {
            for (option, value) in overlay {
                if let Some(mut old) = values.insert(option, value) {
                    old.zeroize();
                }
            }
        }

        let config = NormalizedConfig { location: uri.location().clone(), values };
        config.cross_validate()?;

        debug!(
            location = %config.location,
            options = config.values.len(),
            keyed = config.has_key(),
            "Normalized connection configuration"
        );
        Ok(config)
    }
}

fn encode_overlay<'a>(
    entries: impl Iterator<Item = (&'a str, &'a str)>,
) -> ConnectResult<Vec<(ConfigOption, String)>> {
    entries
        .map(|(name, raw)| {
            let option = ConfigOption::from_name(name)?;
            Ok((option, option.encode(raw)?))
        })
        .collect()
}

/// Immutable, fully encoded connection configuration
///
/// At most one value per option. Iteration follows registry order.
#[derive(Clone, PartialEq, Eq)]
pub struct NormalizedConfig {
    location: DatabaseLocation,
    values: BTreeMap<ConfigOption, String>,
}

impl NormalizedConfig {
    /// Parse a URI with the built-in defaults
    pub fn from_uri(uri: &str) -> ConnectResult<Self> {
        ConfigSource::new(uri).parse()
    }

    pub fn location(&self) -> &DatabaseLocation {
        &self.location
    }

    pub fn is_memory(&self) -> bool {
        self.location.is_memory()
    }

    /// Encoded value of `option`
    pub fn get(&self, option: ConfigOption) -> Option<&str> {
        self.values.get(&option).map(String::as_str)
    }

    /// Encoded values in registry order
    pub fn iter(&self) -> impl Iterator<Item = (ConfigOption, &str)> {
        self.values.iter().map(|(option, value)| (*option, value.as_str()))
    }

    /// Options present for `stage`, in registry order
    pub fn stage(&self, stage: Stage) -> impl Iterator<Item = (ConfigOption, &str)> {
        self.iter().filter(move |(option, _)| option.stage() == stage)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Requested cache scope, `None` when `cache=` was not given
    pub fn cache_scope(&self) -> Option<CacheScope> {
        match self.get(ConfigOption::CacheScope) {
            Some("shared") => Some(CacheScope::Shared),
            Some("private") => Some(CacheScope::Private),
            _ => None,
        }
    }

    /// Whether the request asks to turn on process-wide shared cache
    pub fn shared_cache_requested(&self) -> bool {
        self.cache_scope() == Some(CacheScope::Shared)
            || self.get(ConfigOption::SharedCache) == Some("1")
    }

    pub fn has_key(&self) -> bool {
        self.values.contains_key(&ConfigOption::Key)
    }

    pub fn hex_key_mode(&self) -> HexKeyMode {
        self.get(ConfigOption::HexKeyMode).and_then(HexKeyMode::parse).unwrap_or_default()
    }

    pub(crate) fn key_value(&self) -> Option<&str> {
        self.get(ConfigOption::Key)
    }

    /// Copy of this configuration keyed with `key` instead
    #[must_use]
    pub fn with_key(&self, key: &KeyMaterial) -> Self {
        let mut next = self.clone();
        if let Some(mut old) = next
            .values
            .insert(ConfigOption::Key, key.canonical_pragma_value().as_str().to_string())
        {
            old.zeroize();
        }
        next.values.insert(ConfigOption::HexKeyMode, key.hex_key_mode().as_str().to_string());
        next
    }

    /// Property view, keyed by canonical option name
    pub fn to_properties(&self) -> Properties {
        self.iter().map(|(option, value)| (option.name(), value)).collect()
    }

    fn cross_validate(&self) -> ConnectResult<()> {
        if !self.has_key() {
            if let Some((option, _)) = self.stage(Stage::Cipher).next() {
                return Err(ConnectError::InvalidArgument(format!(
                    "option '{}' requires a key",
                    option
                )));
            }
            if self.values.contains_key(&ConfigOption::HexKeyMode) {
                return Err(ConnectError::InvalidArgument(
                    "option 'hexkey_mode' requires a key".to_string(),
                ));
            }
            return Ok(());
        }

        match self.key_value() {
            Some(value) => validate_key_value(value, self.hex_key_mode()),
            None => Ok(()),
        }
    }
}

impl Drop for NormalizedConfig {
    fn drop(&mut self) {
        for value in self.values.values_mut() {
            value.zeroize();
        }
    }
}

// Custom Debug impl to avoid exposing the key
impl fmt::Debug for NormalizedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (option, value) in self.iter() {
            if option.is_secret() {
                map.entry(&option.name(), &"***");
            } else {
                map.entry(&option.name(), &value);
            }
        }
        map.finish()?;
        write!(f, " @ {}", self.location)
    }
}
