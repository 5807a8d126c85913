//! Property loading from TOML and the environment
//!
//! ## File format
//! ```toml
//! uri = "sqlite:/var/lib/app/data.db"
//!
//! [properties]
//! busy_timeout = 5000
//! journal_mode = "wal"
//! foreign_keys = true
//! ```
//! `uri` is only required by [`parse_config_source`]. Values may be strings,
//! integers or booleans.
//!
//! ## Environment Variables
//! Every variable starting with `CIPHERLINK_` becomes a property, with the
//! prefix removed and the rest lower-cased:
//! - `CIPHERLINK_BUSY_TIMEOUT=5000` → `busy_timeout = 5000`
//! - `CIPHERLINK_KEY=...` → `key = ...`
//!
//! Names are resolved against the registry when the source is parsed, so an
//! unknown variable fails the open with `UnsupportedOption`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ConnectError, ConnectResult};
use crate::properties::Properties;
use crate::source::ConfigSource;

/// Default environment variable prefix
pub const ENV_PREFIX: &str = "CIPHERLINK";

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConnectionFile {
    uri: Option<String>,
    #[serde(default)]
    properties: BTreeMap<String, PropertyValue>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PropertyValue {
    Flag(bool),
    Integer(i64),
    Text(String),
}

impl PropertyValue {
    fn into_string(self) -> String {
        match self {
            Self::Flag(flag) => flag.to_string(),
            Self::Integer(value) => value.to_string(),
            Self::Text(text) => text,
        }
    }
}

fn parse_file(contents: &str) -> ConnectResult<ConnectionFile> {
    toml::from_str(contents).map_err(|e| ConnectError::Config(format!("Invalid TOML format: {}", e)))
}

fn into_properties(entries: BTreeMap<String, PropertyValue>) -> Properties {
    entries.into_iter().map(|(name, value)| (name, value.into_string())).collect()
}

impl Properties {
    /// Parse the `[properties]` table of a TOML document
    ///
    /// # Errors
    /// Returns [`ConnectError::Config`] if the document is not valid TOML or
    /// has unexpected top-level keys.
    pub fn from_toml_str(contents: &str) -> ConnectResult<Self> {
        Ok(into_properties(parse_file(contents)?.properties))
    }
}

/// Load the `[properties]` table from a TOML file
///
/// # Errors
/// Returns [`ConnectError::Config`] if the file is missing, unreadable or
/// invalid.
pub fn load_properties_file(path: &Path) -> ConnectResult<Properties> {
    let contents = read_file(path)?;
    Properties::from_toml_str(&contents)
}

/// Parse a complete connection request (`uri` plus `[properties]`)
///
/// # Errors
/// Returns [`ConnectError::Config`] if the document is invalid or has no
/// `uri`.
pub fn parse_config_source(contents: &str) -> ConnectResult<ConfigSource> {
    let file = parse_file(contents)?;
    let uri = file
        .uri
        .ok_or_else(|| ConnectError::Config("Missing required field 'uri'".to_string()))?;
    Ok(ConfigSource::new(uri).with_properties(into_properties(file.properties)))
}

/// Load a complete connection request from a TOML file
pub fn load_config_source(path: &Path) -> ConnectResult<ConfigSource> {
    let contents = read_file(path)?;
    parse_config_source(&contents)
}

fn read_file(path: &Path) -> ConnectResult<String> {
    if !path.exists() {
        return Err(ConnectError::Config(format!("Config file not found: {}", path.display())));
    }
    info!(path = %path.display(), "Loading connection properties from file");
    std::fs::read_to_string(path)
        .map_err(|e| ConnectError::Config(format!("Failed to read config file: {}", e)))
}

/// Collect properties from process environment variables named `<prefix>_*`
pub fn properties_from_env(prefix: &str) -> Properties {
    properties_from_vars(prefix, std::env::vars())
}

/// Collect properties from `(name, value)` pairs named `<prefix>_*`
pub fn properties_from_vars<I>(prefix: &str, vars: I) -> Properties
where
    I: IntoIterator<Item = (String, String)>,
{
    let wanted = format!("{}_", prefix);
    let props: Properties = vars
        .into_iter()
        .filter_map(|(name, value)| {
            name.strip_prefix(&wanted)
                .filter(|rest| !rest.is_empty())
                .map(|rest| (rest.to_ascii_lowercase(), value))
        })
        .collect();
    debug!(count = props.len(), prefix = %prefix, "Collected properties from environment");
    props
}
