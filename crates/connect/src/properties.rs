//! Explicit connection properties
//!
//! An ordered `name → value` map supplied next to a URI. Names are kept as
//! given; they are resolved against the registry only when the source is
//! parsed. Values are zeroed when the map is dropped because a property set
//! usually carries the key.

use std::collections::BTreeMap;
use std::fmt;

use zeroize::Zeroize;

use crate::registry::ConfigOption;

/// Ordered property set
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a property
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        if let Some(mut old) = self.entries.insert(name.into(), value.into()) {
            old.zeroize();
        }
        self
    }

    /// Owned variant of [`Properties::set`]
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        match self.entries.remove(name) {
            Some(mut value) => {
                value.zeroize();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Overlay `other` on top of `self`; entries in `other` win
    pub fn merge(&mut self, other: &Self) {
        for (name, value) in other.iter() {
            self.set(name, value);
        }
    }
}

impl Drop for Properties {
    fn drop(&mut self) {
        for value in self.entries.values_mut() {
            value.zeroize();
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Self::new();
        for (name, value) in iter {
            props.set(name, value);
        }
        props
    }
}

// Custom Debug impl to avoid exposing the key
impl fmt::Debug for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in self.iter() {
            let secret = ConfigOption::from_name(name).map(ConfigOption::is_secret).unwrap_or(false);
            if secret {
                map.entry(&name, &"***");
            } else {
                map.entry(&name, &value);
            }
        }
        map.finish()
    }
}
