//! Java-style properties source
//!
//! Reads `key=value` files the way `java.util.Properties` does (ISO-8859-1,
//! `\` line continuations, `#`/`!` comments) while keeping declaration order.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use indexmap::IndexMap;
use java_properties::PropertiesIter;
use tracing::debug;

use crate::{ConfigError, Result};

/// Ordered, read-only view over a properties file.
#[derive(Debug, Clone, Default)]
pub struct PropertiesLoader {
    values: IndexMap<String, String>,
    env_overrides: bool,
}

impl PropertiesLoader {
    /// Load properties from a file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let loader = Self::from_reader(BufReader::new(file))?;
        debug!(path = %path.display(), keys = loader.len(), "Loaded properties file");
        Ok(loader)
    }

    /// Parse properties from in-memory text.
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_reader(text.as_bytes())
    }

    /// Build a loader from already separated key/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            env_overrides: false,
        }
    }

    fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut values = IndexMap::new();
        PropertiesIter::new(reader)
            .read_into(|key, value| {
                values.insert(key, value);
            })
            .map_err(|e| ConfigError::properties(e.to_string()))?;
        Ok(Self {
            values,
            env_overrides: false,
        })
    }

    /// Let environment variables shadow file values.
    ///
    /// Key `shiro.redis.host` is looked up as `SHIRO_REDIS_HOST`.
    #[must_use]
    pub fn with_env_overrides(mut self, enabled: bool) -> Self {
        self.env_overrides = enabled;
        self
    }

    /// Returns the value for `key`, treating an empty value as absent.
    pub fn get_property(&self, key: &str) -> Option<String> {
        if self.env_overrides {
            if let Ok(value) = std::env::var(env_key(key)) {
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
        self.values
            .get(key)
            .filter(|v| !v.is_empty())
            .cloned()
    }

    /// Returns the value for `key` or `default` when absent or empty.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get_property(key)
            .unwrap_or_else(|| default.to_string())
    }

    /// Parses the value for `key` as an integer.
    pub fn get_integer(&self, key: &str) -> Result<Option<i64>> {
        match self.get_property(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|e| ConfigError::invalid_value(key, format!("'{raw}' is not an integer: {e}"))),
        }
    }

    /// All `(key, value)` pairs whose key starts with `prefix`, in file order.
    pub fn keys_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.values
            .iter()
            .filter(move |(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '.' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}
