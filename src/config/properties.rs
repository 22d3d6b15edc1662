use crate::config::{ConfigSource, SURVEYABLES_SEPARATOR};
use crate::error::ConfigError;
use log::debug;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

/// In-memory string properties shared by all components
///
/// Values may be changed at any time; readers observe the change on their
/// next lookup.
#[derive(Debug, Default)]
pub struct Properties {
    values: RwLock<HashMap<String, String>>,
}

impl Properties {
    /// Create an empty property set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a property set from key-value pairs
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }

    /// Load properties from a TOML file
    ///
    /// Top-level scalars become strings. An array of strings is joined with
    /// `;`, which is how `surveyables = ["running", "log"]` is expressed.
    /// Nested tables are not supported.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read,
    /// `ConfigError::TomlError` if it is not valid TOML and
    /// `ConfigError::ValidationError` for unsupported value types.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse properties from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = content.parse()?;
        let mut values = HashMap::with_capacity(table.len());

        for (key, value) in table {
            let flattened = Self::flatten_value(&key, value)?;
            debug!("Configuration '{}' = '{}'", key, flattened);
            values.insert(key, flattened);
        }

        Ok(Self {
            values: RwLock::new(values),
        })
    }

    fn flatten_value(key: &str, value: toml::Value) -> Result<String, ConfigError> {
        match value {
            toml::Value::String(s) => Ok(s),
            toml::Value::Integer(i) => Ok(i.to_string()),
            toml::Value::Float(f) => Ok(f.to_string()),
            toml::Value::Boolean(b) => Ok(b.to_string()),
            toml::Value::Datetime(d) => Ok(d.to_string()),
            toml::Value::Array(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        toml::Value::String(s) => parts.push(s),
                        other => {
                            return Err(ConfigError::ValidationError(format!(
                                "'{}' must only contain strings, found {}",
                                key,
                                other.type_str()
                            )))
                        }
                    }
                }
                Ok(parts.join(&SURVEYABLES_SEPARATOR.to_string()))
            }
            toml::Value::Table(_) => Err(ConfigError::ValidationError(format!(
                "'{}' is a table; only top-level values are supported",
                key
            ))),
        }
    }

    /// Set a property, replacing any previous value
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.into(), value.into());
    }

    /// Remove a property, returning its previous value
    pub fn remove(&self, key: &str) -> Option<String> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(key)
    }

    /// Copy all values from `other` into this set, overriding existing keys
    pub fn merge(&self, other: &Properties) {
        let incoming = other.values.read().unwrap_or_else(|e| e.into_inner()).clone();
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.extend(incoming);
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConfigSource for Properties {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }
}
