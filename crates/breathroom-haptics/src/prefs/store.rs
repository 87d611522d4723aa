//! Key-value preference stores.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::HapticsConfig;
use crate::error::PreferenceError;

const PREFERENCES_FILE: &str = "preferences.toml";

/// Flat string key-value storage for persisted settings.
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>, PreferenceError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PreferenceError>;
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PreferenceError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Flat TOML table on disk.
///
/// The file is re-read on every lookup so edits made by another screen or
/// process show up on the next change notification. Non-string values are
/// returned in their textual form (`true`, `3`).
#[derive(Debug, Clone)]
pub struct TomlFileStore {
    path: PathBuf,
}

impl TomlFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file named by `preferences.file`, else `preferences.toml` in the
    /// data directory.
    pub fn from_config(config: &HapticsConfig) -> Result<Self, PreferenceError> {
        if let Some(file) = &config.preferences.file {
            return Ok(Self::new(file.clone()));
        }
        let dir = crate::config::data_dir().map_err(|err| PreferenceError::Read {
            key: "data_dir".into(),
            message: err.to_string(),
        })?;
        Ok(Self::new(dir.join(PREFERENCES_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_table(&self) -> Result<toml::Table, PreferenceError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(toml::Table::new()),
            Err(source) => {
                return Err(PreferenceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        content
            .parse::<toml::Table>()
            .map_err(|err| PreferenceError::Parse(err.to_string()))
    }
}

impl PreferenceStore for TomlFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        let table = self.load_table()?;
        Ok(table.get(key).map(|value| match value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PreferenceError> {
        let mut table = match self.load_table() {
            Ok(table) => table,
            Err(PreferenceError::Parse(message)) => {
                warn!(path = %self.path.display(), %message, "overwriting malformed preference file");
                toml::Table::new()
            }
            Err(err) => return Err(err),
        };
        table.insert(key.to_string(), toml::Value::String(value.to_string()));

        let write_err = |message: String| PreferenceError::Write {
            key: key.to_string(),
            message,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| write_err(err.to_string()))?;
        }
        let content = toml::to_string_pretty(&table).map_err(|err| write_err(err.to_string()))?;
        std::fs::write(&self.path, content).map_err(|err| write_err(err.to_string()))
    }
}
