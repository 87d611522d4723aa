//! TOML-based engine configuration.
//!
//! Host-tunable knobs that are not user preferences:
//! - Cycle defaults and the activation delay
//! - Slider tick throttle
//! - Jitter seed for reproducible sessions
//! - Wake lock behaviour
//! - Preference file location
//!
//! Configuration is stored at `~/.config/breathroom/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{ConfigError, Result};
use crate::timing::DEFAULT_CYCLE_SECONDS;
use crate::wake_lock::DEFAULT_RETRY_DELAY_MS;

/// Returns `~/.config/breathroom[-dev]/` based on BREATHROOM_ENV.
///
/// Set BREATHROOM_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("BREATHROOM_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("breathroom-dev")
    } else {
        base_dir.join("breathroom")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cycle length used until the screen pushes one.
    #[serde(default = "default_cycle_seconds")]
    pub default_cycle_seconds: f64,
    /// Delay between entering an active mode and the first inhale.
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
    #[serde(default = "default_slider_tick_throttle_ms")]
    pub slider_tick_throttle_ms: u64,
    /// Fixed seed for hold-bottom jitter. Unset means fresh entropy.
    #[serde(default)]
    pub jitter_seed: Option<u64>,
}

/// Wake lock configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeLockConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Preference store configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferencesConfig {
    /// Overrides `preferences.toml` in the data directory.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/breathroom/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HapticsConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub wake_lock: WakeLockConfig,
    #[serde(default)]
    pub preferences: PreferencesConfig,
}

fn default_cycle_seconds() -> f64 {
    DEFAULT_CYCLE_SECONDS
}
fn default_startup_delay_ms() -> u64 {
    60
}
fn default_slider_tick_throttle_ms() -> u64 {
    85
}
fn default_true() -> bool {
    true
}
fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_cycle_seconds: default_cycle_seconds(),
            startup_delay_ms: default_startup_delay_ms(),
            slider_tick_throttle_ms: default_slider_tick_throttle_ms(),
            jitter_seed: None,
        }
    }
}

impl Default for WakeLockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl HapticsConfig {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> std::result::Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        if key.is_empty() {
            return Err(invalid("config key is empty".into()));
        }

        let mut parts = key.split('.').peekable();
        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current
                    .get_mut(part)
                    .ok_or_else(|| invalid("unknown config key".into()))?;
                continue;
            }

            let obj = current
                .as_object_mut()
                .ok_or_else(|| invalid("unknown config key".into()))?;
            let existing = obj
                .get(part)
                .ok_or_else(|| invalid("unknown config key".into()))?;

            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value
                        .parse::<bool>()
                        .map_err(|err| invalid(err.to_string()))?,
                ),
                serde_json::Value::Number(_) => parse_number(value)
                    .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?,
                // Optional fields serialize as null; accept "none" to clear them.
                serde_json::Value::Null => {
                    if value.eq_ignore_ascii_case("none") || value.is_empty() {
                        serde_json::Value::Null
                    } else {
                        parse_number(value)
                            .unwrap_or_else(|| serde_json::Value::String(value.into()))
                    }
                }
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    serde_json::from_str(value).map_err(|err| invalid(err.to_string()))?
                }
                serde_json::Value::String(_) => serde_json::Value::String(value.into()),
            };

            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(invalid("unknown config key".into()))
    }

    pub fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from an explicit file. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let load_failed = |message: String| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(load_failed(err.to_string()).into()),
        };
        let cfg: HapticsConfig =
            toml::from_str(&content).map_err(|err| load_failed(err.to_string()))?;
        Ok(cfg)
    }

    /// Load from the data directory, writing defaults on first run.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        if path.exists() {
            return Self::load_from(&path);
        }
        let cfg = Self::default();
        cfg.save_to(&path)?;
        Ok(cfg)
    }

    /// Persist to an explicit file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(ConfigError::from)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| save_failed(err.to_string()))?;
        }
        std::fs::write(path, content).map_err(|err| save_failed(err.to_string()))?;
        Ok(())
    }

    /// Persist to the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|err| {
            warn!(error = %err, "config unavailable; using defaults");
            Self::default()
        })
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key. Does not persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit the
    /// field's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: err.to_string(),
        })?;
        Ok(())
    }
}

fn parse_number(value: &str) -> Option<serde_json::Value> {
    if let Ok(n) = value.parse::<u64>() {
        return Some(serde_json::Value::Number(n.into()));
    }
    value
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
}
