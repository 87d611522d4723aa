//! Core error types for breathroom-haptics.
//!
//! Backends report failures through these types. None of them is meant to
//! reach the user interface: the adapter, the wake-lock manager and the
//! preference bridge catch them, log them and degrade to a silent no-op.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum HapticsError {
    /// Preference store errors
    #[error("Preference error: {0}")]
    Preferences(#[from] PreferenceError),

    /// Vibration platform errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Wake lock errors
    #[error("Wake lock error: {0}")]
    WakeLock(#[from] WakeLockError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Custom(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A textual value did not name any known variant.
    #[error("Unknown {field}: '{value}'")]
    UnknownValue { field: String, value: String },
}

/// Preference store errors.
#[derive(Error, Debug)]
pub enum PreferenceError {
    #[error("Failed to read preference '{key}': {message}")]
    Read { key: String, message: String },

    #[error("Failed to write preference '{key}': {message}")]
    Write { key: String, message: String },

    /// The backing document could not be parsed at all.
    #[error("Failed to parse preferences: {0}")]
    Parse(String),

    #[error("Preference file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Vibration platform errors.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Vibration is not supported on this device")]
    Unsupported,

    #[error("Vibration backend failure: {0}")]
    Backend(String),
}

/// Wake lock errors.
#[derive(Error, Debug)]
pub enum WakeLockError {
    #[error("Wake lock is not supported on this platform")]
    Unsupported,

    /// Locks cannot be requested while the page is hidden.
    #[error("Wake lock cannot be acquired while hidden")]
    NotVisible,

    #[error("Wake lock request denied: {0}")]
    Denied(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::ParseFailed(err.to_string())
    }
}

/// Result type alias for HapticsError
pub type Result<T, E = HapticsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_errors_convert_into_top_level() {
        let err: HapticsError = PlatformError::Backend("busy".into()).into();
        assert!(matches!(err, HapticsError::Platform(_)));
        assert_eq!(err.to_string(), "Platform error: Vibration backend failure: busy");
    }

    #[test]
    fn toml_errors_become_parse_failures() {
        let bad = toml::from_str::<toml::Table>("= nope").unwrap_err();
        let err: ConfigError = bad.into();
        assert!(matches!(err, ConfigError::ParseFailed(_)));
    }
}
