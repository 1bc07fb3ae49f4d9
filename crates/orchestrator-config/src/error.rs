//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File content did not parse
    #[error("failed to parse config file {path}: {message}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Extension is neither YAML nor TOML
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),

    /// Environment variable held an unusable value
    #[error("invalid value for {var}: {message}")]
    Env {
        /// Variable name
        var: String,
        /// What was wrong
        message: String,
    },

    /// A setting is out of range or inconsistent
    #[error("invalid configuration for {field}: {message}")]
    Invalid {
        /// Dotted field path
        field: String,
        /// What was wrong
        message: String,
    },
}

impl ConfigError {
    /// Create a validation error
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an environment error
    pub fn env(var: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Env {
            var: var.into(),
            message: message.into(),
        }
    }
}
