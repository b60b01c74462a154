//! Configuration Error Types
//!
//! Errors raised while loading, merging and validating `MigrationConfig`.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Explicitly requested configuration file does not exist
    #[error("Configuration file not found: {path}")]
    ConfigFileNotFound { path: PathBuf },

    /// Layer merge or deserialization failure reported by the `config` crate
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Configuration validation errors
    #[error("Configuration validation failed: {error}")]
    ValidationError { error: String },
}

impl ConfigurationError {
    pub fn config_file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigFileNotFound { path: path.into() }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }

    pub fn validation_error(error: impl Into<String>) -> Self {
        Self::ValidationError {
            error: error.into(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigurationError>;
