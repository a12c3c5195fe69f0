use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Logtune operations
#[derive(Error, Debug)]
pub enum TuneError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path:?}")]
    ConfigNotFound { path: PathBuf },

    /// Malformed grid bounds for a tunable parameter
    #[error("Invalid parameter spec '{name}': {message}")]
    InvalidParameterSpec { name: String, message: String },

    /// Malformed preprocessing regex
    #[error("Invalid preprocess rule '{pattern}': {message}")]
    InvalidPreprocessRule { pattern: String, message: String },

    /// A parameter required by the selected method is absent from the
    /// configuration, or an unknown parameter was declared
    #[error("Method '{method}': {message} parameter '{name}'")]
    MissingParameter {
        method: String,
        name: String,
        message: String,
    },

    /// Malformed regex event template
    #[error("Invalid template at line {line}: {message}")]
    InvalidTemplate { line: usize, message: String },

    /// Every grid point failed; no configuration could be scored
    #[error("No valid configuration found: all {attempted} grid points failed")]
    NoValidConfiguration { attempted: usize },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for Logtune operations
pub type Result<T> = std::result::Result<T, TuneError>;
