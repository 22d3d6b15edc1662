use thiserror::Error;

/// Errors that can occur when constructing a named implementation
#[derive(Error, Debug)]
pub enum InstantiationError {
    #[error("No implementation registered under '{0}'")]
    UnknownImplementation(String),

    #[error("Cannot instantiate '{name}': {reason}")]
    ConstructionFailed { name: String, reason: String },

    #[error("Constructor for '{name}' panicked: {reason}")]
    Panicked { name: String, reason: String },
}

impl InstantiationError {
    /// Identifier of the implementation that failed to instantiate
    pub fn name(&self) -> &str {
        match self {
            InstantiationError::UnknownImplementation(name) => name,
            InstantiationError::ConstructionFailed { name, .. } => name,
            InstantiationError::Panicked { name, .. } => name,
        }
    }
}

/// Errors raised by a log registry when registering events
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Invalid log event: {0}")]
    InvalidEvent(String),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
