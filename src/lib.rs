/// Error types for the surveillance subsystem
pub mod error;

/// Status reports and messages
pub mod status;

/// Configuration sources and parameter names
pub mod config;

/// Named implementations and hot-swappable singletons
pub mod factory;

/// The surveyable capability and its combinator
pub mod surveyable;

/// Log registries caching log-derived status messages
pub mod registry;

/// Wiring of catalogs, factories and configuration
pub mod surveillance;

// Re-export commonly used types
pub use error::{ConfigError, InstantiationError, RegistryError};
pub use status::{Severity, Status, StatusMessage, Timestamp};
pub use surveillance::Surveillance;
pub use surveyable::Surveyable;
