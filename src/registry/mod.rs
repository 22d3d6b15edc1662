//! Log registries: surveyables fed by log events
//!
//! A registry converts log events into status messages and keeps the recent
//! ones around so a poller can read them later.

/// Logger that feeds log records into the registry
pub mod appender;
/// Bounded, time-indexed cache of log-derived messages
pub mod caching;

pub use appender::RegistryAppender;
pub use caching::CachingLogRegistry;

use crate::error::RegistryError;
use crate::status::{Severity, StatusMessage, Timestamp};
use crate::surveyable::Surveyable;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identifier of the caching registry implementation
pub const CACHING_REGISTRY_ID: &str = "caching";

/// At most this many log messages are kept by default
pub const DEFAULT_MAX_NUMBER_OF_MESSAGES: usize = 1000;

/// Level of a log event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Traffic-light severity for this level
    ///
    /// Fatal and error are red, warnings are yellow, everything else green.
    pub fn severity(self) -> Severity {
        match self {
            LogLevel::Fatal | LogLevel::Error => Severity::Red,
            LogLevel::Warn => Severity::Yellow,
            LogLevel::Info | LogLevel::Debug | LogLevel::Trace => Severity::Green,
        }
    }
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => LogLevel::Error,
            log::Level::Warn => LogLevel::Warn,
            log::Level::Info => LogLevel::Info,
            log::Level::Debug => LogLevel::Debug,
            log::Level::Trace => LogLevel::Trace,
        }
    }
}

/// A log event delivered to a registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEvent {
    /// The rendered log message
    pub rendered_message: String,
    /// Level the event was logged at
    pub level: LogLevel,
    /// When the event was logged, in milliseconds since the epoch
    pub timestamp: Timestamp,
    /// Name of the logger (source) that produced the event
    pub logger_name: String,
}

impl LogEvent {
    pub fn new(
        rendered_message: impl Into<String>,
        level: LogLevel,
        timestamp: Timestamp,
        logger_name: impl Into<String>,
    ) -> Self {
        Self {
            rendered_message: rendered_message.into(),
            level,
            timestamp,
            logger_name: logger_name.into(),
        }
    }
}

impl From<&LogEvent> for StatusMessage {
    fn from(event: &LogEvent) -> Self {
        StatusMessage::new(
            event.rendered_message.clone(),
            event.level.severity(),
            event.timestamp,
            true,
        )
    }
}

/// A surveyable that registers log events for later inspection
pub trait LogRegistry: Surveyable {
    /// Register a log event
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::InvalidEvent` if the event is malformed. This
    /// signals a bug in the producer and is never raised for valid events.
    fn register(&self, event: &LogEvent) -> Result<(), RegistryError>;

    /// View this registry as a plain surveyable
    fn into_surveyable(self: Arc<Self>) -> Arc<dyn Surveyable>;
}
