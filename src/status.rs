//! Core status types shared by every surveyable
//!
//! A poll produces a [`Status`]: the name of what is being surveyed plus a
//! sequence of timestamped, severity-tagged [`StatusMessage`]s.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Milliseconds since 1970-01-01 00:00:00.000Z
pub type Timestamp = i64;

/// Current wall-clock time as a [`Timestamp`]
pub fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis()
}

/// Severity defined in a classic traffic-light fashion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Everything is fine
    Green,
    /// Something may require attention
    Yellow,
    /// Something is broken
    Red,
}

/// A single status message from a surveyed component
///
/// Immutable once constructed. Messages are ordered by `timestamp` only;
/// two distinct messages may share a timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    /// Human readable message
    text: String,
    /// Severity of the message
    severity: Severity,
    /// When the message was generated
    timestamp: Timestamp,
    /// True if derived from a log event, false for a real-time status
    log_derived: bool,
}

impl StatusMessage {
    pub fn new(
        text: impl Into<String>,
        severity: Severity,
        timestamp: Timestamp,
        log_derived: bool,
    ) -> Self {
        Self {
            text: text.into(),
            severity,
            timestamp,
            log_derived,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn is_log_derived(&self) -> bool {
        self.log_derived
    }
}

/// The result of polling a surveyable
///
/// Never absent; an empty message list means "nothing to report".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    /// Name of what is being surveyed
    name: String,
    /// Status messages
    messages: Vec<StatusMessage>,
}

impl Status {
    pub fn new(name: impl Into<String>, messages: Vec<StatusMessage>) -> Self {
        Self {
            name: name.into(),
            messages,
        }
    }

    /// A status with no messages
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn messages(&self) -> &[StatusMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<StatusMessage> {
        self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Newest timestamp among the messages
    ///
    /// Pollers pass this to the next `status_since` call to read incrementally
    /// without losing or repeating messages.
    pub fn latest_timestamp(&self) -> Option<Timestamp> {
        self.messages.iter().map(StatusMessage::timestamp).max()
    }

    /// Newest timestamp among the log-derived messages
    ///
    /// Real-time messages are stamped at poll time, after the log cache was
    /// read, so only log-derived timestamps are safe to resume from.
    pub fn latest_log_timestamp(&self) -> Option<Timestamp> {
        self.messages
            .iter()
            .filter(|m| m.is_log_derived())
            .map(StatusMessage::timestamp)
            .max()
    }

    /// Most severe message, or green when there is nothing to report
    pub fn worst_severity(&self) -> Severity {
        self.messages
            .iter()
            .map(StatusMessage::severity)
            .max()
            .unwrap_or(Severity::Green)
    }
}
