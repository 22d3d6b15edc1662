//! Caching log registry with a bounded, time-indexed store
//!
//! Log-derived messages are kept in buckets keyed by timestamp. When the
//! total number of messages would exceed the configured ceiling, the whole
//! earliest bucket is evicted before the new message is inserted.

use crate::config::{ConfigSource, NUMBER_OF_MESSAGES_KEY};
use crate::error::RegistryError;
use crate::registry::{LogEvent, LogRegistry, DEFAULT_MAX_NUMBER_OF_MESSAGES};
use crate::status::{Status, StatusMessage, Timestamp};
use crate::surveyable::Surveyable;
use log::{info, trace, warn};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};

/// Subject name reported before any event has been registered
pub const DEFAULT_NAME: &str = "Unnamed";

/// Messages bucketed by timestamp, with a running total
struct LogIndex {
    /// Buckets of messages sharing one exact timestamp
    buckets: BTreeMap<Timestamp, Vec<StatusMessage>>,
    /// Total number of messages across all buckets
    count: usize,
    /// Maximum total number of messages kept
    capacity: usize,
    /// Logger name of the most recently registered event
    name: Option<String>,
}

impl LogIndex {
    fn new(capacity: usize) -> Self {
        Self {
            buckets: BTreeMap::new(),
            count: 0,
            capacity,
            name: None,
        }
    }

    /// Insert a message, evicting the earliest bucket if the ceiling requires
    ///
    /// Returns the number of messages evicted.
    fn insert(&mut self, message: StatusMessage) -> usize {
        if self.capacity == 0 {
            return 0;
        }

        let mut evicted = 0;
        if self.count + 1 > self.capacity {
            evicted = self.evict_earliest();
        }

        self.buckets
            .entry(message.timestamp())
            .or_default()
            .push(message);
        self.count += 1;
        evicted
    }

    /// Remove the whole earliest bucket, returning how many messages it held
    fn evict_earliest(&mut self) -> usize {
        match self.buckets.pop_first() {
            Some((_, bucket)) => {
                self.count -= bucket.len();
                bucket.len()
            }
            None => 0,
        }
    }

    /// Messages strictly newer than `since`, oldest first
    fn since(&self, since: Timestamp) -> Vec<StatusMessage> {
        self.buckets
            .range((Bound::Excluded(since), Bound::Unbounded))
            .flat_map(|(_, bucket)| bucket.iter().cloned())
            .collect()
    }
}

/// A log registry that caches log messages for later inspection
///
/// Registration and reads are serialized by a single lock per registry. No
/// logging happens while the lock is held, so the registry can safely be fed
/// by the global logger.
pub struct CachingLogRegistry {
    index: Mutex<LogIndex>,
}

impl Default for CachingLogRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NUMBER_OF_MESSAGES)
    }
}

impl CachingLogRegistry {
    /// Create a registry keeping at most `capacity` messages
    pub fn new(capacity: usize) -> Self {
        Self {
            index: Mutex::new(LogIndex::new(capacity)),
        }
    }

    /// Create a registry with the ceiling read from `numberOfMessages`
    ///
    /// Missing or unparsable values fall back to the default ceiling; a bad
    /// value is logged as a warning rather than failing construction.
    pub fn from_config(config: &dyn ConfigSource) -> Self {
        trace!("Enter CachingLogRegistry::from_config()");
        let capacity = match config.get(NUMBER_OF_MESSAGES_KEY) {
            Some(value) if !value.trim().is_empty() => match value.trim().parse::<usize>() {
                Ok(capacity) => {
                    if capacity != DEFAULT_MAX_NUMBER_OF_MESSAGES {
                        info!("Setting number of messages kept by registry to {}", capacity);
                    }
                    capacity
                }
                Err(e) => {
                    warn!(
                        "Invalid value '{}' for '{}': {}. Falling back to {}",
                        value, NUMBER_OF_MESSAGES_KEY, e, DEFAULT_MAX_NUMBER_OF_MESSAGES
                    );
                    DEFAULT_MAX_NUMBER_OF_MESSAGES
                }
            },
            _ => DEFAULT_MAX_NUMBER_OF_MESSAGES,
        };
        Self::new(capacity)
    }

    /// Number of messages currently held
    pub fn len(&self) -> usize {
        self.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of messages held
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    fn lock(&self) -> MutexGuard<'_, LogIndex> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LogRegistry for CachingLogRegistry {
    fn register(&self, event: &LogEvent) -> Result<(), RegistryError> {
        if event.timestamp < 0 {
            return Err(RegistryError::InvalidEvent(format!(
                "timestamp {} from '{}' is negative",
                event.timestamp, event.logger_name
            )));
        }

        let message = StatusMessage::from(event);
        let evicted = {
            let mut index = self.lock();
            index.name = Some(event.logger_name.clone());
            index.insert(message)
        };

        if evicted > 0 {
            trace!("Evicted {} cached log messages", evicted);
        }
        Ok(())
    }

    fn into_surveyable(self: Arc<Self>) -> Arc<dyn Surveyable> {
        self
    }
}

impl Surveyable for CachingLogRegistry {
    /// All cached messages strictly newer than `since`, oldest first
    fn status_since(&self, since: Timestamp) -> Status {
        trace!("Enter CachingLogRegistry::status_since({})", since);
        let index = self.lock();
        let name = index.name.as_deref().unwrap_or(DEFAULT_NAME).to_string();
        Status::new(name, index.since(since))
    }
}
