use crate::config::{ConfigSource, LOGGER_NAME_KEY};
use crate::status::{now_millis, Severity, Status, StatusMessage, Timestamp};
use crate::surveyable::Surveyable;
use log::trace;
use std::sync::Arc;

/// Subject name used when `loggerName` is not configured
pub const DEFAULT_NAME: &str = "Unnamed";

/// Surveyable that always reports "Running"
///
/// Useful as a liveness signal: as long as polls are answered, the
/// application is up. The subject name is read from configuration on every
/// poll.
pub struct RunningSurveyable {
    config: Arc<dyn ConfigSource>,
}

impl RunningSurveyable {
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self { config }
    }
}

impl Surveyable for RunningSurveyable {
    fn status_since(&self, since: Timestamp) -> Status {
        trace!("Enter RunningSurveyable::status_since({})", since);
        Status::new(
            self.config.get_or(LOGGER_NAME_KEY, DEFAULT_NAME),
            vec![StatusMessage::new(
                "Running",
                Severity::Green,
                now_millis(),
                false,
            )],
        )
    }
}
