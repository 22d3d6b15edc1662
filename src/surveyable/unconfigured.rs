use crate::status::{now_millis, Severity, Status, StatusMessage, Timestamp};
use crate::surveyable::Surveyable;
use log::trace;

/// Default subject name when no identifier is given
pub const DEFAULT_NAME: &str = "Unconfigured";

/// Identifier under which the stand-in may appear in configuration
///
/// It is never constructed from configuration; the combiner filters it out.
pub const UNCONFIGURED_ID: &str = "unconfigured";

/// Text reported by every stand-in
pub const NOT_CONFIGURED_TEXT: &str = "Surveillance has not been configured";

/// A surveyable signalling that surveillance is not set up
///
/// Used when nothing is configured, and in place of a configured source that
/// could not be constructed. In the latter case the stand-in carries the
/// source's identifier so later polls can tell which source is still failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unconfigured {
    name: String,
}

impl Default for Unconfigured {
    fn default() -> Self {
        Self::new()
    }
}

impl Unconfigured {
    /// Stand-in with the default name
    pub fn new() -> Self {
        Self::named(DEFAULT_NAME)
    }

    /// Stand-in for the source with the given identifier
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_NAME
    }
}

impl Surveyable for Unconfigured {
    /// Always a single red message stamped now; `since` is ignored
    fn status_since(&self, since: Timestamp) -> Status {
        trace!("Enter Unconfigured::status_since({})", since);
        Status::new(
            self.name.clone(),
            vec![StatusMessage::new(
                NOT_CONFIGURED_TEXT,
                Severity::Red,
                now_millis(),
                false,
            )],
        )
    }
}
