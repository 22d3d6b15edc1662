/// Combiner merging many surveyables into one
pub mod combiner;
/// Surveyable that reports the application as running
pub mod running;
/// Stand-in for sources that are not configured or failed to construct
pub mod unconfigured;

pub use combiner::SurveyableCombiner;
pub use running::RunningSurveyable;
pub use unconfigured::Unconfigured;

use crate::status::{Status, Timestamp};

/// A pollable source of status information
///
/// Implementations must never fail for the "no data" case; an empty
/// [`Status`] means there is nothing to report. Message order in the result
/// is not significant, callers that need ordering impose it themselves.
#[cfg_attr(test, mockall::automock)]
pub trait Surveyable: Send + Sync {
    /// Get all status messages strictly newer than `since`
    ///
    /// `since` is measured in milliseconds since the Unix epoch. A poller
    /// should pass the newest timestamp seen in the previous result to avoid
    /// losing or repeating messages.
    fn status_since(&self, since: Timestamp) -> Status;

    /// Get all status messages; behaves exactly like `status_since(0)`
    fn status(&self) -> Status {
        self.status_since(0)
    }
}
