/// Key-value configuration store
pub mod properties;

pub use properties::Properties;

/// Parameter listing the identifiers to survey, separated by `;`
pub const SURVEYABLES_KEY: &str = "surveyables";

/// Parameter for how many log messages are kept in the log registry
pub const NUMBER_OF_MESSAGES_KEY: &str = "numberOfMessages";

/// Parameter naming the log registry implementation
pub const REGISTRY_CLASS_KEY: &str = "registryClass";

/// Parameter naming the surveyable singleton implementation
pub const SURVEYABLE_CLASS_KEY: &str = "surveyableClass";

/// Parameter naming the application reported by the running surveyable
pub const LOGGER_NAME_KEY: &str = "loggerName";

/// Separator between identifiers in the `surveyables` parameter
pub const SURVEYABLES_SEPARATOR: char = ';';

/// Source of configuration values, queried on every use
///
/// Components hold a shared reference and re-read values when they need
/// them, so changes made through the source take effect on the next poll.
pub trait ConfigSource: Send + Sync {
    /// Look up the value for `key`, `None` if unset
    fn get(&self, key: &str) -> Option<String>;

    /// Look up the value for `key`, falling back to `default` if unset
    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }
}
