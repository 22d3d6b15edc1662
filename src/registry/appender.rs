use crate::factory::SingletonFactory;
use crate::registry::{LogEvent, LogLevel, LogRegistry};
use crate::status::now_millis;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::cell::Cell;
use std::sync::Arc;

thread_local! {
    /// Set while this thread is registering a record
    static REGISTERING: Cell<bool> = const { Cell::new(false) };
}

/// Clears the re-entrancy flag when dropped
struct RegisteringGuard;

impl RegisteringGuard {
    /// Mark this thread as registering; `None` if it already is
    fn enter() -> Option<Self> {
        let already = REGISTERING.with(|flag| flag.replace(true));
        if already {
            None
        } else {
            Some(RegisteringGuard)
        }
    }
}

impl Drop for RegisteringGuard {
    fn drop(&mut self) {
        REGISTERING.with(|flag| flag.set(false));
    }
}

/// Logger that writes through `env_logger` and caches records in a registry
///
/// Every record is handed to the wrapped `env_logger::Logger` for console
/// output. Records at or above the capture level are additionally converted
/// into [`LogEvent`]s and registered in the log registry singleton, so they
/// can later be polled as status messages.
///
/// Records emitted while a record is being registered (for example from the
/// registry's own construction) are printed but not captured.
pub struct RegistryAppender {
    /// Console logger
    inner: env_logger::Logger,
    /// Most verbose level that is registered
    capture: LevelFilter,
    /// Source of the registry to feed
    registries: Arc<SingletonFactory<dyn LogRegistry>>,
}

impl RegistryAppender {
    /// Create an appender
    ///
    /// # Arguments
    ///
    /// * `inner` - Console logger, typically built with `env_logger::Builder`
    /// * `registries` - Factory resolving the registry to feed
    /// * `capture` - Most verbose level to register (e.g. `LevelFilter::Info`)
    pub fn new(
        inner: env_logger::Logger,
        registries: Arc<SingletonFactory<dyn LogRegistry>>,
        capture: LevelFilter,
    ) -> Self {
        Self {
            inner,
            capture,
            registries,
        }
    }

    /// Most verbose level either the console or the registry is interested in
    pub fn max_level(&self) -> LevelFilter {
        std::cmp::max(self.inner.filter(), self.capture)
    }

    /// Install this appender as the global logger
    ///
    /// # Errors
    ///
    /// Returns `SetLoggerError` if a global logger has already been set.
    pub fn install(self) -> Result<(), SetLoggerError> {
        let level = self.max_level();
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }

    /// Convert a record into a log event stamped now
    pub fn event_from_record(record: &Record<'_>) -> LogEvent {
        LogEvent::new(
            record.args().to_string(),
            LogLevel::from(record.level()),
            now_millis(),
            record.target(),
        )
    }

    fn capture_record(&self, record: &Record<'_>) {
        if record.level() > self.capture {
            return;
        }
        let Some(_guard) = RegisteringGuard::enter() else {
            return;
        };

        let event = Self::event_from_record(record);
        // Logging from here would recurse into this appender
        match self.registries.get() {
            Ok(registry) => {
                if let Err(e) = registry.register(&event) {
                    eprintln!("Failed to register log event: {}", e);
                }
            }
            Err(e) => eprintln!("No log registry available: {}", e),
        }
    }
}

impl Log for RegistryAppender {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.inner.enabled(metadata) || metadata.level() <= self.capture
    }

    fn log(&self, record: &Record<'_>) {
        self.inner.log(record);
        self.capture_record(record);
    }

    fn flush(&self) {
        self.inner.flush();
    }
}
