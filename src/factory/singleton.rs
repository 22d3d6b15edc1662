use crate::config::ConfigSource;
use crate::error::InstantiationError;
use crate::factory::Catalog;
use log::{info, trace};
use std::sync::{Arc, Mutex, MutexGuard};

/// The installed instance together with the identifier it was built from
struct Installed<T: ?Sized> {
    implementation: String,
    instance: Arc<T>,
}

/// Process-wide holder of one lazily constructed implementation
///
/// The implementation is chosen by the configuration value under `key`
/// (falling back to a default). The instance is created on first access and
/// replaced, never mutated, whenever the configured identifier changes.
///
/// Construction runs without holding the lock; installation is a
/// compare-and-swap, so concurrent first accesses end up sharing a single
/// installed instance and constructors are free to log (and thereby re-enter
/// the factory) without deadlocking.
pub struct SingletonFactory<T: ?Sized> {
    config: Arc<dyn ConfigSource>,
    key: &'static str,
    default_implementation: String,
    catalog: Arc<Catalog<T>>,
    current: Mutex<Option<Installed<T>>>,
}

impl<T: ?Sized> SingletonFactory<T> {
    /// Create a factory choosing from `catalog` by the configuration `key`
    pub fn new(
        config: Arc<dyn ConfigSource>,
        key: &'static str,
        default_implementation: impl Into<String>,
        catalog: Arc<Catalog<T>>,
    ) -> Self {
        Self {
            config,
            key,
            default_implementation: default_implementation.into(),
            catalog,
            current: Mutex::new(None),
        }
    }

    /// Get the singleton instance, constructing or replacing it if needed
    ///
    /// # Errors
    ///
    /// Returns `InstantiationError` if the configured implementation is unknown
    /// or cannot be constructed. There is no fallback instance.
    pub fn get(&self) -> Result<Arc<T>, InstantiationError> {
        trace!("Enter SingletonFactory::get() for '{}'", self.key);
        let implementation = self.configured_implementation();

        if let Some(installed) = self.lock().as_ref() {
            if installed.implementation == implementation {
                return Ok(Arc::clone(&installed.instance));
            }
        }

        info!("Initializing singleton '{}' for '{}'", implementation, self.key);
        let created = self.catalog.create(&implementation)?;

        let mut current = self.lock();
        if let Some(installed) = current.as_ref() {
            if installed.implementation == implementation {
                // Another caller installed the same implementation meanwhile
                return Ok(Arc::clone(&installed.instance));
            }
        }
        *current = Some(Installed {
            implementation,
            instance: Arc::clone(&created),
        });
        Ok(created)
    }

    /// Identifier of the currently installed instance, if any
    pub fn current_implementation(&self) -> Option<String> {
        self.lock()
            .as_ref()
            .map(|installed| installed.implementation.clone())
    }

    /// Identifier that the next `get` will use
    pub fn configured_implementation(&self) -> String {
        match self.config.get(self.key) {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => self.default_implementation.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Installed<T>>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
