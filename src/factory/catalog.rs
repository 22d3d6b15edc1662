use crate::error::InstantiationError;
use log::trace;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

/// Constructor producing a fresh instance of an implementation
pub type Constructor<T> = Arc<dyn Fn() -> anyhow::Result<Arc<T>> + Send + Sync>;

/// Table of named implementations
///
/// Maps configuration identifiers to constructor closures, so the
/// implementation to use can be chosen by a configuration string. Entries may
/// be registered at any time and take effect on the next `create`.
pub struct Catalog<T: ?Sized> {
    constructors: RwLock<HashMap<String, Constructor<T>>>,
}

impl<T: ?Sized> Default for Catalog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Catalog<T> {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            constructors: RwLock::new(HashMap::new()),
        }
    }

    /// Register a constructor under `name`, replacing any previous one
    pub fn register<F>(&self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        let mut constructors = self.constructors.write().unwrap_or_else(|e| e.into_inner());
        constructors.insert(name.into(), Arc::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        let constructors = self.constructors.read().unwrap_or_else(|e| e.into_inner());
        constructors.contains_key(name)
    }

    /// Registered identifiers, sorted
    pub fn names(&self) -> Vec<String> {
        let constructors = self.constructors.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct a new instance of the implementation registered as `name`
    ///
    /// The catalog lock is released before the constructor runs, so
    /// constructors may themselves use the catalog.
    ///
    /// # Errors
    ///
    /// * `UnknownImplementation` if nothing is registered under `name`
    /// * `ConstructionFailed` if the constructor returns an error
    /// * `Panicked` if the constructor panics
    pub fn create(&self, name: &str) -> Result<Arc<T>, InstantiationError> {
        trace!("Enter Catalog::create('{}')", name);
        let constructor = {
            let constructors = self.constructors.read().unwrap_or_else(|e| e.into_inner());
            constructors.get(name).cloned()
        }
        .ok_or_else(|| InstantiationError::UnknownImplementation(name.to_string()))?;

        match panic::catch_unwind(AssertUnwindSafe(|| constructor())) {
            Ok(Ok(instance)) => Ok(instance),
            Ok(Err(e)) => Err(InstantiationError::ConstructionFailed {
                name: name.to_string(),
                reason: format!("{:#}", e),
            }),
            Err(payload) => Err(InstantiationError::Panicked {
                name: name.to_string(),
                reason: panic_message(payload.as_ref()),
            }),
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
