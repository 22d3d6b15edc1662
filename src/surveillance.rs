//! Wiring of the surveillance components
//!
//! [`Surveillance`] owns the configuration, the catalogs of named
//! implementations and the two singleton factories (the surveyable exposed to
//! pollers and the log registry fed by the logger). Components receive these
//! explicitly instead of looking them up globally.

use crate::config::{ConfigSource, REGISTRY_CLASS_KEY, SURVEYABLE_CLASS_KEY};
use crate::error::InstantiationError;
use crate::factory::{Catalog, SingletonFactory};
use crate::registry::{CachingLogRegistry, LogRegistry, CACHING_REGISTRY_ID};
use crate::status::{Status, Timestamp};
use crate::surveyable::combiner::COMBINER_ID;
use crate::surveyable::{RunningSurveyable, Surveyable, SurveyableCombiner, Unconfigured};
use log::{debug, trace};
use std::sync::Arc;

/// Identifier of the liveness surveyable
pub const RUNNING_ID: &str = "running";

/// Identifier of the current log registry as a surveyable
pub const LOG_ID: &str = "log";

/// The current log registry, resolved on every poll
///
/// Follows `registryClass` swaps, so polls always read the registry the
/// logger is feeding.
struct CurrentLogRegistry {
    registries: Arc<SingletonFactory<dyn LogRegistry>>,
}

impl Surveyable for CurrentLogRegistry {
    fn status_since(&self, since: Timestamp) -> Status {
        trace!("Enter CurrentLogRegistry::status_since({})", since);
        match self.registries.get() {
            Ok(registry) => registry.into_surveyable().status_since(since),
            Err(e) => {
                debug!("No log registry available: {}", e);
                Unconfigured::named(LOG_ID).status_since(since)
            }
        }
    }
}

/// The surveillance subsystem of one process
pub struct Surveillance {
    config: Arc<dyn ConfigSource>,
    /// Surveyables the combiner may be configured to survey
    members: Arc<Catalog<dyn Surveyable>>,
    /// Surveyable handed out to pollers, chosen by `surveyableClass`
    surveyables: SingletonFactory<dyn Surveyable>,
    /// Log registries the logger may be configured to feed
    registry_catalog: Arc<Catalog<dyn LogRegistry>>,
    /// Log registry fed by the logger, chosen by `registryClass`
    log_registries: Arc<SingletonFactory<dyn LogRegistry>>,
}

impl Surveillance {
    /// Build the subsystem with the built-in implementations registered
    ///
    /// Built-in members are `running` and `log`; the surveyable singleton may
    /// be `combiner` (default), `running` or `log`; the log registry may be
    /// `caching` (default). Nothing is constructed until first use.
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        let registry_catalog: Arc<Catalog<dyn LogRegistry>> = Arc::new(Catalog::new());
        {
            let config = Arc::clone(&config);
            registry_catalog.register(CACHING_REGISTRY_ID, move || {
                Ok(Arc::new(CachingLogRegistry::from_config(&*config)))
            });
        }
        let log_registries = Arc::new(SingletonFactory::new(
            Arc::clone(&config),
            REGISTRY_CLASS_KEY,
            CACHING_REGISTRY_ID,
            Arc::clone(&registry_catalog),
        ));

        let members: Arc<Catalog<dyn Surveyable>> = Arc::new(Catalog::new());
        Self::register_builtins(&members, &config, &log_registries);

        let surveyable_catalog: Arc<Catalog<dyn Surveyable>> = Arc::new(Catalog::new());
        Self::register_builtins(&surveyable_catalog, &config, &log_registries);
        {
            let config = Arc::clone(&config);
            let members = Arc::clone(&members);
            surveyable_catalog.register(COMBINER_ID, move || {
                Ok(Arc::new(SurveyableCombiner::new(
                    Arc::clone(&config),
                    Arc::clone(&members),
                )))
            });
        }
        let surveyables = SingletonFactory::new(
            Arc::clone(&config),
            SURVEYABLE_CLASS_KEY,
            COMBINER_ID,
            surveyable_catalog,
        );

        Self {
            config,
            members,
            surveyables,
            registry_catalog,
            log_registries,
        }
    }

    fn register_builtins(
        catalog: &Catalog<dyn Surveyable>,
        config: &Arc<dyn ConfigSource>,
        log_registries: &Arc<SingletonFactory<dyn LogRegistry>>,
    ) {
        let config = Arc::clone(config);
        catalog.register(RUNNING_ID, move || {
            Ok(Arc::new(RunningSurveyable::new(Arc::clone(&config))))
        });

        let log_registries = Arc::clone(log_registries);
        catalog.register(LOG_ID, move || {
            // Fail construction while no registry can be built
            log_registries.get()?;
            Ok(Arc::new(CurrentLogRegistry {
                registries: Arc::clone(&log_registries),
            }))
        });
    }

    /// Make a surveyable available to the combiner under `name`
    ///
    /// The constructor runs whenever `name` becomes configured in
    /// `surveyables`, and again after a failed attempt on each poll.
    pub fn register_member<F>(&self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> anyhow::Result<Arc<dyn Surveyable>> + Send + Sync + 'static,
    {
        self.members.register(name, constructor);
    }

    /// Make a log registry implementation selectable through `registryClass`
    pub fn register_log_registry<F>(&self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> anyhow::Result<Arc<dyn LogRegistry>> + Send + Sync + 'static,
    {
        self.registry_catalog.register(name, constructor);
    }

    /// The surveyable singleton that pollers should query
    ///
    /// # Errors
    ///
    /// Returns `InstantiationError` if the configured implementation cannot be
    /// constructed.
    pub fn surveyable(&self) -> Result<Arc<dyn Surveyable>, InstantiationError> {
        self.surveyables.get()
    }

    /// The log registry singleton fed by the logger
    pub fn log_registry(&self) -> Result<Arc<dyn LogRegistry>, InstantiationError> {
        self.log_registries.get()
    }

    /// Factory for the log registry, for wiring a [`crate::registry::RegistryAppender`]
    pub fn log_registry_factory(&self) -> Arc<SingletonFactory<dyn LogRegistry>> {
        Arc::clone(&self.log_registries)
    }

    pub fn config(&self) -> &Arc<dyn ConfigSource> {
        &self.config
    }
}
