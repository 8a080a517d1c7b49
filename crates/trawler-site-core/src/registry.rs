//! Process-wide definition and driver registries.
//!
//! Both registries are populated by startup registration and read-mostly
//! afterwards. Re-registering the identical entry is a no-op; registering a
//! *different* entry under an existing key is a programmer error and panics.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use tracing::error;

use crate::definition::{DefinitionError, SiteDefinition};
use crate::error::{SiteError, SiteResult};
use crate::model::SiteSchema;
use crate::service::{DriverContext, SiteDriver};

static DEFINITIONS: Lazy<DefinitionRegistry> = Lazy::new(DefinitionRegistry::default);
static DRIVERS: Lazy<DriverRegistry> = Lazy::new(DriverRegistry::default);

/// Shared handle to the process-wide definition registry.
#[must_use]
pub fn definition_registry() -> &'static DefinitionRegistry {
    &DEFINITIONS
}

/// Shared handle to the process-wide driver registry.
#[must_use]
pub fn driver_registry() -> &'static DriverRegistry {
    &DRIVERS
}

/// Mapping from site id to its immutable declarative definition.
#[derive(Default)]
pub struct DefinitionRegistry {
    inner: RwLock<HashMap<String, Arc<SiteDefinition>>>,
}

impl DefinitionRegistry {
    /// Register a validated definition.
    ///
    /// Registering the same `Arc` twice is a no-op. Registering a different
    /// definition under an existing id panics: definitions are static data
    /// and a conflict is a bug in the definition modules.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] when the definition fails validation.
    ///
    /// # Panics
    ///
    /// Panics on a conflicting re-registration.
    pub fn register(&self, definition: Arc<SiteDefinition>) -> Result<(), DefinitionError> {
        definition.validate()?;
        let mut inner = self.inner.write().expect("definition registry poisoned");
        if let Some(existing) = inner.get(&definition.id) {
            if Arc::ptr_eq(existing, &definition) {
                return Ok(());
            }
            error!(site = %definition.id, "conflicting site definition registration");
            panic!(
                "conflicting registration for site definition '{}'",
                definition.id
            );
        }
        inner.insert(definition.id.clone(), definition);
        Ok(())
    }

    /// Definition by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<SiteDefinition>> {
        self.inner
            .read()
            .expect("definition registry poisoned")
            .get(id)
            .cloned()
    }

    /// Definition by id or any of its aliases (case-insensitive).
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<SiteDefinition>> {
        let inner = self.inner.read().expect("definition registry poisoned");
        if let Some(definition) = inner.get(name) {
            return Some(Arc::clone(definition));
        }
        inner
            .values()
            .find(|definition| {
                definition
                    .aliases
                    .iter()
                    .any(|alias| alias.eq_ignore_ascii_case(name))
            })
            .cloned()
    }

    /// Every registered definition, in unspecified order.
    #[must_use]
    pub fn get_all(&self) -> Vec<Arc<SiteDefinition>> {
        self.inner
            .read()
            .expect("definition registry poisoned")
            .values()
            .cloned()
            .collect()
    }
}

/// Constructor signature registered per schema.
pub type DriverConstructor = fn(DriverContext) -> SiteResult<Arc<dyn SiteDriver>>;

/// Mapping from schema to driver constructor.
#[derive(Default)]
pub struct DriverRegistry {
    inner: RwLock<HashMap<SiteSchema, DriverConstructor>>,
}

impl DriverRegistry {
    /// Register a constructor for `schema`.
    ///
    /// Re-registering the identical function is a no-op; a different
    /// constructor for an already-registered schema panics.
    ///
    /// # Panics
    ///
    /// Panics on a conflicting re-registration.
    pub fn register(&self, schema: SiteSchema, constructor: DriverConstructor) {
        let mut inner = self.inner.write().expect("driver registry poisoned");
        if let Some(existing) = inner.get(&schema) {
            if std::ptr::fn_addr_eq(*existing, constructor) {
                return;
            }
            error!(%schema, "conflicting driver registration");
            panic!("conflicting driver registration for schema '{schema}'");
        }
        inner.insert(schema, constructor);
    }

    /// Instantiate a driver for `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::SiteNotFound`] when no constructor is
    /// registered, or the constructor's own error.
    pub fn create(&self, schema: SiteSchema, context: DriverContext) -> SiteResult<Arc<dyn SiteDriver>> {
        let constructor = {
            self.inner
                .read()
                .expect("driver registry poisoned")
                .get(&schema)
                .copied()
        };
        let Some(constructor) = constructor else {
            return Err(SiteError::SiteNotFound {
                site: schema.to_string(),
            });
        };
        constructor(context)
    }

    /// Schemas with a registered constructor.
    #[must_use]
    pub fn schemas(&self) -> Vec<SiteSchema> {
        self.inner
            .read()
            .expect("driver registry poisoned")
            .keys()
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(id: &str) -> Arc<SiteDefinition> {
        Arc::new(SiteDefinition {
            aliases: vec!["Demo Tracker".to_string()],
            ..SiteDefinition::new(
                id,
                "Demo",
                SiteSchema::Gazelle,
                &["https://demo.example.org"],
            )
        })
    }

    #[test]
    fn registered_definitions_are_shared_by_pointer() {
        let registry = DefinitionRegistry::default();
        let def = definition("regdemo");
        registry.register(Arc::clone(&def)).expect("register");
        let fetched = registry.get("regdemo").expect("lookup");
        assert!(Arc::ptr_eq(&fetched, &def));
        assert!(
            registry
                .get_all()
                .iter()
                .any(|candidate| Arc::ptr_eq(candidate, &def))
        );
    }

    #[test]
    fn identical_reregistration_is_a_noop() {
        let registry = DefinitionRegistry::default();
        let def = definition("noopdemo");
        registry.register(Arc::clone(&def)).expect("first");
        registry.register(Arc::clone(&def)).expect("second");
        assert_eq!(registry.get_all().len(), 1);
    }

    #[test]
    #[should_panic(expected = "conflicting registration")]
    fn conflicting_reregistration_panics() {
        let registry = DefinitionRegistry::default();
        registry.register(definition("conflict")).expect("first");
        registry.register(definition("conflict")).expect("second");
    }

    #[test]
    fn aliases_resolve_case_insensitively() {
        let registry = DefinitionRegistry::default();
        let def = definition("aliasdemo");
        registry.register(Arc::clone(&def)).expect("register");
        let resolved = registry.resolve("demo tracker").expect("alias lookup");
        assert!(Arc::ptr_eq(&resolved, &def));
        assert!(registry.resolve("unknown").is_none());
    }

    #[test]
    fn missing_driver_schema_maps_to_not_found() {
        let registry = DriverRegistry::default();
        let context = DriverContext {
            definition: definition("ctx"),
            config: crate::config::SiteConfig::new(SiteSchema::Gazelle, "ctx"),
            http: Arc::new(NoopExecutor),
        };
        assert!(matches!(
            registry.create(SiteSchema::Gazelle, context),
            Err(SiteError::SiteNotFound { .. })
        ));
    }

    struct NoopExecutor;

    #[async_trait::async_trait]
    impl crate::service::HttpExecutor for NoopExecutor {
        async fn execute(
            &self,
            _site: &str,
            _request: crate::service::DriverRequest,
        ) -> SiteResult<crate::service::DriverResponse> {
            Err(SiteError::NoUrls {
                site: "noop".into(),
            })
        }
    }
}
