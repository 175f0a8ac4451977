//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Name to handle resolution, populated once during setup."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
use std::collections::HashMap;

use simfed_common::SchemaConfig;
use tracing::{debug, info};

use crate::error::{FederateError, Result};
use crate::rti::{FederationService, Handle, HandleCategory, ServiceError};

/// Resolves names through the federation service and caches the result.
///
/// Only exists during connection setup; [`HandleRegistryBuilder::freeze`]
/// turns it into the immutable [`HandleRegistry`] the runtime reads from.
pub struct HandleRegistryBuilder<'a> {
    service: &'a dyn FederationService,
    entries: HashMap<(HandleCategory, String), Handle>,
}

impl<'a> HandleRegistryBuilder<'a> {
    pub fn new(service: &'a dyn FederationService) -> Self {
        Self {
            service,
            entries: HashMap::new(),
        }
    }

    /// Resolve `name`, hitting the service only on the first lookup.
    pub fn resolve(&mut self, category: HandleCategory, name: &str) -> Result<Handle> {
        if let Some(handle) = self.entries.get(&(category, name.to_owned())) {
            return Ok(*handle);
        }
        let handle = self
            .service
            .resolve_handle(category, name)
            .map_err(|err| match err {
                ServiceError::NameNotFound(_) => FederateError::UnknownName {
                    category,
                    name: name.to_owned(),
                },
                other => FederateError::service("resolve_handle")(other),
            })?;
        debug!(%category, name, %handle, "resolved handle");
        self.entries.insert((category, name.to_owned()), handle);
        Ok(handle)
    }

    /// Resolve every name the schema refers to.
    pub fn resolve_schema(&mut self, schema: &SchemaConfig) -> Result<()> {
        let class = &schema.object_class;
        self.resolve(HandleCategory::ObjectClass, &class.name)?;
        for attribute in class.attributes.keys() {
            self.resolve(HandleCategory::Attribute, attribute)?;
        }
        for (interaction, config) in &schema.interactions {
            self.resolve(HandleCategory::InteractionClass, interaction)?;
            for parameter in config.parameters.keys() {
                self.resolve(HandleCategory::Parameter, parameter)?;
            }
        }
        Ok(())
    }

    pub fn freeze(self) -> HandleRegistry {
        let reverse = self
            .entries
            .iter()
            .map(|((category, name), handle)| ((*category, *handle), name.clone()))
            .collect();
        HandleRegistry {
            forward: self.entries,
            reverse,
        }
    }
}

/// Immutable name/handle mapping for the life of a session.
#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    forward: HashMap<(HandleCategory, String), Handle>,
    reverse: HashMap<(HandleCategory, Handle), String>,
}

impl HandleRegistry {
    /// Build a registry holding every handle `schema` needs.
    pub fn populate(service: &dyn FederationService, schema: &SchemaConfig) -> Result<Self> {
        let mut builder = HandleRegistryBuilder::new(service);
        builder.resolve_schema(schema)?;
        let registry = builder.freeze();
        info!(
            service = service.name(),
            handles = registry.len(),
            "handle registry populated"
        );
        Ok(registry)
    }

    /// Look up a cached handle. Names not resolved during setup are unknown.
    pub fn resolve(&self, category: HandleCategory, name: &str) -> Result<Handle> {
        self.forward
            .get(&(category, name.to_owned()))
            .copied()
            .ok_or_else(|| FederateError::UnknownName {
                category,
                name: name.to_owned(),
            })
    }

    pub fn name_of(&self, category: HandleCategory, handle: Handle) -> Option<&str> {
        self.reverse.get(&(category, handle)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingService;

    #[test]
    fn builder_caches_lookups() {
        let service = RecordingService::new();
        let mut builder = HandleRegistryBuilder::new(service.as_ref());
        let first = builder
            .resolve(HandleCategory::Attribute, "WIP")
            .expect("resolves");
        let second = builder
            .resolve(HandleCategory::Attribute, "WIP")
            .expect("cached");
        assert_eq!(first, second);
        assert_eq!(service.count("resolve_handle"), 1);

        let registry = builder.freeze();
        assert_eq!(
            registry.resolve(HandleCategory::Attribute, "WIP").ok(),
            Some(first)
        );
        assert_eq!(registry.name_of(HandleCategory::Attribute, first), Some("WIP"));
    }

    #[test]
    fn unrecognised_name_is_unknown_name_error() {
        let service = RecordingService::new();
        service.forget("Throughput");
        let mut builder = HandleRegistryBuilder::new(service.as_ref());
        let err = builder
            .resolve(HandleCategory::Attribute, "Throughput")
            .expect_err("unknown");
        assert!(matches!(
            err,
            FederateError::UnknownName { category: HandleCategory::Attribute, ref name } if name == "Throughput"
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn frozen_registry_never_calls_the_service() {
        let service = RecordingService::new();
        let registry = HandleRegistryBuilder::new(service.as_ref()).freeze();
        assert!(registry.is_empty());
        assert!(registry
            .resolve(HandleCategory::ObjectClass, "HLAobjectRoot.Station")
            .is_err());
        assert_eq!(service.count("resolve_handle"), 0);
    }

    #[test]
    fn categories_are_separate_namespaces() {
        let service = RecordingService::new();
        let mut builder = HandleRegistryBuilder::new(service.as_ref());
        let attribute = builder
            .resolve(HandleCategory::Attribute, "Reason")
            .expect("attribute");
        let parameter = builder
            .resolve(HandleCategory::Parameter, "Reason")
            .expect("parameter");
        assert_ne!(attribute, parameter);
    }
}
