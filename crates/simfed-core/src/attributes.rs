//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Schema-driven attribute publication and reflection."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::binding::ObjectClassBinding;
use crate::codec::ScalarValue;
use crate::error::{FederateError, Result};
use crate::metrics::FederateMetrics;
use crate::rti::{FederationService, Handle, HandleCategory, HandleValueMap, InstanceHandle};
use crate::sink::ValueSink;

/// The object instance this federate registered.
#[derive(Debug, Clone)]
pub struct ObjectInstanceRegistration {
    instance: InstanceHandle,
    name: String,
    attributes: IndexMap<String, Handle>,
}

impl ObjectInstanceRegistration {
    pub fn instance(&self) -> InstanceHandle {
        self.instance
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute_handle(&self, name: &str) -> Option<Handle> {
        self.attributes.get(name).copied()
    }
}

/// Publishes local values as attribute updates and hands reflected values to
/// the sink.
pub struct AttributeExchange {
    service: Arc<dyn FederationService>,
    class: ObjectClassBinding,
    registration: OnceCell<ObjectInstanceRegistration>,
    remote: RwLock<HashMap<InstanceHandle, String>>,
    sink: Arc<dyn ValueSink>,
    metrics: Arc<FederateMetrics>,
}

impl AttributeExchange {
    pub fn new(
        service: Arc<dyn FederationService>,
        class: ObjectClassBinding,
        sink: Arc<dyn ValueSink>,
        metrics: Arc<FederateMetrics>,
    ) -> Self {
        Self {
            service,
            class,
            registration: OnceCell::new(),
            remote: RwLock::new(HashMap::new()),
            sink,
            metrics,
        }
    }

    pub fn class(&self) -> &ObjectClassBinding {
        &self.class
    }

    /// Publish every bound attribute and, if configured, subscribe to them.
    pub fn declare(&self) -> Result<()> {
        let handles = self.class.attributes().handles();
        self.service
            .publish_object_class_attributes(self.class.handle(), &handles)
            .map_err(FederateError::service("publish_object_class_attributes"))?;
        if self.class.subscribe() {
            self.service
                .subscribe_object_class_attributes(self.class.handle(), &handles)
                .map_err(FederateError::service("subscribe_object_class_attributes"))?;
        }
        debug!(class = self.class.name(), attributes = handles.len(), "object class declared");
        Ok(())
    }

    /// Register the object instance under an already reserved name.
    pub fn register(&self, instance_name: &str) -> Result<&ObjectInstanceRegistration> {
        if let Some(existing) = self.registration.get() {
            return Err(FederateError::AlreadyRegistered {
                name: existing.name.clone(),
            });
        }
        let instance = self
            .service
            .register_object_instance(self.class.handle(), instance_name)
            .map_err(FederateError::service("register_object_instance"))?;
        let registration = ObjectInstanceRegistration {
            instance,
            name: instance_name.to_owned(),
            attributes: self
                .class
                .attributes()
                .iter()
                .map(|binding| (binding.name().to_owned(), binding.handle()))
                .collect(),
        };
        if self.registration.set(registration).is_err() {
            return Err(FederateError::AlreadyRegistered {
                name: instance_name.to_owned(),
            });
        }
        info!(instance = %instance, name = instance_name, class = self.class.name(), "object instance registered");
        self.registration
            .get()
            .ok_or(FederateError::NotRegistered)
    }

    pub fn registration(&self) -> Option<&ObjectInstanceRegistration> {
        self.registration.get()
    }

    /// Encode `values` and send them as one attribute update.
    ///
    /// Undeclared or unencodable entries are logged and skipped; the rest are
    /// still sent. Returns the number of attributes in the update.
    pub fn publish<I, K>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, ScalarValue)>,
        K: AsRef<str>,
    {
        let registration = self.registration.get().ok_or(FederateError::NotRegistered)?;
        let mut encoded = HandleValueMap::new();
        for (name, value) in values {
            let name = name.as_ref();
            let Some(binding) = self.class.attributes().get(name) else {
                warn!(attribute = name, class = self.class.name(), "attribute not in schema; skipped");
                self.metrics.observe_attribute_skipped();
                continue;
            };
            match binding.encode(&value) {
                Ok(raw) => {
                    encoded.insert(binding.handle(), raw);
                }
                Err(err) => {
                    warn!(attribute = name, error = %err, "attribute skipped");
                    self.metrics.observe_attribute_skipped();
                }
            }
        }
        if encoded.is_empty() {
            debug!(instance = %registration.instance, "nothing to publish");
            return Ok(0);
        }
        self.service
            .update_attribute_values(registration.instance, &encoded)
            .map_err(FederateError::service("update_attribute_values"))?;
        self.metrics.observe_update_sent();
        debug!(instance = %registration.instance, attributes = encoded.len(), "attribute update sent");
        Ok(encoded.len())
    }

    /// Decode one reflected attribute and deliver it to the sink.
    pub fn reflect_attribute(&self, handle: Handle, raw: &[u8]) -> Result<ScalarValue> {
        let binding =
            self.class
                .attributes()
                .by_handle(handle)
                .ok_or_else(|| FederateError::UnknownName {
                    category: HandleCategory::Attribute,
                    name: handle.to_string(),
                })?;
        let value = binding.decode(raw)?;
        self.sink.on_attribute_value(binding.name(), &value);
        self.metrics.observe_attribute_reflected();
        Ok(value)
    }

    /// Process a whole reflection; failures affect only their own attribute.
    /// Returns how many values reached the sink.
    pub fn on_reflect(&self, instance: InstanceHandle, values: &HandleValueMap) -> usize {
        let source = self.remote.read().get(&instance).cloned();
        let mut delivered = 0;
        for (handle, raw) in values {
            match self.reflect_attribute(*handle, raw) {
                Ok(_) => delivered += 1,
                Err(err) => {
                    warn!(
                        instance = %instance,
                        source = source.as_deref().unwrap_or("undiscovered"),
                        error = %err,
                        "reflected attribute skipped"
                    );
                    self.metrics.observe_attribute_skipped();
                }
            }
        }
        delivered
    }

    pub fn on_discover(&self, instance: InstanceHandle, class: Handle, name: &str) {
        if class != self.class.handle() {
            debug!(instance = %instance, class = %class, name, "discovered instance of another class");
        }
        self.remote.write().insert(instance, name.to_owned());
        info!(instance = %instance, name, "remote object instance discovered");
    }

    pub fn on_remove(&self, instance: InstanceHandle) {
        match self.remote.write().remove(&instance) {
            Some(name) => info!(instance = %instance, name = %name, "remote object instance removed"),
            None => debug!(instance = %instance, "removal of unknown instance ignored"),
        }
    }

    /// Names of remote instances currently known.
    pub fn remote_instances(&self) -> Vec<(InstanceHandle, String)> {
        let mut known: Vec<_> = self
            .remote
            .read()
            .iter()
            .map(|(handle, name)| (*handle, name.clone()))
            .collect();
        known.sort_by_key(|(handle, _)| *handle);
        known
    }
}
