//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Outbound interaction encoding and inbound dispatch by name."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::binding::InteractionBinding;
use crate::codec::ScalarValue;
use crate::error::{FederateError, Result};
use crate::metrics::FederateMetrics;
use crate::rti::{FederationService, Handle, HandleCategory, HandleValueMap};

/// A decoded inbound interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub name: String,
    pub parameters: IndexMap<String, ScalarValue>,
}

impl InboundMessage {
    pub fn parameter(&self, name: &str) -> Option<&ScalarValue> {
        self.parameters.get(name)
    }
}

/// Callback for one interaction class. Runs on the federation callback
/// thread and must not block.
pub type InteractionHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

pub struct InteractionRouter {
    service: Arc<dyn FederationService>,
    bindings: IndexMap<String, InteractionBinding>,
    by_handle: HashMap<Handle, usize>,
    handlers: RwLock<HashMap<String, InteractionHandler>>,
    metrics: Arc<FederateMetrics>,
}

impl InteractionRouter {
    pub fn new(
        service: Arc<dyn FederationService>,
        bindings: IndexMap<String, InteractionBinding>,
        metrics: Arc<FederateMetrics>,
    ) -> Self {
        let by_handle = bindings
            .values()
            .enumerate()
            .map(|(index, binding)| (binding.handle(), index))
            .collect();
        Self {
            service,
            bindings,
            by_handle,
            handlers: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    pub fn binding(&self, name: &str) -> Option<&InteractionBinding> {
        self.bindings.get(name)
    }

    /// Publish and subscribe interaction classes as the schema asks.
    pub fn declare(&self) -> Result<()> {
        for binding in self.bindings.values() {
            if binding.publish() {
                self.service
                    .publish_interaction_class(binding.handle())
                    .map_err(FederateError::service("publish_interaction_class"))?;
            }
            if binding.subscribe() {
                self.service
                    .subscribe_interaction_class(binding.handle())
                    .map_err(FederateError::service("subscribe_interaction_class"))?;
            }
            debug!(
                interaction = binding.name(),
                publish = binding.publish(),
                subscribe = binding.subscribe(),
                "interaction class declared"
            );
        }
        Ok(())
    }

    /// Register the handler for `name`, replacing any earlier one.
    pub fn on<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let binding = self.binding(name).ok_or_else(|| FederateError::UnknownName {
            category: HandleCategory::InteractionClass,
            name: name.to_owned(),
        })?;
        if !binding.subscribe() {
            warn!(interaction = name, "handler registered for an interaction that is not subscribed");
        }
        self.handlers
            .write()
            .insert(name.to_owned(), Arc::new(handler));
        Ok(())
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// Encode `parameters` and send the interaction.
    ///
    /// Undeclared or unencodable parameters are logged and left out.
    pub fn send<I, K>(&self, name: &str, parameters: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, ScalarValue)>,
        K: AsRef<str>,
    {
        let binding = self.binding(name).ok_or_else(|| FederateError::UnknownName {
            category: HandleCategory::InteractionClass,
            name: name.to_owned(),
        })?;
        let mut encoded = HandleValueMap::new();
        for (parameter, value) in parameters {
            let parameter = parameter.as_ref();
            let Some(field) = binding.parameters().get(parameter) else {
                warn!(interaction = name, parameter, "parameter not in schema; skipped");
                continue;
            };
            match field.encode(&value) {
                Ok(raw) => {
                    encoded.insert(field.handle(), raw);
                }
                Err(err) => warn!(interaction = name, parameter, error = %err, "parameter skipped"),
            }
        }
        self.service
            .send_interaction(binding.handle(), &encoded)
            .map_err(FederateError::service("send_interaction"))?;
        self.metrics.observe_interaction_sent();
        debug!(interaction = name, parameters = encoded.len(), "interaction sent");
        Ok(encoded.len())
    }

    /// Decode an inbound interaction without dispatching it.
    pub fn decode(&self, class: Handle, raw: &HandleValueMap) -> Option<InboundMessage> {
        let Some(binding) = self
            .by_handle
            .get(&class)
            .and_then(|index| self.bindings.get_index(*index))
            .map(|(_, binding)| binding)
        else {
            debug!(class = %class, "interaction of undeclared class ignored");
            return None;
        };
        let mut parameters = IndexMap::with_capacity(raw.len());
        for (handle, bytes) in raw {
            let Some(field) = binding.parameters().by_handle(*handle) else {
                debug!(interaction = binding.name(), parameter = %handle, "undeclared parameter ignored");
                continue;
            };
            match field.decode(bytes) {
                Ok(value) => {
                    parameters.insert(field.name().to_owned(), value);
                }
                Err(err) => {
                    warn!(interaction = binding.name(), error = %err, "parameter skipped")
                }
            }
        }
        Some(InboundMessage {
            name: binding.name().to_owned(),
            parameters,
        })
    }

    /// Decode and dispatch. Returns whether a handler ran.
    pub fn on_receive(&self, class: Handle, raw: &HandleValueMap) -> bool {
        match self.decode(class, raw) {
            Some(message) => {
                self.metrics.observe_interaction_received();
                self.dispatch(&message)
            }
            None => false,
        }
    }

    /// Hand `message` to its handler, or log and drop it.
    pub fn dispatch(&self, message: &InboundMessage) -> bool {
        let handler = self.handlers.read().get(&message.name).cloned();
        match handler {
            Some(handler) => {
                handler(message);
                true
            }
            None => {
                info!(
                    interaction = %message.name,
                    parameters = message.parameters.len(),
                    "no handler registered; interaction dropped"
                );
                self.metrics.observe_interaction_dropped();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandleRegistry;
    use crate::test_support::RecordingService;
    use simfed_common::{InteractionConfig, ObjectClassConfig, SchemaConfig, ValueType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn router() -> (Arc<RecordingService>, InteractionRouter) {
        let service = RecordingService::new();
        let schema = SchemaConfig {
            object_class: ObjectClassConfig {
                name: "HLAobjectRoot.Station".into(),
                instance_name: "Scenario_X".into(),
                subscribe: false,
                attributes: IndexMap::from([("WIP".to_owned(), ValueType::Int32)]),
            },
            interactions: IndexMap::from([
                ("Start".to_owned(), InteractionConfig::default()),
                (
                    "Breakdown".to_owned(),
                    InteractionConfig {
                        parameters: IndexMap::from([
                            ("Machine".to_owned(), ValueType::Text),
                            ("Minutes".to_owned(), ValueType::Int32),
                        ]),
                        publish: true,
                        subscribe: false,
                    },
                ),
            ]),
        };
        let registry = HandleRegistry::populate(service.as_ref(), &schema).expect("registry");
        let bindings = schema
            .interactions
            .iter()
            .map(|(name, config)| {
                let binding =
                    InteractionBinding::from_config(name, config, &registry).expect("binding");
                (name.clone(), binding)
            })
            .collect();
        let router = InteractionRouter::new(service.clone(), bindings, Arc::new(FederateMetrics::new()));
        (service, router)
    }

    #[test]
    fn declare_follows_flags() {
        let (service, router) = router();
        router.declare().expect("declared");
        assert_eq!(service.count("publish_interaction_class"), 2);
        assert_eq!(service.count("subscribe_interaction_class"), 1);
    }

    #[test]
    fn send_encodes_declared_parameters() {
        let (service, router) = router();
        let sent = router
            .send(
                "Breakdown",
                [
                    ("Machine", ScalarValue::from("lathe")),
                    ("Minutes", ScalarValue::Int32(12)),
                    ("Operator", ScalarValue::from("ignored")),
                ],
            )
            .expect("sent");
        assert_eq!(sent, 2);
        assert_eq!(service.interactions.lock().len(), 1);
    }

    #[test]
    fn unknown_interaction_cannot_be_sent() {
        let (_, router) = router();
        let err = router
            .send("Shutdown", Vec::<(&str, ScalarValue)>::new())
            .expect_err("undeclared");
        assert!(matches!(
            err,
            FederateError::UnknownName {
                category: HandleCategory::InteractionClass,
                ..
            }
        ));
    }

    #[test]
    fn inbound_interaction_reaches_its_handler() {
        let (service, router) = router();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        router
            .on("Breakdown", move |message| {
                assert_eq!(
                    message.parameter("Minutes"),
                    Some(&ScalarValue::Int32(12))
                );
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .expect("handler");

        router
            .send(
                "Breakdown",
                [
                    ("Machine", ScalarValue::from("lathe")),
                    ("Minutes", ScalarValue::Int32(12)),
                ],
            )
            .expect("sent");
        let (class, raw) = service.interactions.lock()[0].clone();
        assert!(router.on_receive(class, &raw));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unhandled_interaction_is_dropped_quietly() {
        let (service, router) = router();
        let start = service
            .handle_of(HandleCategory::InteractionClass, "Start")
            .expect("resolved");
        assert!(!router.on_receive(start, &HandleValueMap::new()));
        assert_eq!(router.metrics.snapshot().interactions_dropped, 1);
        assert_eq!(router.metrics.snapshot().interactions_received, 1);
    }

    #[test]
    fn handler_for_undeclared_interaction_is_refused() {
        let (_, router) = router();
        assert!(router.on("Shutdown", |_| {}).is_err());
        assert!(!router.has_handler("Shutdown"));
    }
}
