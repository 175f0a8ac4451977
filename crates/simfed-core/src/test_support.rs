//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "test"
//! fed_description: "Recording federation service for in-crate unit tests."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::rti::{
    FederateAmbassador, FederationService, Handle, HandleCategory, HandleValueMap, InstanceHandle,
    LogicalTime, ServiceError, ServiceResult,
};

/// Records every call and never delivers callbacks on its own; tests drive
/// the callback side directly.
#[derive(Default)]
pub(crate) struct RecordingService {
    calls: Mutex<Vec<String>>,
    handles: Mutex<HashMap<(HandleCategory, String), Handle>>,
    unknown: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<&'static str>>,
    pub(crate) updates: Mutex<Vec<(InstanceHandle, HandleValueMap)>>,
    pub(crate) interactions: Mutex<Vec<(Handle, HandleValueMap)>>,
    ambassador: Mutex<Option<Arc<dyn FederateAmbassador>>>,
}

impl RecordingService {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn forget(&self, name: &str) {
        self.unknown.lock().insert(name.to_owned());
    }

    pub(crate) fn fail(&self, call: &'static str) {
        self.failing.lock().insert(call);
    }

    pub(crate) fn heal(&self, call: &'static str) {
        self.failing.lock().remove(call);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == call).count()
    }

    pub(crate) fn handle_of(&self, category: HandleCategory, name: &str) -> Option<Handle> {
        self.handles.lock().get(&(category, name.to_owned())).copied()
    }

    fn record(&self, call: &'static str) -> ServiceResult<()> {
        self.calls.lock().push(call.to_owned());
        if self.failing.lock().contains(call) {
            return Err(ServiceError::Rejected(format!("{call} refused by test")));
        }
        Ok(())
    }
}

impl FederationService for RecordingService {
    fn name(&self) -> &str {
        "recording"
    }

    fn connect(&self, _host: &str, ambassador: Arc<dyn FederateAmbassador>) -> ServiceResult<()> {
        self.record("connect")?;
        *self.ambassador.lock() = Some(ambassador);
        Ok(())
    }

    fn join(&self, _: &str, _: &str, _: Option<&str>) -> ServiceResult<()> {
        self.record("join")
    }

    fn resign(&self) -> ServiceResult<()> {
        self.record("resign")
    }

    fn disconnect(&self) -> ServiceResult<()> {
        self.record("disconnect")?;
        self.ambassador.lock().take();
        Ok(())
    }

    fn resolve_handle(&self, category: HandleCategory, name: &str) -> ServiceResult<Handle> {
        self.record("resolve_handle")?;
        if self.unknown.lock().contains(name) {
            return Err(ServiceError::NameNotFound(name.to_owned()));
        }
        let mut handles = self.handles.lock();
        let next = Handle::new(handles.len() as u64 + 1);
        Ok(*handles.entry((category, name.to_owned())).or_insert(next))
    }

    fn reserve_object_instance_name(&self, _name: &str) -> ServiceResult<()> {
        self.record("reserve_object_instance_name")
    }

    fn register_object_instance(&self, _: Handle, _: &str) -> ServiceResult<InstanceHandle> {
        self.record("register_object_instance")?;
        Ok(InstanceHandle::new(100))
    }

    fn delete_object_instance(&self, _: InstanceHandle) -> ServiceResult<()> {
        self.record("delete_object_instance")
    }

    fn publish_object_class_attributes(&self, _: Handle, _: &[Handle]) -> ServiceResult<()> {
        self.record("publish_object_class_attributes")
    }

    fn subscribe_object_class_attributes(&self, _: Handle, _: &[Handle]) -> ServiceResult<()> {
        self.record("subscribe_object_class_attributes")
    }

    fn publish_interaction_class(&self, _: Handle) -> ServiceResult<()> {
        self.record("publish_interaction_class")
    }

    fn subscribe_interaction_class(&self, _: Handle) -> ServiceResult<()> {
        self.record("subscribe_interaction_class")
    }

    fn update_attribute_values(
        &self,
        instance: InstanceHandle,
        values: &HandleValueMap,
    ) -> ServiceResult<()> {
        self.record("update_attribute_values")?;
        self.updates.lock().push((instance, values.clone()));
        Ok(())
    }

    fn send_interaction(&self, class: Handle, parameters: &HandleValueMap) -> ServiceResult<()> {
        self.record("send_interaction")?;
        self.interactions.lock().push((class, parameters.clone()));
        Ok(())
    }

    fn enable_time_regulation(&self, _lookahead: f64) -> ServiceResult<()> {
        self.record("enable_time_regulation")
    }

    fn enable_time_constrained(&self) -> ServiceResult<()> {
        self.record("enable_time_constrained")
    }

    fn disable_time_regulation(&self) -> ServiceResult<()> {
        self.record("disable_time_regulation")
    }

    fn disable_time_constrained(&self) -> ServiceResult<()> {
        self.record("disable_time_constrained")
    }

    fn next_message_request(&self, _target: LogicalTime) -> ServiceResult<()> {
        self.record("next_message_request")
    }
}
