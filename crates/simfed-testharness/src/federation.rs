//! ---
//! fed_section: "11-simulation"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "In-process federation service with scripted callback behaviour."
//! fed_version: "v0.1.0"
//! fed_owner: "tbd"
//! ---
//! [`FakeFederation`] implements [`FederationService`] for a single federate.
//! Callbacks are queued to a dedicated delivery thread started at connect
//! time, so they arrive in order and never on the caller's thread. Tests play
//! the other federates through the `inject_*`, `grant` and `confirm_*`
//! helpers.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use simfed_core::{
    FederateAmbassador, FederationService, Handle, HandleCategory, HandleValueMap,
    InstanceHandle, LogicalTime, ServiceError, ServiceResult,
};
use tracing::{debug, trace, warn};

type Callback = Box<dyn FnOnce(&dyn FederateAmbassador) + Send>;

/// How name reservations are answered.
#[derive(Debug, Clone, Default)]
pub enum ReservationPolicy {
    #[default]
    Accept,
    /// Listed names are already taken; everything else is accepted.
    Taken(Vec<String>),
    /// No callback; answer with [`FakeFederation::confirm_reservation`].
    Silent,
    /// Accept after the given delay.
    Delayed(Duration),
}

/// How time-advance requests are granted.
#[derive(Debug, Clone, Default)]
pub enum GrantPolicy {
    /// Grant the requested time straight away.
    #[default]
    Immediate,
    /// Wait for [`FakeFederation::grant`].
    Manual,
    Delayed(Duration),
}

/// How time regulation/constrained requests are confirmed.
#[derive(Debug, Clone, Default)]
pub enum EnablementPolicy {
    #[default]
    Immediate,
    /// Wait for [`FakeFederation::confirm_regulation`] or
    /// [`FakeFederation::confirm_constrained`].
    Manual,
}

#[derive(Debug, Clone, Default)]
pub struct FederationBehaviour {
    pub reservation: ReservationPolicy,
    pub grant: GrantPolicy,
    pub enablement: EnablementPolicy,
    /// Names `resolve_handle` reports as not found.
    pub unknown_names: Vec<String>,
}

/// A service call as the fake received it.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceCall {
    Connect { host: String },
    Join { federate: String, federation: String },
    Resign,
    Disconnect,
    ResolveHandle { category: HandleCategory, name: String },
    ReserveName { name: String },
    RegisterInstance { class: Handle, name: String },
    DeleteInstance { instance: InstanceHandle },
    PublishObjectClass { class: Handle, attributes: usize },
    SubscribeObjectClass { class: Handle, attributes: usize },
    PublishInteraction { class: Handle },
    SubscribeInteraction { class: Handle },
    UpdateAttributes { instance: InstanceHandle, attributes: usize },
    SendInteraction { class: Handle, parameters: usize },
    EnableRegulation { lookahead: f64 },
    EnableConstrained,
    DisableRegulation,
    DisableConstrained,
    NextMessageRequest { target: LogicalTime },
}

impl ServiceCall {
    /// Name of the [`FederationService`] method this call went through.
    pub fn name(&self) -> &'static str {
        match self {
            ServiceCall::Connect { .. } => "connect",
            ServiceCall::Join { .. } => "join",
            ServiceCall::Resign => "resign",
            ServiceCall::Disconnect => "disconnect",
            ServiceCall::ResolveHandle { .. } => "resolve_handle",
            ServiceCall::ReserveName { .. } => "reserve_object_instance_name",
            ServiceCall::RegisterInstance { .. } => "register_object_instance",
            ServiceCall::DeleteInstance { .. } => "delete_object_instance",
            ServiceCall::PublishObjectClass { .. } => "publish_object_class_attributes",
            ServiceCall::SubscribeObjectClass { .. } => "subscribe_object_class_attributes",
            ServiceCall::PublishInteraction { .. } => "publish_interaction_class",
            ServiceCall::SubscribeInteraction { .. } => "subscribe_interaction_class",
            ServiceCall::UpdateAttributes { .. } => "update_attribute_values",
            ServiceCall::SendInteraction { .. } => "send_interaction",
            ServiceCall::EnableRegulation { .. } => "enable_time_regulation",
            ServiceCall::EnableConstrained => "enable_time_constrained",
            ServiceCall::DisableRegulation => "disable_time_regulation",
            ServiceCall::DisableConstrained => "disable_time_constrained",
            ServiceCall::NextMessageRequest { .. } => "next_message_request",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Any,
    Connected,
    Joined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Mode {
    #[default]
    Off,
    Pending,
    On,
}

struct Scheduled {
    at: LogicalTime,
    class: Handle,
    parameters: HandleValueMap,
}

#[derive(Default)]
struct FakeState {
    connected: bool,
    joined: bool,
    delivery: Option<mpsc::Sender<Callback>>,
    handles: HashMap<(HandleCategory, String), Handle>,
    next_handle: u64,
    next_instance: u64,
    reserved: HashSet<String>,
    pending_reservations: HashSet<String>,
    registered: HashMap<InstanceHandle, String>,
    calls: Vec<ServiceCall>,
    updates: Vec<(InstanceHandle, HandleValueMap)>,
    interactions: Vec<(Handle, HandleValueMap)>,
    regulation: Mode,
    constrained: Mode,
    pending_advance: Option<LogicalTime>,
    time: LogicalTime,
    failing: HashSet<&'static str>,
    scheduled: Vec<Scheduled>,
}

impl FakeState {
    fn deliver(&self, callback: Callback) {
        match &self.delivery {
            Some(sender) => {
                if sender.send(callback).is_err() {
                    warn!("callback delivery thread has exited; callback dropped");
                }
            }
            None => debug!("no ambassador connected; callback dropped"),
        }
    }

    fn deliver_after(&self, delay: Duration, callback: Callback) {
        let Some(sender) = self.delivery.clone() else {
            debug!("no ambassador connected; delayed callback dropped");
            return;
        };
        thread::spawn(move || {
            thread::sleep(delay);
            let _ = sender.send(callback);
        });
    }

    fn lookup(&self, category: HandleCategory, name: &str) -> ServiceResult<Handle> {
        self.handles
            .get(&(category, name.to_owned()))
            .copied()
            .ok_or_else(|| ServiceError::NameNotFound(name.to_owned()))
    }

    fn named_values<'a>(
        &self,
        category: HandleCategory,
        values: impl IntoIterator<Item = (&'a str, Bytes)>,
    ) -> ServiceResult<HandleValueMap> {
        values
            .into_iter()
            .map(|(name, raw)| Ok((self.lookup(category, name)?, raw)))
            .collect()
    }

    /// Grant `time`, first delivering scheduled interactions that are due.
    fn grant(&mut self, time: LogicalTime, delay: Option<Duration>) {
        self.pending_advance = None;
        self.time = time;
        let (due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scheduled)
            .into_iter()
            .partition(|scheduled| scheduled.at <= time);
        self.scheduled = later;
        let callback: Callback = Box::new(move |ambassador| {
            for scheduled in &due {
                ambassador.receive_interaction(scheduled.class, &scheduled.parameters);
            }
            ambassador.time_advance_grant(time);
        });
        match delay {
            Some(delay) => self.deliver_after(delay, callback),
            None => self.deliver(callback),
        }
    }
}

/// Fake federation for one federate.
pub struct FakeFederation {
    behaviour: FederationBehaviour,
    state: Mutex<FakeState>,
}

impl Default for FakeFederation {
    fn default() -> Self {
        Self::new(FederationBehaviour::default())
    }
}

impl FakeFederation {
    pub fn new(behaviour: FederationBehaviour) -> Self {
        Self {
            behaviour,
            state: Mutex::new(FakeState {
                next_handle: 1,
                next_instance: 1,
                ..FakeState::default()
            }),
        }
    }

    /// Shared fake that accepts everything immediately.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_behaviour(behaviour: FederationBehaviour) -> Arc<Self> {
        Arc::new(Self::new(behaviour))
    }

    fn begin(&self, call: ServiceCall, phase: Phase) -> ServiceResult<MutexGuard<'_, FakeState>> {
        let mut state = self.state.lock();
        let name = call.name();
        trace!(call = name, "service call");
        state.calls.push(call);
        if state.failing.contains(name) {
            return Err(ServiceError::Rejected(format!("{name} failure injected")));
        }
        let ready = match phase {
            Phase::Any => true,
            Phase::Connected => state.connected,
            Phase::Joined => state.connected && state.joined,
        };
        if !ready {
            return Err(ServiceError::NotConnected);
        }
        Ok(state)
    }

    /// Make every later `call` fail with [`ServiceError::Rejected`].
    pub fn fail(&self, call: &'static str) {
        self.state.lock().failing.insert(call);
    }

    pub fn heal(&self, call: &'static str) {
        self.state.lock().failing.remove(call);
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|recorded| recorded.name() == call)
            .count()
    }

    pub fn updates(&self) -> Vec<(InstanceHandle, HandleValueMap)> {
        self.state.lock().updates.clone()
    }

    pub fn sent_interactions(&self) -> Vec<(Handle, HandleValueMap)> {
        self.state.lock().interactions.clone()
    }

    pub fn handle_of(&self, category: HandleCategory, name: &str) -> Option<Handle> {
        self.state.lock().lookup(category, name).ok()
    }

    pub fn registered_instances(&self) -> Vec<(InstanceHandle, String)> {
        let mut registered: Vec<_> = self
            .state
            .lock()
            .registered
            .iter()
            .map(|(instance, name)| (*instance, name.clone()))
            .collect();
        registered.sort_by_key(|(instance, _)| *instance);
        registered
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn is_joined(&self) -> bool {
        self.state.lock().joined
    }

    pub fn is_regulating(&self) -> bool {
        self.state.lock().regulation == Mode::On
    }

    pub fn is_constrained(&self) -> bool {
        self.state.lock().constrained == Mode::On
    }

    pub fn pending_advance(&self) -> Option<LogicalTime> {
        self.state.lock().pending_advance
    }

    pub fn logical_time(&self) -> LogicalTime {
        self.state.lock().time
    }

    /// Grant the outstanding advance at `time`. Returns `false` if none is
    /// outstanding.
    pub fn grant(&self, time: LogicalTime) -> bool {
        let mut state = self.state.lock();
        if state.pending_advance.is_none() {
            return false;
        }
        state.grant(time, None);
        true
    }

    /// Grant an advance nobody asked for.
    pub fn inject_grant(&self, time: LogicalTime) {
        self.state
            .lock()
            .deliver(Box::new(move |ambassador| ambassador.time_advance_grant(time)));
    }

    pub fn confirm_regulation(&self) -> bool {
        let mut state = self.state.lock();
        if state.regulation != Mode::Pending {
            return false;
        }
        state.regulation = Mode::On;
        let time = state.time;
        state.deliver(Box::new(move |ambassador| {
            ambassador.time_regulation_enabled(time)
        }));
        true
    }

    pub fn confirm_constrained(&self) -> bool {
        let mut state = self.state.lock();
        if state.constrained != Mode::Pending {
            return false;
        }
        state.constrained = Mode::On;
        let time = state.time;
        state.deliver(Box::new(move |ambassador| {
            ambassador.time_constrained_enabled(time)
        }));
        true
    }

    /// Answer a reservation held back by [`ReservationPolicy::Silent`].
    pub fn confirm_reservation(&self, name: &str, accepted: bool) -> bool {
        let mut state = self.state.lock();
        if !state.pending_reservations.remove(name) {
            return false;
        }
        let name = name.to_owned();
        if accepted {
            state.reserved.insert(name.clone());
            state.deliver(Box::new(move |ambassador| {
                ambassador.object_instance_name_reservation_succeeded(&name)
            }));
        } else {
            state.deliver(Box::new(move |ambassador| {
                ambassador.object_instance_name_reservation_failed(&name)
            }));
        }
        true
    }

    /// Deliver a reservation verdict regardless of any request.
    pub fn inject_reservation_verdict(&self, name: &str, accepted: bool) {
        let name = name.to_owned();
        self.state.lock().deliver(Box::new(move |ambassador| {
            if accepted {
                ambassador.object_instance_name_reservation_succeeded(&name)
            } else {
                ambassador.object_instance_name_reservation_failed(&name)
            }
        }));
    }

    pub fn inject_reflection(&self, instance: InstanceHandle, values: HandleValueMap) {
        self.state.lock().deliver(Box::new(move |ambassador| {
            ambassador.reflect_attribute_values(instance, &values)
        }));
    }

    /// Reflect attribute values addressed by attribute name.
    pub fn inject_reflection_named<'a>(
        &self,
        instance: InstanceHandle,
        values: impl IntoIterator<Item = (&'a str, Bytes)>,
    ) -> ServiceResult<()> {
        let values = self
            .state
            .lock()
            .named_values(HandleCategory::Attribute, values)?;
        self.inject_reflection(instance, values);
        Ok(())
    }

    pub fn inject_interaction(&self, class: Handle, parameters: HandleValueMap) {
        self.state.lock().deliver(Box::new(move |ambassador| {
            ambassador.receive_interaction(class, &parameters)
        }));
    }

    /// Deliver an interaction addressed by class and parameter names.
    pub fn inject_interaction_named<'a>(
        &self,
        interaction: &str,
        parameters: impl IntoIterator<Item = (&'a str, Bytes)>,
    ) -> ServiceResult<()> {
        let (class, parameters) = {
            let state = self.state.lock();
            (
                state.lookup(HandleCategory::InteractionClass, interaction)?,
                state.named_values(HandleCategory::Parameter, parameters)?,
            )
        };
        self.inject_interaction(class, parameters);
        Ok(())
    }

    /// Deliver `interaction` just before the first grant at or beyond `at`.
    pub fn schedule_interaction<'a>(
        &self,
        at: LogicalTime,
        interaction: &str,
        parameters: impl IntoIterator<Item = (&'a str, Bytes)>,
    ) -> ServiceResult<()> {
        let mut state = self.state.lock();
        let class = state.lookup(HandleCategory::InteractionClass, interaction)?;
        let parameters = state.named_values(HandleCategory::Parameter, parameters)?;
        state.scheduled.push(Scheduled {
            at,
            class,
            parameters,
        });
        Ok(())
    }

    pub fn inject_discovery(&self, instance: InstanceHandle, class: Handle, name: &str) {
        let name = name.to_owned();
        self.state.lock().deliver(Box::new(move |ambassador| {
            ambassador.discover_object_instance(instance, class, &name)
        }));
    }

    pub fn inject_removal(&self, instance: InstanceHandle) {
        self.state.lock().deliver(Box::new(move |ambassador| {
            ambassador.remove_object_instance(instance)
        }));
    }

    /// Block until every callback queued so far has been delivered.
    pub fn sync(&self, timeout: Duration) -> bool {
        let (done, finished) = mpsc::channel();
        self.state.lock().deliver(Box::new(move |_| {
            let _ = done.send(());
        }));
        finished.recv_timeout(timeout).is_ok()
    }
}

impl FederationService for FakeFederation {
    fn name(&self) -> &str {
        "fake"
    }

    fn connect(&self, host: &str, ambassador: Arc<dyn FederateAmbassador>) -> ServiceResult<()> {
        let mut state = self.begin(
            ServiceCall::Connect {
                host: host.to_owned(),
            },
            Phase::Any,
        )?;
        if state.connected {
            return Err(ServiceError::Rejected("already connected".into()));
        }
        let (sender, receiver) = mpsc::channel::<Callback>();
        thread::Builder::new()
            .name("fake-federation-callbacks".into())
            .spawn(move || {
                for callback in receiver {
                    callback(ambassador.as_ref());
                }
            })
            .map_err(|err| ServiceError::Communication(err.to_string()))?;
        state.delivery = Some(sender);
        state.connected = true;
        Ok(())
    }

    fn join(
        &self,
        federate_name: &str,
        federation_name: &str,
        _config_reference: Option<&str>,
    ) -> ServiceResult<()> {
        let mut state = self.begin(
            ServiceCall::Join {
                federate: federate_name.to_owned(),
                federation: federation_name.to_owned(),
            },
            Phase::Connected,
        )?;
        if state.joined {
            return Err(ServiceError::Rejected("already joined".into()));
        }
        state.joined = true;
        Ok(())
    }

    fn resign(&self) -> ServiceResult<()> {
        let mut state = self.begin(ServiceCall::Resign, Phase::Joined)?;
        state.joined = false;
        state.regulation = Mode::Off;
        state.constrained = Mode::Off;
        state.pending_advance = None;
        Ok(())
    }

    fn disconnect(&self) -> ServiceResult<()> {
        let mut state = self.begin(ServiceCall::Disconnect, Phase::Connected)?;
        if state.joined {
            return Err(ServiceError::Rejected("still joined".into()));
        }
        state.connected = false;
        state.delivery = None;
        Ok(())
    }

    fn resolve_handle(&self, category: HandleCategory, name: &str) -> ServiceResult<Handle> {
        let mut state = self.begin(
            ServiceCall::ResolveHandle {
                category,
                name: name.to_owned(),
            },
            Phase::Joined,
        )?;
        if self.behaviour.unknown_names.iter().any(|unknown| unknown == name) {
            return Err(ServiceError::NameNotFound(name.to_owned()));
        }
        if let Ok(handle) = state.lookup(category, name) {
            return Ok(handle);
        }
        let handle = Handle::new(state.next_handle);
        state.next_handle += 1;
        state.handles.insert((category, name.to_owned()), handle);
        Ok(handle)
    }

    fn reserve_object_instance_name(&self, name: &str) -> ServiceResult<()> {
        let mut state = self.begin(
            ServiceCall::ReserveName {
                name: name.to_owned(),
            },
            Phase::Joined,
        )?;
        let owned = name.to_owned();
        let taken = state.reserved.contains(name)
            || matches!(&self.behaviour.reservation, ReservationPolicy::Taken(names) if names.iter().any(|n| n == name));
        if taken {
            state.deliver(Box::new(move |ambassador| {
                ambassador.object_instance_name_reservation_failed(&owned)
            }));
            return Ok(());
        }
        match &self.behaviour.reservation {
            ReservationPolicy::Accept | ReservationPolicy::Taken(_) => {
                state.reserved.insert(owned.clone());
                state.deliver(Box::new(move |ambassador| {
                    ambassador.object_instance_name_reservation_succeeded(&owned)
                }));
            }
            ReservationPolicy::Silent => {
                state.pending_reservations.insert(owned);
            }
            ReservationPolicy::Delayed(delay) => {
                state.reserved.insert(owned.clone());
                state.deliver_after(
                    *delay,
                    Box::new(move |ambassador| {
                        ambassador.object_instance_name_reservation_succeeded(&owned)
                    }),
                );
            }
        }
        Ok(())
    }

    fn register_object_instance(
        &self,
        class: Handle,
        name: &str,
    ) -> ServiceResult<InstanceHandle> {
        let mut state = self.begin(
            ServiceCall::RegisterInstance {
                class,
                name: name.to_owned(),
            },
            Phase::Joined,
        )?;
        if !state.reserved.contains(name) {
            return Err(ServiceError::Rejected(format!(
                "object instance name '{name}' not reserved"
            )));
        }
        if state.registered.values().any(|registered| registered == name) {
            return Err(ServiceError::Rejected(format!(
                "object instance name '{name}' already registered"
            )));
        }
        let instance = InstanceHandle::new(state.next_instance);
        state.next_instance += 1;
        state.registered.insert(instance, name.to_owned());
        Ok(instance)
    }

    fn delete_object_instance(&self, instance: InstanceHandle) -> ServiceResult<()> {
        let mut state = self.begin(ServiceCall::DeleteInstance { instance }, Phase::Joined)?;
        state
            .registered
            .remove(&instance)
            .map(|_| ())
            .ok_or_else(|| ServiceError::Rejected(format!("{instance} not registered")))
    }

    fn publish_object_class_attributes(
        &self,
        class: Handle,
        attributes: &[Handle],
    ) -> ServiceResult<()> {
        self.begin(
            ServiceCall::PublishObjectClass {
                class,
                attributes: attributes.len(),
            },
            Phase::Joined,
        )
        .map(drop)
    }

    fn subscribe_object_class_attributes(
        &self,
        class: Handle,
        attributes: &[Handle],
    ) -> ServiceResult<()> {
        self.begin(
            ServiceCall::SubscribeObjectClass {
                class,
                attributes: attributes.len(),
            },
            Phase::Joined,
        )
        .map(drop)
    }

    fn publish_interaction_class(&self, class: Handle) -> ServiceResult<()> {
        self.begin(ServiceCall::PublishInteraction { class }, Phase::Joined)
            .map(drop)
    }

    fn subscribe_interaction_class(&self, class: Handle) -> ServiceResult<()> {
        self.begin(ServiceCall::SubscribeInteraction { class }, Phase::Joined)
            .map(drop)
    }

    fn update_attribute_values(
        &self,
        instance: InstanceHandle,
        values: &HandleValueMap,
    ) -> ServiceResult<()> {
        let mut state = self.begin(
            ServiceCall::UpdateAttributes {
                instance,
                attributes: values.len(),
            },
            Phase::Joined,
        )?;
        if !state.registered.contains_key(&instance) {
            return Err(ServiceError::Rejected(format!("{instance} not registered")));
        }
        state.updates.push((instance, values.clone()));
        Ok(())
    }

    fn send_interaction(&self, class: Handle, parameters: &HandleValueMap) -> ServiceResult<()> {
        let mut state = self.begin(
            ServiceCall::SendInteraction {
                class,
                parameters: parameters.len(),
            },
            Phase::Joined,
        )?;
        state.interactions.push((class, parameters.clone()));
        Ok(())
    }

    fn enable_time_regulation(&self, lookahead: f64) -> ServiceResult<()> {
        let mut state = self.begin(ServiceCall::EnableRegulation { lookahead }, Phase::Joined)?;
        if state.regulation != Mode::Off {
            return Err(ServiceError::Rejected("time regulation already enabled".into()));
        }
        state.regulation = Mode::Pending;
        if matches!(self.behaviour.enablement, EnablementPolicy::Immediate) {
            state.regulation = Mode::On;
            let time = state.time;
            state.deliver(Box::new(move |ambassador| {
                ambassador.time_regulation_enabled(time)
            }));
        }
        Ok(())
    }

    fn enable_time_constrained(&self) -> ServiceResult<()> {
        let mut state = self.begin(ServiceCall::EnableConstrained, Phase::Joined)?;
        if state.constrained != Mode::Off {
            return Err(ServiceError::Rejected("time constrained already enabled".into()));
        }
        state.constrained = Mode::Pending;
        if matches!(self.behaviour.enablement, EnablementPolicy::Immediate) {
            state.constrained = Mode::On;
            let time = state.time;
            state.deliver(Box::new(move |ambassador| {
                ambassador.time_constrained_enabled(time)
            }));
        }
        Ok(())
    }

    fn disable_time_regulation(&self) -> ServiceResult<()> {
        let mut state = self.begin(ServiceCall::DisableRegulation, Phase::Joined)?;
        if state.regulation != Mode::On {
            return Err(ServiceError::Rejected("time regulation not enabled".into()));
        }
        state.regulation = Mode::Off;
        Ok(())
    }

    fn disable_time_constrained(&self) -> ServiceResult<()> {
        let mut state = self.begin(ServiceCall::DisableConstrained, Phase::Joined)?;
        if state.constrained != Mode::On {
            return Err(ServiceError::Rejected("time constrained not enabled".into()));
        }
        state.constrained = Mode::Off;
        Ok(())
    }

    fn next_message_request(&self, target: LogicalTime) -> ServiceResult<()> {
        let mut state = self.begin(ServiceCall::NextMessageRequest { target }, Phase::Joined)?;
        if state.pending_advance.is_some() {
            return Err(ServiceError::Rejected("time advance already pending".into()));
        }
        state.pending_advance = Some(target);
        match &self.behaviour.grant {
            GrantPolicy::Immediate => state.grant(target, None),
            GrantPolicy::Delayed(delay) => state.grant(target, Some(*delay)),
            GrantPolicy::Manual => {}
        }
        Ok(())
    }
}
