//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Federation service boundary and callback interface."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
//! The two traits that separate this crate from the federation coordination
//! service: [`FederationService`] is what we call, [`FederateAmbassador`] is
//! what the service calls back on its own delivery thread(s).

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexMap;

/// Opaque service-issued identifier for a class, attribute or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a registered or discovered object instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceHandle(u64);

impl InstanceHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}

/// Namespace a [`Handle`] was resolved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleCategory {
    ObjectClass,
    Attribute,
    InteractionClass,
    Parameter,
}

impl HandleCategory {
    pub const ALL: [HandleCategory; 4] = [
        HandleCategory::ObjectClass,
        HandleCategory::Attribute,
        HandleCategory::InteractionClass,
        HandleCategory::Parameter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HandleCategory::ObjectClass => "object class",
            HandleCategory::Attribute => "attribute",
            HandleCategory::InteractionClass => "interaction class",
            HandleCategory::Parameter => "parameter",
        }
    }
}

impl fmt::Display for HandleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point on the federation's shared logical clock.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct LogicalTime(f64);

impl LogicalTime {
    pub const ZERO: LogicalTime = LogicalTime(0.0);

    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> f64 {
        self.0
    }
}

impl From<f64> for LogicalTime {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl fmt::Display for LogicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encoded attribute or parameter values keyed by handle, in declaration order.
pub type HandleValueMap = IndexMap<Handle, Bytes>;

/// Errors raised by the federation service layer itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("not connected to the federation service")]
    NotConnected,
    #[error("name not known to the federation: {0}")]
    NameNotFound(String),
    #[error("call rejected: {0}")]
    Rejected(String),
    #[error("communication failure: {0}")]
    Communication(String),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Calls this federate makes into the federation coordination service.
///
/// Implementations must be safe to call from the local engine thread while
/// callbacks are being delivered on another thread. Asynchronous outcomes
/// (name reservation, enablement, grants) arrive through the
/// [`FederateAmbassador`] passed to [`FederationService::connect`], possibly
/// before the originating call has returned.
pub trait FederationService: Send + Sync {
    /// Short implementation name used in log records.
    fn name(&self) -> &str;

    fn connect(&self, host: &str, ambassador: Arc<dyn FederateAmbassador>) -> ServiceResult<()>;
    fn join(
        &self,
        federate_name: &str,
        federation_name: &str,
        config_reference: Option<&str>,
    ) -> ServiceResult<()>;
    fn resign(&self) -> ServiceResult<()>;
    fn disconnect(&self) -> ServiceResult<()>;

    fn resolve_handle(&self, category: HandleCategory, name: &str) -> ServiceResult<Handle>;

    /// Starts an asynchronous reservation; the verdict arrives via callback.
    fn reserve_object_instance_name(&self, name: &str) -> ServiceResult<()>;
    fn register_object_instance(&self, class: Handle, name: &str)
        -> ServiceResult<InstanceHandle>;
    fn delete_object_instance(&self, instance: InstanceHandle) -> ServiceResult<()>;

    fn publish_object_class_attributes(
        &self,
        class: Handle,
        attributes: &[Handle],
    ) -> ServiceResult<()>;
    fn subscribe_object_class_attributes(
        &self,
        class: Handle,
        attributes: &[Handle],
    ) -> ServiceResult<()>;
    fn publish_interaction_class(&self, class: Handle) -> ServiceResult<()>;
    fn subscribe_interaction_class(&self, class: Handle) -> ServiceResult<()>;

    fn update_attribute_values(
        &self,
        instance: InstanceHandle,
        values: &HandleValueMap,
    ) -> ServiceResult<()>;
    fn send_interaction(&self, class: Handle, parameters: &HandleValueMap) -> ServiceResult<()>;

    fn enable_time_regulation(&self, lookahead: f64) -> ServiceResult<()>;
    fn enable_time_constrained(&self) -> ServiceResult<()>;
    fn disable_time_regulation(&self) -> ServiceResult<()>;
    fn disable_time_constrained(&self) -> ServiceResult<()>;
    fn next_message_request(&self, target: LogicalTime) -> ServiceResult<()>;
}

/// Callbacks the federation service delivers to this federate.
///
/// Every method runs on the service's delivery thread and must return
/// promptly.
pub trait FederateAmbassador: Send + Sync {
    fn object_instance_name_reservation_succeeded(&self, name: &str);
    fn object_instance_name_reservation_failed(&self, name: &str);

    fn time_regulation_enabled(&self, time: LogicalTime);
    fn time_constrained_enabled(&self, time: LogicalTime);
    fn time_advance_grant(&self, time: LogicalTime);

    fn discover_object_instance(&self, instance: InstanceHandle, class: Handle, name: &str);
    fn remove_object_instance(&self, instance: InstanceHandle);
    fn reflect_attribute_values(&self, instance: InstanceHandle, values: &HandleValueMap);
    fn receive_interaction(&self, class: Handle, parameters: &HandleValueMap);
}
