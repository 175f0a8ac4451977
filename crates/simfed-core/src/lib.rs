//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Federate synchronization core."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
//! Lets a local discrete-event engine take part in a federation: handle
//! resolution, blocking name reservation, the time-management state machine,
//! and schema-driven attribute and interaction exchange, orchestrated by
//! [`SimulationBridge`].

pub mod ambassador;
pub mod attributes;
pub mod binding;
pub mod bridge;
pub mod codec;
pub mod engine;
pub mod error;
pub mod interactions;
pub mod metrics;
pub mod registry;
pub mod reservation;
pub mod rti;
pub mod session;
pub mod signal;
pub mod sink;
pub mod time_manager;

#[cfg(test)]
mod test_support;

pub use ambassador::FederateCallbacks;
pub use attributes::{AttributeExchange, ObjectInstanceRegistration};
pub use binding::{
    AttributeBinding, BindingTable, InteractionBinding, ObjectClassBinding, ParameterBinding,
    SchemaBindings, ValueBinding,
};
pub use bridge::SimulationBridge;
pub use codec::{CodecError, ScalarValue};
pub use engine::LocalEngine;
pub use error::{FederateError, Result};
pub use interactions::{InboundMessage, InteractionHandler, InteractionRouter};
pub use metrics::{FederateMetrics, MetricsSnapshot};
pub use registry::{HandleRegistry, HandleRegistryBuilder};
pub use reservation::{ReservationCoordinator, ReservationRequest};
pub use rti::{
    FederateAmbassador, FederationService, Handle, HandleCategory, HandleValueMap, InstanceHandle,
    LogicalTime, ServiceError, ServiceResult,
};
pub use session::FederateSession;
pub use signal::OneShot;
pub use sink::{CsvSink, MemorySink, ValueSink};
pub use time_manager::{TimeAdvanceState, TimeManager};
