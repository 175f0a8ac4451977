//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Routes federation callbacks to the owning components."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::attributes::AttributeExchange;
use crate::interactions::InteractionRouter;
use crate::reservation::ReservationCoordinator;
use crate::rti::{FederateAmbassador, Handle, HandleValueMap, InstanceHandle, LogicalTime};
use crate::time_manager::TimeManager;

/// Callback receiver handed to the service at connect time.
///
/// The exchange and router only exist once handles are resolved, so they are
/// attached after joining; anything delivered before that is dropped.
pub struct FederateCallbacks {
    reservations: Arc<ReservationCoordinator>,
    time: Arc<TimeManager>,
    attributes: OnceCell<Arc<AttributeExchange>>,
    interactions: OnceCell<Arc<InteractionRouter>>,
}

impl FederateCallbacks {
    pub fn new(reservations: Arc<ReservationCoordinator>, time: Arc<TimeManager>) -> Self {
        Self {
            reservations,
            time,
            attributes: OnceCell::new(),
            interactions: OnceCell::new(),
        }
    }

    /// Returns `false` if an exchange was already attached.
    pub fn attach_attributes(&self, exchange: Arc<AttributeExchange>) -> bool {
        self.attributes.set(exchange).is_ok()
    }

    /// Returns `false` if a router was already attached.
    pub fn attach_interactions(&self, router: Arc<InteractionRouter>) -> bool {
        self.interactions.set(router).is_ok()
    }
}

impl FederateAmbassador for FederateCallbacks {
    fn object_instance_name_reservation_succeeded(&self, name: &str) {
        self.reservations.reservation_succeeded(name);
    }

    fn object_instance_name_reservation_failed(&self, name: &str) {
        self.reservations.reservation_failed(name);
    }

    fn time_regulation_enabled(&self, time: LogicalTime) {
        self.time.time_regulation_enabled(time);
    }

    fn time_constrained_enabled(&self, time: LogicalTime) {
        self.time.time_constrained_enabled(time);
    }

    fn time_advance_grant(&self, time: LogicalTime) {
        self.time.time_advance_grant(time);
    }

    fn discover_object_instance(&self, instance: InstanceHandle, class: Handle, name: &str) {
        match self.attributes.get() {
            Some(exchange) => exchange.on_discover(instance, class, name),
            None => debug!(instance = %instance, name, "discovery before setup dropped"),
        }
    }

    fn remove_object_instance(&self, instance: InstanceHandle) {
        if let Some(exchange) = self.attributes.get() {
            exchange.on_remove(instance);
        }
    }

    fn reflect_attribute_values(&self, instance: InstanceHandle, values: &HandleValueMap) {
        match self.attributes.get() {
            Some(exchange) => {
                exchange.on_reflect(instance, values);
            }
            None => debug!(instance = %instance, "reflection before setup dropped"),
        }
    }

    fn receive_interaction(&self, class: Handle, parameters: &HandleValueMap) {
        match self.interactions.get() {
            Some(router) => {
                router.on_receive(class, parameters);
            }
            None => debug!(class = %class, "interaction before setup dropped"),
        }
    }
}
