//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Blocking object instance name reservation."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{FederateError, Result};
use crate::rti::FederationService;
use crate::signal::OneShot;

/// One outstanding reservation; lives only inside a single `reserve` call.
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    name: String,
    outcome: OneShot<bool>,
}

impl ReservationRequest {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            outcome: OneShot::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn completed(&self) -> bool {
        self.outcome.is_completed()
    }
}

/// Turns the asynchronous reservation verdict into a blocking call.
///
/// At most one request is outstanding. The coordinator never retries; callers
/// decide whether to try a decorated name after a rejection.
pub struct ReservationCoordinator {
    service: Arc<dyn FederationService>,
    pending: Mutex<Option<ReservationRequest>>,
    timeout: Duration,
}

impl ReservationCoordinator {
    pub fn new(service: Arc<dyn FederationService>, timeout: Duration) -> Self {
        Self {
            service,
            pending: Mutex::new(None),
            timeout,
        }
    }

    /// Reserve `name` using the configured timeout. `Ok(false)` means the
    /// federation rejected the name.
    pub fn reserve(&self, name: &str) -> Result<bool> {
        self.reserve_within(name, self.timeout)
    }

    pub fn reserve_within(&self, name: &str, timeout: Duration) -> Result<bool> {
        let request = {
            let mut pending = self.pending.lock();
            if let Some(outstanding) = pending.as_ref() {
                return Err(FederateError::ConcurrentReservation {
                    requested: name.to_owned(),
                    pending: outstanding.name.clone(),
                });
            }
            let request = ReservationRequest::new(name);
            *pending = Some(request.clone());
            request
        };

        debug!(name, "requesting object instance name reservation");
        if let Err(err) = self.service.reserve_object_instance_name(name) {
            self.clear(&request);
            return Err(FederateError::service("reserve_object_instance_name")(err));
        }

        let outcome = request.outcome.wait_timeout(timeout);
        self.clear(&request);
        match outcome {
            Some(true) => {
                info!(name, "object instance name reserved");
                Ok(true)
            }
            Some(false) => {
                warn!(name, "object instance name rejected by federation");
                Ok(false)
            }
            None => Err(FederateError::ReservationTimeout {
                name: name.to_owned(),
                timeout,
            }),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    pub fn reservation_succeeded(&self, name: &str) {
        self.settle(name, true);
    }

    pub fn reservation_failed(&self, name: &str) {
        self.settle(name, false);
    }

    fn settle(&self, name: &str, succeeded: bool) {
        let pending = self.pending.lock();
        match pending.as_ref() {
            Some(request) if request.name == name => {
                if !request.outcome.complete(succeeded) {
                    warn!(name, succeeded, "duplicate reservation callback ignored");
                }
            }
            Some(request) => warn!(
                name,
                expected = %request.name,
                "reservation callback for a name not being reserved ignored"
            ),
            None => warn!(
                name,
                succeeded, "reservation callback with no outstanding request ignored"
            ),
        }
    }

    fn clear(&self, request: &ReservationRequest) {
        let mut pending = self.pending.lock();
        if pending
            .as_ref()
            .is_some_and(|current| current.outcome.same_as(&request.outcome))
        {
            *pending = None;
        }
    }
}
