//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Error taxonomy for the federate synchronization core."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
use std::time::Duration;

use thiserror::Error;

use crate::codec::CodecError;
use crate::rti::{HandleCategory, LogicalTime, ServiceError};
use crate::time_manager::TimeAdvanceState;

pub type Result<T> = std::result::Result<T, FederateError>;

/// Errors surfaced by the federate core.
#[derive(Debug, Error)]
pub enum FederateError {
    #[error("failed to {call} federation '{federation}': {source}")]
    Connection {
        federation: String,
        call: &'static str,
        #[source]
        source: ServiceError,
    },
    #[error("federation does not recognise {category} '{name}'")]
    UnknownName {
        category: HandleCategory,
        name: String,
    },
    #[error("reservation of object instance name '{name}' timed out after {timeout:?}")]
    ReservationTimeout { name: String, timeout: Duration },
    #[error("cannot reserve '{requested}' while reservation of '{pending}' is outstanding")]
    ConcurrentReservation { requested: String, pending: String },
    #[error("object instance name '{name}' rejected after {attempts} attempt(s)")]
    ReservationRejected { name: String, attempts: u32 },
    #[error("cannot {operation} while time management is {state}")]
    InvalidStateTransition {
        operation: &'static str,
        state: TimeAdvanceState,
    },
    #[error("requested logical time {requested} is behind the current logical time {current}")]
    InvalidLogicalTime {
        requested: LogicalTime,
        current: LogicalTime,
    },
    #[error("no object instance registered; attribute updates cannot be sent")]
    NotRegistered,
    #[error("object instance '{name}' is already registered")]
    AlreadyRegistered { name: String },
    #[error("failed to encode '{name}': {source}")]
    Encode {
        name: String,
        #[source]
        source: CodecError,
    },
    #[error("failed to decode '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: CodecError,
    },
    #[error("federation service call {call} failed: {source}")]
    Service {
        call: &'static str,
        #[source]
        source: ServiceError,
    },
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("federation service reported not connected during {call}")]
    NotConnected { call: &'static str },
}

impl FederateError {
    /// Adapter for `map_err` on a service call, recording which call failed.
    pub fn service(call: &'static str) -> impl FnOnce(ServiceError) -> FederateError {
        move |source| match source {
            ServiceError::NotConnected => FederateError::NotConnected { call },
            source => FederateError::Service { call, source },
        }
    }

    /// Errors after which the session cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FederateError::Connection { .. }
                | FederateError::UnknownName { .. }
                | FederateError::NotConnected { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_adapter_separates_disconnects() {
        let err = FederateError::service("send_interaction")(ServiceError::NotConnected);
        assert!(matches!(
            err,
            FederateError::NotConnected {
                call: "send_interaction"
            }
        ));
        assert!(err.is_fatal());

        let err = FederateError::service("send_interaction")(ServiceError::Rejected("x".into()));
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("send_interaction"));
    }

    #[test]
    fn connection_error_names_federation_and_call() {
        let err = FederateError::Connection {
            federation: "Factory".into(),
            call: "join",
            source: ServiceError::Rejected("federation does not exist".into()),
        };
        let message = err.to_string();
        assert!(message.contains("Factory"));
        assert!(message.contains("join"));
        assert!(err.is_fatal());
    }

    #[test]
    fn state_errors_are_recoverable() {
        let err = FederateError::InvalidStateTransition {
            operation: "request a time advance",
            state: TimeAdvanceState::AdvanceRequested,
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("advance requested"));
    }
}
