//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "One connection to a federation."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
use std::sync::Arc;

use simfed_common::FederationConfig;
use tracing::{info, warn};

use crate::error::{FederateError, Result};
use crate::rti::{FederateAmbassador, FederationService, ServiceError};

/// A joined federation execution. Dropped only through [`FederateSession::close`].
pub struct FederateSession {
    federation_name: String,
    federate_name: String,
    host: String,
    service: Arc<dyn FederationService>,
}

impl std::fmt::Debug for FederateSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederateSession")
            .field("federation_name", &self.federation_name)
            .field("federate_name", &self.federate_name)
            .field("host", &self.host)
            .field("service", &self.service.name())
            .finish()
    }
}

impl FederateSession {
    /// Connect to `config.host` and join the federation.
    pub fn open(
        config: &FederationConfig,
        service: Arc<dyn FederationService>,
        ambassador: Arc<dyn FederateAmbassador>,
    ) -> Result<Self> {
        let failed = |call: &'static str| {
            let federation = config.federation_name.clone();
            move |source: ServiceError| FederateError::Connection {
                federation,
                call,
                source,
            }
        };

        service
            .connect(&config.host, ambassador)
            .map_err(failed("connect to"))?;
        if let Err(err) = service.join(
            &config.federate_name,
            &config.federation_name,
            config.config_reference.as_deref(),
        ) {
            if let Err(disconnect) = service.disconnect() {
                warn!(error = %disconnect, "disconnect after failed join also failed");
            }
            return Err(failed("join")(err));
        }

        info!(
            federation = %config.federation_name,
            federate = %config.federate_name,
            host = %config.host,
            service = service.name(),
            "joined federation"
        );
        Ok(Self {
            federation_name: config.federation_name.clone(),
            federate_name: config.federate_name.clone(),
            host: config.host.clone(),
            service,
        })
    }

    pub fn federation_name(&self) -> &str {
        &self.federation_name
    }

    pub fn federate_name(&self) -> &str {
        &self.federate_name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn service(&self) -> &Arc<dyn FederationService> {
        &self.service
    }

    /// Resign and disconnect. Disconnect is attempted even if resign fails;
    /// the first error is returned.
    pub fn close(self) -> Result<()> {
        let resigned = self
            .service
            .resign()
            .map_err(FederateError::service("resign"));
        if let Err(err) = &resigned {
            warn!(federation = %self.federation_name, error = %err, "resign failed");
        }
        let disconnected = self
            .service
            .disconnect()
            .map_err(FederateError::service("disconnect"));
        if let Err(err) = &disconnected {
            warn!(federation = %self.federation_name, error = %err, "disconnect failed");
        }
        resigned.and(disconnected)?;
        info!(federation = %self.federation_name, federate = %self.federate_name, "left federation");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rti::{Handle, HandleValueMap, InstanceHandle, LogicalTime};
    use crate::test_support::RecordingService;

    struct Silent;

    impl FederateAmbassador for Silent {
        fn object_instance_name_reservation_succeeded(&self, _: &str) {}
        fn object_instance_name_reservation_failed(&self, _: &str) {}
        fn time_regulation_enabled(&self, _: LogicalTime) {}
        fn time_constrained_enabled(&self, _: LogicalTime) {}
        fn time_advance_grant(&self, _: LogicalTime) {}
        fn discover_object_instance(&self, _: InstanceHandle, _: Handle, _: &str) {}
        fn remove_object_instance(&self, _: InstanceHandle) {}
        fn reflect_attribute_values(&self, _: InstanceHandle, _: &HandleValueMap) {}
        fn receive_interaction(&self, _: Handle, _: &HandleValueMap) {}
    }

    fn config() -> FederationConfig {
        FederationConfig {
            federation_name: "Factory".into(),
            federate_name: "Line1".into(),
            host: "localhost".into(),
            config_reference: None,
        }
    }

    #[test]
    fn open_and_close_in_order() {
        let service = RecordingService::new();
        let session =
            FederateSession::open(&config(), service.clone(), Arc::new(Silent)).expect("joined");
        assert_eq!(session.federation_name(), "Factory");
        session.close().expect("closed");
        assert_eq!(
            service.calls(),
            vec!["connect", "join", "resign", "disconnect"]
        );
    }

    #[test]
    fn failed_join_disconnects_and_is_fatal() {
        let service = RecordingService::new();
        service.fail("join");
        let err = FederateSession::open(&config(), service.clone(), Arc::new(Silent))
            .expect_err("join refused");
        assert!(err.is_fatal());
        let message = err.to_string();
        assert!(message.contains("Factory") && message.contains("join"));
        assert_eq!(service.count("disconnect"), 1);
    }

    #[test]
    fn close_disconnects_even_if_resign_fails() {
        let service = RecordingService::new();
        let session =
            FederateSession::open(&config(), service.clone(), Arc::new(Silent)).expect("joined");
        service.fail("resign");
        assert!(session.close().is_err());
        assert_eq!(service.count("disconnect"), 1);
    }
}
