//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Start-up, steady-state time advancement and shutdown of one federate."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
//! [`SimulationBridge`] owns the session and every component built on it.
//! Start-up runs connect, join, handle resolution, declaration, name
//! reservation, registration and time-mode enablement in that order; if any
//! step fails the session is torn down before the error is returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use simfed_common::{AppConfig, ControlConfig, TimeScale};
use tracing::{debug, error, info, warn};

use crate::ambassador::FederateCallbacks;
use crate::attributes::AttributeExchange;
use crate::binding::SchemaBindings;
use crate::codec::ScalarValue;
use crate::engine::LocalEngine;
use crate::error::{FederateError, Result};
use crate::interactions::{InboundMessage, InteractionRouter};
use crate::metrics::FederateMetrics;
use crate::registry::HandleRegistry;
use crate::reservation::ReservationCoordinator;
use crate::rti::{FederationService, LogicalTime};
use crate::session::FederateSession;
use crate::sink::ValueSink;
use crate::time_manager::{TimeAdvanceState, TimeManager};

/// Whether the engine may run. Every pause or resume decision is taken with
/// this locked.
#[derive(Debug, Default)]
struct RunGate {
    /// Federation asked the engine to pause; grants must not resume it.
    held: bool,
    /// An advance is outstanding or failed; only a grant may resume the engine.
    advancing: bool,
}

/// State shared between the bridge and the control handlers.
#[derive(Debug, Default)]
struct ControlFlags {
    gate: Mutex<RunGate>,
    stop_requested: AtomicBool,
}

/// Everything built after joining; dropped wholesale if start-up fails.
struct Components {
    registry: HandleRegistry,
    attributes: Arc<AttributeExchange>,
    interactions: Arc<InteractionRouter>,
    instance_name: String,
}

pub struct SimulationBridge {
    session: FederateSession,
    registry: HandleRegistry,
    reservations: Arc<ReservationCoordinator>,
    time: Arc<TimeManager>,
    attributes: Arc<AttributeExchange>,
    interactions: Arc<InteractionRouter>,
    engine: Arc<dyn LocalEngine>,
    scale: TimeScale,
    flags: Arc<ControlFlags>,
    metrics: Arc<FederateMetrics>,
    instance_name: String,
}

impl SimulationBridge {
    /// Join the federation described by `config` and bring the federate to
    /// steady state.
    pub fn start(
        config: &AppConfig,
        service: Arc<dyn FederationService>,
        engine: Arc<dyn LocalEngine>,
        sink: Arc<dyn ValueSink>,
    ) -> Result<Self> {
        Self::start_with_metrics(config, service, engine, sink, Arc::new(FederateMetrics::new()))
    }

    pub fn start_with_metrics(
        config: &AppConfig,
        service: Arc<dyn FederationService>,
        engine: Arc<dyn LocalEngine>,
        sink: Arc<dyn ValueSink>,
        metrics: Arc<FederateMetrics>,
    ) -> Result<Self> {
        let reservations = Arc::new(ReservationCoordinator::new(
            service.clone(),
            config.reservation.timeout,
        ));
        let time = Arc::new(TimeManager::new(
            service.clone(),
            &config.time,
            metrics.clone(),
        ));
        let callbacks = Arc::new(FederateCallbacks::new(
            reservations.clone(),
            time.clone(),
        ));

        let session = FederateSession::open(&config.federation, service, callbacks.clone())?;
        let flags = Arc::new(ControlFlags::default());

        let established = Self::establish(
            config,
            &session,
            &callbacks,
            &reservations,
            &time,
            &engine,
            &flags,
            sink,
            &metrics,
        );
        let components = match established {
            Ok(components) => components,
            Err(err) => {
                error!(
                    federation = %config.federation.federation_name,
                    error = %err,
                    "federate start-up failed; leaving federation"
                );
                if let Err(close_err) = session.close() {
                    warn!(error = %close_err, "teardown after failed start-up incomplete");
                }
                return Err(err);
            }
        };

        info!(
            federation = session.federation_name(),
            federate = session.federate_name(),
            instance = %components.instance_name,
            logical_time = %time.logical_time(),
            "federate in steady state"
        );
        Ok(Self {
            session,
            registry: components.registry,
            reservations,
            time,
            attributes: components.attributes,
            interactions: components.interactions,
            engine,
            scale: TimeScale::from_config(&config.time),
            flags,
            metrics,
            instance_name: components.instance_name,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn establish(
        config: &AppConfig,
        session: &FederateSession,
        callbacks: &FederateCallbacks,
        reservations: &ReservationCoordinator,
        time: &TimeManager,
        engine: &Arc<dyn LocalEngine>,
        flags: &Arc<ControlFlags>,
        sink: Arc<dyn ValueSink>,
        metrics: &Arc<FederateMetrics>,
    ) -> Result<Components> {
        let service = session.service();
        let registry = HandleRegistry::populate(service.as_ref(), &config.schema)?;
        let bindings = SchemaBindings::build(&config.schema, &registry)?;

        let attributes = Arc::new(AttributeExchange::new(
            service.clone(),
            bindings.object_class,
            sink,
            metrics.clone(),
        ));
        let interactions = Arc::new(InteractionRouter::new(
            service.clone(),
            bindings.interactions,
            metrics.clone(),
        ));
        callbacks.attach_attributes(attributes.clone());
        callbacks.attach_interactions(interactions.clone());

        attributes.declare()?;
        interactions.declare()?;
        install_control_handlers(&interactions, &config.control, engine, flags)?;

        let instance_name = reserve_instance_name(
            reservations,
            &config.schema.object_class.instance_name,
            config.reservation.max_attempts,
        )?;
        attributes.register(&instance_name)?;

        time.enable_time_regulation(config.time.lookahead)?;
        time.enable_time_constrained()?;

        Ok(Components {
            registry,
            attributes,
            interactions,
            instance_name,
        })
    }

    pub fn session(&self) -> &FederateSession {
        &self.session
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    pub fn reservations(&self) -> &ReservationCoordinator {
        &self.reservations
    }

    pub fn time_manager(&self) -> &TimeManager {
        &self.time
    }

    pub fn attributes(&self) -> &AttributeExchange {
        &self.attributes
    }

    pub fn interactions(&self) -> &InteractionRouter {
        &self.interactions
    }

    pub fn metrics(&self) -> &FederateMetrics {
        &self.metrics
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn time_scale(&self) -> TimeScale {
        self.scale
    }

    pub fn state(&self) -> TimeAdvanceState {
        self.time.state()
    }

    pub fn logical_time(&self) -> LogicalTime {
        self.time.logical_time()
    }

    /// Set once a stop interaction has been received.
    pub fn stop_requested(&self) -> bool {
        self.flags.stop_requested.load(Ordering::SeqCst)
    }

    /// Whether the federation currently holds the engine paused.
    pub fn held(&self) -> bool {
        self.flags.gate.lock().held
    }

    /// Advance the federation clock up to the engine's current time.
    pub fn on_time_boundary(&self) -> Result<LogicalTime> {
        self.advance_to(self.engine.current_sim_time())
    }

    /// Pause the engine, advance to the logical equivalent of `local_time`
    /// and resume once granted. On failure the engine stays paused until a
    /// later advance is granted; a start interaction does not release it.
    pub fn advance_to(&self, local_time: f64) -> Result<LogicalTime> {
        let target = LogicalTime::new(self.scale.to_logical(local_time));
        let current = self.time.logical_time();
        if self.time.state().can_request_advance() && target <= current {
            debug!(%target, %current, "boundary already covered by the last grant");
            let mut gate = self.flags.gate.lock();
            if gate.advancing {
                // An earlier advance timed out and its grant was collected since.
                gate.advancing = false;
                if !gate.held {
                    self.engine.resume();
                }
            }
            return Ok(current);
        }

        {
            let mut gate = self.flags.gate.lock();
            gate.advancing = true;
            self.engine.pause();
        }
        // The gate is released while blocked: control interactions arrive on
        // the same callback thread as the grant.
        let granted = self.time.request_advance(target).map_err(|err| {
            warn!(%target, local_time, error = %err, "time advance failed; engine left paused");
            err
        })?;

        let mut gate = self.flags.gate.lock();
        gate.advancing = false;
        if gate.held {
            debug!(%granted, "advance granted; engine held by federation");
        } else {
            self.engine.resume();
        }
        Ok(granted)
    }

    /// Publish local values as one attribute update.
    pub fn publish<I, K>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, ScalarValue)>,
        K: AsRef<str>,
    {
        self.attributes.publish(values)
    }

    pub fn send_interaction<I, K>(&self, name: &str, parameters: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, ScalarValue)>,
        K: AsRef<str>,
    {
        self.interactions.send(name, parameters)
    }

    /// Register an application handler. Replaces a control handler of the
    /// same name.
    pub fn on_interaction<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.interactions.on(name, handler)
    }

    /// Disable time management, delete the object instance and leave the
    /// federation. Every step is attempted; the first error is returned.
    pub fn shutdown(self) -> Result<()> {
        info!(
            federation = self.session.federation_name(),
            instance = %self.instance_name,
            logical_time = %self.time.logical_time(),
            "shutting down federate"
        );
        let mut first_error: Option<FederateError> = None;
        let mut note = |step: &str, result: Result<()>| {
            if let Err(err) = result {
                warn!(step, error = %err, "shutdown step failed");
                first_error.get_or_insert(err);
            }
        };

        if self.time.is_regulating() {
            note("disable time regulation", self.time.disable_time_regulation());
        }
        if self.time.is_constrained() {
            note("disable time constrained", self.time.disable_time_constrained());
        }
        if let Some(registration) = self.attributes.registration() {
            note(
                "delete object instance",
                self.session
                    .service()
                    .delete_object_instance(registration.instance())
                    .map_err(FederateError::service("delete_object_instance")),
            );
        }
        note("leave federation", self.session.close());

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Try `base`, then `base_1`, `base_2`, ... until one is accepted.
fn reserve_instance_name(
    reservations: &ReservationCoordinator,
    base: &str,
    max_attempts: u32,
) -> Result<String> {
    for attempt in 0..max_attempts {
        let name = if attempt == 0 {
            base.to_owned()
        } else {
            format!("{base}_{attempt}")
        };
        if reservations.reserve(&name)? {
            return Ok(name);
        }
        debug!(name = %name, attempt, "instance name taken; trying a decorated name");
    }
    Err(FederateError::ReservationRejected {
        name: base.to_owned(),
        attempts: max_attempts,
    })
}

fn install_control_handlers(
    router: &InteractionRouter,
    control: &ControlConfig,
    engine: &Arc<dyn LocalEngine>,
    flags: &Arc<ControlFlags>,
) -> Result<()> {
    if let Some(name) = &control.start {
        let (engine, flags) = (engine.clone(), flags.clone());
        router.on(name, move |message| {
            let mut gate = flags.gate.lock();
            gate.held = false;
            if gate.advancing {
                info!(interaction = %message.name, "start requested by federation; resuming once granted");
            } else {
                info!(interaction = %message.name, "start requested by federation");
                engine.resume();
            }
        })?;
    }
    if let Some(name) = &control.pause {
        let (engine, flags) = (engine.clone(), flags.clone());
        router.on(name, move |message| {
            info!(interaction = %message.name, "pause requested by federation");
            let mut gate = flags.gate.lock();
            gate.held = true;
            engine.pause();
        })?;
    }
    if let Some(name) = &control.stop {
        let (engine, flags) = (engine.clone(), flags.clone());
        router.on(name, move |message| {
            info!(interaction = %message.name, "stop requested by federation");
            let mut gate = flags.gate.lock();
            gate.held = true;
            flags.stop_requested.store(true, Ordering::SeqCst);
            engine.stop();
        })?;
    }
    Ok(())
}
