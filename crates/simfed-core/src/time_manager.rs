//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Time regulation/constrained enablement and the advance request/grant cycle."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
//! Every read-modify-write of the time state happens under one mutex. Service
//! requests that produce a callback are issued with the lock released, because
//! the callback may be delivered before the request returns.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use simfed_common::TimeConfig;
use tracing::{debug, info, warn};

use crate::error::{FederateError, Result};
use crate::metrics::FederateMetrics;
use crate::rti::{FederationService, LogicalTime};
use crate::signal::OneShot;

/// Combined view of both enablement flags and the advance cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeAdvanceState {
    Idle,
    RegulationPending,
    ConstrainedPending,
    Enabled,
    AdvanceRequested,
    AdvanceGranted,
}

impl TimeAdvanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeAdvanceState::Idle => "idle",
            TimeAdvanceState::RegulationPending => "regulation pending",
            TimeAdvanceState::ConstrainedPending => "constrained pending",
            TimeAdvanceState::Enabled => "enabled",
            TimeAdvanceState::AdvanceRequested => "advance requested",
            TimeAdvanceState::AdvanceGranted => "advance granted",
        }
    }

    /// States from which a new advance may be requested.
    pub fn can_request_advance(&self) -> bool {
        matches!(
            self,
            TimeAdvanceState::Enabled | TimeAdvanceState::AdvanceGranted
        )
    }
}

impl fmt::Display for TimeAdvanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Regulation,
    Constrained,
}

impl Mode {
    fn label(self) -> &'static str {
        match self {
            Mode::Regulation => "time regulation",
            Mode::Constrained => "time constrained",
        }
    }
}

#[derive(Debug)]
enum Enablement {
    Disabled,
    Pending(OneShot<LogicalTime>),
    Enabled,
}

#[derive(Debug)]
enum Advance {
    Idle,
    Requested {
        target: LogicalTime,
        signal: OneShot<LogicalTime>,
        issued: Instant,
    },
    Granted(LogicalTime),
}

#[derive(Debug)]
struct TimeState {
    regulation: Enablement,
    constrained: Enablement,
    advance: Advance,
    current: LogicalTime,
}

impl TimeState {
    fn mode(&mut self, mode: Mode) -> &mut Enablement {
        match mode {
            Mode::Regulation => &mut self.regulation,
            Mode::Constrained => &mut self.constrained,
        }
    }

    fn combined(&self) -> TimeAdvanceState {
        match self.advance {
            Advance::Requested { .. } => return TimeAdvanceState::AdvanceRequested,
            Advance::Granted(_) => return TimeAdvanceState::AdvanceGranted,
            Advance::Idle => {}
        }
        match (&self.regulation, &self.constrained) {
            (Enablement::Enabled, Enablement::Enabled) => TimeAdvanceState::Enabled,
            (Enablement::Pending(_), _) => TimeAdvanceState::RegulationPending,
            (_, Enablement::Pending(_)) => TimeAdvanceState::ConstrainedPending,
            _ => TimeAdvanceState::Idle,
        }
    }
}

/// Owns the time-management state of one federate.
pub struct TimeManager {
    service: Arc<dyn FederationService>,
    state: Mutex<TimeState>,
    enable_timeout: Duration,
    advance_timeout: Duration,
    metrics: Arc<FederateMetrics>,
}

impl TimeManager {
    pub fn new(
        service: Arc<dyn FederationService>,
        config: &TimeConfig,
        metrics: Arc<FederateMetrics>,
    ) -> Self {
        Self {
            service,
            state: Mutex::new(TimeState {
                regulation: Enablement::Disabled,
                constrained: Enablement::Disabled,
                advance: Advance::Idle,
                current: LogicalTime::ZERO,
            }),
            enable_timeout: config.enable_timeout,
            advance_timeout: config.advance_timeout,
            metrics,
        }
    }

    pub fn state(&self) -> TimeAdvanceState {
        self.state.lock().combined()
    }

    /// Latest logical time reported by an enablement or grant callback.
    pub fn logical_time(&self) -> LogicalTime {
        self.state.lock().current
    }

    pub fn is_regulating(&self) -> bool {
        matches!(self.state.lock().regulation, Enablement::Enabled)
    }

    pub fn is_constrained(&self) -> bool {
        matches!(self.state.lock().constrained, Enablement::Enabled)
    }

    /// Enable regulation and block until the service confirms it.
    pub fn enable_time_regulation(&self, lookahead: f64) -> Result<LogicalTime> {
        self.enable(Mode::Regulation, || {
            self.service
                .enable_time_regulation(lookahead)
                .map_err(FederateError::service("enable_time_regulation"))
        })
    }

    /// Enable constrained mode and block until the service confirms it.
    pub fn enable_time_constrained(&self) -> Result<LogicalTime> {
        self.enable(Mode::Constrained, || {
            self.service
                .enable_time_constrained()
                .map_err(FederateError::service("enable_time_constrained"))
        })
    }

    fn enable(&self, mode: Mode, request: impl FnOnce() -> Result<()>) -> Result<LogicalTime> {
        let signal = {
            let mut state = self.state.lock();
            let refused = matches!(state.advance, Advance::Requested { .. })
                || !matches!(state.mode(mode), Enablement::Disabled);
            if refused {
                return Err(FederateError::InvalidStateTransition {
                    operation: match mode {
                        Mode::Regulation => "enable time regulation",
                        Mode::Constrained => "enable time constrained",
                    },
                    state: state.combined(),
                });
            }
            let signal = OneShot::new();
            *state.mode(mode) = Enablement::Pending(signal.clone());
            signal
        };

        debug!(mode = mode.label(), "requesting enablement");
        if let Err(err) = request() {
            let mut state = self.state.lock();
            let slot = state.mode(mode);
            if matches!(slot, Enablement::Pending(armed) if armed.same_as(&signal)) {
                *slot = Enablement::Disabled;
            }
            return Err(err);
        }

        // On timeout the mode stays pending so a late confirmation still lands.
        signal
            .wait_timeout(self.enable_timeout)
            .ok_or(FederateError::Timeout {
                operation: match mode {
                    Mode::Regulation => "time regulation enablement",
                    Mode::Constrained => "time constrained enablement",
                },
                timeout: self.enable_timeout,
            })
    }

    /// Callback: the service confirmed regulation.
    pub fn time_regulation_enabled(&self, time: LogicalTime) {
        self.on_enabled(Mode::Regulation, time);
    }

    /// Callback: the service confirmed constrained mode.
    pub fn time_constrained_enabled(&self, time: LogicalTime) {
        self.on_enabled(Mode::Constrained, time);
    }

    fn on_enabled(&self, mode: Mode, time: LogicalTime) {
        let mut state = self.state.lock();
        let slot = state.mode(mode);
        let Enablement::Pending(signal) = slot else {
            warn!(mode = mode.label(), %time, "unexpected enablement callback ignored");
            return;
        };
        let signal = signal.clone();
        *slot = Enablement::Enabled;
        state.current = time;
        signal.complete(time);
        info!(mode = mode.label(), %time, state = %state.combined(), "time mode enabled");
    }

    /// Request an advance to `target` and block until granted, using the
    /// configured timeout.
    pub fn request_advance(&self, target: LogicalTime) -> Result<LogicalTime> {
        self.request_advance_within(target, self.advance_timeout)
    }

    /// Like [`request_advance`](Self::request_advance) with an explicit
    /// timeout. A target behind the current logical time, or NaN, is an
    /// [`FederateError::InvalidLogicalTime`].
    pub fn request_advance_within(
        &self,
        target: LogicalTime,
        timeout: Duration,
    ) -> Result<LogicalTime> {
        let signal = OneShot::new();
        let previous = {
            let mut state = self.state.lock();
            let combined = state.combined();
            if !combined.can_request_advance() {
                return Err(FederateError::InvalidStateTransition {
                    operation: "request a time advance",
                    state: combined,
                });
            }
            if !(target >= state.current) {
                return Err(FederateError::InvalidLogicalTime {
                    requested: target,
                    current: state.current,
                });
            }
            std::mem::replace(
                &mut state.advance,
                Advance::Requested {
                    target,
                    signal: signal.clone(),
                    issued: Instant::now(),
                },
            )
        };

        debug!(%target, "requesting time advance");
        if let Err(err) = self.service.next_message_request(target) {
            let mut state = self.state.lock();
            if matches!(&state.advance, Advance::Requested { signal: armed, .. } if armed.same_as(&signal))
            {
                state.advance = previous;
            }
            return Err(FederateError::service("next_message_request")(err));
        }

        self.wait_for_grant(&signal, timeout)
    }

    /// Wait again for an advance whose earlier wait timed out.
    pub fn await_grant(&self, timeout: Duration) -> Result<LogicalTime> {
        let signal = {
            let state = self.state.lock();
            match &state.advance {
                Advance::Requested { signal, .. } => signal.clone(),
                Advance::Granted(time) => return Ok(*time),
                Advance::Idle => {
                    return Err(FederateError::InvalidStateTransition {
                        operation: "await a time advance grant",
                        state: state.combined(),
                    })
                }
            }
        };
        self.wait_for_grant(&signal, timeout)
    }

    fn wait_for_grant(&self, signal: &OneShot<LogicalTime>, timeout: Duration) -> Result<LogicalTime> {
        match signal.wait_timeout(timeout) {
            Some(granted) => Ok(granted),
            // Another waiter already collected the grant.
            None if signal.is_completed() => Ok(self.logical_time()),
            None => Err(FederateError::Timeout {
                operation: "time advance",
                timeout,
            }),
        }
    }

    /// Callback: the service granted the outstanding advance.
    pub fn time_advance_grant(&self, time: LogicalTime) {
        let mut state = self.state.lock();
        let Advance::Requested {
            target,
            signal,
            issued,
        } = &state.advance
        else {
            warn!(%time, state = %state.combined(), "time advance grant without an outstanding request ignored");
            return;
        };
        let (target, signal, latency) = (*target, signal.clone(), issued.elapsed());
        let time = if time < state.current {
            warn!(%time, current = %state.current, "grant behind the current logical time; keeping current");
            state.current
        } else {
            time
        };
        if time < target {
            debug!(%target, %time, "grant earlier than requested target");
        }
        state.advance = Advance::Granted(time);
        state.current = time;
        signal.complete(time);
        self.metrics.observe_advance_granted(latency);
        debug!(%time, latency_ms = latency.as_millis() as u64, "time advance granted");
    }

    pub fn disable_time_regulation(&self) -> Result<()> {
        self.disable(Mode::Regulation, || {
            self.service
                .disable_time_regulation()
                .map_err(FederateError::service("disable_time_regulation"))
        })
    }

    pub fn disable_time_constrained(&self) -> Result<()> {
        self.disable(Mode::Constrained, || {
            self.service
                .disable_time_constrained()
                .map_err(FederateError::service("disable_time_constrained"))
        })
    }

    // Disabling produces no callback, so the request is issued under the lock.
    fn disable(&self, mode: Mode, request: impl FnOnce() -> Result<()>) -> Result<()> {
        let mut state = self.state.lock();
        let refused = matches!(state.advance, Advance::Requested { .. })
            || !matches!(state.mode(mode), Enablement::Enabled);
        if refused {
            return Err(FederateError::InvalidStateTransition {
                operation: match mode {
                    Mode::Regulation => "disable time regulation",
                    Mode::Constrained => "disable time constrained",
                },
                state: state.combined(),
            });
        }
        request()?;
        *state.mode(mode) = Enablement::Disabled;
        state.advance = Advance::Idle;
        info!(mode = mode.label(), state = %state.combined(), "time mode disabled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingService;
    use std::thread;

    fn manager() -> (Arc<RecordingService>, Arc<TimeManager>) {
        manager_with(Duration::from_secs(5))
    }

    fn manager_with(enable_timeout: Duration) -> (Arc<RecordingService>, Arc<TimeManager>) {
        let service = RecordingService::new();
        let config = TimeConfig {
            enable_timeout,
            advance_timeout: Duration::from_secs(5),
            ..TimeConfig::default()
        };
        let manager = Arc::new(TimeManager::new(
            service.clone(),
            &config,
            Arc::new(FederateMetrics::new()),
        ));
        (service, manager)
    }

    fn confirm_when(
        manager: &Arc<TimeManager>,
        awaited: TimeAdvanceState,
        confirm: fn(&TimeManager, LogicalTime),
        time: f64,
    ) -> thread::JoinHandle<()> {
        let manager = manager.clone();
        thread::spawn(move || {
            while manager.state() != awaited {
                thread::yield_now();
            }
            confirm(manager.as_ref(), LogicalTime::new(time));
        })
    }

    fn enable_both(manager: &Arc<TimeManager>) {
        let confirm = confirm_when(
            manager,
            TimeAdvanceState::RegulationPending,
            TimeManager::time_regulation_enabled,
            0.0,
        );
        manager.enable_time_regulation(1.0).expect("regulation");
        confirm.join().expect("confirm thread");
        let confirm = confirm_when(
            manager,
            TimeAdvanceState::ConstrainedPending,
            TimeManager::time_constrained_enabled,
            0.0,
        );
        manager.enable_time_constrained().expect("constrained");
        confirm.join().expect("confirm thread");
    }

    #[test]
    fn regulation_alone_is_not_enabled() {
        let (_, manager) = manager();
        let confirm = confirm_when(
            &manager,
            TimeAdvanceState::RegulationPending,
            TimeManager::time_regulation_enabled,
            0.0,
        );
        manager.enable_time_regulation(1.0).expect("regulation");
        confirm.join().expect("confirm thread");
        assert!(manager.is_regulating());
        assert_eq!(manager.state(), TimeAdvanceState::Idle);
        let err = manager
            .request_advance(LogicalTime::new(1.0))
            .expect_err("constrained missing");
        assert!(matches!(err, FederateError::InvalidStateTransition { .. }));
    }

    #[test]
    fn both_modes_reach_enabled() {
        let (service, manager) = manager();
        enable_both(&manager);
        assert_eq!(manager.state(), TimeAdvanceState::Enabled);
        assert_eq!(service.count("enable_time_regulation"), 1);
        assert_eq!(service.count("enable_time_constrained"), 1);
    }

    #[test]
    fn enabling_twice_is_refused() {
        let (_, manager) = manager();
        enable_both(&manager);
        let err = manager.enable_time_regulation(1.0).expect_err("already on");
        assert!(matches!(
            err,
            FederateError::InvalidStateTransition {
                state: TimeAdvanceState::Enabled,
                ..
            }
        ));
    }

    #[test]
    fn service_error_leaves_state_unchanged() {
        let (service, manager) = manager();
        service.fail("enable_time_regulation");
        let err = manager.enable_time_regulation(1.0).expect_err("refused");
        assert!(matches!(err, FederateError::Service { .. }));
        assert_eq!(manager.state(), TimeAdvanceState::Idle);

        service.heal("enable_time_regulation");
        enable_both(&manager);
        service.fail("next_message_request");
        assert!(manager.request_advance(LogicalTime::new(5.0)).is_err());
        assert_eq!(manager.state(), TimeAdvanceState::Enabled);
    }

    #[test]
    fn enablement_timeout_keeps_mode_pending() {
        let (_, manager) = manager_with(Duration::from_millis(10));
        let err = manager.enable_time_constrained().expect_err("no callback");
        assert!(matches!(err, FederateError::Timeout { .. }));
        assert_eq!(manager.state(), TimeAdvanceState::ConstrainedPending);
        manager.time_constrained_enabled(LogicalTime::new(2.0));
        assert!(manager.is_constrained());
        assert_eq!(manager.logical_time(), LogicalTime::new(2.0));
    }

    #[test]
    fn advance_blocks_until_granted() {
        let (_, manager) = manager();
        enable_both(&manager);
        let granter = confirm_when(
            &manager,
            TimeAdvanceState::AdvanceRequested,
            TimeManager::time_advance_grant,
            10.0,
        );
        let granted = manager
            .request_advance(LogicalTime::new(10.0))
            .expect("granted");
        granter.join().expect("grant thread");
        assert_eq!(granted, LogicalTime::new(10.0));
        assert_eq!(manager.state(), TimeAdvanceState::AdvanceGranted);
        assert_eq!(manager.metrics.snapshot().advances_granted, 1);
    }

    #[test]
    fn second_request_while_outstanding_is_refused() {
        let (_, manager) = manager();
        enable_both(&manager);
        let background = manager.clone();
        let first = thread::spawn(move || background.request_advance(LogicalTime::new(4.0)));
        while manager.state() != TimeAdvanceState::AdvanceRequested {
            thread::yield_now();
        }
        let err = manager
            .request_advance(LogicalTime::new(8.0))
            .expect_err("outstanding");
        assert!(matches!(
            err,
            FederateError::InvalidStateTransition {
                state: TimeAdvanceState::AdvanceRequested,
                ..
            }
        ));
        manager.time_advance_grant(LogicalTime::new(4.0));
        assert_eq!(
            first.join().expect("thread").expect("granted"),
            LogicalTime::new(4.0)
        );
    }

    #[test]
    fn target_behind_current_time_is_rejected() {
        let (_, manager) = manager();
        enable_both(&manager);
        let granter = confirm_when(
            &manager,
            TimeAdvanceState::AdvanceRequested,
            TimeManager::time_advance_grant,
            6.0,
        );
        manager
            .request_advance(LogicalTime::new(6.0))
            .expect("granted");
        granter.join().expect("grant thread");
        let err = manager
            .request_advance(LogicalTime::new(3.0))
            .expect_err("backwards");
        assert!(matches!(err, FederateError::InvalidLogicalTime { .. }));
        assert_eq!(manager.state(), TimeAdvanceState::AdvanceGranted);
    }

    #[test]
    fn late_grant_is_collected_by_await_grant() {
        let (_, manager) = manager();
        enable_both(&manager);
        let err = manager
            .request_advance_within(LogicalTime::new(2.0), Duration::from_millis(10))
            .expect_err("no grant yet");
        assert!(matches!(err, FederateError::Timeout { .. }));
        assert_eq!(manager.state(), TimeAdvanceState::AdvanceRequested);
        manager.time_advance_grant(LogicalTime::new(2.0));
        assert_eq!(
            manager.await_grant(Duration::from_millis(10)).expect("late grant"),
            LogicalTime::new(2.0)
        );
    }

    #[test]
    fn grant_behind_current_time_does_not_rewind_the_clock() {
        let (_, manager) = manager();
        enable_both(&manager);
        let granter = confirm_when(
            &manager,
            TimeAdvanceState::AdvanceRequested,
            TimeManager::time_advance_grant,
            6.0,
        );
        manager
            .request_advance(LogicalTime::new(6.0))
            .expect("granted");
        granter.join().expect("grant thread");

        manager
            .request_advance_within(LogicalTime::new(7.0), Duration::ZERO)
            .expect_err("no grant yet");
        manager.time_advance_grant(LogicalTime::new(2.0));
        assert_eq!(manager.state(), TimeAdvanceState::AdvanceGranted);
        assert_eq!(manager.logical_time(), LogicalTime::new(6.0));
        assert_eq!(
            manager.await_grant(Duration::ZERO).expect("collected"),
            LogicalTime::new(6.0)
        );
    }

    #[test]
    fn unsolicited_grant_is_ignored() {
        let (_, manager) = manager();
        enable_both(&manager);
        manager.time_advance_grant(LogicalTime::new(50.0));
        assert_eq!(manager.state(), TimeAdvanceState::Enabled);
        assert_eq!(manager.logical_time(), LogicalTime::ZERO);
    }

    #[test]
    fn disable_returns_to_idle() {
        let (service, manager) = manager();
        enable_both(&manager);
        manager.disable_time_regulation().expect("disable regulation");
        assert_eq!(manager.state(), TimeAdvanceState::Idle);
        manager.disable_time_constrained().expect("disable constrained");
        assert!(!manager.is_regulating() && !manager.is_constrained());
        assert!(manager.disable_time_constrained().is_err());
        assert_eq!(service.count("disable_time_constrained"), 1);
    }

    mod sequences {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Call {
            EnableRegulation,
            EnableConstrained,
            ConfirmRegulation,
            ConfirmConstrained,
            Request(u8),
            Grant(i8),
            DisableRegulation,
            DisableConstrained,
        }

        fn call() -> impl Strategy<Value = Call> {
            prop_oneof![
                Just(Call::EnableRegulation),
                Just(Call::EnableConstrained),
                Just(Call::ConfirmRegulation),
                Just(Call::ConfirmConstrained),
                (0u8..5).prop_map(Call::Request),
                (-3i8..4).prop_map(Call::Grant),
                Just(Call::DisableRegulation),
                Just(Call::DisableConstrained),
            ]
        }

        proptest! {
            #[test]
            fn advance_is_never_requested_twice_or_before_enablement(
                calls in proptest::collection::vec(call(), 1..48)
            ) {
                // Nothing answers asynchronously, so every blocking call times
                // out at once and confirmations arrive only as scripted calls.
                let (service, manager) = manager_with(Duration::ZERO);
                for call in calls {
                    let before = manager.state();
                    let enabled = manager.is_regulating() && manager.is_constrained();
                    let clock = manager.logical_time();
                    let issued = service.count("next_message_request");
                    match call {
                        Call::EnableRegulation => {
                            let _ = manager.enable_time_regulation(1.0);
                        }
                        Call::EnableConstrained => {
                            let _ = manager.enable_time_constrained();
                        }
                        Call::ConfirmRegulation => manager.time_regulation_enabled(clock),
                        Call::ConfirmConstrained => manager.time_constrained_enabled(clock),
                        Call::Request(delta) => {
                            let target = LogicalTime::new(clock.value() + f64::from(delta));
                            let outcome = manager.request_advance_within(target, Duration::ZERO);
                            if before == TimeAdvanceState::AdvanceRequested {
                                let refused = matches!(
                                    outcome,
                                    Err(FederateError::InvalidStateTransition { .. })
                                );
                                prop_assert!(refused, "{:?}", outcome);
                            }
                            if service.count("next_message_request") > issued {
                                prop_assert!(enabled);
                                prop_assert!(before.can_request_advance());
                                prop_assert_eq!(manager.state(), TimeAdvanceState::AdvanceRequested);
                            } else {
                                prop_assert!(outcome.is_err());
                            }
                        }
                        Call::Grant(offset) => manager
                            .time_advance_grant(LogicalTime::new(clock.value() + f64::from(offset))),
                        Call::DisableRegulation => {
                            let _ = manager.disable_time_regulation();
                        }
                        Call::DisableConstrained => {
                            let _ = manager.disable_time_constrained();
                        }
                    }
                    if manager.state() == TimeAdvanceState::AdvanceRequested {
                        prop_assert!(manager.is_regulating() && manager.is_constrained());
                    }
                    prop_assert!(manager.logical_time() >= clock);
                }
            }
        }
    }
}
