//! ---
//! fed_section: "11-simulation"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Fixed-step local engine that records control calls."
//! fed_version: "v0.1.0"
//! fed_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use simfed_core::LocalEngine;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    Paused,
    Resumed,
    Stopped,
}

/// Local engine whose clock moves only when [`SteppingEngine::step`] is called.
#[derive(Debug)]
pub struct SteppingEngine {
    now: Mutex<f64>,
    step: f64,
    paused: AtomicBool,
    stopped: AtomicBool,
    events: Mutex<Vec<EngineEvent>>,
}

impl SteppingEngine {
    pub fn new(step: f64) -> Self {
        Self {
            now: Mutex::new(0.0),
            step,
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Advance the clock by one step unless paused or stopped.
    pub fn step(&self) -> Option<f64> {
        if self.is_paused() || self.is_stopped() {
            return None;
        }
        let mut now = self.now.lock();
        *now += self.step;
        Some(*now)
    }

    pub fn set_time(&self, time: f64) {
        *self.now.lock() = time;
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    fn record(&self, event: EngineEvent) {
        trace!(?event, "engine control");
        self.events.lock().push(event);
    }
}

impl LocalEngine for SteppingEngine {
    fn current_sim_time(&self) -> f64 {
        *self.now.lock()
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.record(EngineEvent::Paused);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.record(EngineEvent::Resumed);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.record(EngineEvent::Stopped);
    }
}
