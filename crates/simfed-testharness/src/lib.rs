//! ---
//! fed_section: "11-simulation"
//! fed_subsection: "01-bootstrap"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Test harness exports: fake federation and stepping engine."
//! fed_version: "v0.1.0"
//! fed_owner: "tbd"
//! ---
//! Stand-ins for the two external collaborators of a federate: a
//! [`FakeFederation`] that answers service calls in-process and delivers
//! callbacks on its own thread, and a [`SteppingEngine`] that plays the local
//! discrete-event engine.

pub mod engine;
pub mod federation;
pub mod fixtures;

use std::time::{Duration, Instant};

pub use engine::{EngineEvent, SteppingEngine};
pub use federation::{
    EnablementPolicy, FakeFederation, FederationBehaviour, GrantPolicy, ReservationPolicy,
    ServiceCall,
};
pub use fixtures::station_config;

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
