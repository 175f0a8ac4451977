//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Interface of the local discrete-event engine."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---

/// The local discrete-event engine as the bridge sees it.
///
/// Control calls arrive from both the engine thread and the federation
/// callback thread, so they must be non-blocking and idempotent.
pub trait LocalEngine: Send + Sync {
    /// Current simulation time in local units.
    fn current_sim_time(&self) -> f64;
    fn pause(&self);
    fn resume(&self);
    fn stop(&self);
}
