//! ---
//! fed_section: "01-core-functionality"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Shared primitives and utilities for the federate runtime."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
//! Shared primitives for the SimFed workspace.
//! This crate exposes configuration loading, the value-type vocabulary used
//! by binding schemas, tracing initialisation and time-unit conversion.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AppConfig, ControlConfig, FederationConfig, InteractionConfig, LoggingConfig, MetricsConfig,
    ObjectClassConfig, ReservationConfig, SchemaConfig, SinkConfig, SinkKind, TimeConfig,
    ValueType,
};
pub use logging::{init_tracing, LogFormat};
pub use time::TimeScale;
