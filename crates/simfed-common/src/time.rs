//! ---
//! fed_section: "01-core-functionality"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Shared primitives and utilities for the federate runtime."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
use crate::config::TimeConfig;

/// Converts between local simulation time and federation logical time.
///
/// The conversion is a single multiplication so that every component uses the
/// same factor; nothing else in the workspace scales time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeScale {
    logical_per_local: f64,
}

impl TimeScale {
    /// Build a scale; non-finite or non-positive factors fall back to identity.
    pub fn new(logical_per_local: f64) -> Self {
        if logical_per_local.is_finite() && logical_per_local > 0.0 {
            Self { logical_per_local }
        } else {
            Self::identity()
        }
    }

    pub fn identity() -> Self {
        Self {
            logical_per_local: 1.0,
        }
    }

    pub fn from_config(config: &TimeConfig) -> Self {
        Self::new(config.unit_scale)
    }

    pub fn factor(&self) -> f64 {
        self.logical_per_local
    }

    /// Local simulation time to logical time.
    pub fn to_logical(&self, local: f64) -> f64 {
        local * self.logical_per_local
    }

    /// Logical time back to local simulation time.
    pub fn to_local(&self, logical: f64) -> f64 {
        logical / self.logical_per_local
    }
}

impl Default for TimeScale {
    fn default() -> Self {
        Self::identity()
    }
}
