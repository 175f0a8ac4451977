//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Exchange and time-advance counters with optional Prometheus export."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};

/// Point-in-time copy of the federate counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Batched attribute updates sent to the federation.
    pub updates_sent: u64,
    /// Attribute values decoded and handed to the sink.
    pub attributes_reflected: u64,
    /// Attribute values that were undeclared or failed to encode/decode.
    pub attributes_skipped: u64,
    pub interactions_sent: u64,
    pub interactions_received: u64,
    /// Inbound interactions with no registered handler.
    pub interactions_dropped: u64,
    pub advances_granted: u64,
}

#[derive(Default)]
struct Counters {
    updates_sent: AtomicU64,
    attributes_reflected: AtomicU64,
    attributes_skipped: AtomicU64,
    interactions_sent: AtomicU64,
    interactions_received: AtomicU64,
    interactions_dropped: AtomicU64,
    advances_granted: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            updates_sent: self.updates_sent.load(Ordering::Relaxed),
            attributes_reflected: self.attributes_reflected.load(Ordering::Relaxed),
            attributes_skipped: self.attributes_skipped.load(Ordering::Relaxed),
            interactions_sent: self.interactions_sent.load(Ordering::Relaxed),
            interactions_received: self.interactions_received.load(Ordering::Relaxed),
            interactions_dropped: self.interactions_dropped.load(Ordering::Relaxed),
            advances_granted: self.advances_granted.load(Ordering::Relaxed),
        }
    }
}

struct Exporter {
    updates_sent: IntCounter,
    attributes_reflected: IntCounter,
    attributes_skipped: IntCounter,
    interactions_sent: IntCounter,
    interactions_received: IntCounter,
    interactions_dropped: IntCounter,
    advances_granted: IntCounter,
    advance_latency: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl Exporter {
    fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let advance_latency = Histogram::with_opts(HistogramOpts::new(
            "simfed_time_advance_latency_seconds",
            "Time between a time-advance request and its grant",
        ))?;
        registry.register(Box::new(advance_latency.clone()))?;

        Ok(Self {
            updates_sent: counter(
                registry,
                "simfed_attribute_updates_sent_total",
                "Batched attribute updates sent to the federation",
            )?,
            attributes_reflected: counter(
                registry,
                "simfed_attributes_reflected_total",
                "Reflected attribute values delivered to the sink",
            )?,
            attributes_skipped: counter(
                registry,
                "simfed_attributes_skipped_total",
                "Attribute values skipped because they could not be encoded or decoded",
            )?,
            interactions_sent: counter(
                registry,
                "simfed_interactions_sent_total",
                "Interactions sent to the federation",
            )?,
            interactions_received: counter(
                registry,
                "simfed_interactions_received_total",
                "Interactions received from the federation",
            )?,
            interactions_dropped: counter(
                registry,
                "simfed_interactions_dropped_total",
                "Inbound interactions without a registered handler",
            )?,
            advances_granted: counter(
                registry,
                "simfed_time_advances_granted_total",
                "Time-advance grants received",
            )?,
            advance_latency,
        })
    }
}

/// Counters shared by the exchange, router and time manager.
#[derive(Default)]
pub struct FederateMetrics {
    counters: Counters,
    exporter: Option<Exporter>,
}

impl FederateMetrics {
    /// In-process counters only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters mirrored into `registry`.
    pub fn with_registry(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            counters: Counters::default(),
            exporter: Some(Exporter::register(registry)?),
        })
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.counters.snapshot()
    }

    pub fn observe_update_sent(&self) {
        self.counters.updates_sent.fetch_add(1, Ordering::Relaxed);
        if let Some(exporter) = &self.exporter {
            exporter.updates_sent.inc();
        }
    }

    pub fn observe_attribute_reflected(&self) {
        self.counters
            .attributes_reflected
            .fetch_add(1, Ordering::Relaxed);
        if let Some(exporter) = &self.exporter {
            exporter.attributes_reflected.inc();
        }
    }

    pub fn observe_attribute_skipped(&self) {
        self.counters
            .attributes_skipped
            .fetch_add(1, Ordering::Relaxed);
        if let Some(exporter) = &self.exporter {
            exporter.attributes_skipped.inc();
        }
    }

    pub fn observe_interaction_sent(&self) {
        self.counters
            .interactions_sent
            .fetch_add(1, Ordering::Relaxed);
        if let Some(exporter) = &self.exporter {
            exporter.interactions_sent.inc();
        }
    }

    pub fn observe_interaction_received(&self) {
        self.counters
            .interactions_received
            .fetch_add(1, Ordering::Relaxed);
        if let Some(exporter) = &self.exporter {
            exporter.interactions_received.inc();
        }
    }

    pub fn observe_interaction_dropped(&self) {
        self.counters
            .interactions_dropped
            .fetch_add(1, Ordering::Relaxed);
        if let Some(exporter) = &self.exporter {
            exporter.interactions_dropped.inc();
        }
    }

    /// Record a grant and how long the request waited for it.
    pub fn observe_advance_granted(&self, latency: Duration) {
        self.counters
            .advances_granted
            .fetch_add(1, Ordering::Relaxed);
        if let Some(exporter) = &self.exporter {
            exporter.advances_granted.inc();
            exporter.advance_latency.observe(latency.as_secs_f64());
        }
    }
}
