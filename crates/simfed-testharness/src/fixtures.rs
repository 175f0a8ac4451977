//! ---
//! fed_section: "11-simulation"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Canned federate configuration used by tests and dry runs."
//! fed_version: "v0.1.0"
//! fed_owner: "tbd"
//! ---
use std::time::Duration;

use indexmap::IndexMap;
use simfed_common::{
    AppConfig, ControlConfig, FederationConfig, InteractionConfig, LoggingConfig, MetricsConfig,
    ObjectClassConfig, ReservationConfig, SchemaConfig, SinkConfig, TimeConfig, ValueType,
};

/// A production-line station federate: three attributes, the three control
/// interactions and an `Order` interaction carrying parameters.
pub fn station_config() -> AppConfig {
    let attributes = IndexMap::from([
        ("WIP".to_owned(), ValueType::Int32),
        ("Utilisation".to_owned(), ValueType::Float64),
        ("Status".to_owned(), ValueType::Text),
    ]);
    let mut interactions: IndexMap<String, InteractionConfig> = ["Start", "Pause", "Stop"]
        .into_iter()
        .map(|name| {
            (
                name.to_owned(),
                InteractionConfig {
                    publish: false,
                    ..InteractionConfig::default()
                },
            )
        })
        .collect();
    interactions.insert(
        "Order".to_owned(),
        InteractionConfig {
            parameters: IndexMap::from([
                ("product".to_owned(), ValueType::Text),
                ("quantity".to_owned(), ValueType::Int32),
            ]),
            ..InteractionConfig::default()
        },
    );

    AppConfig {
        federation: FederationConfig {
            federation_name: "Factory".to_owned(),
            federate_name: "Line1".to_owned(),
            host: "localhost".to_owned(),
            config_reference: None,
        },
        time: TimeConfig {
            enable_timeout: Duration::from_secs(2),
            advance_timeout: Duration::from_secs(2),
            ..TimeConfig::default()
        },
        reservation: ReservationConfig {
            timeout: Duration::from_secs(2),
            max_attempts: 3,
        },
        schema: SchemaConfig {
            object_class: ObjectClassConfig {
                name: "HLAobjectRoot.Station".to_owned(),
                instance_name: "Scenario_X".to_owned(),
                subscribe: true,
                attributes,
            },
            interactions,
        },
        control: ControlConfig::default(),
        sink: SinkConfig::default(),
        logging: LoggingConfig::default(),
        metrics: MetricsConfig { enabled: false },
    }
}
