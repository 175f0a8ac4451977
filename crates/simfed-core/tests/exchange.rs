//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "integration-tests"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Attribute and interaction exchange through a running bridge."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use simfed_common::ValueType;
use simfed_core::codec::encode;
use simfed_core::{
    FederationService, HandleCategory, HandleValueMap, InboundMessage, InstanceHandle,
    LocalEngine, MemorySink, ScalarValue, SimulationBridge, ValueSink,
};
use simfed_testharness::{station_config, wait_for, FakeFederation, SteppingEngine};
use tracing_subscriber::fmt::MakeWriter;

const WAIT: Duration = Duration::from_secs(2);

fn running() -> (Arc<FakeFederation>, Arc<MemorySink>, SimulationBridge) {
    let fake = FakeFederation::shared();
    let sink = Arc::new(MemorySink::new());
    let service: Arc<dyn FederationService> = fake.clone();
    let engine: Arc<dyn LocalEngine> = Arc::new(SteppingEngine::new(1.0));
    let values: Arc<dyn ValueSink> = sink.clone();
    let bridge =
        SimulationBridge::start(&station_config(), service, engine, values).expect("bridge starts");
    (fake, sink, bridge)
}

fn encoded(value_type: ValueType, value: impl Into<ScalarValue>) -> Bytes {
    encode(value_type, &value.into()).expect("value encodes")
}

#[test]
fn published_wip_reaches_the_federation_big_endian() {
    let (fake, _sink, bridge) = running();
    let sent = bridge
        .publish([("WIP", ScalarValue::Int32(5))])
        .expect("update sent");
    assert_eq!(sent, 1);

    let updates = fake.updates();
    assert_eq!(updates.len(), 1);
    let (instance, values) = &updates[0];
    assert_eq!(fake.registered_instances()[0], (*instance, "Scenario_X".to_owned()));
    let wip = fake
        .handle_of(HandleCategory::Attribute, "WIP")
        .expect("WIP resolved");
    assert_eq!(values.get(&wip).map(|raw| raw.to_vec()), Some(vec![0u8, 0, 0, 5]));
    assert_eq!(bridge.metrics().snapshot().updates_sent, 1);
}

#[test]
fn undeclared_attributes_are_skipped_from_the_update() {
    let (fake, _sink, bridge) = running();
    let sent = bridge
        .publish([
            ("WIP", ScalarValue::Int32(7)),
            ("Throughput", ScalarValue::Float64(1.5)),
            ("Utilisation", ScalarValue::from("busy")),
        ])
        .expect("partial update sent");
    assert_eq!(sent, 1);
    assert_eq!(fake.updates()[0].1.len(), 1);
    assert_eq!(bridge.metrics().snapshot().attributes_skipped, 2);
}

#[test]
fn malformed_reflection_delivers_the_remaining_attributes() {
    let (fake, sink, bridge) = running();
    let remote = InstanceHandle::new(77);
    let class = fake
        .handle_of(HandleCategory::ObjectClass, "HLAobjectRoot.Station")
        .expect("class resolved");
    fake.inject_discovery(remote, class, "Scenario_Y");
    fake.inject_reflection_named(
        remote,
        [
            ("WIP", encoded(ValueType::Int32, 12i32)),
            ("Utilisation", Bytes::from_static(&[0x3f, 0xe0, 0x00])),
            ("Status", encoded(ValueType::Text, "blocked")),
        ],
    )
    .expect("attributes resolved");

    assert!(wait_for(WAIT, || sink.deliveries() == 2));
    assert!(fake.sync(WAIT));
    assert_eq!(sink.get("WIP"), Some(ScalarValue::Int32(12)));
    assert_eq!(sink.get("Status"), Some(ScalarValue::Text("blocked".into())));
    assert_eq!(sink.get("Utilisation"), None);
    assert_eq!(
        bridge.attributes().remote_instances(),
        vec![(remote, "Scenario_Y".to_owned())]
    );
    let snapshot = bridge.metrics().snapshot();
    assert_eq!(snapshot.attributes_reflected, 2);
    assert_eq!(snapshot.attributes_skipped, 1);
}

#[test]
fn reflections_from_undiscovered_instances_are_delivered() {
    let (fake, sink, _bridge) = running();
    fake.inject_reflection_named(
        InstanceHandle::new(9),
        [("Utilisation", encoded(ValueType::Float64, 0.75f64))],
    )
    .expect("attribute resolved");
    assert!(wait_for(WAIT, || sink.deliveries() == 1));
    assert_eq!(sink.get("Utilisation"), Some(ScalarValue::Float64(0.75)));
}

#[test]
fn order_interaction_round_trips_through_the_router() {
    let (fake, _sink, bridge) = running();
    let received: Arc<Mutex<Vec<InboundMessage>>> = Arc::default();
    let inbox = received.clone();
    bridge
        .on_interaction("Order", move |message| inbox.lock().push(message.clone()))
        .expect("Order declared");

    let sent = bridge
        .send_interaction(
            "Order",
            [
                ("product", ScalarValue::from("bolt")),
                ("quantity", ScalarValue::Int32(12)),
            ],
        )
        .expect("interaction sent");
    assert_eq!(sent, 2);
    let (class, parameters) = fake.sent_interactions().remove(0);
    assert_eq!(
        Some(class),
        fake.handle_of(HandleCategory::InteractionClass, "Order")
    );

    // Echo what we sent back as if another federate had sent it.
    fake.inject_interaction(class, parameters);
    assert!(wait_for(WAIT, || received.lock().len() == 1));
    let message = received.lock().remove(0);
    assert_eq!(message.name, "Order");
    assert_eq!(message.parameter("product"), Some(&ScalarValue::from("bolt")));
    assert_eq!(message.parameter("quantity"), Some(&ScalarValue::Int32(12)));
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn unhandled_interaction_is_logged_and_dropped() {
    let (fake, _sink, bridge) = running();
    let class = fake
        .handle_of(HandleCategory::InteractionClass, "Order")
        .expect("Order resolved");
    let quantity = fake
        .handle_of(HandleCategory::Parameter, "quantity")
        .expect("quantity resolved");
    let parameters = HandleValueMap::from([(quantity, encoded(ValueType::Int32, 3i32))]);

    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let handled = tracing::subscriber::with_default(subscriber, || {
        bridge.interactions().on_receive(class, &parameters)
    });

    assert!(!handled);
    let output = logs.contents();
    assert!(output.contains("no handler registered; interaction dropped"), "{output}");
    assert!(output.contains("Order"), "{output}");
    assert_eq!(bridge.metrics().snapshot().interactions_dropped, 1);
}
