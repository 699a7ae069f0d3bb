//! Router dispatch against real queues and a capturing forwarder.

use std::sync::Arc;

use relaynode::error::{ForwardError, RadioError};
use relaynode::espnow::mac::MacAddr;
use relaynode::protocol::message::{MessageKind, Origin};
use relaynode::protocol::queue::{CONFIG_QUEUE_CAPACITY, ConfigQueue, SensorQueue};
use relaynode::protocol::router::{DropReason, Forward, MessageRouter, Routed};
use serde_json::Value;

use crate::mocks::PEER_A;

#[derive(Default)]
struct CapturingForwarder {
    forwarded: Vec<(String, Value)>,
    refuse: bool,
}

impl Forward for CapturingForwarder {
    fn forward(&mut self, destination: &str, doc: Value) -> Result<MacAddr, ForwardError> {
        if self.refuse {
            return Err(ForwardError::Radio(RadioError::UnknownPeer));
        }
        let mac: MacAddr = destination
            .parse()
            .map_err(|_| ForwardError::InvalidDestination)?;
        self.forwarded.push((destination.to_owned(), doc));
        Ok(mac)
    }
}

fn router() -> (MessageRouter, Arc<SensorQueue>, Arc<ConfigQueue>) {
    let sensor = Arc::new(SensorQueue::new("sensor"));
    let config = Arc::new(ConfigQueue::new("config"));
    (MessageRouter::new(sensor.clone(), config.clone()), sensor, config)
}

#[test]
fn sensor_and_config_go_to_their_queues() {
    let (mut r, sensor, config) = router();

    assert_eq!(
        r.route(br#"{"type":"sensor","v":1}"#, Origin::Serial, None),
        Routed::Queued(MessageKind::Sensor)
    );
    assert_eq!(
        r.route(br#"{"type":"config","screenId":"a"}"#, Origin::Mqtt, None),
        Routed::Queued(MessageKind::Config)
    );
    assert_eq!(sensor.len(), 1);
    assert_eq!(config.len(), 1);

    let item = config.try_pop().expect("config item");
    assert_eq!(item.origin, Origin::Mqtt);
    assert_eq!(item.doc["screenId"], "a");
    assert_eq!(r.stats().routed, 2);
}

#[test]
fn invalid_messages_are_counted_and_dropped() {
    let (mut r, sensor, config) = router();

    assert_eq!(
        r.route(b"{broken", Origin::Serial, None),
        Routed::Dropped(DropReason::Unparsable)
    );
    assert_eq!(
        r.route(br#"{"value":3}"#, Origin::Serial, None),
        Routed::Dropped(DropReason::MissingType)
    );
    assert_eq!(
        r.route(br#"{"type":"firmware"}"#, Origin::Serial, None),
        Routed::Dropped(DropReason::UnknownType)
    );

    let stats = r.stats();
    assert_eq!(stats.unparsable, 1);
    assert_eq!(stats.missing_type, 1);
    assert_eq!(stats.unknown_type, 1);
    assert!(sensor.is_empty());
    assert!(config.is_empty());
}

#[test]
fn config_queue_holds_three() {
    let (mut r, _, config) = router();
    for _ in 0..CONFIG_QUEUE_CAPACITY {
        assert_eq!(
            r.route(br#"{"type":"config"}"#, Origin::Serial, None),
            Routed::Queued(MessageKind::Config)
        );
    }
    assert_eq!(
        r.route(br#"{"type":"config"}"#, Origin::Serial, None),
        Routed::Dropped(DropReason::QueueFull(MessageKind::Config))
    );
    assert_eq!(config.len(), CONFIG_QUEUE_CAPACITY);
}

#[test]
fn subscription_request_yields_topics() {
    let (mut r, sensor, _) = router();
    let routed = r.route(
        br#"{"type":"MQTT_Subscription_Request","subscriptions":["a/b","c/d",3]}"#,
        Origin::WebSocket,
        None,
    );
    assert_eq!(routed, Routed::Subscribe(vec!["a/b".into(), "c/d".into()]));
    assert!(sensor.is_empty());
}

#[test]
fn wipe_request_is_reported() {
    let (mut r, _, _) = router();
    assert_eq!(
        r.route(br#"{"type":"wipe_preferences"}"#, Origin::Http, None),
        Routed::Wipe
    );
}

#[test]
fn destination_takes_precedence_with_forwarder() {
    let (mut r, sensor, _) = router();
    let mut fwd = CapturingForwarder::default();

    let routed = r.route(
        br#"{"type":"sensor","destination":"AA:BB:CC:DD:EE:01"}"#,
        Origin::Serial,
        Some(&mut fwd),
    );
    assert_eq!(routed, Routed::Forwarded(PEER_A));
    assert_eq!(fwd.forwarded.len(), 1);
    assert_eq!(fwd.forwarded[0].0, "AA:BB:CC:DD:EE:01");
    assert!(sensor.is_empty());
    assert_eq!(r.stats().forwarded, 1);
}

#[test]
fn empty_destination_is_routed_locally() {
    let (mut r, sensor, _) = router();
    let mut fwd = CapturingForwarder::default();

    let routed = r.route(
        br#"{"type":"sensor","destination":""}"#,
        Origin::Serial,
        Some(&mut fwd),
    );
    assert_eq!(routed, Routed::Queued(MessageKind::Sensor));
    assert!(fwd.forwarded.is_empty());
    assert_eq!(sensor.len(), 1);
}

#[test]
fn refused_forward_is_dropped_not_queued() {
    let (mut r, sensor, _) = router();
    let mut fwd = CapturingForwarder {
        refuse: true,
        ..CapturingForwarder::default()
    };

    let routed = r.route(
        br#"{"type":"sensor","destination":"AA:BB:CC:DD:EE:01"}"#,
        Origin::Serial,
        Some(&mut fwd),
    );
    assert_eq!(
        routed,
        Routed::Dropped(DropReason::ForwardFailed(ForwardError::Radio(
            RadioError::UnknownPeer
        )))
    );
    assert!(sensor.is_empty());
    assert_eq!(r.stats().forward_failed, 1);
}
