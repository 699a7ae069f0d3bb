//! Gateway forwarding and ESP-NOW peer handling through the orchestrator.

use relaynode::error::ForwardError;
use relaynode::orchestrator::ProtocolMode;
use relaynode::orchestrator::http::HttpRequest;
use relaynode::protocol::message::{MessageKind, Origin};
use relaynode::protocol::router::{DropReason, Routed};
use serde_json::Value;

use crate::mocks::{Call, PEER_A, PEER_B, Rig, mode_config, wifi_config};

fn gateway_with_peer() -> Rig {
    let (mut rig, mode) = Rig::boot(&mode_config("gateway"), 1_000);
    assert_eq!(mode, ProtocolMode::Gateway);
    let resp = rig.orch.handle_http(
        &HttpRequest::post(
            "/api/espnow/peers",
            r#"{"mac":"AA:BB:CC:DD:EE:01","name":"display-1"}"#,
        ),
        1_500,
    );
    assert_eq!(resp.status, 200, "{}", resp.body);
    rig
}

#[test]
fn destination_message_is_sent_once_and_not_queued() {
    let mut rig = gateway_with_peer();

    let routed = rig.orch.route(
        br#"{"type":"sensor","destination":"AA:BB:CC:DD:EE:01","rpm":900}"#,
        Origin::Serial,
        2_000,
    );
    assert_eq!(routed, Routed::Forwarded(PEER_A));

    let sent = rig.air.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, PEER_A);
    let body: Value = serde_json::from_slice(&sent[0].1).unwrap();
    assert!(body.get("destination").is_none());
    assert_eq!(body["rpm"], 900);
    assert_eq!(body["type"], "sensor");

    assert!(rig.sensor.is_empty());
    assert!(rig.config.is_empty());

    // The driver's delivery report comes back through the inbox.
    rig.orch.poll(2_020);
    assert_eq!(rig.orch.peers().stats().messages_sent, 1);
}

#[test]
fn unknown_destination_is_dropped() {
    let mut rig = gateway_with_peer();

    let routed = rig.orch.route(
        br#"{"type":"sensor","destination":"AA:BB:CC:DD:EE:99"}"#,
        Origin::Serial,
        2_000,
    );
    assert!(matches!(
        routed,
        Routed::Dropped(DropReason::ForwardFailed(_))
    ));
    assert!(rig.air.sent().is_empty());
    assert!(rig.sensor.is_empty());
}

#[test]
fn malformed_destination_is_dropped() {
    let mut rig = gateway_with_peer();
    let routed = rig.orch.route(
        br#"{"type":"config","destination":"not-a-mac"}"#,
        Origin::Http,
        2_000,
    );
    assert_eq!(
        routed,
        Routed::Dropped(DropReason::ForwardFailed(ForwardError::InvalidDestination))
    );
    assert!(rig.config.is_empty());
}

#[test]
fn destination_is_ignored_outside_gateway_mode() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);
    let routed = rig.orch.route(
        br#"{"type":"sensor","destination":"AA:BB:CC:DD:EE:01"}"#,
        Origin::Serial,
        2_000,
    );
    assert_eq!(routed, Routed::Queued(MessageKind::Sensor));
    assert_eq!(rig.sensor.len(), 1);
}

#[test]
fn frame_from_unknown_peer_registers_it_and_is_routed() {
    let (mut rig, _) = Rig::boot(&mode_config("espnow"), 1_000);

    assert!(rig.air.deliver(PEER_B, -61, br#"{"type":"sensor","id":"b"}"#));
    rig.orch.poll(2_000);

    let peer = rig.orch.peers().peer(&PEER_B).expect("auto-registered");
    assert_eq!(peer.rssi, -61);
    assert_eq!(peer.name, "Unknown_EE:02");
    assert!(rig.air.registered().contains(&PEER_B));
    assert_eq!(rig.sensor.len(), 1);
    assert_eq!(rig.orch.peers().stats().messages_received, 1);
}

#[test]
fn silent_peer_is_evicted() {
    let (mut rig, _) = Rig::boot(&mode_config("espnow"), 1_000);
    rig.air.deliver(PEER_B, -70, br#"{"type":"sensor"}"#);
    rig.orch.poll(2_000);
    assert_eq!(rig.orch.peers().peer_count(), 1);

    rig.orch.poll(20_000);
    assert_eq!(rig.orch.peers().peer_count(), 1);

    rig.orch.poll(40_000);
    assert_eq!(rig.orch.peers().peer_count(), 0);
    assert!(!rig.air.registered().contains(&PEER_B));
}

#[test]
fn wipe_from_peer_is_acknowledged_to_that_peer() {
    let (mut rig, _) = Rig::boot(&mode_config("espnow"), 1_000);
    rig.air.deliver(PEER_B, -50, br#"{"type":"wipe_preferences"}"#);
    rig.orch.poll(2_000);

    let (to, body) = rig.air.sent().last().cloned().expect("ack sent");
    assert_eq!(to, PEER_B);
    let ack: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(ack["type"], "wipe_preferences_response");
    assert!(rig.rec.contains(&Call::Restart(3_000)));
}

#[test]
fn frames_lost_to_a_full_inbox_show_in_statistics() {
    let (mut rig, _) = Rig::boot(&mode_config("espnow"), 1_000);

    let mut delivered = 0;
    while rig.air.deliver(PEER_B, -55, br#"{"type":"sensor"}"#) {
        delivered += 1;
    }
    assert!(delivered > 0);

    let stats = rig
        .orch
        .handle_http(&HttpRequest::get("/api/espnow/stats"), 1_100)
        .value();
    assert_eq!(stats["statistics"]["receiveErrors"], 1);

    rig.orch.poll(1_200);
    assert_eq!(rig.orch.peers().stats().messages_received, delivered);
    assert_eq!(rig.orch.peers().stats().receive_errors, 1);
}

// ── HTTP peer management ──────────────────────────────────────

#[test]
fn peer_http_endpoints() {
    let mut rig = gateway_with_peer();

    let resp = rig.orch.handle_http(&HttpRequest::get("/api/gateway/status"), 2_000);
    let status = resp.value();
    assert_eq!(status["canForward"], true);
    assert_eq!(status["peerCount"], 1);

    let resp = rig.orch.handle_http(
        &HttpRequest::post("/api/espnow/peers", r#"{"mac":"nonsense"}"#),
        2_000,
    );
    assert_eq!(resp.status, 400);

    let resp = rig.orch.handle_http(
        &HttpRequest::delete("/api/espnow/peers?mac=AA:BB:CC:DD:EE:01", Vec::new()),
        2_000,
    );
    assert_eq!(resp.status, 200);
    assert_eq!(rig.orch.peers().peer_count(), 0);

    let resp = rig.orch.handle_http(
        &HttpRequest::delete("/api/espnow/peers", r#"{"mac":"AA:BB:CC:DD:EE:01"}"#),
        2_000,
    );
    assert_eq!(resp.status, 404);
}

#[test]
fn radio_endpoints_report_missing_radio() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);
    let resp = rig.orch.handle_http(&HttpRequest::get("/api/espnow/status"), 2_000);
    assert_eq!(resp.status, 404);
    assert_eq!(resp.value()["message"], "ESP-NOW not initialized");
}
