//! Backend WebSocket session: discovery, handshake ordering and message
//! dispatch, with the simulated server on the other end.

use relaynode::orchestrator::{Via, WIPE_RESTART_DELAY_MS};
use relaynode::websocket::session::SessionState;
use serde_json::{Value, json};

use crate::mocks::{BACKEND_IP, Call, Rig, wifi_config};

/// Boot in WiFi mode with the link and backend up, and run one poll so
/// the session discovers the backend and opens.
fn connected_rig() -> Rig {
    let (mut rig, _) = Rig::boot(&wifi_config(), 500);
    rig.link.wifi_up();
    rig.backend.set(Some(BACKEND_IP));
    rig.orch.poll(1_000);
    rig
}

fn registered_rig() -> Rig {
    let mut rig = connected_rig();
    rig.ws.push_text(r#"{"type":"welcome","message":"hi"}"#);
    rig.orch.poll(1_100);
    rig.ws.push_text(r#"{"type":"device-registration-ack","status":"ok"}"#);
    rig.orch.poll(1_200);
    assert_eq!(rig.orch.websocket().state(), SessionState::Registered);
    rig
}

#[test]
fn link_up_discovers_backend_and_opens_socket() {
    let rig = connected_rig();

    // Candidates are probed in order until one answers.
    let probes: Vec<_> = rig
        .rec
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Probe(ip) => Some(ip.octets()[3]),
            _ => None,
        })
        .collect();
    assert_eq!(probes, vec![1, 2, 10, 22]);

    assert_eq!(rig.orch.websocket().backend(), Some(BACKEND_IP));
    assert_eq!(rig.orch.websocket().state(), SessionState::Connected);
    assert_eq!(
        rig.ws.opened(),
        vec![
            "ws://192.168.1.22:7180/api/device-websocket/connect?mac=24:6F:28:DE:CA:FE&name=ESP32-S3_R0_CAFE"
                .to_owned()
        ]
    );
    assert!(rig.orch.status().web_socket_connected);
    assert_eq!(rig.orch.status().backend_server_ip, "192.168.1.22");
}

#[test]
fn no_heartbeat_before_registration_ack() {
    let mut rig = connected_rig();

    // Connected but no welcome yet: silence, however long we wait.
    rig.orch.poll(40_000);
    assert!(rig.ws.received().is_empty());

    rig.ws.push_text(r#"{"type":"welcome"}"#);
    rig.orch.poll(41_000);
    assert_eq!(rig.ws.received_types(), vec!["device-registration"]);
    assert_eq!(rig.orch.websocket().state(), SessionState::WelcomeReceived);

    // Past the heartbeat interval, but still unacknowledged.
    rig.orch.poll(80_000);
    assert_eq!(rig.ws.received_types(), vec!["device-registration"]);

    rig.ws.push_text(r#"{"type":"device-registration-ack"}"#);
    rig.orch.poll(80_020);
    assert_eq!(rig.orch.websocket().state(), SessionState::Registered);
    assert_eq!(
        rig.ws.received_types(),
        vec!["device-registration", "heartbeat"]
    );
}

#[test]
fn registration_ack_without_welcome_is_ignored() {
    let mut rig = connected_rig();
    rig.ws.push_text(r#"{"type":"device-registration-ack"}"#);
    rig.orch.poll(1_100);
    assert_eq!(rig.orch.websocket().state(), SessionState::Connected);
    assert!(!rig.orch.websocket().is_registered());
}

#[test]
fn registered_session_sends_heartbeat_and_health_on_schedule() {
    let mut rig = registered_rig();

    rig.orch.poll(20_000);
    assert_eq!(rig.ws.received_types(), vec!["device-registration"]);

    rig.orch.poll(31_100);
    rig.orch.poll(61_100);
    assert_eq!(
        rig.ws.received_types(),
        vec!["device-registration", "heartbeat", "heartbeat", "health"]
    );
}

#[test]
fn ping_gets_pong() {
    let mut rig = connected_rig();
    rig.ws.push_text("ping");
    rig.orch.poll(1_100);
    assert_eq!(rig.ws.received(), vec!["pong".to_owned()]);
}

#[test]
fn espnow_status_request_is_answered() {
    let mut rig = registered_rig();
    rig.ws.push_text(r#"{"type":"espnow-status-request"}"#);
    rig.orch.poll(1_300);

    let last: Value = serde_json::from_str(rig.ws.received().last().expect("reply")).unwrap();
    assert_eq!(last["type"], "espnow-status");
    assert_eq!(last["deviceMac"], "24:6F:28:DE:CA:FE");
}

#[test]
fn backend_sensor_message_is_routed_locally() {
    let mut rig = registered_rig();
    rig.ws.push_text(r#"{"type":"sensor","temperature":21.5}"#);
    rig.orch.poll(1_300);

    let item = rig.sensor.try_pop().expect("queued");
    assert_eq!(item.doc["temperature"], 21.5);
}

#[test]
fn malformed_text_is_dropped() {
    let mut rig = registered_rig();
    rig.ws.push_text("{not json");
    rig.ws.push_text(r#"{"no_type":1}"#);
    rig.orch.poll(1_300);
    assert!(rig.sensor.is_empty());
    assert!(rig.config.is_empty());
    assert_eq!(rig.orch.websocket().state(), SessionState::Registered);
}

#[test]
fn wipe_over_websocket_is_acknowledged_on_the_socket() {
    let mut rig = registered_rig();
    rig.ws.push_text(r#"{"type":"wipe_preferences"}"#);
    rig.orch.poll(1_300);

    let ack: Value = serde_json::from_str(rig.ws.received().last().expect("ack")).unwrap();
    assert_eq!(ack["type"], "wipe_preferences_response");
    assert_eq!(ack["success"], true);
    assert_eq!(ack["restartIn"], 3);
    assert!(rig.rec.contains(&Call::Restart(WIPE_RESTART_DELAY_MS)));
}

#[test]
fn outbound_data_prefers_the_open_socket() {
    let mut rig = registered_rig();
    let report = rig.orch.send_sensor_data(&json!({"type": "sensor", "rpm": 1200}));
    assert_eq!(report.via, Some(Via::WebSocket));
    assert_eq!(rig.rec.count(|c| matches!(c, Call::Post { .. })), 0);
}

#[test]
fn hang_up_reconnects_after_interval_without_rediscovery() {
    let mut rig = registered_rig();
    let probes_before = rig.rec.count(|c| matches!(c, Call::Probe(_)));

    rig.ws.hang_up();
    rig.orch.poll(2_000);
    assert_eq!(rig.orch.websocket().state(), SessionState::Disconnected);
    assert_eq!(rig.ws.opened().len(), 1);

    rig.orch.poll(6_500);
    rig.orch.poll(6_520);
    assert_eq!(rig.ws.opened().len(), 2);
    assert_eq!(rig.orch.websocket().state(), SessionState::Connected);
    assert_eq!(rig.rec.count(|c| matches!(c, Call::Probe(_))), probes_before);
}

#[test]
fn hang_up_behind_a_full_event_queue_still_reconnects() {
    let mut rig = registered_rig();

    // Fill the driver's event queue so the close notification is lost.
    let mut queued = 0;
    while rig.ws.push_text(r#"{"type":"heartbeat-ack"}"#) {
        queued += 1;
    }
    assert!(queued > 0);
    rig.ws.hang_up();

    rig.orch.poll(2_000);
    assert_eq!(rig.orch.websocket().state(), SessionState::Disconnected);

    rig.orch.poll(6_500);
    rig.orch.poll(6_520);
    assert_eq!(rig.ws.opened().len(), 2);
    assert_eq!(rig.orch.websocket().state(), SessionState::Connected);
}

#[test]
fn backend_absent_leaves_session_disconnected() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 500);
    rig.link.wifi_up();
    rig.orch.poll(1_000);

    assert_eq!(rig.orch.websocket().state(), SessionState::Disconnected);
    assert_eq!(rig.orch.websocket().backend(), None);
    // .1 .2 .10 .22 .100; .40 is our own address
    assert_eq!(rig.rec.count(|c| matches!(c, Call::Probe(_))), 5);
    assert!(rig.ws.opened().is_empty());
}
