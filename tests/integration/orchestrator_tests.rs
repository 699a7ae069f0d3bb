//! Startup mode selection, boot-loop protection, wipe and MQTT wiring,
//! driven through a fully mocked orchestrator.

use relaynode::config::ConnectionConfig;
use relaynode::orchestrator::{ProtocolMode, Via, WIPE_RESTART_DELAY_MS};
use relaynode::protocol::message::Origin;
use relaynode::protocol::router::Routed;
use serde_json::json;

use crate::mocks::{BACKEND_IP, Call, Rig, mode_config, wifi_config};

// ── Mode selection ────────────────────────────────────────────

#[test]
fn wifi_mode_starts_station_and_network_services() {
    let (rig, mode) = Rig::boot(&wifi_config(), 1_000);

    assert_eq!(mode, ProtocolMode::WiFiPrimary);
    assert!(rig.rec.contains(&Call::WifiPrimary("HomeNet".into())));
    assert!(rig.rec.contains(&Call::Advertise(
        "JunctionRelay_Device_246F28DECAFE".into()
    )));
    assert!(rig.orch.network_services_started());
    assert!(!rig.orch.peers().is_initialized());
    // no broker configured
    assert_eq!(rig.rec.count(|c| matches!(c, Call::MqttBuilt(_))), 0);
}

#[test]
fn missing_ssid_enters_captive_portal() {
    let (rig, mode) = Rig::boot(&ConnectionConfig::default(), 1_000);

    assert_eq!(mode, ProtocolMode::CaptivePortal);
    assert_eq!(
        rig.rec.calls(),
        vec![Call::CaptivePortal("JunctionRelay_Config_CAFE".into())]
    );
    assert!(!rig.orch.network_services_started());
}

#[test]
fn unknown_mode_enters_captive_portal() {
    let cfg = ConnectionConfig {
        conn_mode: "bluetooth".into(),
        ssid: "HomeNet".into(),
        ..ConnectionConfig::default()
    };
    let (_rig, mode) = Rig::boot(&cfg, 1_000);
    assert_eq!(mode, ProtocolMode::CaptivePortal);
}

#[test]
fn espnow_mode_starts_no_network_services() {
    let (mut rig, mode) = Rig::boot(&mode_config("espnow"), 1_000);

    assert_eq!(mode, ProtocolMode::EspNowOnly);
    assert!(rig.orch.peers().is_initialized());
    assert!(!rig.orch.network_services_started());
    assert!(rig.rec.calls().is_empty(), "unexpected calls: {:?}", rig.rec.calls());

    // Even with a link, the WebSocket session must stay closed.
    rig.link.wifi_up();
    rig.backend.set(Some(BACKEND_IP));
    for t in (2_000..20_000).step_by(500) {
        rig.orch.poll(t);
    }
    assert!(rig.ws.opened().is_empty());
    assert_eq!(rig.rec.count(|c| matches!(c, Call::Probe(_))), 0);
}

#[test]
fn gateway_mode_brings_up_radio_and_backup_wifi() {
    let cfg = ConnectionConfig {
        conn_mode: "gateway".into(),
        ssid: "Fallback".into(),
        pass: "password1".into(),
        ..ConnectionConfig::default()
    };
    let (rig, mode) = Rig::boot(&cfg, 1_000);

    assert_eq!(mode, ProtocolMode::Gateway);
    assert!(rig.orch.peers().is_initialized());
    assert!(rig.rec.contains(&Call::WifiBackup("Fallback".into())));
    assert_eq!(rig.rec.count(|c| matches!(c, Call::WifiPrimary(_))), 0);
    assert!(rig.orch.network_services_started());
}

#[test]
fn ethernet_mode_without_ssid_skips_wifi() {
    let (rig, mode) = Rig::boot(&mode_config("ethernet"), 1_000);

    assert_eq!(mode, ProtocolMode::EthernetPrimary);
    assert_eq!(
        rig.rec
            .count(|c| matches!(c, Call::WifiPrimary(_) | Call::WifiBackup(_))),
        0
    );
    assert!(rig.orch.network_services_started());
}

// ── Boot-loop guard ───────────────────────────────────────────

#[test]
fn rapid_early_inits_force_captive_portal() {
    let mut rig = Rig::new(&wifi_config());

    assert_eq!(rig.orch.init(1_000), ProtocolMode::WiFiPrimary);
    assert_eq!(rig.orch.init(4_000), ProtocolMode::WiFiPrimary);
    assert_eq!(rig.orch.init(7_000), ProtocolMode::CaptivePortal);
    assert!(rig.rec.contains(&Call::CaptivePortal("JunctionRelay_Config_CAFE".into())));
}

#[test]
fn init_after_early_window_resets_guard() {
    let mut rig = Rig::new(&wifi_config());

    assert_eq!(rig.orch.init(1_000), ProtocolMode::WiFiPrimary);
    assert_eq!(rig.orch.init(2_000), ProtocolMode::WiFiPrimary);
    assert_eq!(rig.orch.init(31_000), ProtocolMode::WiFiPrimary);
    assert_eq!(rig.orch.init(32_000), ProtocolMode::WiFiPrimary);
}

// ── Status ────────────────────────────────────────────────────

#[test]
fn status_prefers_ethernet_when_both_links_are_up() {
    let (rig, _) = Rig::boot(&wifi_config(), 1_000);
    rig.link.wifi_up();
    rig.link.ethernet_up("10.0.0.7".parse().unwrap());

    let status = rig.orch.status();
    assert!(status.wifi_connected);
    assert!(status.ethernet_connected);
    assert_eq!(status.active_network_type, "Ethernet");
    assert_eq!(status.ip_address, "10.0.0.7");
    assert_eq!(status.ethernet_ip.as_deref(), Some("10.0.0.7"));
    assert_eq!(status.mac_address, "24:6F:28:DE:CA:FE");
    assert!(!status.web_socket_connected);
}

// ── Wipe ──────────────────────────────────────────────────────

#[test]
fn wipe_request_clears_store_and_schedules_restart() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);

    let routed = rig
        .orch
        .route(br#"{"type":"wipe_preferences"}"#, Origin::Serial, 2_000);
    assert_eq!(routed, Routed::Wipe);
    assert_eq!(
        rig.rec.count(|c| *c == Call::Restart(WIPE_RESTART_DELAY_MS)),
        1
    );
    assert!(rig.orch.config().ssid.is_empty());

    // Rebooting from the wiped store lands in the captive portal.
    assert_eq!(rig.orch.init(40_000), ProtocolMode::CaptivePortal);
}

// ── Outbound ──────────────────────────────────────────────────

#[test]
fn send_without_network_is_dropped() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);
    let report = rig.orch.send_generic_data(&json!({"type": "sensor", "v": 1}));
    assert_eq!(report.via, None);
    assert!(!report.mqtt);
}

#[test]
fn send_falls_back_to_http_post_when_socket_is_down() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);
    rig.link.wifi_up();
    rig.backend.set(Some(BACKEND_IP));
    rig.ws.set_accepting(false);
    rig.orch.poll(2_000);
    assert_eq!(rig.orch.websocket().backend(), Some(BACKEND_IP));
    assert!(!rig.orch.websocket().is_connected());

    let report = rig.orch.send_generic_data(&json!({"type": "sensor", "v": 2}));
    assert_eq!(report.via, Some(Via::Http));

    let posted = rig
        .rec
        .calls()
        .into_iter()
        .find_map(|c| match c {
            Call::Post { ip, port, body } => Some((ip, port, body)),
            _ => None,
        })
        .expect("one POST");
    assert_eq!(posted.0, BACKEND_IP);
    assert_eq!(posted.1, 7180);
    assert!(posted.2.starts_with(b"00000023{\"type\":\"sensor\""));
}

#[test]
fn espnow_mode_broadcasts_outbound_data() {
    let (mut rig, _) = Rig::boot(&mode_config("espnow"), 1_000);
    let report = rig.orch.send_generic_data(&json!({"type": "sensor"}));
    assert_eq!(report.via, Some(Via::EspNow));

    let sent = rig.air.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.is_broadcast());
    assert_eq!(sent[0].1, br#"{"type":"sensor"}"#);
}

// ── MQTT ──────────────────────────────────────────────────────

#[test]
fn mqtt_subscription_request_subscribes_and_feeds_back() {
    let cfg = ConnectionConfig {
        mqtt_broker: "192.168.1.5:1883".into(),
        ..wifi_config()
    };
    let (mut rig, _) = Rig::boot(&cfg, 1_000);
    assert!(rig.rec.contains(&Call::MqttBuilt("ESP32Relay_246F28DECAFE".into())));

    rig.broker.set_reachable(true);
    rig.link.wifi_up();
    rig.orch.poll(2_000);
    assert!(rig.orch.status().mqtt_connected);

    let routed = rig.orch.route(
        br#"{"type":"MQTT_Subscription_Request","subscriptions":["relay/cmd",""]}"#,
        Origin::Serial,
        2_100,
    );
    assert_eq!(routed, Routed::Subscribe(vec!["relay/cmd".to_owned()]));
    assert_eq!(rig.broker.subscriptions(), vec![("relay/cmd".to_owned(), 1)]);

    assert_eq!(rig.broker.deliver("relay/cmd", br#"{"type":"sensor","t":21}"#), 1);
    rig.orch.poll(2_200);
    assert_eq!(rig.sensor.len(), 1);

    // Outbound data is mirrored to the data topic.
    let report = rig.orch.send_generic_data(&json!({"type": "sensor"}));
    assert!(report.mqtt);
    assert_eq!(rig.broker.published()[0].0, "junctionrelay/data");
}
