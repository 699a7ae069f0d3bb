//! Ingress bytes all the way to the display sink, plus the HTTP API.

use relaynode::orchestrator::PREFS_RESTART_DELAY_MS;
use relaynode::orchestrator::http::HttpRequest;
use relaynode::protocol::consumer::{ConfigConsumer, ConfigOutcome, SensorConsumer, home_config};
use relaynode::protocol::ingress::IngressPort;
use relaynode::protocol::message::{MessageKind, Origin};
use relaynode::protocol::queue::SENSOR_QUEUE_CAPACITY;
use relaynode::protocol::router::{DropReason, Routed};

use crate::mocks::{Call, FixedClock, RecordingSink, Rig, wifi_config};

const SENSOR_FRAME: &[u8] = b"00000017{\"type\":\"sensor\"}";

#[test]
fn framed_serial_sensor_reaches_sink_once() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);
    let mut serial = IngressPort::new(Origin::Serial, rig.inbox.clone());

    assert_eq!(serial.push_bytes(SENSOR_FRAME), 1);
    assert_eq!(rig.orch.poll(1_100), 1);
    assert_eq!(rig.sensor.len(), 1);

    let sink = RecordingSink::default();
    let mut consumer = SensorConsumer::new(rig.sensor.clone(), sink.clone());
    assert_eq!(consumer.drain(), 1);
    assert_eq!(consumer.processed(), 1);
    assert_eq!(sink.sensors().len(), 1);
    assert_eq!(sink.sensors()[0]["type"], "sensor");
    assert!(sink.configs().is_empty());
}

#[test]
fn frame_split_byte_by_byte_is_reassembled() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);
    let mut serial = IngressPort::new(Origin::Serial, rig.inbox.clone());

    let mut submitted = 0;
    for b in SENSOR_FRAME {
        submitted += serial.push_bytes(std::slice::from_ref(b));
    }
    assert_eq!(submitted, 1);
    rig.orch.poll(1_100);
    assert_eq!(rig.sensor.len(), 1);
}

#[test]
fn garbage_before_frame_is_skipped() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);
    let mut serial = IngressPort::new(Origin::Serial, rig.inbox.clone());

    assert_eq!(serial.push_bytes(b"xx-noise"), 0);
    assert_eq!(serial.push_bytes(SENSOR_FRAME), 1);
    rig.orch.poll(1_100);
    assert_eq!(rig.sensor.len(), 1);
}

#[test]
fn config_reaches_sink_and_updates_stats() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);
    let mut serial = IngressPort::new(Origin::Serial, rig.inbox.clone());
    serial.push_bytes(br#"{"type":"config","screenId":"main"}"#);
    serial.push_bytes(br#"{"type":"config","screenId":7}"#);
    rig.orch.poll(1_100);
    assert_eq!(rig.config.len(), 2);

    let sink = RecordingSink::default();
    let mut consumer =
        ConfigConsumer::new(rig.config.clone(), sink.clone(), FixedClock(4_242), rig.stats.clone());

    let first = rig.config.try_pop().expect("first config");
    assert_eq!(consumer.process(first), ConfigOutcome::Applied);
    assert_eq!(rig.stats.count(), 1);
    assert_eq!(rig.stats.last_applied_ms(), 4_242);

    // Rejected layouts fall back to the home screen.
    let second = rig.config.try_pop().expect("second config");
    assert!(matches!(consumer.process(second), ConfigOutcome::FellBackToHome(_)));
    assert_eq!(rig.stats.count(), 1);
    assert_eq!(sink.configs().len(), 2);
    assert_eq!(sink.configs()[1], home_config());
}

#[test]
fn sensor_queue_applies_backpressure() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);

    for i in 0..SENSOR_QUEUE_CAPACITY {
        let doc = format!(r#"{{"type":"sensor","seq":{i}}}"#);
        assert_eq!(
            rig.orch.route(doc.as_bytes(), Origin::Serial, 1_100),
            Routed::Queued(MessageKind::Sensor)
        );
    }
    assert_eq!(
        rig.orch.route(br#"{"type":"sensor","seq":99}"#, Origin::Serial, 1_100),
        Routed::Dropped(DropReason::QueueFull(MessageKind::Sensor))
    );
    assert_eq!(rig.orch.router().stats().queue_full, 1);

    // Oldest first, the dropped message never appears.
    let first = rig.sensor.try_pop().expect("head");
    assert_eq!(first.doc["seq"], 0);
    let mut last = first;
    while let Some(item) = rig.sensor.try_pop() {
        last = item;
    }
    assert_eq!(last.doc["seq"], SENSOR_QUEUE_CAPACITY - 1);
}

// ── HTTP API ──────────────────────────────────────────────────

#[test]
fn http_data_endpoint_feeds_the_router() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);

    let resp = rig
        .orch
        .handle_http(&HttpRequest::post("/api/data", SENSOR_FRAME), 1_100);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.value()["accepted"], 1);

    rig.orch.poll(1_200);
    let item = rig.sensor.try_pop().expect("queued");
    assert_eq!(item.origin, Origin::Http);
}

#[test]
fn preferences_round_trip_masks_passwords_and_restarts() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);

    let resp = rig
        .orch
        .handle_http(&HttpRequest::get("/api/device/preferences"), 1_100);
    let prefs = resp.value();
    assert_eq!(prefs["wifiSSID"], "HomeNet");
    assert_ne!(prefs["wifiPassword"], "hunter2hunter2");
    assert_eq!(prefs["backendPort"], 7180);

    // Broker change alone: saved, no restart.
    let resp = rig.orch.handle_http(
        &HttpRequest::post("/api/device/set-preferences", r#"{"mqttBroker":"10.0.0.9:1884"}"#),
        1_200,
    );
    assert_eq!(resp.status, 200);
    assert!(resp.value().get("restart").is_none());
    assert_eq!(rig.rec.count(|c| matches!(c, Call::Restart(_))), 0);

    // SSID change: restart scheduled.
    let resp = rig.orch.handle_http(
        &HttpRequest::post("/api/device/set-preferences", r#"{"wifiSSID":"Upstairs"}"#),
        1_300,
    );
    assert_eq!(resp.value()["restart"], true);
    assert!(rig.rec.contains(&Call::Restart(PREFS_RESTART_DELAY_MS)));

    let prefs = rig
        .orch
        .handle_http(&HttpRequest::get("/api/device/preferences"), 1_400)
        .value();
    assert_eq!(prefs["wifiSSID"], "Upstairs");
    assert_eq!(prefs["mqttBroker"], "10.0.0.9:1884");
}

#[test]
fn set_preferences_rejects_bad_bodies() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);
    for body in ["", "not json", "[1,2]"] {
        let resp = rig.orch.handle_http(
            &HttpRequest::post("/api/device/set-preferences", body),
            1_100,
        );
        assert_eq!(resp.status, 400, "body {body:?}");
    }
}

#[test]
fn http_wipe_responds_and_schedules_restart() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);
    let resp = rig
        .orch
        .handle_http(&HttpRequest::post("/api/device/wipe-preferences", ""), 1_100);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.value()["restartIn"], 3);
    assert!(rig.rec.contains(&Call::Restart(3_000)));

    let prefs = rig
        .orch
        .handle_http(&HttpRequest::get("/api/device/preferences"), 1_200)
        .value();
    assert_eq!(prefs["wifiSSID"], "");
}

#[test]
fn info_endpoints_describe_the_device() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);

    let caps = rig
        .orch
        .handle_http(&HttpRequest::get("/api/device/capabilities"), 1_100)
        .value();
    assert_eq!(caps["deviceName"], "ESP32-S3_R0_CAFE");
    assert_eq!(caps["hasESPNow"], true);

    let beat = rig
        .orch
        .handle_http(&HttpRequest::get("/api/health/heartbeat"), 1_100)
        .value();
    assert_eq!(beat["status"], "OK");
    assert_eq!(beat["free_heap"], 150_000);

    let lite = rig
        .orch
        .handle_http(&HttpRequest::get("/api/system/statslite"), 1_100)
        .value();
    assert_eq!(lite["configuration"]["configCount"], 0);
    assert_eq!(lite["connectionMode"], "wifi");

    let status = rig
        .orch
        .handle_http(&HttpRequest::get("/api/connection/status"), 1_100);
    assert_eq!(status.status, 200);
}

#[test]
fn reset_config_clears_config_stats() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);
    rig.stats.record_applied(900);
    assert!(rig.stats.has_received());

    let resp = rig
        .orch
        .handle_http(&HttpRequest::post("/api/system/reset-config", ""), 1_100);
    assert_eq!(resp.status, 200);
    assert!(!rig.stats.has_received());
}

#[test]
fn unknown_path_and_wrong_method() {
    let (mut rig, _) = Rig::boot(&wifi_config(), 1_000);
    assert_eq!(
        rig.orch.handle_http(&HttpRequest::get("/api/nope"), 1_100).status,
        404
    );
    assert_eq!(
        rig.orch
            .handle_http(&HttpRequest::get("/api/device/wipe-preferences"), 1_100)
            .status,
        405
    );
}
