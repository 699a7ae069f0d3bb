//! Mock adapters for integration tests.
//!
//! Network, system, backend HTTP and mDNS calls are recorded into one
//! shared log so tests can assert on the full side-effect history. The
//! radio, WebSocket and MQTT collaborators use the crate's in-memory
//! simulations, whose test handles are kept on the [`Rig`].

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use relaynode::adapters::device_id;
use relaynode::adapters::mqtt_client::SimBroker;
use relaynode::adapters::nvs::NvsAdapter;
use relaynode::adapters::radio::{SimAir, SimRadio};
use relaynode::adapters::ws_client::SimWsServer;
use relaynode::app::ports::{
    AdvertiseError, Advertiser, BackendHttp, BatteryReading, Clock, DisplaySink, HeapStats,
    LinkSnapshot, MqttSettings, NetworkPort, PostError, SinkError, SystemPort,
};
use relaynode::app::status::ConfigStats;
use relaynode::config::ConnectionConfig;
use relaynode::espnow::mac::MacAddr;
use relaynode::orchestrator::{
    Collaborators, MqttClientBox, ProtocolMode, ProtocolOrchestrator,
};
use relaynode::protocol::ingress::{Inbox, new_inbox};
use relaynode::protocol::queue::{ConfigQueue, SensorQueue};
use relaynode::protocol::router::MessageRouter;

/// MAC of the simulated node (matches `device_id::local_identity`).
pub const NODE_MAC: MacAddr = MacAddr([0x24, 0x6F, 0x28, 0xDE, 0xCA, 0xFE]);
pub const WIFI_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 40);
pub const BACKEND_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 22);
pub const PEER_A: MacAddr = MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]);
pub const PEER_B: MacAddr = MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x02]);

// ── Call record ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    WifiPrimary(String),
    WifiBackup(String),
    CaptivePortal(String),
    Advertise(String),
    Restart(u32),
    Probe(Ipv4Addr),
    Post { ip: Ipv4Addr, port: u16, body: Vec<u8> },
    MqttBuilt(String),
}

#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Call>>>);

#[allow(dead_code)]
impl Recorder {
    fn push(&self, call: Call) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn contains(&self, call: &Call) -> bool {
        self.calls().contains(call)
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

// ── Network ───────────────────────────────────────────────────

/// Shared handle to the link state the mock network reports.
#[derive(Clone, Default)]
pub struct LinkControl(Arc<Mutex<LinkSnapshot>>);

#[allow(dead_code)]
impl LinkControl {
    fn get(&self) -> LinkSnapshot {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update(&self, f: impl FnOnce(&mut LinkSnapshot)) {
        f(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner));
    }

    pub fn wifi_up(&self) {
        self.update(|l| {
            l.wifi_connected = true;
            l.wifi_ip = Some(WIFI_IP);
            l.wifi_rssi = Some(-55);
        });
    }

    pub fn wifi_down(&self) {
        self.update(|l| {
            l.wifi_connected = false;
            l.wifi_ip = None;
            l.wifi_rssi = None;
        });
    }

    pub fn ethernet_up(&self, ip: Ipv4Addr) {
        self.update(|l| {
            l.ethernet_connected = true;
            l.ethernet_ip = Some(ip);
            l.ethernet_mac = Some("24:6F:28:00:00:01".into());
        });
    }
}

pub struct MockNetwork {
    rec: Recorder,
    link: LinkControl,
}

impl NetworkPort for MockNetwork {
    fn start_wifi_primary(&mut self, ssid: &str, _password: &str) {
        self.rec.push(Call::WifiPrimary(ssid.into()));
    }

    fn start_wifi_backup(&mut self, ssid: &str, _password: &str) {
        self.rec.push(Call::WifiBackup(ssid.into()));
    }

    fn start_captive_portal(&mut self, ap_name: &str) {
        self.rec.push(Call::CaptivePortal(ap_name.into()));
    }

    fn poll(&mut self, _now_ms: u64) {}

    fn link(&self) -> LinkSnapshot {
        self.link.get()
    }
}

// ── System ────────────────────────────────────────────────────

pub struct MockSystem {
    rec: Recorder,
}

impl SystemPort for MockSystem {
    fn heap(&self) -> HeapStats {
        HeapStats {
            free: 150_000,
            total: 320_000,
            largest_block: 96_000,
        }
    }

    fn battery(&self) -> Option<BatteryReading> {
        None
    }

    fn schedule_restart(&mut self, delay_ms: u32) {
        self.rec.push(Call::Restart(delay_ms));
    }
}

// ── Backend HTTP ──────────────────────────────────────────────

/// Address the mock backend answers probes on; `None` means no backend.
#[derive(Clone, Default)]
pub struct BackendControl(Arc<Mutex<Option<Ipv4Addr>>>);

#[allow(dead_code)]
impl BackendControl {
    pub fn set(&self, ip: Option<Ipv4Addr>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = ip;
    }

    fn get(&self) -> Option<Ipv4Addr> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct MockBackendHttp {
    rec: Recorder,
    backend: BackendControl,
}

impl BackendHttp for MockBackendHttp {
    fn probe(&mut self, ip: Ipv4Addr, _port: u16, _timeout_ms: u32) -> bool {
        self.rec.push(Call::Probe(ip));
        self.backend.get() == Some(ip)
    }

    fn post_data(&mut self, ip: Ipv4Addr, port: u16, body: &[u8]) -> Result<(), PostError> {
        self.rec.push(Call::Post {
            ip,
            port,
            body: body.to_vec(),
        });
        if self.backend.get() == Some(ip) {
            Ok(())
        } else {
            Err(PostError::Unreachable)
        }
    }
}

// ── mDNS ──────────────────────────────────────────────────────

pub struct MockAdvertiser {
    rec: Recorder,
}

impl Advertiser for MockAdvertiser {
    fn advertise(
        &mut self,
        hostname: &str,
        _service: &str,
        _protocol: &str,
        _port: u16,
    ) -> Result<(), AdvertiseError> {
        self.rec.push(Call::Advertise(hostname.into()));
        Ok(())
    }
}

// ── Display sink ──────────────────────────────────────────────

#[derive(Default)]
pub struct SinkLog {
    pub sensors: Vec<Value>,
    pub configs: Vec<Value>,
}

/// Display sink that keeps every document it is handed.
#[derive(Clone, Default)]
pub struct RecordingSink(Arc<Mutex<SinkLog>>);

#[allow(dead_code)]
impl RecordingSink {
    pub fn sensors(&self) -> Vec<Value> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).sensors.clone()
    }

    pub fn configs(&self) -> Vec<Value> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).configs.clone()
    }
}

impl DisplaySink for RecordingSink {
    fn route_sensor(&mut self, doc: &Value) -> Result<(), SinkError> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sensors
            .push(doc.clone());
        Ok(())
    }

    fn route_config(&mut self, doc: &Value) -> Result<(), SinkError> {
        if doc.get("screenId").is_some_and(|v| !v.is_string()) {
            return Err(SinkError::Rejected("screenId must be a string"));
        }
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .configs
            .push(doc.clone());
        Ok(())
    }
}

#[derive(Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// An orchestrator wired to mocks, with handles to every collaborator.
pub struct Rig {
    pub orch: ProtocolOrchestrator,
    pub rec: Recorder,
    pub link: LinkControl,
    pub backend: BackendControl,
    pub air: SimAir,
    pub ws: SimWsServer,
    pub broker: SimBroker,
    pub inbox: Inbox,
    pub sensor: Arc<SensorQueue>,
    pub config: Arc<ConfigQueue>,
    pub stats: Arc<ConfigStats>,
}

#[allow(dead_code)]
impl Rig {
    /// Build a rig whose store holds `cfg`. `init` is not called.
    pub fn new(cfg: &ConnectionConfig) -> Self {
        let mut storage = NvsAdapter::new().expect("sim store");
        cfg.save(&mut storage).expect("seed preferences");

        let rec = Recorder::default();
        let link = LinkControl::default();
        let backend = BackendControl::default();
        let radio = SimRadio::new(NODE_MAC);
        let air = radio.air();
        let ws = SimWsServer::new();
        let broker = SimBroker::new();
        let inbox = new_inbox();

        let builder_rec = rec.clone();
        let builder_broker = broker.clone();
        let builder_inbox = inbox.clone();
        let collaborators = Collaborators {
            storage: Box::new(storage),
            network: Box::new(MockNetwork {
                rec: rec.clone(),
                link: link.clone(),
            }),
            system: Box::new(MockSystem { rec: rec.clone() }),
            radio: Box::new(radio),
            ws_client: Box::new(ws.client()),
            backend_http: Box::new(MockBackendHttp {
                rec: rec.clone(),
                backend: backend.clone(),
            }),
            advertiser: Box::new(MockAdvertiser { rec: rec.clone() }),
            mqtt_builder: Box::new(move |settings: &MqttSettings| {
                builder_rec.push(Call::MqttBuilt(settings.client_id.clone()));
                let client = builder_broker.client(settings, builder_inbox.clone());
                Some(Box::new(client) as MqttClientBox)
            }),
        };

        let sensor = Arc::new(SensorQueue::new("sensor"));
        let config = Arc::new(ConfigQueue::new("config"));
        let stats = Arc::new(ConfigStats::new());
        let router = MessageRouter::new(sensor.clone(), config.clone());
        let orch = ProtocolOrchestrator::new(
            collaborators,
            device_id::local_identity(),
            inbox.clone(),
            router,
            stats.clone(),
        );

        Self {
            orch,
            rec,
            link,
            backend,
            air,
            ws,
            broker,
            inbox,
            sensor,
            config,
            stats,
        }
    }

    /// Build and run `init` at `now_ms`.
    pub fn boot(cfg: &ConnectionConfig, now_ms: u64) -> (Self, ProtocolMode) {
        let mut rig = Self::new(cfg);
        let mode = rig.orch.init(now_ms);
        (rig, mode)
    }
}

// ── Configs ───────────────────────────────────────────────────

pub fn wifi_config() -> ConnectionConfig {
    ConnectionConfig {
        conn_mode: "wifi".into(),
        ssid: "HomeNet".into(),
        pass: "hunter2hunter2".into(),
        ..ConnectionConfig::default()
    }
}

#[allow(dead_code)]
pub fn mode_config(mode: &str) -> ConnectionConfig {
    ConnectionConfig {
        conn_mode: mode.into(),
        ..ConnectionConfig::default()
    }
}
