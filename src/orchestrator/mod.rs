//! Protocol orchestrator: owns configuration, picks the protocol mode at
//! boot and wires every transport together.
//!
//! ```text
//!                     ┌─────────────── ProtocolOrchestrator ───────────────┐
//!  Inbox ───────────▶ │  EspNowPeerManager ─▶ MessageRouter ─▶ WorkQueues   │
//!  (serial, HTTP,     │        ▲                   │                        │
//!   MQTT, radio)      │        └─ GatewayForwarder ┘ (gateway mode)         │
//!                     │  WebSocketSession   MqttSession   NetworkPort       │
//!                     └────────────────────────────────────────────────────┘
//! ```
//!
//! Mode selection, in order:
//!
//! 1. WiFi mode without an SSID goes straight to the captive portal.
//! 2. A third `init()` within 10 s of the previous one, during the first
//!    30 s of uptime, is treated as a crash loop: captive portal.
//! 3. The stored mode decides the rest; an unknown mode string also ends
//!    in the captive portal.
//!
//! Network services (WebSocket, MQTT, mDNS, HTTP API) only start for
//! modes with IP connectivity, never for ESP-NOW only.

pub mod boot_guard;
pub mod http;

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Value, json};

use crate::app::ports::{
    Advertiser, BackendHttp, LinkSnapshot, MqttClient, MqttSettings, NetworkPort, RadioDriver,
    StatusSink, StorageError, StoragePort, SystemPort, WsClient,
};
use crate::app::status::{ConfigStats, ConnectionStatus};
use crate::config::{ConnMode, ConnectionConfig};
use crate::espnow::gateway::GatewayForwarder;
use crate::espnow::peers::EspNowPeerManager;
use crate::mqtt::{self, MqttSession, TopicRegistry};
use crate::protocol::codec::encode_frame;
use crate::protocol::ingress::{Inbound, Inbox, IngressPort};
use crate::protocol::message::Origin;
use crate::protocol::router::{MessageRouter, Routed};
use crate::websocket::messages::{self, DeviceIdentity, EspNowSummary, Telemetry};
use crate::websocket::{SessionOutput, WebSocketSession};

use boot_guard::BootGuard;

pub const PEER_CLEANUP_INTERVAL_MS: u64 = 5_000;
pub const LINK_CHECK_INTERVAL_MS: u64 = 2_000;
pub const WIPE_RESTART_DELAY_MS: u32 = 3_000;
pub const PREFS_RESTART_DELAY_MS: u32 = 1_000;
pub const HTTP_PORT: u16 = 80;
pub const MDNS_SERVICE: &str = "_junctionrelay";
pub const MDNS_PROTOCOL: &str = "_tcp";

pub type Storage = Box<dyn StoragePort + Send>;
pub type Radio = Box<dyn RadioDriver + Send>;
pub type WsClientBox = Box<dyn WsClient + Send>;
pub type BackendHttpBox = Box<dyn BackendHttp + Send>;
pub type MqttClientBox = Box<dyn MqttClient + Send>;

/// Builds the broker client once the stored broker is known. `None` when
/// the client cannot be created.
pub type MqttBuilder = Box<dyn FnMut(&MqttSettings) -> Option<MqttClientBox> + Send>;

/// Protocol modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProtocolMode {
    Idle,
    WiFiPrimary,
    EthernetPrimary,
    EspNowOnly,
    Gateway,
    CaptivePortal,
}

impl ProtocolMode {
    /// Modes that bring up the IP services.
    pub fn uses_network(self) -> bool {
        matches!(self, Self::WiFiPrimary | Self::EthernetPrimary | Self::Gateway)
    }
}

/// Transport treated as authoritative for outbound data this boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrimaryProtocol {
    WebSocketHttp,
    EspNow,
    Gateway,
}

/// Where one outbound message went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Via {
    EspNow,
    WebSocket,
    Http,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Primary path that accepted the message, if any.
    pub via: Option<Via>,
    /// Also published on MQTT.
    pub mqtt: bool,
}

/// Everything the orchestrator drives, handed over at construction.
pub struct Collaborators {
    pub storage: Storage,
    pub network: Box<dyn NetworkPort + Send>,
    pub system: Box<dyn SystemPort + Send>,
    pub radio: Radio,
    pub ws_client: WsClientBox,
    pub backend_http: BackendHttpBox,
    pub advertiser: Box<dyn Advertiser + Send>,
    pub mqtt_builder: MqttBuilder,
}

pub struct ProtocolOrchestrator {
    config: ConnectionConfig,
    mode: ProtocolMode,
    primary: PrimaryProtocol,
    boot_guard: BootGuard,
    identity: DeviceIdentity,

    storage: Storage,
    network: Box<dyn NetworkPort + Send>,
    system: Box<dyn SystemPort + Send>,
    advertiser: Box<dyn Advertiser + Send>,
    mqtt_builder: MqttBuilder,
    status_sink: Option<Box<dyn StatusSink + Send>>,

    inbox: Inbox,
    http_ingress: IngressPort,
    router: MessageRouter,
    config_stats: Arc<ConfigStats>,
    peers: EspNowPeerManager<Radio>,
    ws: WebSocketSession<WsClientBox, BackendHttpBox>,
    mqtt: Option<MqttSession<MqttClientBox>>,

    network_services: bool,
    last_link: LinkSnapshot,
    last_peer_cleanup: u64,
    last_link_check: Option<u64>,
}

impl ProtocolOrchestrator {
    pub fn new(
        c: Collaborators,
        identity: DeviceIdentity,
        inbox: Inbox,
        router: MessageRouter,
        config_stats: Arc<ConfigStats>,
    ) -> Self {
        let config = ConnectionConfig::default();
        let ws = WebSocketSession::new(
            c.ws_client,
            c.backend_http,
            identity.clone(),
            config.backend_port,
        );
        Self {
            config,
            mode: ProtocolMode::Idle,
            primary: PrimaryProtocol::WebSocketHttp,
            boot_guard: BootGuard::new(),
            identity,
            storage: c.storage,
            network: c.network,
            system: c.system,
            advertiser: c.advertiser,
            mqtt_builder: c.mqtt_builder,
            status_sink: None,
            http_ingress: IngressPort::new(Origin::Http, inbox.clone()),
            peers: EspNowPeerManager::new(c.radio, inbox.clone()),
            inbox,
            router,
            config_stats,
            ws,
            mqtt: None,
            network_services: false,
            last_link: LinkSnapshot::default(),
            last_peer_cleanup: 0,
            last_link_check: None,
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn mode(&self) -> ProtocolMode {
        self.mode
    }

    pub fn primary(&self) -> PrimaryProtocol {
        self.primary
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn network_services_started(&self) -> bool {
        self.network_services
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn peers(&self) -> &EspNowPeerManager<Radio> {
        &self.peers
    }

    pub fn peers_mut(&mut self) -> &mut EspNowPeerManager<Radio> {
        &mut self.peers
    }

    pub fn websocket(&self) -> &WebSocketSession<WsClientBox, BackendHttpBox> {
        &self.ws
    }

    pub fn mqtt(&self) -> Option<&MqttSession<MqttClientBox>> {
        self.mqtt.as_ref()
    }

    pub fn config_stats(&self) -> &Arc<ConfigStats> {
        &self.config_stats
    }

    pub fn set_status_sink(&mut self, sink: Box<dyn StatusSink + Send>) {
        self.status_sink = Some(sink);
    }

    // ── Startup ───────────────────────────────────────────────

    /// Load the configuration and enter a protocol mode.
    pub fn init(&mut self, now_ms: u64) -> ProtocolMode {
        info!("Orchestrator: starting initialization");
        self.config = ConnectionConfig::load(self.storage.as_ref());

        if self.config.missing_required_credentials() {
            return self.enter_captive_portal("WiFi mode selected but no SSID configured");
        }
        if self.boot_guard.record_init(now_ms) {
            return self.enter_captive_portal("restart loop detected");
        }
        let Some(conn_mode) = self.config.mode() else {
            warn!("Orchestrator: unknown connection mode '{}'", self.config.conn_mode);
            return self.enter_captive_portal("unknown connection mode");
        };

        self.ws.set_port(self.config.backend_port);

        match conn_mode {
            ConnMode::EspNow => {
                info!("Orchestrator: ESP-NOW only mode");
                self.primary = PrimaryProtocol::EspNow;
                self.mode = ProtocolMode::EspNowOnly;
                self.start_radio();
                self.publish_status();
                return self.mode;
            }
            ConnMode::Gateway => {
                info!("Orchestrator: gateway mode (Ethernet + ESP-NOW)");
                self.primary = PrimaryProtocol::Gateway;
                self.mode = ProtocolMode::Gateway;
                self.start_radio();
                if self.config.has_wifi_credentials() {
                    info!("Orchestrator: backup WiFi for gateway");
                    self.network.start_wifi_backup(&self.config.ssid, &self.config.pass);
                }
            }
            ConnMode::Ethernet => {
                info!("Orchestrator: Ethernet mode");
                self.primary = PrimaryProtocol::WebSocketHttp;
                self.mode = ProtocolMode::EthernetPrimary;
                if self.config.has_wifi_credentials() {
                    info!("Orchestrator: backup WiFi for Ethernet");
                    self.network.start_wifi_backup(&self.config.ssid, &self.config.pass);
                }
            }
            ConnMode::Wifi => {
                info!("Orchestrator: WiFi mode");
                self.primary = PrimaryProtocol::WebSocketHttp;
                self.mode = ProtocolMode::WiFiPrimary;
                self.network.start_wifi_primary(&self.config.ssid, &self.config.pass);
            }
        }

        self.start_network_services();
        self.publish_status();
        info!("Orchestrator: initialization complete ({:?})", self.mode);
        self.mode
    }

    fn enter_captive_portal(&mut self, reason: &str) -> ProtocolMode {
        warn!("Orchestrator: {}, starting captive portal", reason);
        let hex = self.identity.mac.compact();
        let ap_name = format!("JunctionRelay_Config_{}", &hex[hex.len() - 4..]);
        self.network.start_captive_portal(&ap_name);
        self.ws.set_enabled(false);
        self.mode = ProtocolMode::CaptivePortal;
        self.mode
    }

    fn start_radio(&mut self) {
        match self.peers.begin() {
            Ok(()) => info!("Orchestrator: ESP-NOW ready"),
            Err(e) => warn!("Orchestrator: ESP-NOW initialization failed: {}", e),
        }
    }

    fn start_network_services(&mut self) {
        self.network_services = true;
        self.ws.set_enabled(true);

        if let Some(broker) = self.config.mqtt_broker() {
            let settings = mqtt::session::settings(
                &broker,
                &self.config.mqtt_username,
                &self.config.mqtt_password,
                &self.identity.mac,
            );
            info!("MQTT: broker {} as {}", settings.url(), settings.client_id);
            match (self.mqtt_builder)(&settings) {
                Some(client) => {
                    let topics = TopicRegistry::load(self.storage.as_ref());
                    self.mqtt = Some(MqttSession::new(client, topics));
                }
                None => warn!("MQTT: client could not be created"),
            }
        }

        let host = format!("JunctionRelay_Device_{}", self.identity.mac.compact());
        match self
            .advertiser
            .advertise(&host, MDNS_SERVICE, MDNS_PROTOCOL, HTTP_PORT)
        {
            Ok(()) => info!("mDNS: advertising {}.local", host),
            Err(e) => warn!("mDNS: {}", e),
        }
    }

    // ── Main loop ─────────────────────────────────────────────

    /// One pass of the orchestrator task. Returns the number of inbound
    /// items handled.
    pub fn poll(&mut self, now_ms: u64) -> usize {
        let mut handled = 0;
        while let Ok(msg) = self.inbox.try_receive() {
            self.handle_inbound(msg, now_ms);
            handled += 1;
        }

        if self.peers.is_initialized()
            && now_ms.saturating_sub(self.last_peer_cleanup) >= PEER_CLEANUP_INTERVAL_MS
        {
            self.last_peer_cleanup = now_ms;
            let evicted = self.peers.cleanup_inactive(now_ms);
            if evicted > 0 {
                debug!("Orchestrator: evicted {} stale peer(s)", evicted);
            }
        }

        self.network.poll(now_ms);
        if !self.mode.uses_network() {
            return handled;
        }

        let due = self
            .last_link_check
            .is_none_or(|t| now_ms.saturating_sub(t) >= LINK_CHECK_INTERVAL_MS);
        if due {
            self.last_link_check = Some(now_ms);
            self.check_links(now_ms);
        }

        if self.network_services {
            let link = self.network.link();
            let telemetry = self.telemetry(now_ms);
            for out in self.ws.poll(now_ms, &link, &telemetry) {
                self.handle_session_output(out, now_ms);
            }
            if let Some(mqtt) = &mut self.mqtt {
                mqtt.tick(now_ms, link.any_up());
            }
        }
        handled
    }

    fn handle_inbound(&mut self, msg: Inbound, now_ms: u64) {
        match msg {
            Inbound::RadioSent { peer, delivered } => self.peers.on_send_status(peer, delivered),
            Inbound::Frame { origin, payload } => {
                if let Origin::EspNow { peer, rssi } = origin
                    && !self.peers.on_receive(peer, payload.as_bytes(), rssi, now_ms)
                {
                    return;
                }
                self.route(payload.as_bytes(), origin, now_ms);
            }
        }
    }

    /// Route one complete payload and carry out any follow-up action.
    pub fn route(&mut self, payload: &[u8], origin: Origin, now_ms: u64) -> Routed {
        let routed = if self.mode == ProtocolMode::Gateway {
            let mut forwarder = GatewayForwarder::new(&mut self.peers);
            self.router.route(payload, origin, Some(&mut forwarder))
        } else {
            self.router.route(payload, origin, None)
        };

        match &routed {
            Routed::Subscribe(topics) => self.subscribe(topics),
            Routed::Wipe => self.wipe(origin, now_ms),
            _ => {}
        }
        routed
    }

    fn subscribe(&mut self, topics: &[String]) {
        match &mut self.mqtt {
            Some(mqtt) => {
                let added = mqtt.subscribe(topics, self.storage.as_mut());
                info!("MQTT: subscription request, {} new topic(s)", added);
            }
            None => warn!("MQTT: no broker configured, subscription request ignored"),
        }
    }

    /// Erase all preferences, acknowledge on the originating channel and
    /// schedule a restart.
    pub fn wipe(&mut self, origin: Origin, now_ms: u64) {
        let result = self.erase_preferences();
        let success = result.is_ok();
        let message = match result {
            Ok(()) => "All preferences wiped successfully".to_owned(),
            Err(e) => format!("Failed to wipe preferences: {e}"),
        };
        let ack = json!({
            "type": "wipe_preferences_response",
            "timestamp": now_ms,
            "success": success,
            "message": message,
            "restartIn": WIPE_RESTART_DELAY_MS / 1000,
        });

        match origin {
            Origin::WebSocket => {
                if let Err(e) = self.ws.send_json(&ack) {
                    warn!("WS: wipe acknowledgement not sent: {}", e);
                }
            }
            Origin::EspNow { peer, .. } => {
                if let Err(e) = self.peers.send_json(&peer, &ack) {
                    warn!("ESP-NOW: wipe acknowledgement not sent: {}", e);
                }
            }
            _ => {
                self.send_generic_data(&ack);
            }
        }

        info!("Orchestrator: restarting in {} ms", WIPE_RESTART_DELAY_MS);
        self.system.schedule_restart(WIPE_RESTART_DELAY_MS);
    }

    /// Erase the whole store and every piece of in-memory state derived
    /// from it.
    fn erase_preferences(&mut self) -> Result<(), StorageError> {
        warn!("Orchestrator: wiping all preferences");
        let result = self.storage.erase_all();
        self.config = ConnectionConfig::default();
        self.config_stats.reset();
        self.peers.reset_statistics();
        if let Some(mqtt) = &mut self.mqtt {
            mqtt.forget_topics();
        }
        result
    }

    fn handle_session_output(&mut self, out: SessionOutput, now_ms: u64) {
        match out {
            SessionOutput::Forward(text) => {
                self.route(text.as_bytes(), Origin::WebSocket, now_ms);
            }
            SessionOutput::EspNowStatusRequested => {
                let summary = self.espnow_summary(now_ms);
                let msg = messages::espnow_status(&self.identity, &summary, now_ms);
                if let Err(e) = self.ws.send_json(&msg) {
                    warn!("WS: espnow-status not sent: {}", e);
                }
            }
        }
    }

    fn espnow_summary(&mut self, now_ms: u64) -> EspNowSummary {
        let initialized = self.peers.is_initialized();
        let (online, offline) = self
            .peers
            .peers(now_ms)
            .iter()
            .partition::<Vec<_>, _>(|p| p.is_active);
        EspNowSummary {
            initialized,
            online: online.iter().map(|p| p.mac.to_string()).collect(),
            offline: offline.iter().map(|p| p.mac.to_string()).collect(),
        }
    }

    fn check_links(&mut self, now_ms: u64) {
        let link = self.network.link();
        if link == self.last_link {
            return;
        }
        let prev = core::mem::replace(&mut self.last_link, link.clone());

        if link.wifi_connected != prev.wifi_connected {
            info!(
                "Orchestrator: WiFi {}",
                if link.wifi_connected { "connected" } else { "disconnected" }
            );
        }
        if link.ethernet_connected != prev.ethernet_connected {
            info!(
                "Orchestrator: Ethernet {}",
                if link.ethernet_connected { "connected" } else { "disconnected" }
            );
        }
        self.publish_status();

        let came_up = (link.wifi_connected && !prev.wifi_connected)
            || (link.ethernet_connected && !prev.ethernet_connected);
        if came_up && self.network_services {
            self.ws.nudge(now_ms, &link);
        }
    }

    // ── Outbound ──────────────────────────────────────────────

    /// Send `doc` over the primary transport, and also over MQTT when it
    /// is connected.
    pub fn send_generic_data(&mut self, doc: &Value) -> SendReport {
        let text = doc.to_string();
        let mut report = SendReport::default();

        match self.primary {
            PrimaryProtocol::EspNow => {
                if self.peers.is_initialized() {
                    match self.peers.broadcast(text.as_bytes()) {
                        Ok(()) => report.via = Some(Via::EspNow),
                        Err(e) => warn!("ESP-NOW: broadcast failed: {}", e),
                    }
                }
            }
            PrimaryProtocol::WebSocketHttp | PrimaryProtocol::Gateway => {
                let link = self.network.link();
                if self.ws.is_connected() {
                    if self.ws.send_text(&text).is_ok() {
                        report.via = Some(Via::WebSocket);
                    }
                } else if let Some(backend) = self.ws.backend()
                    && link.any_up()
                {
                    report.via = self.post_framed(backend, &text);
                } else {
                    warn!("Orchestrator: no network available, data dropped");
                }
            }
        }

        if let Some(mqtt) = &mut self.mqtt
            && mqtt.is_connected()
        {
            match mqtt.publish_data(text.as_bytes()) {
                Ok(()) => report.mqtt = true,
                Err(e) => warn!("MQTT: publish failed: {}", e),
            }
        }
        report
    }

    fn post_framed(&mut self, backend: core::net::Ipv4Addr, text: &str) -> Option<Via> {
        let Some(body) = encode_frame(text.as_bytes()) else {
            warn!("HTTP: payload of {} bytes too large to frame", text.len());
            return None;
        };
        let port = self.ws.port();
        match self.ws.http().post_data(backend, port, &body) {
            Ok(()) => Some(Via::Http),
            Err(e) => {
                warn!("HTTP: POST to {}:{} failed: {}", backend, port, e);
                None
            }
        }
    }

    pub fn send_sensor_data(&mut self, doc: &Value) -> SendReport {
        debug!("Orchestrator: sending sensor data");
        self.send_generic_data(doc)
    }

    pub fn send_config_data(&mut self, doc: &Value) -> SendReport {
        debug!("Orchestrator: sending config data");
        self.send_generic_data(doc)
    }

    // ── Status ────────────────────────────────────────────────

    /// Fresh snapshot, rebuilt from the live components.
    pub fn status(&self) -> ConnectionStatus {
        let link = self.network.link();
        ConnectionStatus {
            esp_now_active: self.peers.is_initialized(),
            wifi_connected: link.wifi_connected,
            mqtt_connected: self.mqtt.as_ref().is_some_and(MqttSession::is_connected),
            ethernet_connected: link.ethernet_connected,
            web_socket_connected: self.ws.is_connected(),
            ip_address: link.active_ip().map(|ip| ip.to_string()).unwrap_or_default(),
            mac_address: self.identity.mac.to_string(),
            ethernet_ip: link
                .ethernet_ip
                .filter(|_| link.ethernet_connected)
                .map(|ip| ip.to_string()),
            ethernet_mac: link.ethernet_mac.clone().filter(|_| link.ethernet_connected),
            active_network_type: link.active_type(),
            backend_server_ip: self.ws.backend().map(|ip| ip.to_string()).unwrap_or_default(),
        }
    }

    fn publish_status(&mut self) {
        let status = self.status();
        if let Some(sink) = &mut self.status_sink {
            sink.publish(&status);
        }
    }

    pub fn telemetry(&self, now_ms: u64) -> Telemetry {
        Telemetry {
            uptime_ms: now_ms,
            heap: self.system.heap(),
            battery: self.system.battery(),
        }
    }
}
