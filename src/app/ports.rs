//! Port traits: the hexagonal boundary between relay logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Router / PeerManager / Session / Orchestrator
//! ```
//!
//! Driven adapters (NVS, radio, sockets, MQTT, display) implement these
//! traits. The core consumes them via generics or boxed trait objects, so
//! nothing in `protocol`, `espnow`, `websocket` or `orchestrator` touches
//! ESP-IDF directly. Every port error is typed.

use core::fmt;
use core::net::Ipv4Addr;

use serde_json::Value;

use crate::error::RadioError;
use crate::espnow::mac::MacAddr;
use crate::protocol::ingress::CountingInbox;

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: relay ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage, namespaced by subsystem.
///
/// Write operations MUST be atomic. ESP-IDF NVS guarantees this per
/// commit; the in-memory simulation achieves it trivially.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;

    /// Erase every namespace (factory wipe).
    fn erase_all(&mut self) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    Full,
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "storage I/O error"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Display sink (driven adapter: consumer tasks → rendering)
// ───────────────────────────────────────────────────────────────

/// Downstream display subsystem. Called only from the consumer tasks.
pub trait DisplaySink {
    fn route_sensor(&mut self, doc: &Value) -> Result<(), SinkError>;
    fn route_config(&mut self, doc: &Value) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// The layout or payload was rejected.
    Rejected(&'static str),
    /// The display pipeline is not ready.
    NotReady,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(why) => write!(f, "rejected: {why}"),
            Self::NotReady => write!(f, "display not ready"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Radio driver (driven adapter: peer manager ↔ ESP-NOW)
// ───────────────────────────────────────────────────────────────

/// Raw ESP-NOW driver. Receive and send-status callbacks are installed
/// by `init` and hand off to the ingress channel; they never block. Items
/// the channel refuses are counted by the [`CountingInbox`].
pub trait RadioDriver {
    fn init(&mut self, inbox: CountingInbox) -> Result<(), RadioError>;
    fn deinit(&mut self);
    fn register_peer(&mut self, mac: &MacAddr) -> Result<(), RadioError>;
    fn unregister_peer(&mut self, mac: &MacAddr) -> Result<(), RadioError>;
    fn send(&mut self, mac: &MacAddr, data: &[u8]) -> Result<(), RadioError>;
    fn local_mac(&self) -> MacAddr;
    fn channel(&self) -> u8;
}

impl<T: RadioDriver + ?Sized> RadioDriver for Box<T> {
    fn init(&mut self, inbox: CountingInbox) -> Result<(), RadioError> {
        (**self).init(inbox)
    }
    fn deinit(&mut self) {
        (**self).deinit();
    }
    fn register_peer(&mut self, mac: &MacAddr) -> Result<(), RadioError> {
        (**self).register_peer(mac)
    }
    fn unregister_peer(&mut self, mac: &MacAddr) -> Result<(), RadioError> {
        (**self).unregister_peer(mac)
    }
    fn send(&mut self, mac: &MacAddr, data: &[u8]) -> Result<(), RadioError> {
        (**self).send(mac, data)
    }
    fn local_mac(&self) -> MacAddr {
        (**self).local_mac()
    }
    fn channel(&self) -> u8 {
        (**self).channel()
    }
}

// ───────────────────────────────────────────────────────────────
// MQTT client (black box: connect / subscribe / publish)
// ───────────────────────────────────────────────────────────────

pub trait MqttClient {
    fn connect(&mut self) -> Result<(), MqttError>;
    fn is_connected(&self) -> bool;
    fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), MqttError>;
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), MqttError>;
}

impl<T: MqttClient + ?Sized> MqttClient for Box<T> {
    fn connect(&mut self) -> Result<(), MqttError> {
        (**self).connect()
    }
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
    fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), MqttError> {
        (**self).subscribe(topic, qos)
    }
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        (**self).publish(topic, payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttError {
    NotConnected,
    ConnectFailed,
    SubscribeFailed,
    PublishFailed,
}

impl fmt::Display for MqttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
            Self::PublishFailed => write!(f, "publish failed"),
        }
    }
}

/// Everything needed to construct a broker client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keepalive_secs: u16,
}

impl MqttSettings {
    pub fn url(&self) -> String {
        format!("mqtt://{}:{}", self.host, self.port)
    }
}

// ───────────────────────────────────────────────────────────────
// WebSocket client (black box: open / send / events)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    Opened,
    Closed,
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsError {
    ConnectFailed,
    SendFailed,
    NotConnected,
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::SendFailed => write!(f, "send failed"),
            Self::NotConnected => write!(f, "not connected"),
        }
    }
}

/// Non-blocking WebSocket client. `open` only initiates the connection;
/// completion is reported later through `poll_event`.
///
/// `is_open` reflects the socket itself and never lags behind a lost
/// `Opened`/`Closed` event.
pub trait WsClient {
    fn open(&mut self, url: &str) -> Result<(), WsError>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    fn send_text(&mut self, text: &str) -> Result<(), WsError>;
    fn poll_event(&mut self) -> Option<WsEvent>;
}

impl<T: WsClient + ?Sized> WsClient for Box<T> {
    fn open(&mut self, url: &str) -> Result<(), WsError> {
        (**self).open(url)
    }
    fn close(&mut self) {
        (**self).close();
    }
    fn is_open(&self) -> bool {
        (**self).is_open()
    }
    fn send_text(&mut self, text: &str) -> Result<(), WsError> {
        (**self).send_text(text)
    }
    fn poll_event(&mut self) -> Option<WsEvent> {
        (**self).poll_event()
    }
}

// ───────────────────────────────────────────────────────────────
// Backend HTTP (discovery probe + framed POST fallback)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostError {
    Unreachable,
    Status(u16),
}

impl fmt::Display for PostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable => write!(f, "backend unreachable"),
            Self::Status(code) => write!(f, "backend returned HTTP {code}"),
        }
    }
}

pub trait BackendHttp {
    /// Plain-HTTP health probe. `true` when the host answers like a backend.
    fn probe(&mut self, ip: Ipv4Addr, port: u16, timeout_ms: u32) -> bool;

    /// POST an already-framed body to `/api/data`.
    fn post_data(&mut self, ip: Ipv4Addr, port: u16, body: &[u8]) -> Result<(), PostError>;
}

impl<T: BackendHttp + ?Sized> BackendHttp for Box<T> {
    fn probe(&mut self, ip: Ipv4Addr, port: u16, timeout_ms: u32) -> bool {
        (**self).probe(ip, port, timeout_ms)
    }
    fn post_data(&mut self, ip: Ipv4Addr, port: u16, body: &[u8]) -> Result<(), PostError> {
        (**self).post_data(ip, port, body)
    }
}

// ───────────────────────────────────────────────────────────────
// Network links (WiFi STA, Ethernet, captive portal AP)
// ───────────────────────────────────────────────────────────────

/// Point-in-time view of the IP links.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub wifi_connected: bool,
    pub ethernet_connected: bool,
    pub wifi_ip: Option<Ipv4Addr>,
    pub ethernet_ip: Option<Ipv4Addr>,
    pub ethernet_mac: Option<String>,
    pub wifi_rssi: Option<i8>,
}

impl LinkSnapshot {
    pub fn any_up(&self) -> bool {
        self.wifi_connected || self.ethernet_connected
    }

    /// The wired link wins when both are up.
    pub fn active_type(&self) -> &'static str {
        if self.ethernet_connected {
            "Ethernet"
        } else if self.wifi_connected {
            "WiFi"
        } else {
            "None"
        }
    }

    pub fn active_ip(&self) -> Option<Ipv4Addr> {
        if self.ethernet_connected {
            self.ethernet_ip
        } else if self.wifi_connected {
            self.wifi_ip
        } else {
            None
        }
    }
}

pub trait NetworkPort {
    /// Bring up WiFi as the primary link, retrying in the background.
    fn start_wifi_primary(&mut self, ssid: &str, password: &str);
    /// Keep WiFi ready as a fallback; it connects only while Ethernet is down.
    fn start_wifi_backup(&mut self, ssid: &str, password: &str);
    /// Open the configuration access point.
    fn start_captive_portal(&mut self, ap_name: &str);
    /// Drive retry timers.
    fn poll(&mut self, now_ms: u64);
    fn link(&self) -> LinkSnapshot;
}

/// Service advertisement on the local network (mDNS).
pub trait Advertiser {
    fn advertise(
        &mut self,
        hostname: &str,
        service: &str,
        protocol: &str,
        port: u16,
    ) -> Result<(), AdvertiseError>;
}

/// Driver error code from the advertiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertiseError(pub i32);

impl fmt::Display for AdvertiseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "advertise failed ({})", self.0)
    }
}

// ───────────────────────────────────────────────────────────────
// System services
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub free: u32,
    pub total: u32,
    pub largest_block: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    pub percent: u8,
    pub voltage: f32,
}

pub trait SystemPort {
    fn heap(&self) -> HeapStats;
    fn battery(&self) -> Option<BatteryReading>;
    /// Restart the chip after `delay_ms`, giving pending replies time to flush.
    fn schedule_restart(&mut self, delay_ms: u32);
}

/// Monotonic milliseconds since boot.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Status sink (driven adapter: orchestrator → log / display)
// ───────────────────────────────────────────────────────────────

pub trait StatusSink {
    fn publish(&mut self, status: &super::status::ConnectionStatus);
}
