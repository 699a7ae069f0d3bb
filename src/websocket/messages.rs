//! Outbound backend messages.
//!
//! Every message has the same envelope:
//! `{"type": …, "timestamp": <uptime ms>, "deviceMac": "AA:BB:…", "data": {…}}`.

use serde_json::{Map, Value, json};

use crate::app::ports::{BatteryReading, HeapStats, LinkSnapshot};
use crate::espnow::mac::MacAddr;

/// Static facts about this node, gathered once at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub mac: MacAddr,
    pub device_name: String,
    pub device_model: String,
    pub firmware_version: &'static str,
    pub chip_model: String,
    pub chip_revision: u16,
    pub cpu_freq_mhz: u32,
    pub flash_size: u32,
    pub supports_ethernet: bool,
    pub supports_espnow: bool,
    pub supports_mqtt: bool,
}

impl DeviceIdentity {
    pub fn capabilities(&self) -> Vec<&'static str> {
        let mut caps = vec!["WiFi", "WebSocket", "JSON", "HealthReporting", "RemoteConfig"];
        if self.supports_ethernet {
            caps.push("Ethernet");
        }
        if self.supports_espnow {
            caps.push("ESP-NOW");
        }
        if self.supports_mqtt {
            caps.push("MQTT");
        }
        caps
    }

    pub fn supported_protocols(&self) -> Vec<&'static str> {
        let mut protocols = vec!["WebSocket", "HTTP"];
        if self.supports_mqtt {
            protocols.push("MQTT");
        }
        if self.supports_espnow {
            protocols.push("ESP-NOW");
        }
        protocols
    }
}

/// `<chip>_R<rev>_<last 4 MAC hex>`, e.g. `ESP32-S3_R0_EEFF`.
pub fn device_name(chip_model: &str, chip_revision: u16, mac: &MacAddr) -> String {
    let hex = mac.compact();
    format!("{}_R{}_{}", chip_model, chip_revision, &hex[hex.len() - 4..])
}

/// Values sampled at send time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    pub uptime_ms: u64,
    pub heap: HeapStats,
    pub battery: Option<BatteryReading>,
}

/// Handshake flags reported in `health`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    pub reconnect_attempts: u32,
    pub welcome_received: bool,
    pub registered: bool,
}

/// Peer liveness for `espnow-status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EspNowSummary {
    pub initialized: bool,
    pub online: Vec<String>,
    pub offline: Vec<String>,
}

fn envelope(kind: &str, identity: &DeviceIdentity, now_ms: u64, data: Value) -> Value {
    json!({
        "type": kind,
        "timestamp": now_ms,
        "deviceMac": identity.mac.to_string(),
        "data": data,
    })
}

fn ip_text(link: &LinkSnapshot) -> String {
    link.active_ip().map(|ip| ip.to_string()).unwrap_or_default()
}

pub fn registration(identity: &DeviceIdentity, link: &LinkSnapshot, now_ms: u64) -> Value {
    let data = json!({
        "deviceName": identity.device_name,
        "firmwareVersion": identity.firmware_version,
        "deviceModel": identity.device_model,
        "connectionMode": link.active_type(),
        "ipAddress": ip_text(link),
        "chipModel": identity.chip_model,
        "chipRevision": identity.chip_revision,
        "cpuFreqMHz": identity.cpu_freq_mhz,
        "flashSize": identity.flash_size,
        "capabilities": identity.capabilities(),
        "supportedProtocols": identity.supported_protocols(),
    });
    envelope("device-registration", identity, now_ms, data)
}

pub fn heartbeat(identity: &DeviceIdentity, link: &LinkSnapshot, t: &Telemetry) -> Value {
    let mut data = Map::new();
    data.insert("uptimeMs".into(), json!(t.uptime_ms));
    data.insert("freeHeap".into(), json!(t.heap.free));
    if link.wifi_connected {
        if let Some(rssi) = link.wifi_rssi {
            data.insert("wifiRssi".into(), json!(rssi));
        }
        data.insert("connectionType".into(), json!("WiFi"));
    } else if link.ethernet_connected {
        data.insert("connectionType".into(), json!("Ethernet"));
    }
    envelope("heartbeat", identity, t.uptime_ms, Value::Object(data))
}

pub fn health(
    identity: &DeviceIdentity,
    link: &LinkSnapshot,
    t: &Telemetry,
    flags: SessionFlags,
) -> Value {
    let active_mac = match (&link.ethernet_mac, link.ethernet_connected) {
        (Some(mac), true) => mac.clone(),
        _ => identity.mac.to_string(),
    };
    let mut data = json!({
        "freeHeap": t.heap.free,
        "heapSize": t.heap.total,
        "maxAllocHeap": t.heap.largest_block,
        "uptimeMs": t.uptime_ms,
        "cpuFreqMHz": identity.cpu_freq_mhz,
        "connectionType": link.active_type(),
        "ipAddress": ip_text(link),
        "macAddress": active_mac,
        "chipModel": identity.chip_model,
        "chipRevision": identity.chip_revision,
        "flashSize": identity.flash_size,
        "firmwareVersion": identity.firmware_version,
        "reconnectAttempts": flags.reconnect_attempts,
        "isWelcomeReceived": flags.welcome_received,
        "isRegistered": flags.registered,
    });
    if let Some(obj) = data.as_object_mut() {
        if link.wifi_connected
            && let Some(rssi) = link.wifi_rssi
        {
            obj.insert("wifiRssi".into(), json!(rssi));
        }
        if let Some(b) = t.battery {
            obj.insert("batteryPercent".into(), json!(b.percent));
            obj.insert("batteryVoltage".into(), json!(b.voltage));
        }
    }
    envelope("health", identity, t.uptime_ms, data)
}

pub fn espnow_status(identity: &DeviceIdentity, summary: &EspNowSummary, now_ms: u64) -> Value {
    let data = json!({
        "isInitialized": summary.initialized,
        "peerCount": summary.online.len() + summary.offline.len(),
        "onlinePeers": summary.online,
        "offlinePeers": summary.offline,
        "degradedPeers": [],
    });
    envelope("espnow-status", identity, now_ms, data)
}

#[cfg(test)]
pub(crate) fn test_identity() -> DeviceIdentity {
    DeviceIdentity {
        mac: MacAddr([0x24, 0x6F, 0x28, 0xAA, 0xEE, 0xFF]),
        device_name: "ESP32-S3_R0_EEFF".into(),
        device_model: "ESP32-S3".into(),
        firmware_version: "0.3.0",
        chip_model: "ESP32-S3".into(),
        chip_revision: 0,
        cpu_freq_mhz: 240,
        flash_size: 8 * 1024 * 1024,
        supports_ethernet: false,
        supports_espnow: true,
        supports_mqtt: true,
    }
}
