//! Status structures shared across tasks.
//!
//! [`ConnectionStatus`] is a derived snapshot: it is rebuilt from the live
//! components every time it is requested and never patched field by field.
//! [`ConfigStats`] is the one piece of state written by the config consumer
//! and read by the orchestrator, so it is made of atomics.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use serde::Serialize;

/// Snapshot of every transport's health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub esp_now_active: bool,
    pub wifi_connected: bool,
    pub mqtt_connected: bool,
    pub ethernet_connected: bool,
    pub web_socket_connected: bool,
    pub ip_address: String,
    pub mac_address: String,
    #[serde(rename = "ethernetIP", skip_serializing_if = "Option::is_none")]
    pub ethernet_ip: Option<String>,
    #[serde(rename = "ethernetMAC", skip_serializing_if = "Option::is_none")]
    pub ethernet_mac: Option<String>,
    pub active_network_type: &'static str,
    #[serde(rename = "backendServerIP")]
    pub backend_server_ip: String,
}

/// Config-received bookkeeping, reset by wipe and by `reset-config`.
///
/// The timestamp is kept in 32 bits: not every ESP32 core has 64-bit
/// atomics. It wraps after ~49 days of uptime.
#[derive(Debug, Default)]
pub struct ConfigStats {
    received: AtomicBool,
    last_applied_ms: AtomicU32,
    count: AtomicU32,
}

impl ConfigStats {
    pub const fn new() -> Self {
        Self {
            received: AtomicBool::new(false),
            last_applied_ms: AtomicU32::new(0),
            count: AtomicU32::new(0),
        }
    }

    pub fn record_applied(&self, now_ms: u64) {
        self.last_applied_ms.store(now_ms as u32, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.received.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.received.store(false, Ordering::Release);
        self.last_applied_ms.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
    }

    pub fn has_received(&self) -> bool {
        self.received.load(Ordering::Acquire)
    }

    pub fn last_applied_ms(&self) -> u64 {
        u64::from(self.last_applied_ms.load(Ordering::Relaxed))
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }
}
