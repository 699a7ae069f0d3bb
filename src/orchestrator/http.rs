//! HTTP API.
//!
//! Handlers are plain functions of request to response so they can be
//! exercised without a server. The ESP-IDF HTTP server adapter collects
//! the body, locks the orchestrator and calls [`ProtocolOrchestrator::handle_http`].

use log::{info, warn};
use serde_json::{Value, json};

use super::{PREFS_RESTART_DELAY_MS, ProtocolMode, ProtocolOrchestrator, WIPE_RESTART_DELAY_MS};
use crate::config::ConnectionConfig;
use crate::error::RadioError;

/// Largest accepted preferences body.
pub const MAX_PREFS_BODY: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    /// Path, optionally with a `?query`.
    pub path: String,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn get(path: &str) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: Vec::new(),
        }
    }

    pub fn post(path: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: body.into(),
        }
    }

    pub fn delete(path: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: body.into(),
        }
    }

    fn route(&self) -> &str {
        self.path.split_once('?').map_or(self.path.as_str(), |(p, _)| p)
    }

    fn query_param(&self, name: &str) -> Option<&str> {
        let (_, query) = self.path.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn ok(body: &Value) -> Self {
        Self::json(200, body)
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, &json!({"success": false, "message": message}))
    }

    /// Parsed body; `Value::Null` if it is not JSON.
    pub fn value(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

fn radio_down() -> HttpResponse {
    HttpResponse::error(404, "ESP-NOW not initialized")
}

impl ProtocolOrchestrator {
    /// Serve one API request.
    pub fn handle_http(&mut self, req: &HttpRequest, now_ms: u64) -> HttpResponse {
        use Method::{Delete, Get, Post};

        match (req.method, req.route()) {
            (Get, "/api/connection/status") => HttpResponse::ok(&json!(self.status())),
            (Get, "/api/device/capabilities") => HttpResponse::ok(&self.capabilities_json()),
            (Get, "/api/device/info") => HttpResponse::ok(&self.device_info_json(now_ms)),
            (Get, "/api/device/preferences") => {
                let stored = ConnectionConfig::load(self.storage.as_ref());
                HttpResponse::ok(&stored.to_preferences_json())
            }
            (Post, "/api/device/set-preferences") => self.set_preferences(&req.body),
            (Post, "/api/device/wipe-preferences") => self.wipe_via_http(now_ms),
            (Post, "/api/data") => {
                let accepted = self.http_ingress.push_bytes(&req.body);
                HttpResponse::ok(&json!({"success": true, "accepted": accepted}))
            }
            (Get, "/api/health/heartbeat") => HttpResponse::ok(&json!({
                "status": "OK",
                "mac": self.identity.mac.to_string(),
                "firmware": self.identity.firmware_version,
                "uptime": now_ms,
                "free_heap": self.system.heap().free,
            })),
            (Get, "/api/system/statslite") => HttpResponse::ok(&self.stats_lite_json(now_ms)),
            (Post, "/api/system/reset-config") => {
                self.config_stats.reset();
                info!("Orchestrator: configuration state reset");
                HttpResponse::ok(&json!({
                    "success": true,
                    "message": "Configuration state reset",
                }))
            }
            (Get, "/api/gateway/status") => HttpResponse::ok(&json!({
                "hasEthernet": self.identity.supports_ethernet,
                "hasESPNow": self.peers.is_initialized(),
                "canForward": self.mode == ProtocolMode::Gateway && self.peers.is_initialized(),
                "peerCount": self.peers.peer_count(),
            })),
            (Get, "/api/espnow/status") => self.with_radio(|o| HttpResponse::ok(&o.peers.status_json())),
            (Get, "/api/espnow/stats") => {
                self.with_radio(|o| HttpResponse::ok(&o.peers.statistics_json()))
            }
            (Get, "/api/espnow/peers") => {
                self.with_radio(|o| HttpResponse::ok(&o.peers.peers_json(now_ms)))
            }
            (Post, "/api/espnow/peers") => self.with_radio(|o| o.add_peer_http(req, now_ms)),
            (Delete, "/api/espnow/peers") => self.with_radio(|o| o.remove_peer_http(req)),
            (_, path) if KNOWN_PATHS.contains(&path) => {
                HttpResponse::error(405, "Method not allowed")
            }
            (_, path) => {
                warn!("HTTP: no handler for {}", path);
                HttpResponse::error(404, "Not found")
            }
        }
    }

    fn with_radio(&mut self, f: impl FnOnce(&mut Self) -> HttpResponse) -> HttpResponse {
        if self.peers.is_initialized() {
            f(self)
        } else {
            radio_down()
        }
    }

    fn capabilities_json(&self) -> Value {
        let id = &self.identity;
        json!({
            "deviceName": id.device_name,
            "deviceModel": id.device_model,
            "firmwareVersion": id.firmware_version,
            "chipModel": id.chip_model,
            "macAddress": id.mac.to_string(),
            "hasEthernet": id.supports_ethernet,
            "hasESPNow": id.supports_espnow,
            "hasMQTT": id.supports_mqtt,
            "capabilities": id.capabilities(),
            "supportedProtocols": id.supported_protocols(),
        })
    }

    fn device_info_json(&self, now_ms: u64) -> Value {
        let id = &self.identity;
        let heap = self.system.heap();
        json!({
            "deviceModel": id.device_model,
            "firmwareVersion": id.firmware_version,
            "chipModel": id.chip_model,
            "chipRevision": id.chip_revision,
            "cpuFreqMHz": id.cpu_freq_mhz,
            "flashSize": id.flash_size,
            "uniqueIdentifier": id.mac.compact().as_str(),
            "macAddress": id.mac.to_string(),
            "uptime": now_ms,
            "freeHeap": heap.free,
            "heapSize": heap.total,
        })
    }

    fn stats_lite_json(&self, now_ms: u64) -> Value {
        let heap = self.system.heap();
        let stats = &self.config_stats;
        json!({
            "memory": {"freeHeap": heap.free, "heapSize": heap.total},
            "queues": {
                "sensor": self.router.sensor_queue().stats(),
                "config": self.router.config_queue().stats(),
            },
            "router": self.router.stats(),
            "system": {"uptime": now_ms, "cpuFreqMHz": self.identity.cpu_freq_mhz},
            "configuration": {
                "hasReceivedConfig": stats.has_received(),
                "lastConfigTimestamp": stats.last_applied_ms(),
                "configCount": stats.count(),
            },
            "connectionMode": self.config.conn_mode,
            "protocolMode": self.mode,
            "timestamp": now_ms,
        })
    }

    fn set_preferences(&mut self, body: &[u8]) -> HttpResponse {
        if body.is_empty() {
            return HttpResponse::error(400, "JSON body required");
        }
        if body.len() > MAX_PREFS_BODY {
            return HttpResponse::error(413, "Body too large");
        }
        let Ok(doc) = serde_json::from_slice::<Value>(body) else {
            return HttpResponse::error(400, "Invalid JSON");
        };

        let mut cfg = ConnectionConfig::load(self.storage.as_ref());
        let Ok(update) = cfg.apply_update(&doc) else {
            return HttpResponse::error(400, "JSON object required");
        };
        if let Err(e) = cfg.save(self.storage.as_mut()) {
            warn!("HTTP: saving preferences failed: {}", e);
            return HttpResponse::error(500, "Failed to save preferences");
        }
        self.config = cfg;
        info!(
            "HTTP: preferences saved (changed: {}, restart: {})",
            update.changed, update.restart
        );

        let mut resp = json!({
            "success": true,
            "message": "Preferences saved successfully",
            "settings": {
                "backendPort": self.config.backend_port,
                "connMode": self.config.conn_mode,
                "wifiSSID": self.config.ssid,
                "mqttBroker": self.config.mqtt_broker,
                "mqttUsername": self.config.mqtt_username,
            },
        });
        if update.restart {
            resp["restart"] = json!(true);
            resp["message"] = json!("Preferences saved. Device will restart.");
            self.system.schedule_restart(PREFS_RESTART_DELAY_MS);
        }
        HttpResponse::ok(&resp)
    }

    fn wipe_via_http(&mut self, now_ms: u64) -> HttpResponse {
        let erased = self.erase_preferences();
        self.system.schedule_restart(WIPE_RESTART_DELAY_MS);
        match erased {
            Ok(()) => HttpResponse::ok(&json!({
                "success": true,
                "message": "All preferences wiped successfully",
                "timestamp": now_ms,
                "restartIn": WIPE_RESTART_DELAY_MS / 1000,
            })),
            Err(e) => HttpResponse::json(
                500,
                &json!({
                    "success": false,
                    "message": format!("Failed to wipe preferences: {e}"),
                    "timestamp": now_ms,
                    "restartIn": WIPE_RESTART_DELAY_MS / 1000,
                }),
            ),
        }
    }

    fn add_peer_http(&mut self, req: &HttpRequest, now_ms: u64) -> HttpResponse {
        let doc = req.json_body().unwrap_or(Value::Null);
        let Some(mac) = doc.get("mac").and_then(Value::as_str) else {
            return HttpResponse::error(400, "MAC address required");
        };
        let name = doc.get("name").and_then(Value::as_str).unwrap_or("");
        match self.peers.add_peer_str(mac, name, now_ms) {
            Ok(()) => HttpResponse::ok(&json!({"success": true, "message": "Peer added"})),
            Err(RadioError::InvalidMac) => HttpResponse::error(400, "Invalid MAC address"),
            Err(e) => HttpResponse::error(500, &e.to_string()),
        }
    }

    fn remove_peer_http(&mut self, req: &HttpRequest) -> HttpResponse {
        let doc = req.json_body().unwrap_or(Value::Null);
        let mac = doc
            .get("mac")
            .and_then(Value::as_str)
            .or_else(|| req.query_param("mac"));
        let Some(mac) = mac else {
            return HttpResponse::error(400, "MAC address required");
        };
        match self.peers.remove_peer_str(mac) {
            Ok(()) => HttpResponse::ok(&json!({"success": true, "message": "Peer removed"})),
            Err(RadioError::InvalidMac) => HttpResponse::error(400, "Invalid MAC address"),
            Err(RadioError::PeerNotFound) => HttpResponse::error(404, "Peer not found"),
            Err(e) => HttpResponse::error(500, &e.to_string()),
        }
    }
}

const KNOWN_PATHS: &[&str] = &[
    "/api/connection/status",
    "/api/device/capabilities",
    "/api/device/info",
    "/api/device/preferences",
    "/api/device/set-preferences",
    "/api/device/wipe-preferences",
    "/api/data",
    "/api/health/heartbeat",
    "/api/system/statslite",
    "/api/system/reset-config",
    "/api/gateway/status",
    "/api/espnow/status",
    "/api/espnow/stats",
    "/api/espnow/peers",
];
