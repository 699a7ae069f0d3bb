//! Connection configuration.
//!
//! Everything the orchestrator needs to pick a protocol mode at boot.
//! Persisted through [`StoragePort`] under the `connConfig` namespace as
//! plain UTF-8 values; read once at startup and rewritten only by the
//! preferences-update path.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::app::ports::{StorageError, StoragePort};

/// NVS namespace holding every connection preference.
pub const PREFS_NAMESPACE: &str = "connConfig";

pub const KEY_CONN_MODE: &str = "connMode";
pub const KEY_SSID: &str = "ssid";
pub const KEY_PASS: &str = "pass";
pub const KEY_MQTT_BROKER: &str = "mqttBroker";
pub const KEY_MQTT_USERNAME: &str = "mqttUsername";
pub const KEY_MQTT_PASSWORD: &str = "mqttPassword";
pub const KEY_BACKEND_PORT: &str = "backendPort";

/// Backend HTTP/WebSocket port when none (or garbage) is stored.
pub const DEFAULT_BACKEND_PORT: u16 = 7180;

/// MQTT port when the broker string carries none (or garbage).
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Largest stored value we read back.
const MAX_VALUE_LEN: usize = 256;

// ───────────────────────────────────────────────────────────────
// Connection mode
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnMode {
    Wifi,
    Ethernet,
    EspNow,
    Gateway,
}

impl ConnMode {
    /// Parse the stored mode string. Empty means WiFi; anything
    /// unrecognised yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "" | "wifi" => Some(Self::Wifi),
            "ethernet" => Some(Self::Ethernet),
            "espnow" => Some(Self::EspNow),
            "gateway" => Some(Self::Gateway),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wifi => "wifi",
            Self::Ethernet => "ethernet",
            Self::EspNow => "espnow",
            Self::Gateway => "gateway",
        }
    }
}

// ───────────────────────────────────────────────────────────────
// MQTT broker address
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttBroker {
    pub host: String,
    pub port: u16,
}

impl MqttBroker {
    /// Parse `host[:port]`. The split happens at the first `:`; a port
    /// outside 1..=65535 (or not a number) falls back to 1883. Returns
    /// `None` when the host is empty.
    pub fn parse(raw: &str) -> Option<Self> {
        let (host, port) = match raw.split_once(':') {
            Some((host, port_str)) => {
                let port = match port_str.trim().parse::<u32>() {
                    Ok(p) if (1..=65_535).contains(&p) => p as u16,
                    _ => {
                        warn!(
                            "Config: MQTT port '{}' invalid, using {}",
                            port_str.trim(),
                            DEFAULT_MQTT_PORT
                        );
                        DEFAULT_MQTT_PORT
                    }
                };
                (host, port)
            }
            None => (raw, DEFAULT_MQTT_PORT),
        };

        let host = host.trim();
        if host.is_empty() {
            return None;
        }
        Some(Self {
            host: host.into(),
            port,
        })
    }
}

// ───────────────────────────────────────────────────────────────
// Connection config
// ───────────────────────────────────────────────────────────────

/// Persisted connection preferences.
///
/// `conn_mode` keeps the raw stored string so that an unknown value can
/// be detected (and routed to the captive portal) instead of silently
/// coerced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub conn_mode: String,
    pub ssid: String,
    pub pass: String,
    pub mqtt_broker: String,
    pub mqtt_username: String,
    pub mqtt_password: String,
    pub backend_port: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            conn_mode: String::new(),
            ssid: String::new(),
            pass: String::new(),
            mqtt_broker: String::new(),
            mqtt_username: String::new(),
            mqtt_password: String::new(),
            backend_port: DEFAULT_BACKEND_PORT,
        }
    }
}

/// Result of applying a preferences update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreferencesUpdate {
    /// At least one field changed.
    pub changed: bool,
    /// The new settings only take effect after a restart.
    pub restart: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateError {
    /// Body is not a JSON object.
    NotAnObject,
}

impl ConnectionConfig {
    /// Load every key, substituting defaults for anything missing.
    pub fn load<S: StoragePort + ?Sized>(store: &S) -> Self {
        let backend_raw = read_string(store, KEY_BACKEND_PORT);
        let backend_port = if backend_raw.is_empty() {
            DEFAULT_BACKEND_PORT
        } else {
            parse_port(&backend_raw).unwrap_or_else(|| {
                warn!(
                    "Config: invalid backend port '{}', using default {}",
                    backend_raw, DEFAULT_BACKEND_PORT
                );
                DEFAULT_BACKEND_PORT
            })
        };

        let cfg = Self {
            conn_mode: read_string(store, KEY_CONN_MODE),
            ssid: read_string(store, KEY_SSID),
            pass: read_string(store, KEY_PASS),
            mqtt_broker: read_string(store, KEY_MQTT_BROKER),
            mqtt_username: read_string(store, KEY_MQTT_USERNAME),
            mqtt_password: read_string(store, KEY_MQTT_PASSWORD),
            backend_port,
        };
        info!(
            "Config: mode='{}' ssid='{}' broker='{}' backendPort={}",
            cfg.conn_mode, cfg.ssid, cfg.mqtt_broker, cfg.backend_port
        );
        cfg
    }

    /// Persist every key.
    pub fn save<S: StoragePort + ?Sized>(&self, store: &mut S) -> Result<(), StorageError> {
        store.write(PREFS_NAMESPACE, KEY_CONN_MODE, self.conn_mode.as_bytes())?;
        store.write(PREFS_NAMESPACE, KEY_SSID, self.ssid.as_bytes())?;
        store.write(PREFS_NAMESPACE, KEY_PASS, self.pass.as_bytes())?;
        store.write(PREFS_NAMESPACE, KEY_MQTT_BROKER, self.mqtt_broker.as_bytes())?;
        store.write(PREFS_NAMESPACE, KEY_MQTT_USERNAME, self.mqtt_username.as_bytes())?;
        store.write(PREFS_NAMESPACE, KEY_MQTT_PASSWORD, self.mqtt_password.as_bytes())?;
        let port = self.backend_port.to_string();
        store.write(PREFS_NAMESPACE, KEY_BACKEND_PORT, port.as_bytes())?;
        Ok(())
    }

    /// `None` for an unrecognised mode string.
    pub fn mode(&self) -> Option<ConnMode> {
        ConnMode::parse(&self.conn_mode)
    }

    pub fn has_wifi_credentials(&self) -> bool {
        !self.ssid.is_empty()
    }

    /// WiFi mode (explicit or empty) with no SSID stored.
    pub fn missing_required_credentials(&self) -> bool {
        self.mode() == Some(ConnMode::Wifi) && !self.has_wifi_credentials()
    }

    pub fn mqtt_broker(&self) -> Option<MqttBroker> {
        if self.mqtt_broker.trim().is_empty() {
            return None;
        }
        MqttBroker::parse(&self.mqtt_broker)
    }

    /// Apply a `set-preferences` body. Unknown fields are ignored; a
    /// backend port outside 1..=65535 is ignored. Changing SSID,
    /// passphrase or mode implies a restart unless the body carries an
    /// explicit `restart` flag.
    pub fn apply_update(&mut self, body: &Value) -> Result<PreferencesUpdate, UpdateError> {
        let obj = body.as_object().ok_or(UpdateError::NotAnObject)?;
        let mut changed = false;
        let mut needs_restart = false;

        let mut set = |field: &mut String, key: &str, restart: bool| {
            if let Some(v) = obj.get(key).and_then(Value::as_str) {
                if field.as_str() != v {
                    *field = v.into();
                    changed = true;
                    needs_restart |= restart;
                }
            }
        };
        set(&mut self.conn_mode, "connMode", true);
        set(&mut self.ssid, "wifiSSID", true);
        set(&mut self.pass, "wifiPassword", true);
        set(&mut self.mqtt_broker, "mqttBroker", false);
        set(&mut self.mqtt_username, "mqttUsername", false);
        set(&mut self.mqtt_password, "mqttPassword", false);

        if let Some(port) = obj.get("backendPort").and_then(json_port) {
            if port != self.backend_port {
                self.backend_port = port;
                changed = true;
            }
        }

        let restart = obj
            .get("restart")
            .and_then(Value::as_bool)
            .unwrap_or(needs_restart);
        Ok(PreferencesUpdate { changed, restart })
    }

    /// Preferences as reported over HTTP, secrets masked.
    pub fn to_preferences_json(&self) -> Value {
        json!({
            "connMode": self.conn_mode,
            "wifiSSID": self.ssid,
            "wifiPassword": mask(&self.pass),
            "mqttBroker": self.mqtt_broker,
            "mqttUsername": self.mqtt_username,
            "mqttPassword": mask(&self.mqtt_password),
            "backendPort": self.backend_port,
        })
    }
}

fn read_string<S: StoragePort + ?Sized>(store: &S, key: &str) -> String {
    let mut buf = [0u8; MAX_VALUE_LEN];
    match store.read(PREFS_NAMESPACE, key, &mut buf) {
        Ok(len) => match core::str::from_utf8(&buf[..len]) {
            Ok(s) => s.into(),
            Err(_) => {
                warn!("Config: '{}' is not UTF-8, ignoring", key);
                String::new()
            }
        },
        Err(StorageError::NotFound) => String::new(),
        Err(e) => {
            warn!("Config: read '{}' failed: {}", key, e);
            String::new()
        }
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    match raw.trim().parse::<u32>() {
        Ok(p) if (1..=65_535).contains(&p) => Some(p as u16),
        _ => None,
    }
}

/// Accepts a number or a numeric string.
fn json_port(v: &Value) -> Option<u16> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .filter(|p| (1..=65_535).contains(p))
            .map(|p| p as u16),
        Value::String(s) => parse_port(s),
        _ => None,
    }
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "********" }
}
