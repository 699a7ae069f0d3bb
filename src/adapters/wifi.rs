//! Network links adapter: WiFi station, Ethernet status, captive portal AP.
//!
//! Implements [`NetworkPort`].
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::EspWifi` for the
//!   station/AP, and the default Ethernet netif (`ETH_DEF`) for the wired
//!   link, which the board support brings up.
//! - **all other targets**: in-memory simulation whose links tests can
//!   flip.
//!
//! ## Retry policy
//!
//! Primary WiFi retries every 5 s while down. Backup WiFi only connects
//! while the wired link is down.

use core::fmt;
use core::net::Ipv4Addr;

use log::{info, warn};

use super::utils::is_printable_ascii;
use crate::app::ports::{LinkSnapshot, NetworkPort};

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};

pub const WIFI_RETRY_INTERVAL_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
        }
    }
}

/// What the WiFi radio is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiRole {
    Off,
    Primary,
    /// Connects only while Ethernet is down.
    Backup,
    AccessPoint,
}

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

pub fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Simulation state
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, Default)]
struct SimLinks {
    wifi_up: bool,
    ethernet_ip: Option<Ipv4Addr>,
    failures_left: u32,
    connect_calls: u32,
}

#[cfg(not(target_os = "espidf"))]
const SIM_WIFI_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 40);

// ───────────────────────────────────────────────────────────────
// Network manager
// ───────────────────────────────────────────────────────────────

pub struct NetworkManager {
    role: WifiRole,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    last_attempt: Option<u64>,
    attempts: u32,
    #[cfg(target_os = "espidf")]
    wifi: EspWifi<'static>,
    #[cfg(not(target_os = "espidf"))]
    sim: SimLinks,
}

impl NetworkManager {
    /// Takes the driver and starts it in station mode without joining, so
    /// ESP-NOW has a running interface in every protocol mode.
    #[cfg(target_os = "espidf")]
    pub fn new(mut wifi: EspWifi<'static>) -> Self {
        if let Err(e) = wifi
            .set_configuration(&Configuration::Client(ClientConfiguration::default()))
            .and_then(|()| wifi.start())
        {
            warn!("WiFi: driver start failed: {}", e);
        }
        Self {
            role: WifiRole::Off,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            last_attempt: None,
            attempts: 0,
            wifi,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            role: WifiRole::Off,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            last_attempt: None,
            attempts: 0,
            sim: SimLinks::default(),
        }
    }

    pub fn role(&self) -> WifiRole {
        self.role
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid
            .push_str(ssid)
            .map_err(|()| ConnectivityError::InvalidSsid)?;
        self.password.clear();
        self.password
            .push_str(password)
            .map_err(|()| ConnectivityError::InvalidPassword)?;
        Ok(())
    }

    fn start_station(&mut self, role: WifiRole, ssid: &str, password: &str) {
        if let Err(e) = self.set_credentials(ssid, password) {
            warn!("WiFi: not starting, {}", e);
            self.role = WifiRole::Off;
            return;
        }
        self.role = role;
        self.last_attempt = None;
        self.attempts = 0;
        info!("WiFi: {:?} station for '{}'", role, self.ssid);
        if let Err(e) = self.platform_configure_station() {
            warn!("WiFi: configuration failed: {}", e);
        }
    }

    fn wants_station(&self) -> bool {
        match self.role {
            WifiRole::Primary => true,
            WifiRole::Backup => !self.ethernet_up(),
            WifiRole::Off | WifiRole::AccessPoint => false,
        }
    }

    fn attempt_connect(&mut self, now_ms: u64) {
        self.last_attempt = Some(now_ms);
        self.attempts += 1;
        info!("WiFi: connecting to '{}' (attempt {})", self.ssid, self.attempts);
        if let Err(e) = self.platform_connect() {
            warn!("WiFi: {}", e);
        }
    }

    // ── Platform: ESP-IDF ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_configure_station(&mut self) -> Result<(), ConnectivityError> {
        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: self.ssid.clone(),
            password: self.password.clone(),
            auth_method,
            ..Default::default()
        });
        self.wifi
            .set_configuration(&config)
            .and_then(|()| self.wifi.start())
            .map_err(|e| {
                warn!("WiFi: driver error {}", e);
                ConnectivityError::ConnectionFailed
            })
    }

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        self.wifi
            .connect()
            .map_err(|_| ConnectivityError::ConnectionFailed)
    }

    #[cfg(target_os = "espidf")]
    fn platform_start_ap(&mut self, ap_name: &str) -> Result<(), ConnectivityError> {
        let ssid = ap_name
            .try_into()
            .map_err(|()| ConnectivityError::InvalidSsid)?;
        let config = Configuration::AccessPoint(AccessPointConfiguration {
            ssid,
            auth_method: AuthMethod::None,
            channel: 1,
            ..Default::default()
        });
        self.wifi
            .set_configuration(&config)
            .and_then(|()| self.wifi.start())
            .map_err(|_| ConnectivityError::ConnectionFailed)
    }

    #[cfg(target_os = "espidf")]
    fn wifi_ip(&self) -> Option<Ipv4Addr> {
        if !self.wifi.is_connected().unwrap_or(false) {
            return None;
        }
        let info = self.wifi.sta_netif().get_ip_info().ok()?;
        (!info.ip.is_unspecified()).then_some(info.ip)
    }

    #[cfg(target_os = "espidf")]
    fn wifi_rssi(&self) -> Option<i8> {
        use esp_idf_svc::sys::{ESP_OK, esp_wifi_sta_get_ap_info, wifi_ap_record_t};
        let mut ap = wifi_ap_record_t::default();
        // SAFETY: `ap` outlives the call; the driver only writes into it.
        let ret = unsafe { esp_wifi_sta_get_ap_info(&mut ap) };
        (ret == ESP_OK as i32).then_some(ap.rssi)
    }

    /// Wired link state from the default Ethernet netif.
    #[cfg(target_os = "espidf")]
    fn ethernet(&self) -> (bool, Option<Ipv4Addr>, Option<String>) {
        use esp_idf_svc::sys::{
            ESP_OK, esp_netif_get_handle_from_ifkey, esp_netif_get_ip_info, esp_netif_get_mac,
            esp_netif_ip_info_t, esp_netif_is_netif_up,
        };

        // SAFETY: static NUL-terminated key; a null handle means no Ethernet.
        let handle = unsafe { esp_netif_get_handle_from_ifkey(c"ETH_DEF".as_ptr()) };
        if handle.is_null() {
            return (false, None, None);
        }
        // SAFETY: `handle` is a live netif owned by the ESP-IDF netif layer.
        let up = unsafe { esp_netif_is_netif_up(handle) };
        let mut info = esp_netif_ip_info_t::default();
        let ip = (unsafe { esp_netif_get_ip_info(handle, &mut info) } == ESP_OK as i32
            && info.ip.addr != 0)
            .then(|| Ipv4Addr::from(info.ip.addr.to_le_bytes()));
        let mut mac = [0u8; 6];
        let mac = (unsafe { esp_netif_get_mac(handle, mac.as_mut_ptr()) } == ESP_OK as i32)
            .then(|| crate::espnow::mac::MacAddr(mac).to_string());
        (up && ip.is_some(), ip, mac)
    }

    #[cfg(target_os = "espidf")]
    fn ethernet_up(&self) -> bool {
        self.ethernet().0
    }

    // ── Platform: simulation ──────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn platform_configure_station(&mut self) -> Result<(), ConnectivityError> {
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        self.sim.connect_calls += 1;
        if self.sim.failures_left > 0 {
            self.sim.failures_left -= 1;
            return Err(ConnectivityError::ConnectionFailed);
        }
        self.sim.wifi_up = true;
        info!("WiFi(sim): connected to '{}'", self.ssid);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start_ap(&mut self, ap_name: &str) -> Result<(), ConnectivityError> {
        info!("WiFi(sim): access point '{}' up", ap_name);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn wifi_ip(&self) -> Option<Ipv4Addr> {
        self.sim.wifi_up.then_some(SIM_WIFI_IP)
    }

    #[cfg(not(target_os = "espidf"))]
    fn wifi_rssi(&self) -> Option<i8> {
        self.sim.wifi_up.then_some(-58)
    }

    #[cfg(not(target_os = "espidf"))]
    fn ethernet(&self) -> (bool, Option<Ipv4Addr>, Option<String>) {
        match self.sim.ethernet_ip {
            Some(ip) => (true, Some(ip), Some("24:6F:28:00:00:01".into())),
            None => (false, None, None),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn ethernet_up(&self) -> bool {
        self.sim.ethernet_ip.is_some()
    }

    /// Simulation: plug or unplug the wired link.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_ethernet(&mut self, ip: Option<Ipv4Addr>) {
        self.sim.ethernet_ip = ip;
    }

    /// Simulation: drop the WiFi association.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_drop_wifi(&mut self) {
        self.sim.wifi_up = false;
        info!("WiFi(sim): association lost");
    }

    /// Simulation: fail the next `n` connection attempts.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_fail_next(&mut self, n: u32) {
        self.sim.failures_left = n;
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for NetworkManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkPort for NetworkManager {
    fn start_wifi_primary(&mut self, ssid: &str, password: &str) {
        self.start_station(WifiRole::Primary, ssid, password);
    }

    fn start_wifi_backup(&mut self, ssid: &str, password: &str) {
        self.start_station(WifiRole::Backup, ssid, password);
    }

    fn start_captive_portal(&mut self, ap_name: &str) {
        self.role = WifiRole::AccessPoint;
        match self.platform_start_ap(ap_name) {
            Ok(()) => info!("WiFi: captive portal '{}' started", ap_name),
            Err(e) => warn!("WiFi: captive portal failed: {}", e),
        }
    }

    fn poll(&mut self, now_ms: u64) {
        if !self.wants_station() || self.wifi_ip().is_some() {
            return;
        }
        let due = self
            .last_attempt
            .is_none_or(|t| now_ms.saturating_sub(t) >= WIFI_RETRY_INTERVAL_MS);
        if due {
            self.attempt_connect(now_ms);
        }
    }

    fn link(&self) -> LinkSnapshot {
        let wifi_ip = self.wifi_ip();
        let (ethernet_connected, ethernet_ip, ethernet_mac) = self.ethernet();
        LinkSnapshot {
            wifi_connected: wifi_ip.is_some(),
            ethernet_connected,
            wifi_ip,
            ethernet_ip,
            ethernet_mac,
            wifi_rssi: wifi_ip.and_then(|_| self.wifi_rssi()),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
