//! ESP-NOW radio adapter.
//!
//! Implements [`RadioDriver`]. Receive and send-status callbacks copy the
//! frame into the ingress channel with `try_send`; they never block. A
//! full inbox drops the frame and bumps the inbox's drop counter.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::espnow::EspNow` on the
//!   station interface. WiFi must be started first.
//! - **all other targets**: [`SimRadio`], an in-memory "air" shared with
//!   tests through [`SimAir`].

use log::info;

use crate::app::ports::RadioDriver;
use crate::error::RadioError;
use crate::espnow::mac::MacAddr;
use crate::protocol::ingress::{CountingInbox, Inbound};
use crate::protocol::message::Origin;

// ───────────────────────────────────────────────────────────────
// ESP-IDF driver
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct EspNowRadio {
    driver: Option<esp_idf_svc::espnow::EspNow<'static>>,
}

#[cfg(target_os = "espidf")]
impl EspNowRadio {
    pub fn new() -> Self {
        Self { driver: None }
    }

    fn driver(&self) -> Result<&esp_idf_svc::espnow::EspNow<'static>, RadioError> {
        self.driver.as_ref().ok_or(RadioError::NotInitialized)
    }
}

#[cfg(target_os = "espidf")]
impl Default for EspNowRadio {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl RadioDriver for EspNowRadio {
    fn init(&mut self, inbox: CountingInbox) -> Result<(), RadioError> {
        use esp_idf_svc::espnow::{EspNow, SendStatus};

        if self.driver.is_some() {
            return Ok(());
        }
        let driver = EspNow::take().map_err(|e| RadioError::Driver(e.code()))?;

        let rx_inbox = inbox.clone();
        driver
            .register_recv_cb(move |info, data| {
                let origin = Origin::EspNow {
                    peer: MacAddr(*info.src_addr),
                    rssi: info.rx_ctrl.rssi() as i8,
                };
                rx_inbox.submit_message(origin, data);
            })
            .map_err(|e| RadioError::Driver(e.code()))?;

        driver
            .register_send_cb(move |mac, status| {
                let Ok(peer) = <[u8; 6]>::try_from(mac) else {
                    return;
                };
                let delivered = matches!(status, SendStatus::SUCCESS);
                inbox.submit(Inbound::RadioSent {
                    peer: MacAddr(peer),
                    delivered,
                });
            })
            .map_err(|e| RadioError::Driver(e.code()))?;

        self.driver = Some(driver);
        info!("Radio: ESP-NOW driver up");
        Ok(())
    }

    fn deinit(&mut self) {
        if let Some(driver) = self.driver.take() {
            let _ = driver.unregister_recv_cb();
            let _ = driver.unregister_send_cb();
            info!("Radio: ESP-NOW driver down");
        }
    }

    fn register_peer(&mut self, mac: &MacAddr) -> Result<(), RadioError> {
        use esp_idf_svc::espnow::PeerInfo;
        use esp_idf_svc::sys::wifi_interface_t_WIFI_IF_STA;

        let driver = self.driver()?;
        if driver.peer_exists(mac.0).unwrap_or(false) {
            return Ok(());
        }
        let peer = PeerInfo {
            peer_addr: mac.0,
            channel: 0,
            ifidx: wifi_interface_t_WIFI_IF_STA,
            encrypt: false,
            ..Default::default()
        };
        driver
            .add_peer(peer)
            .map_err(|e| RadioError::Driver(e.code()))
    }

    fn unregister_peer(&mut self, mac: &MacAddr) -> Result<(), RadioError> {
        self.driver()?
            .del_peer(mac.0)
            .map_err(|e| RadioError::Driver(e.code()))
    }

    fn send(&mut self, mac: &MacAddr, data: &[u8]) -> Result<(), RadioError> {
        self.driver()?
            .send(mac.0, data)
            .map_err(|e| RadioError::Driver(e.code()))
    }

    fn local_mac(&self) -> MacAddr {
        use esp_idf_svc::sys::{esp_wifi_get_mac, wifi_interface_t_WIFI_IF_STA};
        let mut mac = [0u8; 6];
        // SAFETY: `mac` is the 6-byte buffer the call fills.
        unsafe { esp_wifi_get_mac(wifi_interface_t_WIFI_IF_STA, mac.as_mut_ptr()) };
        MacAddr(mac)
    }

    fn channel(&self) -> u8 {
        use esp_idf_svc::sys::{ESP_OK, esp_wifi_get_channel, wifi_second_chan_t};
        let mut primary = 0u8;
        let mut second: wifi_second_chan_t = 0;
        // SAFETY: both out-pointers are live locals.
        let ret = unsafe { esp_wifi_get_channel(&mut primary, &mut second) };
        if ret == ESP_OK as i32 { primary } else { 0 }
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub use sim::{SimAir, SimRadio};

#[cfg(not(target_os = "espidf"))]
mod sim {
    use std::sync::{Arc, Mutex, PoisonError};

    use super::*;

    const SIM_CHANNEL: u8 = 1;

    #[derive(Default)]
    struct AirState {
        inbox: Option<CountingInbox>,
        registered: Vec<MacAddr>,
        sent: Vec<(MacAddr, Vec<u8>)>,
        fail_sends: bool,
    }

    /// Test-side view of the simulated radio.
    #[derive(Clone, Default)]
    pub struct SimAir(Arc<Mutex<AirState>>);

    impl SimAir {
        fn with<R>(&self, f: impl FnOnce(&mut AirState) -> R) -> R {
            let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        }

        /// Frames handed to the driver, in order.
        pub fn sent(&self) -> Vec<(MacAddr, Vec<u8>)> {
            self.with(|a| a.sent.clone())
        }

        pub fn registered(&self) -> Vec<MacAddr> {
            self.with(|a| a.registered.clone())
        }

        pub fn set_fail_sends(&self, fail: bool) {
            self.with(|a| a.fail_sends = fail);
        }

        /// Inject a frame as if `peer` had transmitted it.
        pub fn deliver(&self, peer: MacAddr, rssi: i8, data: &[u8]) -> bool {
            self.with(|a| match &a.inbox {
                Some(inbox) => inbox.submit_message(Origin::EspNow { peer, rssi }, data),
                None => false,
            })
        }
    }

    pub struct SimRadio {
        mac: MacAddr,
        air: SimAir,
    }

    impl SimRadio {
        pub fn new(mac: MacAddr) -> Self {
            Self {
                mac,
                air: SimAir::default(),
            }
        }

        pub fn air(&self) -> SimAir {
            self.air.clone()
        }
    }

    impl RadioDriver for SimRadio {
        fn init(&mut self, inbox: CountingInbox) -> Result<(), RadioError> {
            self.air.with(|a| a.inbox = Some(inbox));
            info!("Radio(sim): up on channel {}", SIM_CHANNEL);
            Ok(())
        }

        fn deinit(&mut self) {
            self.air.with(|a| {
                a.inbox = None;
                a.registered.clear();
            });
            info!("Radio(sim): down");
        }

        fn register_peer(&mut self, mac: &MacAddr) -> Result<(), RadioError> {
            self.air.with(|a| {
                if a.inbox.is_none() {
                    return Err(RadioError::NotInitialized);
                }
                if !a.registered.contains(mac) {
                    a.registered.push(*mac);
                }
                Ok(())
            })
        }

        fn unregister_peer(&mut self, mac: &MacAddr) -> Result<(), RadioError> {
            self.air.with(|a| {
                let before = a.registered.len();
                a.registered.retain(|m| m != mac);
                if a.registered.len() == before {
                    Err(RadioError::Driver(-1))
                } else {
                    Ok(())
                }
            })
        }

        fn send(&mut self, mac: &MacAddr, data: &[u8]) -> Result<(), RadioError> {
            self.air.with(|a| {
                let Some(inbox) = a.inbox.clone() else {
                    return Err(RadioError::NotInitialized);
                };
                if a.fail_sends {
                    return Err(RadioError::Driver(-1));
                }
                a.sent.push((*mac, data.to_vec()));
                inbox.submit(Inbound::RadioSent {
                    peer: *mac,
                    delivered: true,
                });
                Ok(())
            })
        }

        fn local_mac(&self) -> MacAddr {
            self.mac
        }

        fn channel(&self) -> u8 {
            SIM_CHANNEL
        }
    }
}
