//! WebSocket client adapter.
//!
//! Implements [`WsClient`]. Driver callbacks push [`WsEvent`]s into a
//! small bounded channel that the session drains from `poll_event`; a
//! full channel drops the event. Socket state is also kept in an atomic
//! flag, so `is_open` stays correct when an `Opened`/`Closed` event is
//! lost.
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::ws::client::EspWebSocketClient`.
//! - **other targets**: [`SimWs`] against a scripted [`SimWsServer`].

use std::sync::Arc;
#[cfg(target_os = "espidf")]
use std::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::info;

use crate::app::ports::{WsClient, WsError, WsEvent};

const EVENT_DEPTH: usize = 8;

type EventChannel = Channel<CriticalSectionRawMutex, WsEvent, EVENT_DEPTH>;

// ───────────────────────────────────────────────────────────────
// ESP-IDF client
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct EspWs {
    client: Option<esp_idf_svc::ws::client::EspWebSocketClient<'static>>,
    events: Arc<EventChannel>,
    /// Replaced on every `open`, so callbacks of a dropped client cannot
    /// touch the state of its successor.
    open: Arc<AtomicBool>,
}

#[cfg(target_os = "espidf")]
impl EspWs {
    pub fn new() -> Self {
        Self {
            client: None,
            events: Arc::new(Channel::new()),
            open: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[cfg(target_os = "espidf")]
impl Default for EspWs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl WsClient for EspWs {
    fn open(&mut self, url: &str) -> Result<(), WsError> {
        use core::time::Duration;
        use esp_idf_svc::ws::client::{
            EspWebSocketClient, EspWebSocketClientConfig, WebSocketEventType,
        };

        self.close();
        while self.events.try_receive().is_ok() {}

        let open = Arc::new(AtomicBool::new(false));
        self.open = open.clone();
        let events = self.events.clone();
        let config = EspWebSocketClientConfig::default();
        let client = EspWebSocketClient::new(url, &config, Duration::from_secs(10), move |ev| {
            let mapped = match ev {
                Ok(ev) => match ev.event_type {
                    WebSocketEventType::Connected => Some(WsEvent::Opened),
                    WebSocketEventType::Disconnected
                    | WebSocketEventType::Close(_)
                    | WebSocketEventType::Closed => Some(WsEvent::Closed),
                    WebSocketEventType::Text(text) => Some(WsEvent::Text(text.to_owned())),
                    _ => None,
                },
                Err(_) => Some(WsEvent::Closed),
            };
            match mapped {
                Some(WsEvent::Opened) => open.store(true, Ordering::Release),
                Some(WsEvent::Closed) => open.store(false, Ordering::Release),
                _ => {}
            }
            if let Some(event) = mapped
                && events.try_send(event).is_err()
            {
                log::warn!("WS: event channel full, event dropped");
            }
        })
        .map_err(|e| {
            log::warn!("WS: client start failed: {}", e);
            WsError::ConnectFailed
        })?;

        self.client = Some(client);
        Ok(())
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::Release);
        if self.client.take().is_some() {
            info!("WS: client closed");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn send_text(&mut self, text: &str) -> Result<(), WsError> {
        use esp_idf_svc::ws::FrameType;
        let client = self.client.as_mut().ok_or(WsError::NotConnected)?;
        if !client.is_connected() {
            return Err(WsError::NotConnected);
        }
        client
            .send(FrameType::Text(false), text.as_bytes())
            .map_err(|_| WsError::SendFailed)
    }

    fn poll_event(&mut self) -> Option<WsEvent> {
        self.events.try_receive().ok()
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub use sim::{SimWs, SimWsServer};

#[cfg(not(target_os = "espidf"))]
mod sim {
    use std::sync::{Mutex, PoisonError};

    use super::*;

    struct ServerState {
        accepting: bool,
        open_url: Option<String>,
        opened: Vec<String>,
        received: Vec<String>,
    }

    impl Default for ServerState {
        fn default() -> Self {
            Self {
                accepting: true,
                open_url: None,
                opened: Vec::new(),
                received: Vec::new(),
            }
        }
    }

    /// Backend side of the simulated socket. Accepts connections until
    /// told otherwise.
    #[derive(Clone)]
    pub struct SimWsServer {
        state: Arc<Mutex<ServerState>>,
        events: Arc<EventChannel>,
    }

    impl Default for SimWsServer {
        fn default() -> Self {
            Self {
                state: Arc::default(),
                events: Arc::new(Channel::new()),
            }
        }
    }

    impl SimWsServer {
        pub fn new() -> Self {
            Self::default()
        }

        fn with<R>(&self, f: impl FnOnce(&mut ServerState) -> R) -> R {
            let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        }

        pub fn set_accepting(&self, accepting: bool) {
            self.with(|s| s.accepting = accepting);
        }

        /// Every URL the device opened, in order.
        pub fn opened(&self) -> Vec<String> {
            self.with(|s| s.opened.clone())
        }

        /// Text frames the device sent.
        pub fn received(&self) -> Vec<String> {
            self.with(|s| s.received.clone())
        }

        /// `type` fields of the JSON frames the device sent.
        pub fn received_types(&self) -> Vec<String> {
            self.received()
                .iter()
                .filter_map(|t| serde_json::from_str::<serde_json::Value>(t).ok())
                .filter_map(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_owned))
                .collect()
        }

        /// Server-to-device text frame.
        pub fn push_text(&self, text: &str) -> bool {
            self.with(|s| s.open_url.is_some())
                && self.events.try_send(WsEvent::Text(text.to_owned())).is_ok()
        }

        /// Drop the connection from the server side. The `Closed` event is
        /// lost when the device has not drained its event channel.
        pub fn hang_up(&self) {
            if self.with(|s| s.open_url.take()).is_some() {
                let _ = self.events.try_send(WsEvent::Closed);
            }
        }

        pub fn client(&self) -> SimWs {
            SimWs {
                server: self.clone(),
            }
        }
    }

    pub struct SimWs {
        server: SimWsServer,
    }

    impl WsClient for SimWs {
        fn open(&mut self, url: &str) -> Result<(), WsError> {
            let accepted = self.server.with(|s| {
                s.opened.push(url.to_owned());
                if s.accepting {
                    s.open_url = Some(url.to_owned());
                }
                s.accepting
            });
            if accepted {
                info!("WS(sim): connected to {}", url);
                let _ = self.server.events.try_send(WsEvent::Opened);
                Ok(())
            } else {
                Err(WsError::ConnectFailed)
            }
        }

        fn close(&mut self) {
            self.server.with(|s| s.open_url = None);
            while self.server.events.try_receive().is_ok() {}
        }

        fn is_open(&self) -> bool {
            self.server.with(|s| s.open_url.is_some())
        }

        fn send_text(&mut self, text: &str) -> Result<(), WsError> {
            self.server.with(|s| {
                if s.open_url.is_none() {
                    return Err(WsError::NotConnected);
                }
                s.received.push(text.to_owned());
                Ok(())
            })
        }

        fn poll_event(&mut self) -> Option<WsEvent> {
            self.server.events.try_receive().ok()
        }
    }
}
