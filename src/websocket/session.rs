//! Backend WebSocket session.
//!
//! ```text
//!  Disconnected ──connect()──▶ Connecting ──Opened──▶ Connected
//!       ▲                          │                     │ welcome
//!       │ close / send failure /   │ 15 s timeout        ▼
//!       │ timeout                  ▼               WelcomeReceived
//!       └──────────────────── Disconnected              │ device-registration-ack
//!                                                       ▼
//!                                                   Registered ── heartbeat 30 s
//!                                                                └ health 60 s
//! ```
//!
//! The session is driven by [`WebSocketSession::poll`], called from the
//! orchestrator loop with the current time and link state. It never blocks
//! longer than one discovery scan. After the event queue is drained, the
//! state is checked against [`WsClient::is_open`], so a lost `Opened` or
//! `Closed` event cannot strand the session. Reconnects are bounded: up to
//! [`MAX_RECONNECT_ATTEMPTS`] tries every [`RECONNECT_INTERVAL_MS`], then a
//! [`RECONNECT_COOLDOWN_MS`] pause before the counter resets.

use core::net::Ipv4Addr;

use log::{debug, info, warn};
use serde_json::Value;

use super::discovery;
use super::messages::{self, DeviceIdentity, SessionFlags, Telemetry};
use crate::app::ports::{BackendHttp, LinkSnapshot, WsClient, WsEvent};
use crate::error::SessionError;

pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000;
pub const HEALTH_REPORT_INTERVAL_MS: u64 = 60_000;
pub const RECONNECT_INTERVAL_MS: u64 = 5_000;
pub const CONNECTION_TIMEOUT_MS: u64 = 15_000;
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;
pub const RECONNECT_COOLDOWN_MS: u64 = 30_000;
/// Consecutive failed attempts after which the cached backend is dropped.
pub const REDISCOVER_AFTER_FAILURES: u32 = 3;

const WELCOME_WAIT_LOG_MS: u64 = 3_000;
const ACK_WAIT_LOG_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    WelcomeReceived,
    Registered,
}

/// Work the session hands back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutput {
    /// A backend message that is not session traffic; route it.
    Forward(String),
    /// The backend asked for `espnow-status`.
    EspNowStatusRequested,
}

pub struct WebSocketSession<C, B> {
    client: C,
    http: B,
    identity: DeviceIdentity,
    port: u16,
    enabled: bool,
    state: SessionState,
    backend: Option<Ipv4Addr>,
    connection_start: Option<u64>,
    last_attempt: Option<u64>,
    reconnect_attempts: u32,
    consecutive_failures: u32,
    cooldown_start: Option<u64>,
    last_heartbeat: u64,
    last_health_report: u64,
    last_wait_log: u64,
    messages_sent: u32,
}

impl<C: WsClient, B: BackendHttp> WebSocketSession<C, B> {
    pub fn new(client: C, http: B, identity: DeviceIdentity, port: u16) -> Self {
        Self {
            client,
            http,
            identity,
            port,
            enabled: true,
            state: SessionState::Disconnected,
            backend: None,
            connection_start: None,
            last_attempt: None,
            reconnect_attempts: 0,
            consecutive_failures: 0,
            cooldown_start: None,
            last_heartbeat: 0,
            last_health_report: 0,
            last_wait_log: 0,
            messages_sent: 0,
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Socket open (handshake may still be in progress).
    pub fn is_connected(&self) -> bool {
        self.state >= SessionState::Connected
    }

    pub fn is_registered(&self) -> bool {
        self.state == SessionState::Registered
    }

    pub fn backend(&self) -> Option<Ipv4Addr> {
        self.backend
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn messages_sent(&self) -> u32 {
        self.messages_sent
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn http(&mut self) -> &mut B {
        &mut self.http
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Change the backend port. Takes effect on the next connect.
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    fn flags(&self) -> SessionFlags {
        SessionFlags {
            reconnect_attempts: self.reconnect_attempts,
            welcome_received: self.state >= SessionState::WelcomeReceived,
            registered: self.is_registered(),
        }
    }

    // ── Connection management ─────────────────────────────────

    /// Back to `Disconnected`; timers cleared.
    pub fn reset_connection_state(&mut self) {
        if self.state != SessionState::Disconnected {
            debug!("WS: state {:?} -> Disconnected", self.state);
        }
        self.state = SessionState::Disconnected;
        self.connection_start = None;
    }

    pub fn disconnect(&mut self) {
        if self.state != SessionState::Disconnected {
            self.client.close();
            self.reset_connection_state();
            info!("WS: disconnected");
        }
    }

    /// Connect immediately, bypassing the retry timer. Used when a link
    /// has just come up.
    pub fn nudge(&mut self, now_ms: u64, link: &LinkSnapshot) {
        if !self.enabled || self.state != SessionState::Disconnected {
            return;
        }
        self.reconnect_attempts = 0;
        self.cooldown_start = None;
        self.last_attempt = Some(now_ms);
        let _ = self.connect(now_ms, link);
    }

    /// Resolve the backend (discovering it if needed) and open the socket.
    pub fn connect(&mut self, now_ms: u64, link: &LinkSnapshot) -> Result<(), SessionError> {
        let Some(local) = link.active_ip() else {
            warn!("WS: cannot connect, no network");
            return Err(SessionError::NoNetwork);
        };

        let backend = match self.backend {
            Some(ip) => ip,
            None => match discovery::discover(&mut self.http, local, self.port) {
                Some(ip) => {
                    self.backend = Some(ip);
                    ip
                }
                None => {
                    self.record_failure();
                    return Err(SessionError::NoBackend);
                }
            },
        };

        if self.state != SessionState::Disconnected {
            self.client.close();
        }
        self.reset_connection_state();

        let url = self.connection_url(backend);
        info!("WS: connecting to {}", url);
        self.state = SessionState::Connecting;
        self.connection_start = Some(now_ms);

        self.client.open(&url).map_err(|e| {
            warn!("WS: failed to initiate connection: {}", e);
            self.reset_connection_state();
            self.record_failure();
            SessionError::from(e)
        })
    }

    pub fn connection_url(&self, backend: Ipv4Addr) -> String {
        format!(
            "ws://{}:{}/api/device-websocket/connect?mac={}&name={}",
            backend, self.port, self.identity.mac, self.identity.device_name
        )
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= REDISCOVER_AFTER_FAILURES && self.backend.is_some() {
            info!(
                "WS: {} consecutive failures, dropping cached backend",
                self.consecutive_failures
            );
            self.backend = None;
            self.consecutive_failures = 0;
        }
    }

    // ── Poll ──────────────────────────────────────────────────

    /// Drive the session. Returns any messages for the orchestrator.
    pub fn poll(&mut self, now_ms: u64, link: &LinkSnapshot, t: &Telemetry) -> Vec<SessionOutput> {
        let mut out = Vec::new();

        while let Some(event) = self.client.poll_event() {
            self.handle_event(event, now_ms, link, t, &mut out);
        }
        self.reconcile_socket(now_ms);

        if self.state == SessionState::Connecting
            && let Some(start) = self.connection_start
            && now_ms.saturating_sub(start) > CONNECTION_TIMEOUT_MS
        {
            warn!("WS: connection timeout, forcing reconnect");
            self.client.close();
            self.reset_connection_state();
            self.record_failure();
        }

        match self.state {
            SessionState::Registered => self.send_periodic(now_ms, link, t),
            SessionState::WelcomeReceived => {
                if now_ms.saturating_sub(self.last_wait_log) > ACK_WAIT_LOG_MS {
                    info!("WS: waiting for device registration acknowledgment");
                    self.last_wait_log = now_ms;
                }
            }
            SessionState::Connected => {
                if now_ms.saturating_sub(self.last_wait_log) > WELCOME_WAIT_LOG_MS {
                    info!("WS: connected, waiting for welcome message");
                    self.last_wait_log = now_ms;
                }
            }
            SessionState::Disconnected => self.maybe_reconnect(now_ms, link),
            SessionState::Connecting => {}
        }

        out
    }

    fn reconcile_socket(&mut self, now_ms: u64) {
        let open = self.client.is_open();
        if self.state >= SessionState::Connected && !open {
            warn!("WS: socket closed without close event");
            self.client.close();
            self.reset_connection_state();
        } else if self.state == SessionState::Connecting && open {
            warn!("WS: socket open without open event");
            self.on_opened(now_ms);
        }
    }

    fn maybe_reconnect(&mut self, now_ms: u64, link: &LinkSnapshot) {
        if !self.enabled || !link.any_up() {
            return;
        }

        if let Some(start) = self.cooldown_start {
            if now_ms.saturating_sub(start) < RECONNECT_COOLDOWN_MS {
                return;
            }
            info!("WS: cooldown over, resuming reconnects");
            self.cooldown_start = None;
            self.reconnect_attempts = 0;
        }

        let due = self
            .last_attempt
            .is_none_or(|t| now_ms.saturating_sub(t) >= RECONNECT_INTERVAL_MS);
        if !due {
            return;
        }

        if self.reconnect_attempts >= MAX_RECONNECT_ATTEMPTS {
            warn!(
                "WS: max reconnection attempts reached, waiting {}s before retry",
                RECONNECT_COOLDOWN_MS / 1000
            );
            self.cooldown_start = Some(now_ms);
            return;
        }

        self.reconnect_attempts += 1;
        self.last_attempt = Some(now_ms);
        info!(
            "WS: reconnection attempt {}/{}",
            self.reconnect_attempts, MAX_RECONNECT_ATTEMPTS
        );
        let _ = self.connect(now_ms, link);
    }

    fn send_periodic(&mut self, now_ms: u64, link: &LinkSnapshot, t: &Telemetry) {
        if now_ms.saturating_sub(self.last_heartbeat) >= HEARTBEAT_INTERVAL_MS {
            self.last_heartbeat = now_ms;
            let msg = messages::heartbeat(&self.identity, link, t);
            if self.send_json(&msg).is_ok() {
                debug!("WS: heartbeat sent");
            }
        }
        if self.is_registered()
            && now_ms.saturating_sub(self.last_health_report) >= HEALTH_REPORT_INTERVAL_MS
        {
            self.last_health_report = now_ms;
            self.send_health(link, t);
        }
    }

    fn send_health(&mut self, link: &LinkSnapshot, t: &Telemetry) {
        let msg = messages::health(&self.identity, link, t, self.flags());
        if self.send_json(&msg).is_ok() {
            debug!("WS: health report sent");
        }
    }

    // ── Inbound ───────────────────────────────────────────────

    fn handle_event(
        &mut self,
        event: WsEvent,
        now_ms: u64,
        link: &LinkSnapshot,
        t: &Telemetry,
        out: &mut Vec<SessionOutput>,
    ) {
        match event {
            WsEvent::Opened => {
                info!("WS: connection opened");
                self.on_opened(now_ms);
            }
            WsEvent::Closed => {
                info!("WS: connection closed");
                self.reset_connection_state();
            }
            WsEvent::Text(text) => self.handle_text(text, now_ms, link, t, out),
        }
    }

    fn on_opened(&mut self, now_ms: u64) {
        self.state = SessionState::Connected;
        self.connection_start = None;
        self.reconnect_attempts = 0;
        self.consecutive_failures = 0;
        self.last_wait_log = now_ms;
    }

    fn handle_text(
        &mut self,
        text: String,
        now_ms: u64,
        link: &LinkSnapshot,
        t: &Telemetry,
        out: &mut Vec<SessionOutput>,
    ) {
        if text == "ping" {
            if let Err(e) = self.send_text("pong") {
                debug!("WS: pong not sent: {}", e);
            }
            return;
        }

        let doc: Value = match serde_json::from_str(&text) {
            Ok(doc) => doc,
            Err(_) => {
                warn!("WS: JSON parse error, raw message dropped ({} bytes)", text.len());
                return;
            }
        };
        let Some(kind) = doc.get("type").and_then(Value::as_str) else {
            warn!("WS: message missing 'type' field");
            return;
        };

        match kind {
            "welcome" => self.on_welcome(&doc, now_ms, link),
            "device-registration-ack" => self.on_registration_ack(&doc),
            "health-request" => {
                if self.is_registered() {
                    info!("WS: health report requested by backend");
                    self.send_health(link, t);
                } else {
                    warn!("WS: health request ignored in state {:?}", self.state);
                }
            }
            "heartbeat-ack" | "health-ack" | "espnow-status-ack" | "config-ack" => {
                debug!("WS: {} received", kind);
            }
            "espnow-status-request" => {
                info!("WS: ESP-NOW status requested");
                out.push(SessionOutput::EspNowStatusRequested);
            }
            "error" => {
                let msg = doc.get("message").and_then(Value::as_str).unwrap_or("Unknown error");
                warn!("WS: backend error: {}", msg);
            }
            _ => out.push(SessionOutput::Forward(text)),
        }
    }

    fn on_welcome(&mut self, doc: &Value, now_ms: u64, link: &LinkSnapshot) {
        if !matches!(
            self.state,
            SessionState::Connected | SessionState::WelcomeReceived
        ) {
            warn!("WS: welcome ignored in state {:?}", self.state);
            return;
        }
        info!("WS: welcome received");
        if let Some(msg) = doc.get("message").and_then(Value::as_str) {
            info!("WS: server message: {}", msg);
        }
        self.state = SessionState::WelcomeReceived;
        self.last_heartbeat = now_ms;
        self.last_health_report = now_ms;
        self.last_wait_log = now_ms;

        let registration = messages::registration(&self.identity, link, now_ms);
        if self.send_json(&registration).is_ok() {
            info!("WS: device registration sent");
        }
    }

    fn on_registration_ack(&mut self, doc: &Value) {
        if self.state != SessionState::WelcomeReceived {
            warn!("WS: registration ack ignored in state {:?}", self.state);
            return;
        }
        if let Some(status) = doc.get("status").and_then(Value::as_str) {
            info!("WS: registration status: {}", status);
        }
        self.state = SessionState::Registered;
        info!("WS: device registered, starting heartbeat and health reports");
    }

    // ── Outbound ──────────────────────────────────────────────

    /// Send a JSON document. A client-side failure resets the session.
    pub fn send_json(&mut self, doc: &Value) -> Result<(), SessionError> {
        self.send_text(&doc.to_string())
    }

    pub fn send_text(&mut self, text: &str) -> Result<(), SessionError> {
        if !self.is_connected() {
            debug!("WS: cannot send, not connected");
            return Err(SessionError::NotConnected);
        }
        match self.client.send_text(text) {
            Ok(()) => {
                self.messages_sent += 1;
                Ok(())
            }
            Err(e) => {
                warn!("WS: send failed ({}), connection may be broken", e);
                self.reset_connection_state();
                Err(SessionError::SendFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{PostError, WsError};
    use crate::websocket::messages::test_identity;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeWs {
        opened: Vec<String>,
        sent: Vec<String>,
        events: VecDeque<WsEvent>,
        fail_send: bool,
        closes: u32,
        open: bool,
    }

    impl FakeWs {
        fn sent_types(&self) -> Vec<String> {
            self.sent
                .iter()
                .map(|s| {
                    serde_json::from_str::<Value>(s)
                        .ok()
                        .and_then(|v| v["type"].as_str().map(String::from))
                        .unwrap_or_else(|| s.clone())
                })
                .collect()
        }
    }

    impl WsClient for FakeWs {
        fn open(&mut self, url: &str) -> Result<(), WsError> {
            self.opened.push(url.to_owned());
            Ok(())
        }
        fn close(&mut self) {
            self.closes += 1;
            self.open = false;
        }
        fn is_open(&self) -> bool {
            self.open
        }
        fn send_text(&mut self, text: &str) -> Result<(), WsError> {
            if self.fail_send {
                return Err(WsError::SendFailed);
            }
            self.sent.push(text.to_owned());
            Ok(())
        }
        fn poll_event(&mut self) -> Option<WsEvent> {
            self.events.pop_front()
        }
    }

    struct FakeHttp {
        backend: Option<Ipv4Addr>,
        probes: u32,
    }

    impl BackendHttp for FakeHttp {
        fn probe(&mut self, ip: Ipv4Addr, _port: u16, _timeout_ms: u32) -> bool {
            self.probes += 1;
            Some(ip) == self.backend
        }
        fn post_data(&mut self, _ip: Ipv4Addr, _port: u16, _body: &[u8]) -> Result<(), PostError> {
            Ok(())
        }
    }

    type Session = WebSocketSession<FakeWs, FakeHttp>;

    fn link() -> LinkSnapshot {
        LinkSnapshot {
            wifi_connected: true,
            wifi_ip: Some(Ipv4Addr::new(192, 168, 1, 40)),
            ..Default::default()
        }
    }

    fn session() -> Session {
        WebSocketSession::new(
            FakeWs::default(),
            FakeHttp {
                backend: Some(Ipv4Addr::new(192, 168, 1, 2)),
                probes: 0,
            },
            test_identity(),
            7180,
        )
    }

    /// Queue a driver event; lifecycle events also move the socket flag.
    fn push(s: &mut Session, ev: WsEvent) {
        match ev {
            WsEvent::Opened => s.client.open = true,
            WsEvent::Closed => s.client.open = false,
            WsEvent::Text(_) => {}
        }
        s.client.events.push_back(ev);
    }

    fn text(s: &mut Session, t: &str) {
        push(s, WsEvent::Text(t.to_owned()));
    }

    fn registered(now: u64) -> Session {
        let mut s = session();
        let t = Telemetry::default();
        s.poll(now, &link(), &t);
        push(&mut s, WsEvent::Opened);
        text(&mut s, r#"{"type":"welcome"}"#);
        text(&mut s, r#"{"type":"device-registration-ack","status":"ok"}"#);
        s.poll(now, &link(), &t);
        assert_eq!(s.state(), SessionState::Registered);
        s
    }

    #[test]
    fn first_poll_discovers_and_connects() {
        let mut s = session();
        s.poll(0, &link(), &Telemetry::default());
        assert_eq!(s.state(), SessionState::Connecting);
        assert_eq!(s.backend(), Some(Ipv4Addr::new(192, 168, 1, 2)));
        assert_eq!(
            s.client.opened[0],
            "ws://192.168.1.2:7180/api/device-websocket/connect?mac=24:6F:28:AA:EE:FF&name=ESP32-S3_R0_EEFF"
        );
    }

    #[test]
    fn no_link_no_attempt() {
        let mut s = session();
        s.poll(0, &LinkSnapshot::default(), &Telemetry::default());
        assert_eq!(s.state(), SessionState::Disconnected);
        assert!(s.client.opened.is_empty());
    }

    #[test]
    fn handshake_sends_registration_after_welcome() {
        let mut s = session();
        let t = Telemetry::default();
        s.poll(0, &link(), &t);
        push(&mut s, WsEvent::Opened);
        s.poll(10, &link(), &t);
        assert_eq!(s.state(), SessionState::Connected);
        assert!(s.client.sent.is_empty());

        text(&mut s, r#"{"type":"welcome","message":"hi"}"#);
        s.poll(20, &link(), &t);
        assert_eq!(s.state(), SessionState::WelcomeReceived);
        assert_eq!(s.client.sent_types(), vec!["device-registration"]);
    }

    #[test]
    fn no_heartbeat_before_ack() {
        let mut s = session();
        let t = Telemetry::default();
        s.poll(0, &link(), &t);
        push(&mut s, WsEvent::Opened);
        s.poll(1, &link(), &t);
        s.poll(HEARTBEAT_INTERVAL_MS * 3, &link(), &t);
        assert_eq!(s.state(), SessionState::Connected);
        assert!(s.client.sent.is_empty());

        text(&mut s, r#"{"type":"welcome"}"#);
        s.poll(HEARTBEAT_INTERVAL_MS * 4, &link(), &t);
        s.poll(HEARTBEAT_INTERVAL_MS * 6, &link(), &t);
        assert_eq!(s.client.sent_types(), vec!["device-registration"]);
    }

    #[test]
    fn registered_session_sends_heartbeat_and_health() {
        let mut s = registered(1_000);
        let t = Telemetry::default();
        s.poll(1_000 + HEARTBEAT_INTERVAL_MS, &link(), &t);
        s.poll(1_000 + HEALTH_REPORT_INTERVAL_MS, &link(), &t);
        assert_eq!(
            s.client.sent_types(),
            vec!["device-registration", "heartbeat", "heartbeat", "health"]
        );
    }

    #[test]
    fn ack_outside_handshake_is_ignored() {
        let mut s = session();
        let t = Telemetry::default();
        s.poll(0, &link(), &t);
        push(&mut s, WsEvent::Opened);
        text(&mut s, r#"{"type":"device-registration-ack"}"#);
        s.poll(1, &link(), &t);
        assert_eq!(s.state(), SessionState::Connected);
    }

    #[test]
    fn ping_is_answered_with_pong() {
        let mut s = registered(0);
        text(&mut s, "ping");
        s.poll(1, &link(), &Telemetry::default());
        assert_eq!(s.client.sent.last().map(String::as_str), Some("pong"));
    }

    #[test]
    fn unknown_types_are_forwarded_and_status_requests_surface() {
        let mut s = registered(0);
        text(&mut s, r#"{"type":"sensor","v":1}"#);
        text(&mut s, r#"{"type":"espnow-status-request"}"#);
        text(&mut s, r#"{"type":"heartbeat-ack"}"#);
        text(&mut s, "garbage");
        let out = s.poll(1, &link(), &Telemetry::default());
        assert_eq!(
            out,
            vec![
                SessionOutput::Forward(r#"{"type":"sensor","v":1}"#.into()),
                SessionOutput::EspNowStatusRequested,
            ]
        );
    }

    #[test]
    fn health_request_is_answered() {
        let mut s = registered(0);
        text(&mut s, r#"{"type":"health-request"}"#);
        s.poll(1, &link(), &Telemetry::default());
        assert_eq!(s.client.sent_types().last().map(String::as_str), Some("health"));
    }

    #[test]
    fn close_resets_to_disconnected() {
        let mut s = registered(0);
        push(&mut s, WsEvent::Closed);
        s.poll(1, &link(), &Telemetry::default());
        assert_eq!(s.state(), SessionState::Disconnected);
    }

    #[test]
    fn lost_close_event_still_resets_and_reconnects() {
        let mut s = registered(0);
        // Socket gone, but the driver's close event never arrived.
        s.client.open = false;
        s.poll(1, &link(), &Telemetry::default());
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(s.client.closes, 1);

        s.poll(RECONNECT_INTERVAL_MS, &link(), &Telemetry::default());
        assert_eq!(s.state(), SessionState::Connecting);
        assert_eq!(s.client.opened.len(), 2);
    }

    #[test]
    fn lost_open_event_still_completes_connect() {
        let mut s = session();
        let t = Telemetry::default();
        s.poll(0, &link(), &t);
        assert_eq!(s.state(), SessionState::Connecting);

        s.client.open = true;
        s.poll(10, &link(), &t);
        assert_eq!(s.state(), SessionState::Connected);
    }

    #[test]
    fn health_request_before_registration_is_ignored() {
        let mut s = session();
        let t = Telemetry::default();
        s.poll(0, &link(), &t);
        push(&mut s, WsEvent::Opened);
        text(&mut s, r#"{"type":"health-request"}"#);
        s.poll(1, &link(), &t);
        assert_eq!(s.state(), SessionState::Connected);
        assert!(s.client.sent.is_empty());

        text(&mut s, r#"{"type":"welcome"}"#);
        text(&mut s, r#"{"type":"health-request"}"#);
        s.poll(2, &link(), &t);
        assert_eq!(s.client.sent_types(), vec!["device-registration"]);
    }

    #[test]
    fn send_failure_resets_session() {
        let mut s = registered(0);
        s.client.fail_send = true;
        assert_eq!(
            s.send_json(&serde_json::json!({"type": "x"})),
            Err(SessionError::SendFailed)
        );
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(
            s.send_json(&serde_json::json!({"type": "x"})),
            Err(SessionError::NotConnected)
        );
    }

    #[test]
    fn connect_timeout_forces_retry() {
        let mut s = session();
        let t = Telemetry::default();
        s.poll(0, &link(), &t);
        assert_eq!(s.state(), SessionState::Connecting);
        s.poll(CONNECTION_TIMEOUT_MS, &link(), &t);
        assert_eq!(s.state(), SessionState::Connecting);
        s.poll(CONNECTION_TIMEOUT_MS + 1, &link(), &t);
        assert_eq!(s.client.closes, 1);
        assert_eq!(s.client.opened.len(), 2);
        assert_eq!(s.state(), SessionState::Connecting);
    }

    #[test]
    fn bounded_retries_then_cooldown() {
        let mut s = WebSocketSession::new(
            FakeWs::default(),
            FakeHttp {
                backend: None,
                probes: 0,
            },
            test_identity(),
            7180,
        );
        let t = Telemetry::default();
        let mut now = 0;
        for _ in 0..MAX_RECONNECT_ATTEMPTS {
            s.poll(now, &link(), &t);
            now += RECONNECT_INTERVAL_MS;
        }
        assert_eq!(s.reconnect_attempts(), MAX_RECONNECT_ATTEMPTS);
        let probes = s.http.probes;

        s.poll(now, &link(), &t);
        s.poll(now + RECONNECT_COOLDOWN_MS - 1, &link(), &t);
        assert_eq!(s.http.probes, probes);

        s.poll(now + RECONNECT_COOLDOWN_MS, &link(), &t);
        assert_eq!(s.reconnect_attempts(), 1);
        assert!(s.http.probes > probes);
    }

    #[test]
    fn cached_backend_dropped_after_repeated_failures() {
        let mut s = session();
        let t = Telemetry::default();
        let mut now = 0;
        for _ in 0..REDISCOVER_AFTER_FAILURES {
            s.poll(now, &link(), &t);
            now += CONNECTION_TIMEOUT_MS + 1;
            s.poll(now, &link(), &t);
        }
        // Third timeout cleared the cache; the same poll rediscovered it.
        assert_eq!(s.http.probes, 4);
        assert_eq!(s.backend(), Some(Ipv4Addr::new(192, 168, 1, 2)));
    }
}
