//! ESP-NOW peer table, message history and send primitives.
//!
//! ```text
//!  radio rx callback ──▶ Inbox ──▶ Orchestrator ──▶ on_receive() ──▶ peer table
//!                                                        │         └▶ history ring
//!                                                        ▼
//!                                                  MessageRouter
//! ```
//!
//! The manager is owned by the orchestrator task; callbacks never touch
//! it directly. Peers unheard-from for [`PEER_TIMEOUT_MS`] are evicted on
//! every read of the table and by the periodic cleanup pass.

use heapless::{Deque, Vec as HVec};
use log::{debug, info, warn};
use serde_json::{Value, json};

use super::mac::MacAddr;
use crate::app::ports::RadioDriver;
use crate::error::RadioError;
use crate::protocol::ingress::{CountingInbox, Inbox};

pub const MAX_PEERS: usize = 20;
pub const MAX_MESSAGE_HISTORY: usize = 50;
pub const PEER_TIMEOUT_MS: u64 = 30_000;
/// Largest payload one radio frame carries.
pub const MAX_RADIO_PAYLOAD: usize = 250;

const RECENT_MESSAGES: usize = 5;
const HISTORY_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EspNowPeer {
    pub mac: MacAddr,
    pub name: String,
    pub is_active: bool,
    pub last_seen: u64,
    pub rssi: i8,
}

impl EspNowPeer {
    fn to_json(&self) -> Value {
        json!({
            "mac": self.mac.to_string(),
            "name": self.name,
            "active": self.is_active,
            "lastSeen": self.last_seen,
            "rssi": self.rssi,
        })
    }
}

/// One received frame, kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub sender: MacAddr,
    pub data: String,
    pub timestamp: u64,
    pub rssi: i8,
}

/// Monotonic counters; reset only by a full wipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EspNowStats {
    pub messages_sent: u32,
    pub messages_received: u32,
    pub send_errors: u32,
    /// Includes frames and send reports the full inbox refused.
    pub receive_errors: u32,
}

pub struct EspNowPeerManager<R> {
    radio: R,
    inbox: CountingInbox,
    initialized: bool,
    receive_mode: bool,
    send_mode: bool,
    broadcast_registered: bool,
    peers: HVec<EspNowPeer, MAX_PEERS>,
    history: Deque<HistoryEntry, MAX_MESSAGE_HISTORY>,
    stats: EspNowStats,
}

impl<R: RadioDriver> EspNowPeerManager<R> {
    pub fn new(radio: R, inbox: Inbox) -> Self {
        Self {
            radio,
            inbox: CountingInbox::new(inbox),
            initialized: false,
            receive_mode: true,
            send_mode: true,
            broadcast_registered: false,
            peers: HVec::new(),
            history: Deque::new(),
            stats: EspNowStats::default(),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Start the radio. Calling again after success is a no-op.
    pub fn begin(&mut self) -> Result<(), RadioError> {
        if self.initialized {
            debug!("ESP-NOW: already initialized");
            return Ok(());
        }
        self.radio.init(self.inbox.clone()).inspect_err(|e| {
            warn!("ESP-NOW: init failed: {}", e);
        })?;
        self.initialized = true;
        info!(
            "ESP-NOW: initialized, local MAC {} channel {}",
            self.radio.local_mac(),
            self.radio.channel()
        );
        Ok(())
    }

    pub fn end(&mut self) {
        if !self.initialized {
            return;
        }
        self.clear_peers();
        self.radio.deinit();
        self.initialized = false;
        self.broadcast_registered = false;
        info!("ESP-NOW: shut down");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn set_receive_mode(&mut self, on: bool) {
        self.receive_mode = on;
    }

    pub fn set_send_mode(&mut self, on: bool) {
        self.send_mode = on;
    }

    pub fn receive_mode(&self) -> bool {
        self.receive_mode
    }

    pub fn send_mode(&self) -> bool {
        self.send_mode
    }

    pub fn local_mac(&self) -> MacAddr {
        self.radio.local_mac()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    // ── Peer table ────────────────────────────────────────────

    /// Register `mac`, or refresh it if already known. When the table is
    /// full, stale peers are evicted first.
    pub fn add_peer(&mut self, mac: MacAddr, name: &str, now_ms: u64) -> Result<(), RadioError> {
        if !self.initialized {
            return Err(RadioError::NotInitialized);
        }
        self.add_peer_internal(mac, name, now_ms)
    }

    pub fn add_peer_str(&mut self, mac: &str, name: &str, now_ms: u64) -> Result<(), RadioError> {
        let mac: MacAddr = mac.parse().inspect_err(|_| {
            warn!("ESP-NOW: invalid MAC address format: {}", mac);
        })?;
        self.add_peer(mac, name, now_ms)
    }

    fn add_peer_internal(&mut self, mac: MacAddr, name: &str, now_ms: u64) -> Result<(), RadioError> {
        if let Some(peer) = self.peers.iter_mut().find(|p| p.mac == mac) {
            peer.is_active = true;
            peer.last_seen = now_ms;
            if !name.is_empty() {
                peer.name = name.to_owned();
            }
            return Ok(());
        }

        if self.peers.is_full() {
            warn!("ESP-NOW: maximum peers ({}) reached, evicting stale", MAX_PEERS);
            self.cleanup_inactive(now_ms);
            if self.peers.is_full() {
                return Err(RadioError::PeerTableFull);
            }
        }

        self.radio.register_peer(&mac).inspect_err(|e| {
            warn!("ESP-NOW: driver refused peer {}: {}", mac, e);
        })?;

        let peer = EspNowPeer {
            mac,
            name: name.to_owned(),
            is_active: true,
            last_seen: now_ms,
            rssi: 0,
        };
        if self.peers.push(peer).is_err() {
            let _ = self.radio.unregister_peer(&mac);
            return Err(RadioError::PeerTableFull);
        }
        info!("ESP-NOW: added peer {} ({})", mac, name);
        Ok(())
    }

    pub fn remove_peer(&mut self, mac: &MacAddr) -> Result<(), RadioError> {
        if !self.initialized {
            return Err(RadioError::NotInitialized);
        }
        let idx = self
            .peers
            .iter()
            .position(|p| p.mac == *mac)
            .ok_or(RadioError::PeerNotFound)?;
        self.radio.unregister_peer(mac)?;
        let peer = self.peers.swap_remove(idx);
        info!("ESP-NOW: removed peer {} ({})", peer.mac, peer.name);
        Ok(())
    }

    pub fn remove_peer_str(&mut self, mac: &str) -> Result<(), RadioError> {
        let mac: MacAddr = mac.parse()?;
        self.remove_peer(&mac)
    }

    pub fn clear_peers(&mut self) {
        for peer in &self.peers {
            let _ = self.radio.unregister_peer(&peer.mac);
        }
        self.peers.clear();
        info!("ESP-NOW: cleared all peers");
    }

    pub fn has_peer(&self, mac: &MacAddr) -> bool {
        self.peers.iter().any(|p| p.mac == *mac)
    }

    pub fn peer(&self, mac: &MacAddr) -> Option<&EspNowPeer> {
        self.peers.iter().find(|p| p.mac == *mac)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Live peers. Evicts stale entries first.
    pub fn peers(&mut self, now_ms: u64) -> &[EspNowPeer] {
        self.cleanup_inactive(now_ms);
        &self.peers
    }

    /// Drop peers silent for longer than [`PEER_TIMEOUT_MS`]. Returns how
    /// many were evicted.
    pub fn cleanup_inactive(&mut self, now_ms: u64) -> usize {
        let before = self.peers.len();
        let radio = &mut self.radio;
        self.peers.retain(|p| {
            let stale = now_ms.saturating_sub(p.last_seen) > PEER_TIMEOUT_MS;
            if stale {
                let _ = radio.unregister_peer(&p.mac);
                info!("ESP-NOW: removed inactive peer {} ({})", p.mac, p.name);
            }
            !stale
        });
        before - self.peers.len()
    }

    // ── Send path ─────────────────────────────────────────────

    pub fn send(&mut self, mac: &MacAddr, data: &[u8]) -> Result<(), RadioError> {
        if !self.initialized {
            return Err(RadioError::NotInitialized);
        }
        if !self.send_mode {
            return Err(RadioError::SendDisabled);
        }
        if data.len() > MAX_RADIO_PAYLOAD {
            self.stats.send_errors += 1;
            warn!(
                "ESP-NOW: message too long ({} bytes, max {})",
                data.len(),
                MAX_RADIO_PAYLOAD
            );
            return Err(RadioError::PayloadTooLarge(data.len()));
        }
        if !mac.is_broadcast() && !self.has_peer(mac) {
            return Err(RadioError::UnknownPeer);
        }
        self.radio.send(mac, data).inspect_err(|e| {
            self.stats.send_errors += 1;
            warn!("ESP-NOW: send to {} failed: {}", mac, e);
        })
    }

    pub fn send_str(&mut self, mac: &str, data: &[u8]) -> Result<(), RadioError> {
        let mac: MacAddr = mac.parse()?;
        self.send(&mac, data)
    }

    pub fn send_json(&mut self, mac: &MacAddr, doc: &Value) -> Result<(), RadioError> {
        let text = doc.to_string();
        self.send(mac, text.as_bytes())
    }

    /// Send to the broadcast address, registering it with the driver on
    /// first use.
    pub fn broadcast(&mut self, data: &[u8]) -> Result<(), RadioError> {
        if !self.initialized {
            return Err(RadioError::NotInitialized);
        }
        if !self.broadcast_registered {
            self.radio.register_peer(&MacAddr::BROADCAST)?;
            self.broadcast_registered = true;
        }
        self.send(&MacAddr::BROADCAST, data)
    }

    pub fn broadcast_json(&mut self, doc: &Value) -> Result<(), RadioError> {
        let text = doc.to_string();
        self.broadcast(text.as_bytes())
    }

    // ── Callbacks (delivered through the ingress channel) ─────

    /// Account for one received frame. Returns `false` when receive mode
    /// is off and the frame must be ignored.
    pub fn on_receive(&mut self, mac: MacAddr, data: &[u8], rssi: i8, now_ms: u64) -> bool {
        if !self.receive_mode {
            return false;
        }
        self.stats.messages_received += 1;
        self.update_peer_activity(mac, rssi, now_ms);
        self.push_history(HistoryEntry {
            sender: mac,
            data: String::from_utf8_lossy(data).into_owned(),
            timestamp: now_ms,
            rssi,
        });
        true
    }

    pub fn on_send_status(&mut self, mac: MacAddr, delivered: bool) {
        if delivered {
            self.stats.messages_sent += 1;
        } else {
            self.stats.send_errors += 1;
            warn!("ESP-NOW: delivery to {} failed", mac);
        }
    }

    fn update_peer_activity(&mut self, mac: MacAddr, rssi: i8, now_ms: u64) {
        if let Some(peer) = self.peers.iter_mut().find(|p| p.mac == mac) {
            peer.last_seen = now_ms;
            peer.is_active = true;
            if rssi != 0 {
                peer.rssi = rssi;
            }
            return;
        }

        let text = mac.to_string();
        let name = format!("Unknown_{}", &text[text.len() - 5..]);
        match self.add_peer_internal(mac, &name, now_ms) {
            Ok(()) => {
                if rssi != 0
                    && let Some(peer) = self.peers.iter_mut().find(|p| p.mac == mac)
                {
                    peer.rssi = rssi;
                }
            }
            Err(e) => {
                self.stats.receive_errors += 1;
                warn!("ESP-NOW: could not register sender {}: {}", mac, e);
            }
        }
    }

    fn push_history(&mut self, entry: HistoryEntry) {
        if self.history.is_full() {
            self.history.pop_front();
        }
        let _ = self.history.push_back(entry);
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn stats(&self) -> EspNowStats {
        EspNowStats {
            receive_errors: self.stats.receive_errors + self.inbox.dropped(),
            ..self.stats
        }
    }

    pub fn reset_statistics(&mut self) {
        self.stats = EspNowStats::default();
        self.inbox.reset_dropped();
        info!("ESP-NOW: statistics reset");
    }

    // ── JSON views ────────────────────────────────────────────

    pub fn peers_json(&mut self, now_ms: u64) -> Value {
        let peers: Vec<Value> = self.peers(now_ms).iter().map(EspNowPeer::to_json).collect();
        json!({
            "peers": peers,
            "count": self.peers.len(),
            "maxPeers": MAX_PEERS,
            "timestamp": now_ms,
        })
    }

    pub fn statistics_json(&self) -> Value {
        let stats = self.stats();
        json!({
            "initialized": self.initialized,
            "receiveMode": self.receive_mode,
            "sendMode": self.send_mode,
            "peerCount": self.peers.len(),
            "maxPeers": MAX_PEERS,
            "messageHistoryCount": self.history.len(),
            "maxMessageHistory": MAX_MESSAGE_HISTORY,
            "statistics": {
                "messagesSent": stats.messages_sent,
                "messagesReceived": stats.messages_received,
                "sendErrors": stats.send_errors,
                "receiveErrors": stats.receive_errors,
                "inboxDrops": self.inbox.dropped(),
            },
            "network": {
                "localMac": self.radio.local_mac().to_string(),
                "channel": self.radio.channel(),
                "wifiMode": "STA",
            },
        })
    }

    pub fn status_json(&self) -> Value {
        let peers: Vec<Value> = self.peers.iter().map(EspNowPeer::to_json).collect();
        let skip = self.history.len().saturating_sub(RECENT_MESSAGES);
        let recent: Vec<Value> = self
            .history
            .iter()
            .skip(skip)
            .map(|m| {
                let preview: String = m.data.chars().take(HISTORY_PREVIEW_CHARS).collect();
                json!({
                    "from": m.sender.to_string(),
                    "data": preview,
                    "timestamp": m.timestamp,
                    "rssi": m.rssi,
                })
            })
            .collect();

        json!({
            "status": if self.initialized { "active" } else { "inactive" },
            "localMac": self.radio.local_mac().to_string(),
            "channel": self.radio.channel(),
            "receiveMode": self.receive_mode,
            "sendMode": self.send_mode,
            "peers": peers,
            "recentMessages": recent,
        })
    }
}
