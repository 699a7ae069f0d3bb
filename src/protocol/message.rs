//! Message envelope types that travel between tasks.

use core::fmt;

use serde_json::Value;

use super::codec::MAX_PAYLOAD_SIZE;
use crate::espnow::mac::MacAddr;

/// Which ingress channel a payload arrived on. Replies (e.g. the wipe
/// acknowledgement) go back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Serial,
    Http,
    WebSocket,
    Mqtt,
    EspNow { peer: MacAddr, rssi: i8 },
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Http => write!(f, "http"),
            Self::WebSocket => write!(f, "websocket"),
            Self::Mqtt => write!(f, "mqtt"),
            Self::EspNow { peer, .. } => write!(f, "espnow/{peer}"),
        }
    }
}

/// An owned, size-bounded copy of one decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// `None` when `bytes` is empty or larger than [`MAX_PAYLOAD_SIZE`].
    pub fn new(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > MAX_PAYLOAD_SIZE {
            return None;
        }
        Some(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The `type` discriminants the router understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Sensor,
    Config,
    MqttSubscriptionRequest,
    WipePreferences,
}

impl MessageKind {
    pub fn from_type(ty: &str) -> Option<Self> {
        match ty {
            "sensor" => Some(Self::Sensor),
            "config" => Some(Self::Config),
            "MQTT_Subscription_Request" => Some(Self::MqttSubscriptionRequest),
            "wipe_preferences" => Some(Self::WipePreferences),
            _ => None,
        }
    }
}

/// A sensor or config document in transit to its consumer task.
/// Created by the router, owned by the queue, consumed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub doc: Value,
    pub origin: Origin,
}
