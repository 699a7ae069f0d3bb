//! Message router: parses one decoded payload and decides where it goes.
//!
//! ```text
//!  payload ─▶ parse ─▶ destination? ──(gateway)──▶ Forward ─▶ radio
//!                          │
//!                          ▼
//!                        type ─┬─ sensor ─────────────▶ sensor queue
//!                              ├─ config ─────────────▶ config queue
//!                              ├─ MQTT_Subscription_Request ─▶ Subscribe
//!                              └─ wipe_preferences ─────────▶ Wipe
//! ```
//!
//! The router owns no transport. Actions that need other collaborators
//! (subscribing, wiping) are returned to the orchestrator as a `Routed`
//! value. Unparsable or untyped payloads are dropped and counted; the wire
//! is noisy and nothing here may fail the caller.

use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

use super::message::{MessageKind, Origin, QueueItem};
use super::queue::{ConfigQueue, SensorQueue};
use crate::error::ForwardError;
use crate::espnow::mac::MacAddr;
use crate::throttle::LogThrottle;

/// Field naming a gateway peer.
pub const DESTINATION_FIELD: &str = "destination";

/// Something that can relay a document to a named peer.
pub trait Forward {
    /// Relay `doc` to `destination`. The destination field is removed
    /// before the document leaves the node.
    fn forward(&mut self, destination: &str, doc: Value) -> Result<MacAddr, ForwardError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Unparsable,
    MissingType,
    UnknownType,
    QueueFull(MessageKind),
    ForwardFailed(ForwardError),
}

/// Outcome of routing one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Queued(MessageKind),
    Forwarded(MacAddr),
    /// Topics the MQTT session should subscribe to.
    Subscribe(Vec<String>),
    Wipe,
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterStats {
    pub routed: u32,
    pub forwarded: u32,
    pub forward_failed: u32,
    pub unparsable: u32,
    pub missing_type: u32,
    pub unknown_type: u32,
    pub queue_full: u32,
}

pub struct MessageRouter {
    sensor: Arc<SensorQueue>,
    config: Arc<ConfigQueue>,
    stats: RouterStats,
    throttle: LogThrottle,
}

impl MessageRouter {
    pub fn new(sensor: Arc<SensorQueue>, config: Arc<ConfigQueue>) -> Self {
        Self {
            sensor,
            config,
            stats: RouterStats::default(),
            throttle: LogThrottle::new(),
        }
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    pub fn sensor_queue(&self) -> &Arc<SensorQueue> {
        &self.sensor
    }

    pub fn config_queue(&self) -> &Arc<ConfigQueue> {
        &self.config
    }

    /// Parse and dispatch one payload. `forwarder` is only supplied while
    /// the node acts as a gateway.
    pub fn route(
        &mut self,
        payload: &[u8],
        origin: Origin,
        forwarder: Option<&mut dyn Forward>,
    ) -> Routed {
        let Ok(doc) = serde_json::from_slice::<Value>(payload) else {
            self.stats.unparsable += 1;
            if self.throttle.allow() {
                warn!("Router: unparsable payload ({} bytes) from {}", payload.len(), origin);
            }
            return Routed::Dropped(DropReason::Unparsable);
        };
        self.route_value(doc, origin, forwarder)
    }

    /// Dispatch an already-parsed document.
    pub fn route_value(
        &mut self,
        doc: Value,
        origin: Origin,
        forwarder: Option<&mut dyn Forward>,
    ) -> Routed {
        if let Some(fwd) = forwarder
            && let Some(dest) = destination_of(&doc)
        {
            let dest = dest.to_owned();
            return match fwd.forward(&dest, doc) {
                Ok(mac) => {
                    self.stats.forwarded += 1;
                    debug!("Router: forwarded message from {} to {}", origin, mac);
                    Routed::Forwarded(mac)
                }
                Err(e) => {
                    self.stats.forward_failed += 1;
                    warn!("Gateway: forward to {} failed: {}", dest, e);
                    Routed::Dropped(DropReason::ForwardFailed(e))
                }
            };
        }

        let Some(ty) = doc.get("type").and_then(Value::as_str) else {
            self.stats.missing_type += 1;
            if self.throttle.allow() {
                warn!("Router: message from {} has no type", origin);
            }
            return Routed::Dropped(DropReason::MissingType);
        };

        let Some(kind) = MessageKind::from_type(ty) else {
            self.stats.unknown_type += 1;
            if self.throttle.allow() {
                warn!("Router: unknown message type '{}' from {}", ty, origin);
            }
            return Routed::Dropped(DropReason::UnknownType);
        };

        match kind {
            MessageKind::Sensor | MessageKind::Config => self.enqueue(kind, doc, origin),
            MessageKind::MqttSubscriptionRequest => {
                self.stats.routed += 1;
                Routed::Subscribe(subscriptions_of(&doc))
            }
            MessageKind::WipePreferences => {
                self.stats.routed += 1;
                Routed::Wipe
            }
        }
    }

    fn enqueue(&mut self, kind: MessageKind, doc: Value, origin: Origin) -> Routed {
        let item = QueueItem { doc, origin };
        let (queue_name, pushed) = match kind {
            MessageKind::Config => (self.config.name(), self.config.try_push(item)),
            _ => (self.sensor.name(), self.sensor.try_push(item)),
        };

        if pushed.is_ok() {
            self.stats.routed += 1;
            Routed::Queued(kind)
        } else {
            self.stats.queue_full += 1;
            if self.throttle.allow() {
                warn!("Queue[{}]: full, dropping message from {}", queue_name, origin);
            }
            Routed::Dropped(DropReason::QueueFull(kind))
        }
    }
}

/// A non-empty string `destination`, if present.
pub fn destination_of(doc: &Value) -> Option<&str> {
    doc.get(DESTINATION_FIELD)
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
}

fn subscriptions_of(doc: &Value) -> Vec<String> {
    doc.get("subscriptions")
        .and_then(Value::as_array)
        .map(|topics| {
            topics
                .iter()
                .filter_map(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
