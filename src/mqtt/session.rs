//! MQTT session: connection upkeep and subscription bookkeeping.
//!
//! The client itself is a black box behind [`MqttClient`]. This layer
//! decides when to connect (only with a network link), re-subscribes
//! every remembered topic after each (re)connect, and publishes outbound
//! data. Inbound messages never pass through here; the client adapter
//! feeds them straight into the ingress channel.

use log::{debug, info, warn};

use super::topics::TopicRegistry;
use crate::app::ports::{MqttClient, MqttError, MqttSettings, StoragePort};
use crate::config::MqttBroker;
use crate::espnow::mac::MacAddr;

pub const DATA_TOPIC: &str = "junctionrelay/data";
pub const KEEPALIVE_SECS: u16 = 15;
pub const MAINTENANCE_INTERVAL_MS: u64 = 1_000;
pub const SUBSCRIBE_QOS: u8 = 1;

/// `ESP32Relay_<MAC without colons>`.
pub fn client_id(mac: &MacAddr) -> String {
    format!("ESP32Relay_{}", mac.compact())
}

/// Build client settings from the stored broker and credentials. Empty
/// credentials are omitted.
pub fn settings(broker: &MqttBroker, username: &str, password: &str, mac: &MacAddr) -> MqttSettings {
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_owned());
    MqttSettings {
        host: broker.host.clone(),
        port: broker.port,
        client_id: client_id(mac),
        username: non_empty(username),
        password: non_empty(password),
        keepalive_secs: KEEPALIVE_SECS,
    }
}

pub struct MqttSession<C> {
    client: C,
    topics: TopicRegistry,
    was_connected: bool,
    last_tick: Option<u64>,
    published: u32,
}

impl<C: MqttClient> MqttSession<C> {
    pub fn new(client: C, topics: TopicRegistry) -> Self {
        Self {
            client,
            topics,
            was_connected: false,
            last_tick: None,
            published: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    pub fn published(&self) -> u32 {
        self.published
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Maintenance, rate-limited to once per [`MAINTENANCE_INTERVAL_MS`].
    pub fn tick(&mut self, now_ms: u64, link_up: bool) {
        if let Some(last) = self.last_tick
            && now_ms.saturating_sub(last) < MAINTENANCE_INTERVAL_MS
        {
            return;
        }
        self.last_tick = Some(now_ms);

        if link_up && !self.client.is_connected() {
            debug!("MQTT: attempting connection");
            if let Err(e) = self.client.connect() {
                debug!("MQTT: connect failed: {}", e);
            }
        }

        let connected = self.client.is_connected();
        if connected && !self.was_connected {
            info!("MQTT: connected");
            self.resubscribe();
        } else if !connected && self.was_connected {
            warn!("MQTT: connection lost");
        }
        self.was_connected = connected;
    }

    fn resubscribe(&mut self) {
        if self.topics.is_empty() {
            return;
        }
        info!("MQTT: resubscribing {} topic(s)", self.topics.len());
        for topic in self.topics.iter() {
            if let Err(e) = self.client.subscribe(topic, SUBSCRIBE_QOS) {
                warn!("MQTT: resubscribe to {} failed: {}", topic, e);
            }
        }
    }

    /// Remember `topics` and subscribe now if connected. Returns how many
    /// topics were new. Topics the registry refuses are not subscribed.
    pub fn subscribe<S: StoragePort + ?Sized>(&mut self, topics: &[String], store: &mut S) -> usize {
        let mut added = 0;
        for topic in topics {
            match self.topics.add(topic) {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("MQTT: topic {} rejected: {}", topic, e);
                    continue;
                }
            }
            if self.client.is_connected() {
                match self.client.subscribe(topic, SUBSCRIBE_QOS) {
                    Ok(()) => info!("MQTT: subscribed to {}", topic),
                    Err(e) => warn!("MQTT: subscribe to {} failed: {}", topic, e),
                }
            } else {
                info!("MQTT: not connected, {} remembered for later", topic);
            }
        }
        if added > 0
            && let Err(e) = self.topics.save(store)
        {
            warn!("MQTT: failed to persist topics: {}", e);
        }
        added
    }

    pub fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        if !self.client.is_connected() {
            return Err(MqttError::NotConnected);
        }
        self.client.publish(topic, payload)?;
        self.published += 1;
        Ok(())
    }

    /// Publish on the shared data topic.
    pub fn publish_data(&mut self, payload: &[u8]) -> Result<(), MqttError> {
        self.publish(DATA_TOPIC, payload)
    }

    /// Drop every remembered topic. Storage is wiped separately.
    pub fn forget_topics(&mut self) {
        self.topics.forget();
    }
}
