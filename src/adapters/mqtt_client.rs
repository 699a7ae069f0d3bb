//! MQTT client adapter.
//!
//! Implements [`MqttClient`]. Messages arriving on subscribed topics go
//! through an [`IngressPort`] tagged [`Origin::Mqtt`], so they share the
//! framing rules of every other byte channel.
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::mqtt::client::EspMqttClient`.
//!   The driver reconnects on its own; `connect` only reports whether the
//!   session is up.
//! - **other targets**: [`SimMqtt`] against an in-memory [`SimBroker`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::info;

use crate::app::ports::{MqttClient, MqttError, MqttSettings};
use crate::protocol::ingress::{Inbox, IngressPort};
use crate::protocol::message::Origin;

// ───────────────────────────────────────────────────────────────
// ESP-IDF client
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct EspMqtt {
    client: esp_idf_svc::mqtt::client::EspMqttClient<'static>,
    connected: Arc<AtomicBool>,
}

#[cfg(target_os = "espidf")]
impl EspMqtt {
    /// Start the client. It connects in the background.
    pub fn start(settings: &MqttSettings, inbox: Inbox) -> Result<Self, MqttError> {
        use core::time::Duration;
        use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration};

        let connected = Arc::new(AtomicBool::new(false));
        let flag = connected.clone();
        let mut port = IngressPort::new(Origin::Mqtt, inbox);

        let conf = MqttClientConfiguration {
            client_id: Some(&settings.client_id),
            username: settings.username.as_deref(),
            password: settings.password.as_deref(),
            keep_alive_interval: Some(Duration::from_secs(settings.keepalive_secs.into())),
            ..Default::default()
        };

        let client = EspMqttClient::new_cb(&settings.url(), &conf, move |event| {
            match event.payload() {
                EventPayload::Connected(_) => flag.store(true, Ordering::Release),
                EventPayload::Disconnected => flag.store(false, Ordering::Release),
                EventPayload::Received { data, .. } => {
                    port.push_bytes(data);
                }
                _ => {}
            }
        })
        .map_err(|e| {
            log::warn!("MQTT: client start failed: {}", e);
            MqttError::ConnectFailed
        })?;

        info!("MQTT: client started for {}", settings.url());
        Ok(Self { client, connected })
    }
}

#[cfg(target_os = "espidf")]
fn qos(level: u8) -> esp_idf_svc::mqtt::client::QoS {
    use esp_idf_svc::mqtt::client::QoS;
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

#[cfg(target_os = "espidf")]
impl MqttClient for EspMqtt {
    fn connect(&mut self) -> Result<(), MqttError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MqttError::ConnectFailed)
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn subscribe(&mut self, topic: &str, level: u8) -> Result<(), MqttError> {
        self.client
            .subscribe(topic, qos(level))
            .map(|_| ())
            .map_err(|_| MqttError::SubscribeFailed)
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }
        self.client
            .enqueue(topic, qos(0), false, payload)
            .map(|_| ())
            .map_err(|_| MqttError::PublishFailed)
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub use sim::{SimBroker, SimMqtt};

#[cfg(not(target_os = "espidf"))]
mod sim {
    use std::sync::{Mutex, PoisonError};

    use super::*;

    #[derive(Default)]
    struct BrokerState {
        reachable: bool,
        subscriptions: Vec<(String, u8)>,
        published: Vec<(String, Vec<u8>)>,
        port: Option<IngressPort>,
    }

    /// In-memory broker shared between a [`SimMqtt`] and tests.
    #[derive(Clone, Default)]
    pub struct SimBroker {
        state: Arc<Mutex<BrokerState>>,
        connected: Arc<AtomicBool>,
    }

    impl SimBroker {
        pub fn new() -> Self {
            Self::default()
        }

        fn with<R>(&self, f: impl FnOnce(&mut BrokerState) -> R) -> R {
            let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        }

        pub fn set_reachable(&self, up: bool) {
            self.with(|b| b.reachable = up);
            if !up {
                self.connected.store(false, Ordering::Release);
            }
        }

        pub fn subscriptions(&self) -> Vec<(String, u8)> {
            self.with(|b| b.subscriptions.clone())
        }

        pub fn published(&self) -> Vec<(String, Vec<u8>)> {
            self.with(|b| b.published.clone())
        }

        /// Publish from the broker side. Reaches the device only if it is
        /// connected and subscribed to `topic`.
        pub fn deliver(&self, topic: &str, payload: &[u8]) -> usize {
            if !self.connected.load(Ordering::Acquire) {
                return 0;
            }
            self.with(|b| {
                let subscribed = b.subscriptions.iter().any(|(t, _)| t == topic);
                match (&mut b.port, subscribed) {
                    (Some(port), true) => port.push_bytes(payload),
                    _ => 0,
                }
            })
        }

        /// Build a client attached to this broker.
        pub fn client(&self, settings: &MqttSettings, inbox: Inbox) -> SimMqtt {
            self.with(|b| b.port = Some(IngressPort::new(Origin::Mqtt, inbox)));
            info!("MQTT(sim): client {} for {}", settings.client_id, settings.url());
            SimMqtt {
                broker: self.clone(),
            }
        }
    }

    pub struct SimMqtt {
        broker: SimBroker,
    }

    impl MqttClient for SimMqtt {
        fn connect(&mut self) -> Result<(), MqttError> {
            if self.broker.with(|b| b.reachable) {
                self.broker.connected.store(true, Ordering::Release);
                Ok(())
            } else {
                Err(MqttError::ConnectFailed)
            }
        }

        fn is_connected(&self) -> bool {
            self.broker.connected.load(Ordering::Acquire)
        }

        fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), MqttError> {
            if !self.is_connected() {
                return Err(MqttError::NotConnected);
            }
            self.broker.with(|b| {
                if !b.subscriptions.iter().any(|(t, _)| t == topic) {
                    b.subscriptions.push((topic.to_owned(), qos));
                }
            });
            Ok(())
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
            if !self.is_connected() {
                return Err(MqttError::NotConnected);
            }
            self.broker
                .with(|b| b.published.push((topic.to_owned(), payload.to_vec())));
            Ok(())
        }
    }
}
