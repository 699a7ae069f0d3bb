//! Log-based sinks.
//!
//! [`LogStatusSink`] writes every connection status snapshot to the
//! ESP-IDF logger (UART / USB-CDC in production). [`LogDisplaySink`]
//! stands in for a panel driver on boards without a display: it logs
//! what it would render and keeps the last documents for inspection.

use log::info;
use serde_json::Value;

use crate::app::ports::{DisplaySink, SinkError, StatusSink};
use crate::app::status::ConnectionStatus;

#[derive(Default)]
pub struct LogStatusSink;

impl LogStatusSink {
    pub fn new() -> Self {
        Self
    }
}

impl StatusSink for LogStatusSink {
    fn publish(&mut self, s: &ConnectionStatus) {
        info!(
            "STATUS | net={} ip={} | wifi={} eth={} ws={} mqtt={} espnow={} | backend={}",
            s.active_network_type,
            s.ip_address,
            s.wifi_connected,
            s.ethernet_connected,
            s.web_socket_connected,
            s.mqtt_connected,
            s.esp_now_active,
            if s.backend_server_ip.is_empty() {
                "-"
            } else {
                s.backend_server_ip.as_str()
            },
        );
    }
}

#[derive(Default)]
pub struct LogDisplaySink {
    last_sensor: Option<Value>,
    last_config: Option<Value>,
}

impl LogDisplaySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_sensor(&self) -> Option<&Value> {
        self.last_sensor.as_ref()
    }

    pub fn last_config(&self) -> Option<&Value> {
        self.last_config.as_ref()
    }
}

impl DisplaySink for LogDisplaySink {
    fn route_sensor(&mut self, doc: &Value) -> Result<(), SinkError> {
        if !doc.is_object() {
            return Err(SinkError::Rejected("sensor payload is not an object"));
        }
        info!("DISPLAY | sensor {}", doc);
        self.last_sensor = Some(doc.clone());
        Ok(())
    }

    fn route_config(&mut self, doc: &Value) -> Result<(), SinkError> {
        if !doc.is_object() {
            return Err(SinkError::Rejected("layout is not an object"));
        }
        let layout = doc.get("type").and_then(Value::as_str).unwrap_or("?");
        info!("DISPLAY | config layout={}", layout);
        self.last_config = Some(doc.clone());
        Ok(())
    }
}
