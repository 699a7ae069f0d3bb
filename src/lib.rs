//! JunctionRelay node firmware library.
//!
//! Exposes the relay core (framing, routing, queues, ESP-NOW peers,
//! WebSocket/MQTT sessions, orchestrator) for integration testing. All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod espnow;
pub mod mqtt;
pub mod orchestrator;
pub mod protocol;
pub mod throttle;
pub mod websocket;

mod esp_link_shims;
