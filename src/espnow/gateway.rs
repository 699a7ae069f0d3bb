//! Gateway forwarding: relays a document carrying `destination` to that
//! ESP-NOW peer.
//!
//! Forwarding is best-effort. The radio reports delivery asynchronously
//! through the send-status callback, so a successful `forward` only means
//! the frame was handed to the driver.

use log::info;
use serde_json::Value;

use super::mac::MacAddr;
use super::peers::EspNowPeerManager;
use crate::app::ports::RadioDriver;
use crate::error::ForwardError;
use crate::protocol::router::{DESTINATION_FIELD, Forward};

pub struct GatewayForwarder<'a, R> {
    peers: &'a mut EspNowPeerManager<R>,
}

impl<'a, R: RadioDriver> GatewayForwarder<'a, R> {
    pub fn new(peers: &'a mut EspNowPeerManager<R>) -> Self {
        Self { peers }
    }
}

impl<R: RadioDriver> Forward for GatewayForwarder<'_, R> {
    fn forward(&mut self, destination: &str, mut doc: Value) -> Result<MacAddr, ForwardError> {
        let mac: MacAddr = destination
            .parse()
            .map_err(|_| ForwardError::InvalidDestination)?;

        if let Some(obj) = doc.as_object_mut() {
            obj.remove(DESTINATION_FIELD);
        }
        let body = serde_json::to_vec(&doc).map_err(|_| ForwardError::Encode)?;

        self.peers.send(&mac, &body)?;
        info!("Gateway: forwarded {} bytes to {}", body.len(), mac);
        Ok(mac)
    }
}
