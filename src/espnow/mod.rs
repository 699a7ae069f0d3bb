//! ESP-NOW radio: addressing, the peer table and gateway forwarding.

pub mod gateway;
pub mod mac;
pub mod peers;

pub use gateway::GatewayForwarder;
pub use mac::MacAddr;
pub use peers::EspNowPeerManager;
