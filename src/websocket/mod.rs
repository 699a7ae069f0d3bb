//! Backend WebSocket link: subnet discovery, handshake, keep-alive.

pub mod discovery;
pub mod messages;
pub mod session;

pub use messages::{DeviceIdentity, Telemetry};
pub use session::{SessionOutput, SessionState, WebSocketSession};
