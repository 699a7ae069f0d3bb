//! MQTT transport: broker session and durable topic list.

pub mod session;
pub mod topics;

pub use session::MqttSession;
pub use topics::TopicRegistry;
