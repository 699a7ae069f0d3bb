//! Ingest pipeline: framing, hand-off, routing and the work queues.
//!
//! ```text
//!  bytes ─▶ codec::FrameDecoder ─▶ ingress::Inbox ─▶ router::MessageRouter
//!                                                        │
//!                                   queue::SensorQueue ◀─┤
//!                                   queue::ConfigQueue ◀─┘
//!                                          │
//!                                          ▼
//!                                consumer tasks ─▶ DisplaySink
//! ```

pub mod codec;
pub mod consumer;
pub mod ingress;
pub mod message;
pub mod queue;
pub mod router;
pub mod transport;
