//! Unified error types for the relay firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping
//! the orchestrator's error handling uniform. All variants are `Copy` so
//! they can be passed through queues and counters without allocation.
//!
//! Lower layers (frame decoding, peer table, queues) return these typed
//! errors; nothing in the ingest path turns them into panics.

use core::fmt;

use crate::app::ports::{MqttError, SinkError, StorageError, WsError};

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A wire frame was malformed.
    Frame(FrameError),
    /// A work queue rejected an item.
    Queue(QueueError),
    /// The ESP-NOW radio or peer table refused an operation.
    Radio(RadioError),
    /// Gateway forwarding failed.
    Forward(ForwardError),
    /// The backend WebSocket session could not carry a message.
    Session(SessionError),
    /// Persistent storage failed.
    Storage(StorageError),
    /// MQTT client failure.
    Mqtt(MqttError),
    /// The display/system sink rejected a payload.
    Sink(SinkError),
    /// Peripheral or service initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame(e) => write!(f, "frame: {e}"),
            Self::Queue(e) => write!(f, "queue: {e}"),
            Self::Radio(e) => write!(f, "radio: {e}"),
            Self::Forward(e) => write!(f, "forward: {e}"),
            Self::Session(e) => write!(f, "websocket: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Mqtt(e) => write!(f, "mqtt: {e}"),
            Self::Sink(e) => write!(f, "sink: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Frame errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// One of the eight length digits was not an ASCII digit.
    InvalidPrefix,
    /// Declared length was zero or above the payload limit.
    LengthOutOfRange(usize),
    /// An unframed (bare JSON) chunk exceeded the payload limit.
    Oversized(usize),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPrefix => write!(f, "length prefix is not 8 ASCII digits"),
            Self::LengthOutOfRange(n) => write!(f, "declared length {n} out of range"),
            Self::Oversized(n) => write!(f, "unframed chunk of {n} bytes too large"),
        }
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

// ---------------------------------------------------------------------------
// Queue errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// Queue at capacity; the new item was dropped.
    Full,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "queue full"),
        }
    }
}

impl From<QueueError> for Error {
    fn from(e: QueueError) -> Self {
        Self::Queue(e)
    }
}

// ---------------------------------------------------------------------------
// Radio errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// `begin()` has not succeeded yet.
    NotInitialized,
    /// Send mode is switched off.
    SendDisabled,
    /// Payload exceeds the 250-byte radio frame.
    PayloadTooLarge(usize),
    /// Destination is not in the peer table.
    UnknownPeer,
    /// Peer table is full even after evicting stale peers.
    PeerTableFull,
    /// MAC address text could not be parsed.
    InvalidMac,
    /// Removal of a peer that is not registered.
    PeerNotFound,
    /// The underlying driver returned an error code.
    Driver(i32),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "ESP-NOW not initialized"),
            Self::SendDisabled => write!(f, "send mode disabled"),
            Self::PayloadTooLarge(n) => write!(f, "payload of {n} bytes exceeds radio limit"),
            Self::UnknownPeer => write!(f, "peer not registered"),
            Self::PeerTableFull => write!(f, "peer table full"),
            Self::InvalidMac => write!(f, "invalid MAC address"),
            Self::PeerNotFound => write!(f, "peer not found"),
            Self::Driver(code) => write!(f, "driver error {code}"),
        }
    }
}

impl From<RadioError> for Error {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

// ---------------------------------------------------------------------------
// Gateway forwarding errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardError {
    /// `destination` is not a MAC address.
    InvalidDestination,
    /// The remainder of the message could not be re-serialised.
    Encode,
    /// The radio refused the send.
    Radio(RadioError),
}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDestination => write!(f, "destination is not a MAC address"),
            Self::Encode => write!(f, "re-serialisation failed"),
            Self::Radio(e) => write!(f, "{e}"),
        }
    }
}

impl From<RadioError> for ForwardError {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

impl From<ForwardError> for Error {
    fn from(e: ForwardError) -> Self {
        Self::Forward(e)
    }
}

// ---------------------------------------------------------------------------
// WebSocket session errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// Socket is not open.
    NotConnected,
    /// The client reported a send failure; the session was reset.
    SendFailed,
    /// No backend could be discovered on the local subnet.
    NoBackend,
    /// No network link is up.
    NoNetwork,
    /// Outbound message could not be serialised.
    Encode,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::SendFailed => write!(f, "send failed"),
            Self::NoBackend => write!(f, "no backend found"),
            Self::NoNetwork => write!(f, "no network"),
            Self::Encode => write!(f, "encode failed"),
        }
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<MqttError> for Error {
    fn from(e: MqttError) -> Self {
        Self::Mqtt(e)
    }
}

impl From<SinkError> for Error {
    fn from(e: SinkError) -> Self {
        Self::Sink(e)
    }
}

impl From<WsError> for SessionError {
    fn from(e: WsError) -> Self {
        match e {
            WsError::NotConnected => Self::NotConnected,
            WsError::ConnectFailed | WsError::SendFailed => Self::SendFailed,
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
