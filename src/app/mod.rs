//! Application boundary: port traits and the shared status snapshot.
//!
//! Everything the relay core needs from the outside world (storage,
//! radio, sockets, display, system services) is expressed as a trait
//! in [`ports`], keeping the protocol layer testable without hardware.

pub mod ports;
pub mod status;
