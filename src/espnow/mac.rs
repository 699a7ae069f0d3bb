//! 6-byte hardware address with the `AA:BB:CC:DD:EE:FF` text form.

use core::fmt;
use core::str::FromStr;

use crate::error::RadioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Reserved ESP-NOW broadcast destination.
    pub const BROADCAST: Self = Self([0xFF; 6]);

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Upper-case hex without separators, e.g. `AABBCCDDEEFF`.
    pub fn compact(&self) -> heapless::String<12> {
        let mut out = heapless::String::new();
        use core::fmt::Write;
        for b in self.0 {
            let _ = write!(out, "{:02X}", b);
        }
        out
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = RadioError;

    /// Exactly 17 characters, `:` at every third position, hex elsewhere.
    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 17 {
            return Err(RadioError::InvalidMac);
        }
        let mut out = [0u8; 6];
        for (i, chunk) in bytes.chunks(3).enumerate() {
            if chunk.len() == 3 && chunk[2] != b':' {
                return Err(RadioError::InvalidMac);
            }
            let hi = hex_val(chunk[0]).ok_or(RadioError::InvalidMac)?;
            let lo = hex_val(chunk[1]).ok_or(RadioError::InvalidMac)?;
            out[i] = (hi << 4) | lo;
        }
        Ok(Self(out))
    }
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
