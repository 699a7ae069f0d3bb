//! Length-prefix frame codec.
//!
//! Wire format:
//! ```text
//! ┌──────────────────────┬──────────────────────────┐
//! │ Length (8 B)         │ JSON payload (N B)       │
//! │ ASCII decimal, 0-pad │ 1 ≤ N ≤ 8192             │
//! └──────────────────────┴──────────────────────────┘
//! ```
//!
//! Transports that already deliver whole messages may skip the prefix:
//! a chunk that begins with `{` while the decoder is idle is taken as one
//! complete unframed payload.
//!
//! The decoder accumulates bytes across any number of `feed` calls. A
//! single call may complete one frame and start the next (or complete
//! several); every complete payload is handed to the callback in order.
//! Malformed prefixes and out-of-range lengths reset the decoder and
//! discard the rest of the chunk, so a corrupted stream costs at most the
//! chunk it arrived in.

use log::{debug, warn};

use crate::error::FrameError;
use crate::throttle::LogThrottle;

/// Maximum payload size (protects against memory exhaustion).
pub const MAX_PAYLOAD_SIZE: usize = 8192;

/// Length prefix size (8 ASCII digits).
pub const PREFIX_LEN: usize = 8;

/// Decoder state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Waiting for prefix digits.
    ReadingLength { collected: usize },
    /// Prefix validated, reading payload.
    ReadingPayload { expected: usize, collected: usize },
}

/// Per-decoder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub frames: u32,
    pub unframed: u32,
    pub rejected: u32,
    pub last_error: Option<FrameError>,
}

/// Streaming frame decoder. One instance per ingress channel; never shared.
pub struct FrameDecoder {
    state: DecoderState,
    prefix_buf: [u8; PREFIX_LEN],
    payload_buf: Box<[u8]>,
    stats: DecoderStats,
    throttle: LogThrottle,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::ReadingLength { collected: 0 },
            prefix_buf: [0; PREFIX_LEN],
            payload_buf: vec![0u8; MAX_PAYLOAD_SIZE].into_boxed_slice(),
            stats: DecoderStats::default(),
            throttle: LogThrottle::new(),
        }
    }

    /// `true` when no bytes of the current frame have been consumed.
    pub fn is_idle(&self) -> bool {
        self.state == DecoderState::ReadingLength { collected: 0 }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Feed bytes into the decoder, invoking `on_payload` once per complete
    /// payload. The slice passed to the callback is only valid during the
    /// call. Empty input is a no-op.
    pub fn feed(&mut self, data: &[u8], mut on_payload: impl FnMut(&[u8])) {
        if data.is_empty() {
            return;
        }

        if self.is_idle() && data[0] == b'{' {
            if data.len() > MAX_PAYLOAD_SIZE {
                self.reject(FrameError::Oversized(data.len()));
                return;
            }
            self.stats.unframed += 1;
            on_payload(data);
            return;
        }

        let mut offset = 0;
        while offset < data.len() {
            match self.state {
                DecoderState::ReadingLength { collected } => {
                    let to_copy = (PREFIX_LEN - collected).min(data.len() - offset);
                    self.prefix_buf[collected..collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);
                    offset += to_copy;

                    let collected = collected + to_copy;
                    if collected < PREFIX_LEN {
                        self.state = DecoderState::ReadingLength { collected };
                        continue;
                    }

                    match parse_prefix(&self.prefix_buf) {
                        Ok(expected) => {
                            self.state = DecoderState::ReadingPayload {
                                expected,
                                collected: 0,
                            };
                        }
                        Err(e) => {
                            self.reject(e);
                            return;
                        }
                    }
                }

                DecoderState::ReadingPayload {
                    expected,
                    collected,
                } => {
                    let to_copy = (expected - collected).min(data.len() - offset);
                    self.payload_buf[collected..collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);
                    offset += to_copy;

                    let collected = collected + to_copy;
                    if collected == expected {
                        self.state = DecoderState::ReadingLength { collected: 0 };
                        self.stats.frames += 1;
                        on_payload(&self.payload_buf[..expected]);
                    } else {
                        self.state = DecoderState::ReadingPayload {
                            expected,
                            collected,
                        };
                    }
                }
            }
        }
    }

    /// Reset decoder state (e.g. after a transport reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingLength { collected: 0 };
    }

    fn reject(&mut self, e: FrameError) {
        self.reset();
        self.stats.rejected += 1;
        self.stats.last_error = Some(e);
        if self.throttle.allow() {
            warn!("Decoder: {}, resynchronising", e);
        } else {
            debug!("Decoder: {} (log suppressed)", e);
        }
    }
}

fn parse_prefix(prefix: &[u8; PREFIX_LEN]) -> Result<usize, FrameError> {
    if !prefix.iter().all(u8::is_ascii_digit) {
        return Err(FrameError::InvalidPrefix);
    }
    let len = prefix
        .iter()
        .fold(0usize, |acc, d| acc * 10 + usize::from(d - b'0'));
    if len == 0 || len > MAX_PAYLOAD_SIZE {
        return Err(FrameError::LengthOutOfRange(len));
    }
    Ok(len)
}

/// Encode a payload as `[8-digit zero-padded length][payload]`.
///
/// Returns `None` for empty or oversized payloads.
pub fn encode_frame(payload: &[u8]) -> Option<Vec<u8>> {
    if payload.is_empty() || payload.len() > MAX_PAYLOAD_SIZE {
        return None;
    }
    let mut out = Vec::with_capacity(PREFIX_LEN + payload.len());
    out.extend_from_slice(format!("{:08}", payload.len()).as_bytes());
    out.extend_from_slice(payload);
    Some(out)
}
