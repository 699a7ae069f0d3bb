//! Fuzz target: `FrameDecoder::feed`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder, split
//! at a data-dependent point, and asserts that it never panics and never
//! yields an empty or oversized payload.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use relaynode::protocol::codec::{FrameDecoder, MAX_PAYLOAD_SIZE};

fuzz_target!(|data: &[u8]| {
    let check = |payload: &[u8]| {
        assert!(!payload.is_empty(), "decoder must not yield empty payload");
        assert!(payload.len() <= MAX_PAYLOAD_SIZE, "payload exceeds MAX_PAYLOAD_SIZE");
    };

    let mut decoder = FrameDecoder::new();
    decoder.feed(data, check);

    // Same bytes in two chunks; the cut point comes from the input itself.
    decoder.reset();
    let cut = data.first().map_or(0, |b| usize::from(*b) % (data.len() + 1));
    decoder.feed(&data[..cut], check);
    decoder.feed(&data[cut..], check);
});
