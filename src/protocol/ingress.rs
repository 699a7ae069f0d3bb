//! Ingress channel: hands decoded payloads from transport contexts to
//! the orchestrator task.
//!
//! ```text
//!  Serial thread ─┐
//!  HTTP handler  ─┤  IngressPort (own FrameDecoder)
//!  MQTT callback ─┤──────────────────────────────┐
//!                 │                              ▼
//!  Radio rx cb   ─┴──── submit() ──────▶ ┌──────────────┐ ──▶ Orchestrator
//!  Radio tx cb   ──────  (send status) ─▶│ Inbox (16)   │     (router, peers)
//!                                        └──────────────┘
//! ```
//!
//! Callback contexts only copy and `try_send`; a full inbox drops the item.
//! Radio callbacks go through a [`CountingInbox`] so those drops show up in
//! the ESP-NOW statistics. Each `IngressPort` owns the single decode buffer
//! for its channel.

use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{info, warn};

use super::codec::FrameDecoder;
use super::message::{Origin, Payload};
use super::transport::Transport;
use crate::drivers::task_pin::{self, Core};
use crate::espnow::mac::MacAddr;
use crate::throttle::LogThrottle;

/// Inbox depth.
pub const INGRESS_DEPTH: usize = 16;

const READ_BUF_SIZE: usize = 512;
const SERIAL_POLL_MS: u64 = 10;

/// Work handed to the orchestrator task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A complete payload and the channel it came from.
    Frame { origin: Origin, payload: Payload },
    /// Radio send-status callback.
    RadioSent { peer: MacAddr, delivered: bool },
}

pub type IngressChannel = Channel<CriticalSectionRawMutex, Inbound, INGRESS_DEPTH>;

/// Shared handle to the ingress channel.
pub type Inbox = Arc<IngressChannel>;

pub fn new_inbox() -> Inbox {
    Arc::new(Channel::new())
}

/// Non-blocking hand-off. Safe from callback context.
pub fn submit(inbox: &IngressChannel, msg: Inbound) -> bool {
    inbox.try_send(msg).is_ok()
}

/// Copy a whole message (no framing) into the inbox.
pub fn submit_message(inbox: &IngressChannel, origin: Origin, bytes: &[u8]) -> bool {
    match Payload::new(bytes) {
        Some(payload) => submit(inbox, Inbound::Frame { origin, payload }),
        None => false,
    }
}

/// Inbox handle for driver callbacks. Counts every item the inbox
/// refused; clones share the counter.
#[derive(Clone)]
pub struct CountingInbox {
    inbox: Inbox,
    dropped: Arc<AtomicU32>,
}

impl CountingInbox {
    pub fn new(inbox: Inbox) -> Self {
        Self {
            inbox,
            dropped: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn submit(&self, msg: Inbound) -> bool {
        self.count(submit(&self.inbox, msg))
    }

    pub fn submit_message(&self, origin: Origin, bytes: &[u8]) -> bool {
        self.count(submit_message(&self.inbox, origin, bytes))
    }

    fn count(&self, accepted: bool) -> bool {
        if !accepted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        accepted
    }

    /// Items refused since creation or the last reset.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn reset_dropped(&self) {
        self.dropped.store(0, Ordering::Relaxed);
    }
}

// ── Per-channel decoder + hand-off ───────────────────────────

/// One framed ingress channel: its decoder and its link to the inbox.
pub struct IngressPort {
    origin: Origin,
    decoder: FrameDecoder,
    inbox: Inbox,
    submitted: u32,
    dropped: u32,
    throttle: LogThrottle,
}

impl IngressPort {
    pub fn new(origin: Origin, inbox: Inbox) -> Self {
        Self {
            origin,
            decoder: FrameDecoder::new(),
            inbox,
            submitted: 0,
            dropped: 0,
            throttle: LogThrottle::new(),
        }
    }

    /// Decode `data` and forward every complete payload. Returns how many
    /// payloads reached the inbox.
    pub fn push_bytes(&mut self, data: &[u8]) -> usize {
        let origin = self.origin;
        let inbox = &self.inbox;
        let mut accepted = 0;
        let mut rejected = 0;
        self.decoder.feed(data, |bytes| {
            if submit_message(inbox, origin, bytes) {
                accepted += 1;
            } else {
                rejected += 1;
            }
        });

        self.submitted += accepted;
        if rejected > 0 {
            self.dropped += rejected;
            if self.throttle.allow() {
                warn!("IO[{}]: inbox full, dropped {} payload(s)", origin, rejected);
            }
        }
        accepted as usize
    }

    pub fn reset(&mut self) {
        self.decoder.reset();
    }

    pub fn submitted(&self) -> u32 {
        self.submitted
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }
}

// ── Serial ingress loop ──────────────────────────────────────

async fn serial_loop<T: Transport>(mut transport: T, mut port: IngressPort) {
    let mut read_buf = [0u8; READ_BUF_SIZE];
    loop {
        loop {
            match transport.read(&mut read_buf) {
                Ok(0) => break,
                Ok(n) => {
                    port.push_bytes(&read_buf[..n]);
                }
                Err(e) => {
                    warn!("IO[serial]: read error {:?}, resetting decoder", e);
                    port.reset();
                    break;
                }
            }
        }
        async_io_mini::Timer::after(Duration::from_millis(SERIAL_POLL_MS)).await;
    }
}

fn run_serial(transport: impl Transport, port: IngressPort) {
    let executor: edge_executor::LocalExecutor<'_, 2> = edge_executor::LocalExecutor::new();
    executor.spawn(serial_loop(transport, port)).detach();
    info!("IO[serial]: ingress task started");
    futures_lite::future::block_on(executor.run(core::future::pending::<()>()));
}

/// Spawn the serial ingress thread on the protocol core.
pub fn spawn_serial<T>(transport: T, inbox: Inbox) -> std::io::Result<std::thread::JoinHandle<()>>
where
    T: Transport + Send + 'static,
{
    let port = IngressPort::new(Origin::Serial, inbox);
    task_pin::spawn_on_core(Core::Pro, 5, 6, "serial-in\0", move || {
        run_serial(transport, port);
    })
}
